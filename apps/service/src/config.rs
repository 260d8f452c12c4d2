use std::{env, fmt, fs, path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::SchedulerConfig;
use crate::notify::twilio::TwilioSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadFailed {
        path: path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    WriteFailed {
        path: path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available: neither XDG_CONFIG_HOME nor a home directory is set")]
    ConfigPathUnavailable,
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: Storage,
    pub scheduler: Scheduler,
    pub notifier: Notifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    /// Root of the check store; checks live in `<data_dir>/checks`
    pub data_dir: path::PathBuf,
    pub logs_dir: path::PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scheduler {
    pub sweep_interval_seconds: u64,
    pub rotation_interval_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Log,
    Twilio,
    Webhook,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notifier {
    pub kind: NotifierKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twilio: Option<Twilio>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<Webhook>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Twilio {
    pub account_sid: String,
    pub auth_token: String,
    pub from_phone: String,
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(default = "default_twilio_api")]
    pub api_base: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub url: String,
}

fn default_country_code() -> String {
    "+1".into()
}

fn default_twilio_api() -> String {
    "https://api.twilio.com".into()
}

impl Default for Storage {
    fn default() -> Self {
        Self { data_dir: ".data".into(), logs_dir: ".logs".into() }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self { sweep_interval_seconds: 60, rotation_interval_seconds: 86_400 }
    }
}

impl From<&Twilio> for TwilioSettings {
    fn from(twilio: &Twilio) -> Self {
        Self {
            account_sid: twilio.account_sid.clone(),
            auth_token: twilio.auth_token.clone(),
            from_phone: twilio.from_phone.clone(),
            country_code: twilio.country_code.clone(),
            api_base: twilio.api_base.clone(),
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/upwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("upwatch/config.toml"))
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "********" }
}

impl fmt::Display for NotifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifierKind::Log => write!(f, "log"),
            NotifierKind::Twilio => write!(f, "twilio"),
            NotifierKind::Webhook => write!(f, "webhook"),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Storage")?;
        write_1(f, "Data Directory", &self.storage.data_dir.display())?;
        write_1(f, "Logs Directory", &self.storage.logs_dir.display())?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Sweep Interval (s)", &self.scheduler.sweep_interval_seconds)?;
        write_1(f, "Rotation Interval (s)", &self.scheduler.rotation_interval_seconds)?;
        write_title_1(f, "Notifier")?;
        write_1(f, "Kind", &self.notifier.kind)?;
        if let Some(twilio) = &self.notifier.twilio {
            write_1(f, "Twilio", &"")?;
            write_2(f, "Account SID", &twilio.account_sid)?;
            write_2(f, "Auth Token", &mask(&twilio.auth_token))?;
            write_2(f, "From Phone", &twilio.from_phone)?;
            write_2(f, "Country Code", &twilio.country_code)?;
        }
        if let Some(webhook) = &self.notifier.webhook {
            write_1(f, "Webhook URL", &webhook.url)?;
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/upwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str::<Self>(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Reject settings the scheduler or notifier cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.sweep_interval_seconds == 0 {
            return Err(ConfigError::Invalid("scheduler.sweep_interval_seconds must be positive".into()));
        }
        if self.scheduler.rotation_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.rotation_interval_seconds must be positive".into(),
            ));
        }

        match self.notifier.kind {
            NotifierKind::Twilio if self.notifier.twilio.is_none() => {
                Err(ConfigError::Invalid("notifier.kind is twilio but [notifier.twilio] is missing".into()))
            }
            NotifierKind::Webhook if self.notifier.webhook.is_none() => Err(ConfigError::Invalid(
                "notifier.kind is webhook but [notifier.webhook] is missing".into(),
            )),
            _ => Ok(()),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            sweep_interval: Duration::from_secs(self.scheduler.sweep_interval_seconds),
            rotation_interval: Duration::from_secs(self.scheduler.rotation_interval_seconds),
        }
    }
}
