//! In-memory doubles for every collaborator of the monitoring engine.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::clock::Clock;
use crate::monitoring::checker::{ProbeReply, ProbeRequest, ProbeTransport};
use crate::monitoring::types::{CheckSpec, CheckState, HttpMethod, LogRecord, Protocol};
use crate::notify::{Notifier, NotifyError};
use crate::storage::{CheckStore, LogError, LogSink, StoreError};

pub fn sample_spec() -> CheckSpec {
    CheckSpec {
        id: "abcdefghij0123456789".to_string(),
        owner_id: "5551234567".to_string(),
        protocol: Protocol::Http,
        url: "example.com/health".to_string(),
        method: HttpMethod::Get,
        success_codes: BTreeSet::from([200]),
        timeout_seconds: 2,
        state: CheckState::Down,
        last_checked: None,
    }
}

/// Spec with a different id and url, for multi-check sweeps
pub fn spec_for(id_prefix: char, url: &str) -> CheckSpec {
    CheckSpec {
        id: std::iter::repeat_n(id_prefix, 20).collect(),
        url: url.to_string(),
        ..sample_spec()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum TimerMode {
    /// `sleep` never completes
    Frozen,
    /// `sleep` completes immediately
    Instant,
}

/// Clock with a settable `now` and timers that either never or instantly fire
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    timers: TimerMode,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    fn with_mode(timers: TimerMode) -> Self {
        let start = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap_or_default();
        Self { now: Mutex::new(start), timers, sleeps: Mutex::new(Vec::new()) }
    }

    pub fn frozen() -> Self {
        Self::with_mode(TimerMode::Frozen)
    }

    pub fn instant_timers() -> Self {
        Self::with_mode(TimerMode::Instant)
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    pub fn requested_sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }

    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
        if let TimerMode::Frozen = self.timers {
            std::future::pending::<()>().await;
        }
    }
}

enum Behavior {
    Reply(ProbeReply),
    Hang,
    ByTarget(HashMap<String, ProbeReply>),
}

/// Transport with canned replies that records what it was asked to probe
pub struct ScriptedTransport {
    behavior: Behavior,
    calls: AtomicUsize,
    targets: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn with_behavior(behavior: Behavior) -> Self {
        Self { behavior, calls: AtomicUsize::new(0), targets: Mutex::new(Vec::new()) }
    }

    pub fn replying(reply: ProbeReply) -> Self {
        Self::with_behavior(Behavior::Reply(reply))
    }

    pub fn hanging() -> Self {
        Self::with_behavior(Behavior::Hang)
    }

    /// Reply per target URL; unknown targets answer 200
    pub fn by_target(replies: impl IntoIterator<Item = (String, ProbeReply)>) -> Self {
        Self::with_behavior(Behavior::ByTarget(replies.into_iter().collect()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probed_targets(&self) -> Vec<String> {
        let mut targets = lock(&self.targets).clone();
        targets.sort();
        targets
    }
}

#[async_trait]
impl ProbeTransport for ScriptedTransport {
    async fn probe(&self, request: &ProbeRequest) -> ProbeReply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.targets).push(request.target());

        match &self.behavior {
            Behavior::Reply(reply) => reply.clone(),
            Behavior::Hang => std::future::pending().await,
            Behavior::ByTarget(replies) => {
                replies.get(&request.target()).cloned().unwrap_or(ProbeReply::Status(200))
            }
        }
    }
}

/// Check store backed by a map of raw records
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, Value>>,
    written: Mutex<HashMap<String, CheckSpec>>,
    fail_writes: AtomicBool,
    fail_list: AtomicBool,
}

impl MemoryStore {
    pub fn insert_raw(&self, id: &str, raw: Value) {
        lock(&self.records).insert(id.to_string(), raw);
    }

    pub fn insert(&self, spec: &CheckSpec) {
        let raw = serde_json::to_value(spec).unwrap_or(Value::Null);
        self.insert_raw(&spec.id, raw);
    }

    /// Id listed by the store but with no record behind it
    pub fn insert_dangling(&self, id: &str) {
        self.insert_raw(id, Value::Null);
    }

    pub fn written(&self, id: &str) -> Option<CheckSpec> {
        lock(&self.written).get(id).cloned()
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_list(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    fn io_error(id: &str) -> StoreError {
        StoreError::Io {
            path: PathBuf::from(format!("memory/{id}")),
            source: std::io::Error::other("simulated failure"),
        }
    }
}

#[async_trait]
impl CheckStore for MemoryStore {
    async fn list_check_ids(&self) -> Result<Vec<String>, StoreError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::io_error("checks"));
        }
        Ok(lock(&self.records).keys().cloned().collect())
    }

    async fn read_check(&self, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(lock(&self.records).get(id).filter(|raw| !raw.is_null()).cloned())
    }

    async fn write_check(&self, id: &str, spec: &CheckSpec) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::io_error(id));
        }
        let raw = serde_json::to_value(spec).map_err(|source| StoreError::Serialize { id: id.to_string(), source })?;
        lock(&self.records).insert(id.to_string(), raw);
        lock(&self.written).insert(id.to_string(), spec.clone());
        Ok(())
    }
}

/// Log sink that keeps records in memory and can fail compression per log
#[derive(Default)]
pub struct MemoryLogSink {
    live: Mutex<BTreeMap<String, Vec<LogRecord>>>,
    archives: Mutex<Vec<(String, String)>>,
    failing_compress: Mutex<BTreeSet<String>>,
}

impl MemoryLogSink {
    pub fn records(&self, check_id: &str) -> Vec<LogRecord> {
        lock(&self.live).get(check_id).cloned().unwrap_or_default()
    }

    /// `(log_id, archive_id)` pairs in the order they were compressed
    pub fn archives(&self) -> Vec<(String, String)> {
        lock(&self.archives).clone()
    }

    pub fn fail_compress(&self, log_id: &str) {
        lock(&self.failing_compress).insert(log_id.to_string());
    }

    fn archive(&self, log_id: &str, archive_id: &str) -> Result<(), LogError> {
        if lock(&self.failing_compress).contains(log_id) {
            return Err(LogError::Io {
                path: PathBuf::from(format!("memory/{archive_id}")),
                source: std::io::Error::other("simulated compression failure"),
            });
        }
        lock(&self.archives).push((log_id.to_string(), archive_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn append(&self, check_id: &str, record: &LogRecord) -> Result<(), LogError> {
        lock(&self.live).entry(check_id.to_string()).or_default().push(record.clone());
        Ok(())
    }

    async fn list_rotatable(&self) -> Result<Vec<String>, LogError> {
        Ok(lock(&self.live)
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn compress(&self, log_id: &str, archive_id: &str) -> Result<(), LogError> {
        self.archive(log_id, archive_id)
    }

    async fn truncate(&self, log_id: &str) -> Result<(), LogError> {
        if let Some(records) = lock(&self.live).get_mut(log_id) {
            records.clear();
        }
        Ok(())
    }

    async fn rotate(&self, log_id: &str, archive_id: &str) -> Result<(), LogError> {
        // Holding the live map keeps appends out until the log is emptied.
        let mut live = lock(&self.live);
        self.archive(log_id, archive_id)?;
        if let Some(records) = live.get_mut(log_id) {
            records.clear();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    /// `(recipient, message)` pairs in send order
    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        lock(&self.sent).push((recipient.to_string(), message.to_string()));
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _recipient: &str, _message: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected(503))
    }
}

/// Accept one HTTP request on a local port and answer it with `status`.
///
/// Returns the base URL and a handle resolving to the raw request text.
pub async fn serve_once(status: u16) -> (String, tokio::task::JoinHandle<String>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response =
            format!("HTTP/1.1 {status} Test\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });

    (base, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let read = socket.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);

        if let Some(end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buffer[..end]).to_ascii_lowercase();
            let body_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= end + 4 + body_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buffer).into_owned()
}
