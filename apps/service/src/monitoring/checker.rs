use async_trait::async_trait;
use reqwest::{Method, redirect};
use url::Url;

use super::types::{CheckOutcome, CheckSpec, HttpMethod, Protocol};

/// What to probe, stripped of scheduling state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub protocol: Protocol,
    pub url: String,
    pub method: HttpMethod,
}

impl ProbeRequest {
    pub fn target(&self) -> String {
        format!("{}://{}", self.protocol, self.url)
    }
}

impl From<&CheckSpec> for ProbeRequest {
    fn from(spec: &CheckSpec) -> Self {
        Self { protocol: spec.protocol, url: spec.url.clone(), method: spec.method }
    }
}

/// How a probe ended when it was not cut short by the timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeReply {
    Status(u16),
    TransportError(String),
}

impl From<ProbeReply> for CheckOutcome {
    fn from(reply: ProbeReply) -> Self {
        match reply {
            ProbeReply::Status(code) => CheckOutcome::response(code),
            ProbeReply::TransportError(details) => CheckOutcome::transport_error(details),
        }
    }
}

/// Outbound transport used by the executor.
///
/// Implementations do not enforce the check timeout; the executor races the
/// returned future against its own timer and drops it when the timer wins.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn probe(&self, request: &ProbeRequest) -> ProbeReply;
}

/// HTTP/HTTPS transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> reqwest::Result<Self> {
        // Redirects are reported as-is so a 301 can be listed as a success code.
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(concat!("upwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[async_trait]
impl ProbeTransport for HttpTransport {
    async fn probe(&self, request: &ProbeRequest) -> ProbeReply {
        let target = match Url::parse(&request.target()) {
            Ok(target) => target,
            Err(e) => return ProbeReply::TransportError(format!("invalid target URL: {e}")),
        };

        match self.client.request(to_reqwest_method(request.method), target).send().await {
            Ok(response) => ProbeReply::Status(response.status().as_u16()),
            Err(e) => ProbeReply::TransportError(e.to_string()),
        }
    }
}
