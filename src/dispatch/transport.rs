use super::{Channel, DispatchRequest};
use crate::config::{DispatchConfig, TransportConfig, TransportKind};
use crate::error::{BridgeError, DispatchError};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// The actuator side of the dispatch boundary
#[async_trait]
pub trait DispatchTransport: Send + Sync {
    async fn send(&self, request: &DispatchRequest) -> Result<(), DispatchError>;

    fn name(&self) -> &'static str;
}

/// JSON body for a request
///
/// Gesture: `{"uid", "gesture"}`; voice: `{"uid", "voice", "type": "voice"}`;
/// both carry `request_id` and `issued_at`.
pub fn request_body(uid: &str, request: &DispatchRequest) -> Value {
    let mut body = match request.channel {
        Channel::Gesture => json!({
            "uid": uid,
            "gesture": request.value,
        }),
        Channel::Voice => json!({
            "uid": uid,
            "voice": request.value,
            "type": "voice",
        }),
    };
    body["request_id"] = json!(request.id.to_string());
    body["issued_at"] = json!(request.issued_at.to_rfc3339());
    body
}

/// Logs requests instead of sending them
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl DispatchTransport for LogTransport {
    async fn send(&self, request: &DispatchRequest) -> Result<(), DispatchError> {
        info!(
            request_id = %request.id,
            resend = request.resend,
            "Dispatch {} '{}'",
            request.channel,
            request.value
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// POSTs JSON to a per-channel endpoint
///
/// `ureq` is blocking, so each request runs on the blocking pool.
#[cfg(feature = "http")]
pub struct HttpTransport {
    agent: ureq::Agent,
    gesture_url: String,
    voice_url: String,
    uid: String,
}

#[cfg(feature = "http")]
impl HttpTransport {
    pub fn new(config: &TransportConfig, timeout: std::time::Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            gesture_url: config.gesture_url.clone(),
            voice_url: config.voice_url.clone(),
            uid: config.uid.clone(),
        }
    }

    fn url(&self, channel: Channel) -> &str {
        match channel {
            Channel::Gesture => &self.gesture_url,
            Channel::Voice => &self.voice_url,
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl DispatchTransport for HttpTransport {
    async fn send(&self, request: &DispatchRequest) -> Result<(), DispatchError> {
        let agent = self.agent.clone();
        let url = self.url(request.channel).to_string();
        let body = request_body(&self.uid, request);

        let result = tokio::task::spawn_blocking(move || {
            agent
                .post(&url)
                .set("Content-Type", "application/json")
                .send_json(body)
        })
        .await
        .map_err(|e| DispatchError::Transport {
            details: format!("Send task failed: {}", e),
        })?;

        match result {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, response)) => Err(DispatchError::Rejected {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => Err(DispatchError::Transport {
                details: transport.to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Pick the transport for the configuration; dry runs always log
pub fn build_transport(
    transport: &TransportConfig,
    dispatch: &DispatchConfig,
    dry_run: bool,
) -> Result<Arc<dyn DispatchTransport>, BridgeError> {
    if dry_run || transport.kind == TransportKind::Log {
        info!("Using log transport");
        return Ok(Arc::new(LogTransport));
    }

    #[cfg(feature = "http")]
    {
        info!(
            "Using HTTP transport (gesture: {}, voice: {})",
            transport.gesture_url, transport.voice_url
        );
        let timeout = crate::config::secs(dispatch.send_timeout);
        Ok(Arc::new(HttpTransport::new(transport, timeout)))
    }

    #[cfg(not(feature = "http"))]
    {
        let _ = dispatch;
        Err(BridgeError::system(
            "HTTP transport requested but smartbridge was built without the `http` feature",
        ))
    }
}
