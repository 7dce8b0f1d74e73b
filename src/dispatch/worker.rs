use super::transport::DispatchTransport;
use super::DispatchRequest;
use crate::error::DispatchError;
use crate::events::{BridgeEvent, EventBus};

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pool of sender tasks draining the dispatch queue
pub struct SenderPool {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl SenderPool {
    /// Spawn `workers` tasks sharing one queue
    ///
    /// Workers exit once the queue is closed and drained, or when `cancel`
    /// fires.
    pub fn spawn(
        workers: usize,
        receiver: mpsc::Receiver<DispatchRequest>,
        transport: Arc<dyn DispatchTransport>,
        send_timeout: Duration,
        event_bus: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        info!(
            "Starting {} dispatch workers using {} transport",
            workers,
            transport.name()
        );

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let transport = Arc::clone(&transport);
                let event_bus = event_bus.clone();
                let cancel = cancel.clone();

                tokio::spawn(async move {
                    debug!("Dispatch worker {} started", worker_id);
                    loop {
                        let next = tokio::select! {
                            _ = cancel.cancelled() => None,
                            request = async { receiver.lock().await.recv().await } => request,
                        };
                        let Some(request) = next else { break };

                        deliver(transport.as_ref(), &request, send_timeout, &event_bus).await;
                    }
                    debug!("Dispatch worker {} stopped", worker_id);
                })
            })
            .collect();

        Self { handles, cancel }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Wait for the workers to drain the queue, cancelling them after `timeout`
    ///
    /// Returns `true` if every worker finished on its own.
    pub async fn join(self, timeout: Duration) -> bool {
        let cancel = self.cancel.clone();
        let mut joined = Box::pin(join_all(self.handles));

        match tokio::time::timeout(timeout, &mut joined).await {
            Ok(_) => true,
            Err(_) => {
                warn!(
                    "Dispatch workers did not drain within {:?}, cancelling",
                    timeout
                );
                cancel.cancel();
                let _ = tokio::time::timeout(Duration::from_secs(1), joined).await;
                false
            }
        }
    }
}

/// Send one request with its own timeout and report the result
///
/// Failures are reported, never retried and never fed back into debounce state.
pub async fn deliver(
    transport: &dyn DispatchTransport,
    request: &DispatchRequest,
    send_timeout: Duration,
    event_bus: &EventBus,
) {
    let started = Instant::now();
    let result = match tokio::time::timeout(send_timeout, transport.send(request)).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::Timeout {
            after_ms: send_timeout.as_millis() as u64,
        }),
    };

    let event = match result {
        Ok(()) => {
            let latency_ms = started.elapsed().as_millis() as u64;
            info!(
                "Sent {} '{}' ({}ms{})",
                request.channel,
                request.value,
                latency_ms,
                if request.resend { ", resend" } else { "" }
            );
            BridgeEvent::DispatchSent {
                request_id: request.id.to_string(),
                channel: request.channel,
                value: request.value.clone(),
                resend: request.resend,
                latency_ms,
            }
        }
        Err(e) => {
            warn!("Failed to send {} '{}': {}", request.channel, request.value, e);
            BridgeEvent::DispatchFailed {
                request_id: request.id.to_string(),
                channel: request.channel,
                value: request.value.clone(),
                error: e.to_string(),
            }
        }
    };

    let _ = event_bus.publish(event);
}
