use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use shared::headers::Header;
use shared::message::{Message, MessageType};
use shared::protocol::{MAX_WAIT_SECS, MIN_WAIT_SECS, SEARCH_REPEAT, SSDP_ALL};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::net::transport::Transport;
use crate::scope::Scope;

/// Issues M-SEARCH requests through a transport.
///
/// Each search is sent `SEARCH_REPEAT` times, `MX` seconds apart, from a
/// background task. Responses come back through the transport's normal
/// receive path; nothing is correlated here.
pub struct SearchEmitter {
    transport: Arc<Transport>,
    control_point: String,
    scope: Scope,
}

impl SearchEmitter {
    pub fn new(transport: Arc<Transport>, control_point: impl Into<String>, scope: Scope) -> Self {
        Self {
            transport,
            control_point: control_point.into(),
            scope,
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Build the M-SEARCH request for `target` (default `ssdp:all`)
    pub fn request(&self, target: Option<&str>, max_wait: u32) -> Message {
        Message::new(MessageType::Search)
            .with_header(Header::Host, self.transport.interface().multicast_host())
            .with_header(Header::SearchTarget, target.unwrap_or(SSDP_ALL))
            .with_header(Header::MaxWaitTime, clamp_wait(max_wait).to_string())
            .with_header(Header::ControlPointFriendlyName, self.control_point.as_str())
    }

    /// Start a search without waiting for the repeats to finish
    pub fn search(&self, target: Option<&str>, max_wait: u32) -> Option<JoinHandle<()>> {
        self.search_to(target, max_wait, None)
    }

    /// Like `search`, but sent to `destination` instead of the multicast group
    pub fn search_to(
        &self,
        target: Option<&str>,
        max_wait: u32,
        destination: Option<SocketAddr>,
    ) -> Option<JoinHandle<()>> {
        if self.scope.is_closed() {
            tracing::debug!("Search on {} skipped: scope closed", self.transport.interface().name);
            return None;
        }

        let request = self.request(target, max_wait);
        let delay = Duration::from_secs(u64::from(clamp_wait(max_wait)));
        let transport = Arc::clone(&self.transport);
        let cancel = self.scope.child_token();

        tracing::debug!(
            "M-SEARCH {} on {}",
            target.unwrap_or(SSDP_ALL),
            transport.interface().name
        );

        Some(self.scope.spawn(async move {
            repeat(SEARCH_REPEAT, delay, &cancel, |attempt| {
                let transport = Arc::clone(&transport);
                let request = request.clone();
                async move {
                    let sent = transport
                        .send(&request, destination.map(|d| d.ip()), destination.map(|d| d.port()))
                        .await;
                    if let Err(e) = sent {
                        tracing::warn!("M-SEARCH {}/{} failed: {}", attempt, SEARCH_REPEAT, e);
                    }
                }
            })
            .await;
        }))
    }
}

fn clamp_wait(max_wait: u32) -> u32 {
    max_wait.clamp(MIN_WAIT_SECS, MAX_WAIT_SECS)
}

/// Run `attempt` `times` times with `delay` between runs, stopping early on
/// cancellation. Returns how many attempts ran.
async fn repeat<F, Fut>(times: u32, delay: Duration, cancel: &CancellationToken, mut attempt: F) -> u32
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut done = 0;
    for n in 1..=times {
        if cancel.is_cancelled() {
            break;
        }
        attempt(n).await;
        done = n;

        if n < times {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
    done
}
