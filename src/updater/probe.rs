//! Best-effort network reachability check run before a scheduled update check.

use std::time::Duration;

use futures::future::BoxFuture;

/// Advisory reachability check. A `false` only means "skip this cycle";
/// it is never an error state.
pub trait ReachabilityProbe: Send + Sync {
    fn is_reachable(&self, host: &str, timeout: Duration) -> BoxFuture<'static, bool>;
}

/// Probes by resolving the feed host through the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsProbe;

impl ReachabilityProbe for DnsProbe {
    fn is_reachable(&self, host: &str, timeout: Duration) -> BoxFuture<'static, bool> {
        let host = host.to_string();
        Box::pin(async move { is_reachable(&host, timeout).await })
    }
}

/// Resolve `host` within `timeout`. Never fails; any error reads as unreachable.
pub async fn is_reachable(host: &str, timeout: Duration) -> bool {
    if host.is_empty() {
        return false;
    }
    match tokio::time::timeout(timeout, tokio::net::lookup_host((host, 443))).await {
        Ok(Ok(mut addrs)) => addrs.next().is_some(),
        Ok(Err(e)) => {
            log::debug!("Reachability lookup for {host} failed: {e}");
            false
        }
        Err(_) => {
            log::debug!("Reachability lookup for {host} timed out after {timeout:?}");
            false
        }
    }
}
