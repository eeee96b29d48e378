//! Network readiness gate.

use std::time::Duration;

use async_trait::async_trait;

use crate::alert;

/// Resolves host names.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Whether `host` resolves to at least one address.
    async fn resolves(&self, host: &str) -> std::io::Result<bool>;
}

/// Resolver backed by the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolves(&self, host: &str) -> std::io::Result<bool> {
        let mut addrs = tokio::net::lookup_host((host, 80)).await?;
        Ok(addrs.next().is_some())
    }
}

/// Block until `host` resolves, retrying every `delay`.
///
/// There is no retry limit. Returns the number of failed attempts.
pub async fn wait_for_network(resolver: &dyn Resolver, host: &str, delay: Duration) -> u32 {
    let mut failures = 0;
    loop {
        match resolver.resolves(host).await {
            Ok(true) => break,
            Ok(false) => tracing::debug!(host, "Probe host resolved to no addresses"),
            Err(e) => tracing::debug!(host, error = %e, "Probe host lookup failed"),
        }
        failures += 1;
        alert!(attempt = failures, "waiting for network connected");
        tokio::time::sleep(delay).await;
    }
    alert!("network is connected");
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    struct FlakyResolver {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Resolver for FlakyResolver {
        async fn resolves(&self, _host: &str) -> std::io::Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) == 0 {
                return Ok(true);
            }
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no route"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_connects() {
        let resolver = FlakyResolver {
            failures_left: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        };
        let start = Instant::now();

        let failures = wait_for_network(&resolver, "apple.com", Duration::from_secs(5)).await;

        assert_eq!(failures, 2);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success() {
        let resolver = FlakyResolver {
            failures_left: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        };
        assert_eq!(wait_for_network(&resolver, "apple.com", Duration::from_secs(5)).await, 0);
    }
}
