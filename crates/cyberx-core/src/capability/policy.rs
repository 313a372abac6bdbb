use std::time::Duration;

use tracing::{debug, warn};

use super::{CapabilityClient, Failure};

/// Default per-call timeout
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Fixed delay before the single reattempt on `Unreachable`
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Bounded invocation policy shared by every capability call
///
/// A call that runs past `timeout` counts as `Unreachable`. `Unreachable` gets
/// exactly one reattempt after `retry_delay`; every other failure is returned
/// as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokePolicy {
    pub timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for InvokePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl InvokePolicy {
    pub fn new(timeout: Duration, retry_delay: Duration) -> Self {
        Self {
            timeout,
            retry_delay,
        }
    }

    /// Invoke `client` under this policy
    pub async fn call<C>(&self, client: &C, request: &C::Request) -> Result<C::Response, Failure>
    where
        C: CapabilityClient + ?Sized,
    {
        self.run(client.name(), || client.invoke(request)).await
    }

    /// Run `op` under this policy; `name` labels logs and timeout messages
    pub async fn run<T, F, Fut>(&self, name: &str, op: F) -> Result<T, Failure>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        match self.attempt(name, &op).await {
            Err(Failure::Unreachable(reason)) => {
                warn!(
                    client = name,
                    reason = %reason,
                    delay_ms = self.retry_delay.as_millis() as u64,
                    "Service unreachable, reattempting once"
                );
                tokio::time::sleep(self.retry_delay).await;
                self.attempt(name, &op).await
            }
            other => other,
        }
    }

    async fn attempt<T, F, Fut>(&self, name: &str, op: &F) -> Result<T, Failure>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        debug!(client = name, "Invoking capability");
        match tokio::time::timeout(self.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(Failure::Unreachable(format!(
                "{} timed out after {}ms",
                name,
                self.timeout.as_millis()
            ))),
        }
    }
}
