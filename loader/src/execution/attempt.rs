use std::time::Duration;

use common::logger::warn_if_slow;
use tracing::debug;

use super::fetcher::Fetcher;
use crate::error::LoadError;
use crate::request::DataRequest;

/// Runs a single attempt of `req`: one fetch raced against `timeout`.
///
/// On success the request's transform (if any) has already been applied.
/// A timed-out fetch future is dropped, so a late response can never be
/// recorded.
pub async fn attempt<F: Fetcher>(
    fetcher: &F,
    req: &DataRequest<F::Params, F::Output>,
    timeout: Duration,
    slow: Duration,
) -> Result<F::Output, LoadError> {
    let call = fetcher.fetch(&req.endpoint, &req.params, req.priority.hint());

    match tokio::time::timeout(timeout, warn_if_slow("fetch", slow, call)).await {
        Err(_) => {
            debug!(request_id = %req.id, timeout_ms = timeout.as_millis() as u64, "fetch timed out");
            Err(LoadError::Timeout {
                after_ms: timeout.as_millis() as u64,
            })
        }
        Ok(Err(e)) => Err(LoadError::transport(&e)),
        Ok(Ok(data)) => Ok(match &req.transform {
            Some(f) => f(data),
            None => data,
        }),
    }
}
