use std::sync::Arc;

use async_trait::async_trait;

use crate::request::PriorityHint;

/// The batching layer the scheduler dispatches through.
///
/// The scheduler owns ordering, retries and timeouts; an implementation only
/// issues one call. Errors may be anything: they are normalized into
/// `LoadError::Transport` before they are recorded.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    type Params: Clone + Send + Sync + 'static;
    type Output: Clone + Send + Sync + 'static;

    async fn fetch(
        &self,
        endpoint: &str,
        params: &Self::Params,
        hint: PriorityHint,
    ) -> anyhow::Result<Self::Output>;
}

#[async_trait]
impl<F: Fetcher> Fetcher for Arc<F> {
    type Params = F::Params;
    type Output = F::Output;

    async fn fetch(
        &self,
        endpoint: &str,
        params: &Self::Params,
        hint: PriorityHint,
    ) -> anyhow::Result<Self::Output> {
        (**self).fetch(endpoint, params, hint).await
    }
}
