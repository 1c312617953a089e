use ragfuse_core::ProviderError;

/// Run CPU-bound inference on tokio's blocking pool.
///
/// The returned future yields while the work runs, so a caller's timeout can
/// fire before inference finishes. A panic in `work` surfaces as
/// `ProviderError::Other`.
pub async fn offload<T, F>(work: F) -> Result<T, ProviderError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ProviderError::Other(format!("embedding worker join: {e}")))?
        .map_err(|e| ProviderError::Other(e.to_string()))
}
