use ras_client::ClientError;

/// Errors surfaced synchronously by the collector.
///
/// Everything that goes wrong inside a poll tick is logged and contained in
/// that tick; only construction can fail in front of the caller.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("failed to authenticate against the remote administration server: {0}")]
    Authentication(#[source] ClientError),
}
