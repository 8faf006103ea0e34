/// Source of a transport error raised when the request timeout elapsed.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("origin did not answer within the request timeout")]
pub struct TimedOut;

/// Source of a `Canceled` error raised by the caller's cancellation token.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("fetch canceled by caller")]
pub struct OperationCanceled;
