use serde::Serialize;

/// App-wide error type. Every fallible function returns `Result<T, AppError>`.
/// Serializes cleanly for the web frontend as `{ error: "...", kind: "..." }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A generation is already in flight; the operation is rejected, not queued.
    #[error("A generation is already in flight: {0}")]
    ConcurrentStream(String),

    #[error("Remote call error: {0}")]
    RemoteCall(String),

    #[error("Attachment too large: {0} bytes (limit 10 MiB)")]
    AttachmentTooLarge(u64),

    #[error("Attachment type not supported: {0}")]
    AttachmentUnsupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AppError {
    /// Machine-readable discriminant, stable across message-text changes.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ConcurrentStream(_) => "concurrent_stream",
            AppError::RemoteCall(_) => "remote_call",
            AppError::AttachmentTooLarge(_) => "attachment_too_large",
            AppError::AttachmentUnsupported(_) => "attachment_unsupported",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidState(_) => "invalid_state",
            AppError::Io(_) => "io",
            AppError::Serde(_) => "serde",
        }
    }
}

/// The frontend consumes errors as `{ error: "...", kind: "..." }`.
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field("kind", self.kind())?;
        s.end()
    }
}

/// Convert any displayable error into `AppError::RemoteCall`.
pub fn remote_err(e: impl std::fmt::Display) -> AppError {
    AppError::RemoteCall(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_kind() {
        let err = AppError::ConcurrentStream("send".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "concurrent_stream");
        assert!(json["error"].as_str().unwrap().contains("in flight"));
    }

    #[test]
    fn test_remote_err_helper() {
        let err = remote_err("connection refused");
        assert_eq!(err.kind(), "remote_call");
        assert!(err.to_string().contains("connection refused"));
    }
}
