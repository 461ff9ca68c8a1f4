use thiserror::Error;

/// Failures while wiring the gateway's process-level plumbing.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("listener io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upstream client error: {message}")]
    Client { message: String },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
