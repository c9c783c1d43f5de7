// Errors surfaced by connector handles
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("another connector already owns the shared signal store")]
    PrimaryTaken,
    #[error("another connector already owns the wizard selection")]
    WizardTaken,
    #[error("runtime {0} is not in the current roster")]
    UnknownRuntime(String),
    #[error("runtime {0} is offline")]
    RuntimeOffline(String),
    #[error("{0} was not sent: no active runtime or broker connection")]
    NotSent(&'static str),
    #[error("request timeout after {0:?}")]
    RequestTimeout(Duration),
    #[error("connector stopped")]
    Stopped,
}
