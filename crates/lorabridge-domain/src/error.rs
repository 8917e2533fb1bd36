use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Malformed uplink event: {0}")]
    MalformedUplink(String),

    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    #[error("Outbox write failed: {0}")]
    OutboxWriteFailed(String),

    #[error("Network server request failed: {0}")]
    NetworkServerFailed(String),

    #[error("Reconnect attempts exhausted after {0} attempts")]
    ReconnectExhausted(u32),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
