use thiserror::Error;

pub type SecurityResult<T> = Result<T, SecurityError>;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("signing key must not be empty")]
    EmptySigningKey,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("HMAC error: {0}")]
    Hmac(String),
}
