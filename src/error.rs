#[allow(unused)]
pub use anyhow::{anyhow, bail, ensure, Error};

#[derive(Debug, thiserror::Error)]
pub enum JoseError {
    #[error("Internal error: [{0}]")]
    InternalError(String),
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Invalid key size")]
    InvalidKeySize,
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Invalid key format")]
    InvalidKeyFormat,
    #[error("Unsupported curve: {0}")]
    UnsupportedCurve(String),
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),
    #[error("MAC check failed")]
    MacCheckFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Critical extension is not supported: {0}")]
    UnsupportedCritical(String),
    #[error("No valid signature found")]
    NoValidSignature,
    #[error("No usable recipient found")]
    NoUsableRecipient,
    #[error("Already finalized")]
    AlreadyFinalized,
    #[error("Single-use key management cannot be used with multiple recipients")]
    MultipleRecipientsDirect,
    #[error("Signature didn't verify")]
    InvalidSignature,
    #[error("JOSE serialization error")]
    CompactEncodingError,
    #[error("JOSE header too large")]
    HeaderTooLarge,
    #[error("Token is too long")]
    TokenTooLong,
    #[error("Private key material is required")]
    MissingPrivateKey,
    #[error("No matching key found")]
    KeyNotFound,
    #[error("Invalid serialization options: {0}")]
    InvalidFormatOption(String),
    #[error("Symmetric keys cannot be embedded in a header")]
    CannotEmbedKey,
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),
}

impl From<&str> for JoseError {
    fn from(e: &str) -> JoseError {
        JoseError::InternalError(e.into())
    }
}

/// Returns the classification of an error produced by this crate, if any.
pub fn classify(err: &Error) -> Option<&JoseError> {
    err.downcast_ref::<JoseError>()
}
