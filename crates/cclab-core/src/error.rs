use thiserror::Error;

/// Errors surfaced by the simulation core.
///
/// Integrity failures are terminal for the operation that hit them; nothing
/// in this crate retries or masks them.
#[derive(Debug, Error)]
pub enum LabError {
    #[error("enclave '{0}' is not loaded")]
    EnclaveNotLoaded(String),

    #[error("invalid segments: {0}")]
    InvalidSegments(String),

    #[error("unknown ECALL '{0}'")]
    UnknownEcall(String),

    #[error("identity is required")]
    IdentityRequired,

    #[error("no sealed data for identity '{0}'")]
    NoSealedData(String),

    #[error("page write of {len} bytes exceeds page size {size}")]
    PageOverflow { len: usize, size: usize },

    #[error("VM '{0}' not found")]
    VmNotFound(String),

    #[error("page {0} not found")]
    PageNotFound(u64),

    #[error("token is not valid url-safe base64 of at least 48 bytes")]
    MalformedToken,

    #[error("ciphertext integrity check failed")]
    IntegrityFailure,

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LabError>;
