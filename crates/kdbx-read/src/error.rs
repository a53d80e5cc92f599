//! Error types for kdbx-read

use thiserror::Error;

/// Result type alias for kdbx-read operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding a KDBX4 database.
///
/// The variants fall into four groups: malformed input, unsupported
/// parameters, authentication failures and consistency violations. All of
/// them abort the decode; no partial tree is ever returned.
#[derive(Error, Debug)]
pub enum Error {
    /// Read past the end of the input buffer
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },

    /// The file does not start with the KDBX magic words
    #[error("invalid KDBX signature")]
    InvalidSignature,

    /// The format version is not KDBX4
    #[error("unsupported format version {0:#010x}")]
    UnsupportedVersion(u32),

    /// Structurally invalid data in the outer header, inner header or body
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Invalid variant map encoding (bad tag, bad length, newer version)
    #[error("invalid variant map: {0}")]
    InvalidVariantMap(String),

    /// The cipher uuid does not map to a supported cipher
    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(String),

    /// The KDF uuid is unknown or its parameters are missing/mistyped
    #[error("unsupported key derivation function (KDF) or invalid parameters")]
    UnsupportedKdf,

    /// The compression flag is outside the known algorithms
    #[error("unsupported compression algorithm: {0}")]
    UnsupportedCompression(u32),

    /// A KDBX3-only header field appeared inside a KDBX4 stream
    #[error("legacy header field {0} found in KDBX4 file")]
    LegacyFieldInV4(&'static str),

    /// KDF rounds exceed the operational bound
    #[error("KDF rounds too large: {0}")]
    RoundsTooLarge(u64),

    /// Argon2 memory parameter exceeds the operational bound
    #[error("KDF memory too large: {0} KiB")]
    MemoryTooLarge(u64),

    /// The KDF seed was empty when a challenge-response fold required it
    #[error("KDF seed empty")]
    SeedEmpty,

    /// SHA-256 over the header bytes does not match the stored digest
    #[error("header SHA256 mismatch")]
    HeaderHashMismatch,

    /// The header HMAC does not match: the first check that depends on the
    /// derived key, so this is what a wrong password looks like
    #[error("invalid credentials: incorrect password or key file")]
    InvalidCredentials,

    /// A body block was shorter than its declared length
    #[error("truncated HMAC block")]
    TruncatedBlock,

    /// A body block failed its per-block HMAC check
    #[error("block HMAC verification failed at block {block_index}")]
    IntegrityCheckFailed { block_index: u64 },

    /// A key had the wrong length for the operation it was handed to
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Cipher construction or processing failed
    #[error("cipher error: {0}")]
    Cipher(String),

    /// Key derivation primitive failure
    #[error("key derivation failed: {0}")]
    KdfFailure(String),

    /// Failure inflating the compressed body
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Structurally invalid XML or malformed text in a typed XML field
    #[error("XML parse error: {0}")]
    Xml(String),

    /// An entry carried the same string attribute twice
    #[error("duplicate entry attribute: {0}")]
    DuplicateAttribute(String),

    /// A history entry carried its own History element
    #[error("history element inside a history entry")]
    NestedHistory,

    /// More than one Root group element
    #[error("multiple root group elements")]
    MultipleRootGroups,

    /// A required UUID element was absent
    #[error("missing required UUID on {0}")]
    MissingUuid(&'static str),

    /// A Binary element referenced a pool slot that does not exist
    #[error("unknown binary reference: {0}")]
    UnknownBinaryRef(String),

    /// A timestamp fell outside the representable range
    #[error("date outside of range: {0}")]
    DateOutOfRange(u64),

    /// Functionality the format defines but this reader does not support
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Whether the error indicates wrong credentials rather than a damaged
    /// or unsupported file. Callers use this to pick the user-facing message.
    pub fn is_credentials_error(&self) -> bool {
        matches!(self, Error::InvalidCredentials)
    }
}
