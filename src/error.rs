use thiserror::Error;

/// Errors returned by this crate.
///
/// Parse and unlock failures carry enough context to tell a corrupt container
/// apart from a wrong password. Per-entry conditions (`MissingClassKey`,
/// `EntryKeyUnwrapFailed`) are recoverable at the batch level: callers log and
/// skip the entry. Everything else aborts the operation it occurred in.
#[derive(Debug, Error)]
pub enum Error {
    /// The keybag byte stream violated the fourcc/length/value grammar.
    #[error("malformed keybag container: {context}")]
    MalformedKeybag { context: &'static str },

    /// The keybag carried a tag this decoder does not recognize. The decoder
    /// is deliberately strict: an unknown tag is a parse error, not something
    /// to skip.
    #[error("unhandled keybag field {fourcc:?}")]
    UnhandledField { fourcc: String },

    /// The stretched key failed to unwrap a password-protected class key.
    #[error("bad password")]
    BadPassword,

    /// A keychain entry blob ended before the structure it promised.
    #[error("truncated keychain entry while reading {context}")]
    TruncatedEntry { context: &'static str },

    /// The keychain entry blob uses a version other than the supported v3.
    #[error("unsupported keychain entry version {version}")]
    UnsupportedVersion { version: u32 },

    /// No recovered key for the entry's protection class (device-bound keys
    /// are never recoverable here). Recoverable: skip the entry.
    #[error("no class key available for protection class {class}")]
    MissingClassKey { class: u32 },

    /// The per-entry key failed its unwrap integrity check under the class
    /// key. Recoverable: skip the entry.
    #[error("failed to unwrap entry key for protection class {class}")]
    EntryKeyUnwrapFailed { class: u32 },

    /// Authenticated decryption failed. This does not distinguish a corrupted
    /// backup from a fundamentally wrong key; the source format gives no way
    /// to tell them apart at this stage.
    #[error("authenticated decryption failed")]
    DecryptFailed,

    /// Invalid AES key length (expected 16, 24, or 32 bytes).
    #[error("invalid AES key length {len}; expected 16, 24, or 32 bytes")]
    InvalidKeyLength { len: usize },

    /// Key material handed to `wrap` must be at least 16 bytes and a multiple
    /// of 8 (RFC 3394).
    #[error("key wrap input must be at least 16 bytes and a multiple of 8")]
    InvalidWrapInput,

    /// The requested keychain category name is not one of the four groups.
    #[error("unknown keychain category {name:?}")]
    UnknownCategory { name: String },

    #[error("malformed property list: {0}")]
    Plist(#[from] plist::Error),

    #[error("json encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
