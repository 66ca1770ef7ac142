//! iOS backup keychain decryption.
//!
//! This crate currently supports:
//! - Parsing the backup keybag container (fourcc/length/value records)
//! - Password→key derivation (optional PBKDF2-HMAC-SHA256 stage, then
//!   PBKDF2-HMAC-SHA1) and class-key unwrap (RFC 3394)
//! - Decrypting keychain entry blobs (version 3, AES-GCM with appended tag)
//! - Decoding decrypted entries into ordered, typed records
//! - Parsing the backup manifest and keychain export plists, and dumping
//!   them to JSON
//!
//! The typical path runs [`dump_all`] or [`dump_entry`]; the lower layers are
//! public for callers that need one stage at a time.

pub mod aeswrap;
pub mod dump;
pub mod entry;
pub mod error;
pub mod gcm;
pub mod keybag;
pub mod keychain;
pub mod manifest;
pub mod record;

pub use dump::{dump_all, dump_entry, result_json, unlock_keybag};
pub use entry::decrypt_entry;
pub use error::Error;
pub use keybag::{ClassKey, Keybag, WRAP_DEVICE, WRAP_PASSCODE};
pub use keychain::{Category, KeychainEntry, KeychainTable};
pub use manifest::Manifest;
pub use record::{DecryptedRecord, RecordValue};
