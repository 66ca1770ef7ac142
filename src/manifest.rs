//! The backup manifest plist.
//!
//! Only two manifest fields matter to decryption: the embedded keybag blob and
//! the encryption flag. Everything else the manifest records about the backup
//! is ignored here.

use serde::Deserialize;

use crate::error::Error;

/// The decryption-relevant slice of a backup manifest.
#[derive(Debug)]
pub struct Manifest {
    /// Raw keybag container, ready for [`crate::Keybag::parse`].
    pub keybag: Vec<u8>,
    pub is_encrypted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawManifest {
    backup_key_bag: plist::Data,
    #[serde(default)]
    is_encrypted: bool,
}

impl Manifest {
    /// Parse a manifest plist (XML or binary).
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let raw: RawManifest = plist::from_bytes(bytes)?;
        Ok(Self {
            keybag: raw.backup_key_bag.into(),
            is_encrypted: raw.is_encrypted,
        })
    }
}
