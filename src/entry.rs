//! Keychain entry decryption.
//!
//! Each entry blob is a little-endian structure: a version word (only 3 is
//! supported), the protection class, the wrapped per-entry key's length and
//! bytes, and the remainder as AES-GCM ciphertext plus tag. The per-entry key
//! is unwrapped under the recovered class key, the payload opened, and the
//! plaintext handed to the record decoder.

use zeroize::Zeroizing;

use crate::error::Error;
use crate::keybag::Keybag;
use crate::keychain::KeychainEntry;
use crate::record::{self, DecryptedRecord, RecordValue};
use crate::{aeswrap, gcm};

const SUPPORTED_VERSION: u32 = 3;

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], Error> {
        if self.bytes.len() < n {
            return Err(Error::TruncatedEntry { context });
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn read_u32_le(&mut self, context: &'static str) -> Result<u32, Error> {
        let bytes = self.take(4, context)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn rest(self) -> &'a [u8] {
        self.bytes
    }
}

/// Decrypt one keychain entry against an unlocked keybag.
///
/// Returns the decoded record with diagnostic fields appended: `_class`,
/// `_version`, `_wkey` (the wrapped per-entry key), `_length` (the wrapped
/// key's length as declared in the blob), and `_ref` (the entry's persistent
/// reference).
///
/// [`Error::MissingClassKey`] and [`Error::EntryKeyUnwrapFailed`] identify the
/// entry as undecryptable under the keys at hand; batch callers skip those.
pub fn decrypt_entry(keybag: &Keybag, entry: &KeychainEntry) -> Result<DecryptedRecord, Error> {
    let mut reader = Reader::new(&entry.data);
    let version = reader.read_u32_le("version")?;
    if version != SUPPORTED_VERSION {
        return Err(Error::UnsupportedVersion { version });
    }
    let class = reader.read_u32_le("protection class")?;
    let wrapped_len = reader.read_u32_le("wrapped key length")? as usize;
    let wrapped_key = reader.take(wrapped_len, "wrapped key")?;
    let ciphertext = reader.rest();

    let class_key = keybag
        .class_key(class)
        .ok_or(Error::MissingClassKey { class })?;
    let entry_key: Zeroizing<Vec<u8>> = aeswrap::unwrap(class_key, wrapped_key)
        .ok_or(Error::EntryKeyUnwrapFailed { class })?;
    let plaintext = gcm::open(&entry_key, ciphertext)?;

    let mut record = record::decode(&plaintext);
    record.push("_class", RecordValue::Integer(i64::from(class)));
    record.push("_version", RecordValue::Integer(i64::from(version)));
    record.push("_wkey", RecordValue::Blob(wrapped_key.to_vec()));
    record.push("_length", RecordValue::Integer(wrapped_len as i64));
    record.push("_ref", RecordValue::Blob(entry.persistent_ref.clone()));
    Ok(record)
}
