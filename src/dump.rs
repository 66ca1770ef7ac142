//! High-level keychain dumping.
//!
//! These entry points tie the pipeline together: parse the manifest, unlock
//! its keybag with the backup password, decrypt every entry of the export, and
//! render the result as JSON. Entries protected by device-bound keys cannot be
//! decrypted from a backup alone; they are logged and skipped rather than
//! failing the dump.

use serde_json::{json, Value};

use crate::entry::decrypt_entry;
use crate::error::Error;
use crate::keybag::Keybag;
use crate::keychain::{Category, KeychainEntry, KeychainTable};
use crate::manifest::Manifest;
use crate::record::DecryptedRecord;

/// Parse `manifest` and unlock its keybag with `password`.
///
/// When the manifest says the backup is unencrypted the password is not used
/// and no class keys are recovered.
pub fn unlock_keybag(manifest: &[u8], password: &str) -> Result<Keybag, Error> {
    let manifest = Manifest::parse(manifest)?;
    let mut keybag = Keybag::parse(&manifest.keybag)?;
    if manifest.is_encrypted {
        keybag.set_password(password)?;
    }
    Ok(keybag)
}

/// Decrypt a whole entry group, skipping entries the recovered keys cannot
/// reach. Any other failure is a real corruption and aborts.
fn decrypt_group(keybag: &Keybag, entries: &[KeychainEntry]) -> Result<Vec<DecryptedRecord>, Error> {
    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        match decrypt_entry(keybag, entry) {
            Ok(record) => records.push(record),
            Err(err @ (Error::MissingClassKey { .. } | Error::EntryKeyUnwrapFailed { .. })) => {
                log::warn!("skipping undecryptable keychain entry: {err}");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(records)
}

/// Decrypt every entry of the export, grouped by category name.
pub fn dump_all(
    keychain: &KeychainTable,
    manifest: &[u8],
    password: &str,
) -> Result<Value, Error> {
    let keybag = unlock_keybag(manifest, password)?;
    let mut groups = serde_json::Map::new();
    for category in Category::ALL {
        let records = decrypt_group(&keybag, keychain.group(category))?;
        groups.insert(category.name().to_string(), serde_json::to_value(records)?);
    }
    Ok(Value::Object(groups))
}

/// Decrypt the first entry in `category` whose `acct` field equals `account`.
///
/// Returns `Value::Null` when no entry matches; an unknown category name is an
/// error.
pub fn dump_entry(
    keychain: &KeychainTable,
    manifest: &[u8],
    password: &str,
    category: &str,
    account: &str,
) -> Result<Value, Error> {
    let category = Category::from_name(category)?;
    let keybag = unlock_keybag(manifest, password)?;
    for record in decrypt_group(&keybag, keychain.group(category))? {
        let matches = record
            .get("acct")
            .and_then(|value| value.as_str())
            .is_some_and(|acct| acct == account);
        if matches {
            return Ok(serde_json::to_value(record)?);
        }
    }
    Ok(Value::Null)
}

/// Render an operation outcome as the bridge JSON envelope:
/// `{"result":"success","data":...}` or `{"result":"error","error":...}`.
pub fn result_json(outcome: Result<Value, Error>) -> String {
    let envelope = match outcome {
        Ok(data) => json!({ "result": "success", "data": data }),
        Err(err) => json!({ "result": "error", "error": err.to_string() }),
    };
    envelope.to_string()
}
