//! End-to-end dumps: manifest plus keychain export to JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use ibackup_keychain::{
    aeswrap, dump_all, dump_entry, gcm, result_json, Error, KeychainTable, WRAP_PASSCODE,
};

const PASSKEY: [u8; 32] = [0x77; 32];
const CLASS_KEY: [u8; 32] = [0xab; 32];
const ENTRY_KEY: [u8; 32] = [0xcd; 32];

fn record(tag: &[u8; 4], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + value.len());
    out.extend_from_slice(tag);
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
    out
}

fn keybag_bytes() -> Vec<u8> {
    let wrapped = aeswrap::wrap(&PASSKEY, &CLASS_KEY).unwrap();
    [
        record(b"VERS", &2u32.to_be_bytes()),
        record(b"TYPE", &1u32.to_be_bytes()),
        record(b"UUID", &[0x10; 16]),
        record(b"SALT", &[0x31; 8]),
        record(b"ITER", &2u32.to_be_bytes()),
        record(b"UUID", &[0x20; 16]),
        record(b"CLAS", &1u32.to_be_bytes()),
        record(b"WRAP", &WRAP_PASSCODE.to_be_bytes()),
        record(b"KTYP", &0u32.to_be_bytes()),
        record(b"WPKY", &wrapped),
    ]
    .concat()
}

fn manifest_xml() -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>BackupKeyBag</key>
    <data>{}</data>
    <key>IsEncrypted</key>
    <true/>
</dict>
</plist>"#,
        STANDARD.encode(keybag_bytes())
    )
    .into_bytes()
}

fn tlv(tag: u8, body: &[u8]) -> Vec<u8> {
    assert!(body.len() < 0x80);
    let mut out = vec![tag, body.len() as u8];
    out.extend_from_slice(body);
    out
}

/// `SET { SEQUENCE { "acct", account } }`, sealed into an entry blob.
fn entry_blob(class: u32, account: &str) -> Vec<u8> {
    let field = tlv(
        0x30,
        &[tlv(0x0c, b"acct"), tlv(0x0c, account.as_bytes())].concat(),
    );
    let plaintext = tlv(0x31, &field);

    let wrapped = aeswrap::wrap(&CLASS_KEY, &ENTRY_KEY).unwrap();
    let sealed = gcm::seal(&ENTRY_KEY, &plaintext).unwrap();

    let mut data = Vec::new();
    data.extend_from_slice(&3u32.to_le_bytes());
    data.extend_from_slice(&class.to_le_bytes());
    data.extend_from_slice(&(wrapped.len() as u32).to_le_bytes());
    data.extend_from_slice(&wrapped);
    data.extend_from_slice(&sealed);
    data
}

fn plist_entry(blob: &[u8], persistent_ref: &[u8]) -> String {
    format!(
        "<dict><key>v_Data</key><data>{}</data><key>v_PersistentRef</key><data>{}</data></dict>",
        STANDARD.encode(blob),
        STANDARD.encode(persistent_ref)
    )
}

/// `genp` holds one decryptable entry and one whose class key is missing;
/// `inet` holds a second account.
fn keychain_xml() -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>genp</key>
    <array>{}{}</array>
    <key>inet</key>
    <array>{}</array>
</dict>
</plist>"#,
        plist_entry(&entry_blob(1, "alice"), b"ref-1"),
        plist_entry(&entry_blob(99, "carol"), b"ref-2"),
        plist_entry(&entry_blob(1, "bob"), b"ref-3"),
    )
    .into_bytes()
}

fn password() -> String {
    hex::encode(PASSKEY)
}

#[test]
fn dump_all_groups_by_category_and_skips_unreachable_entries() {
    let table = KeychainTable::parse(&keychain_xml()).unwrap();
    let dumped = dump_all(&table, &manifest_xml(), &password()).unwrap();

    let groups = dumped.as_object().unwrap();
    assert_eq!(groups.len(), 4);

    let general = groups["General"].as_array().unwrap();
    assert_eq!(general.len(), 1);
    assert_eq!(general[0]["acct"], Value::String("alice".to_string()));
    assert_eq!(general[0]["_class"], Value::from(1));

    let internet = groups["Internet"].as_array().unwrap();
    assert_eq!(internet.len(), 1);
    assert_eq!(internet[0]["acct"], Value::String("bob".to_string()));

    assert!(groups["Certs"].as_array().unwrap().is_empty());
    assert!(groups["Keys"].as_array().unwrap().is_empty());
}

#[test]
fn dump_entry_selects_by_account() {
    let table = KeychainTable::parse(&keychain_xml()).unwrap();

    let found = dump_entry(&table, &manifest_xml(), &password(), "Internet", "bob").unwrap();
    assert_eq!(found["acct"], Value::String("bob".to_string()));

    let missing = dump_entry(&table, &manifest_xml(), &password(), "General", "mallory").unwrap();
    assert_eq!(missing, Value::Null);

    assert!(matches!(
        dump_entry(&table, &manifest_xml(), &password(), "Passwords", "bob"),
        Err(Error::UnknownCategory { .. })
    ));
}

#[test]
fn wrong_password_renders_an_error_envelope() {
    let table = KeychainTable::parse(&keychain_xml()).unwrap();
    let rendered = result_json(dump_all(&table, &manifest_xml(), "hunter2"));
    assert!(rendered.contains(r#""result":"error"#), "{rendered}");
    assert!(rendered.contains("bad password"), "{rendered}");
}

#[test]
fn success_envelope_wraps_the_dump() {
    let table = KeychainTable::parse(&keychain_xml()).unwrap();
    let rendered = result_json(dump_all(&table, &manifest_xml(), &password()));
    assert!(rendered.contains(r#""result":"success"#), "{rendered}");
    assert!(rendered.contains(r#""acct":"alice"#), "{rendered}");
}
