//! Tagged-record decoding.

use chrono::{TimeZone, Utc};
use ibackup_keychain::{record, RecordValue};

fn tlv(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    if body.len() < 0x80 {
        out.push(body.len() as u8);
    } else {
        assert!(body.len() <= 0xffff);
        out.push(0x82);
        out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    }
    out.extend_from_slice(body);
    out
}

fn field(name: &str, value_tlv: &[u8]) -> Vec<u8> {
    tlv(0x30, &[tlv(0x0c, name.as_bytes()), value_tlv.to_vec()].concat())
}

#[test]
fn decodes_the_generic_value_grammar() {
    let body = [
        field("acct", &tlv(0x0c, b"alice")),
        field("port", &tlv(0x02, &[0x01, 0xbb])),
        field("sync", &tlv(0x01, &[0xff])),
        field("data", &tlv(0x04, &[0xde, 0xad])),
    ]
    .concat();
    let decoded = record::decode(&tlv(0x31, &body));

    assert_eq!(
        decoded.get("acct"),
        Some(&RecordValue::String("alice".to_string()))
    );
    assert_eq!(decoded.get("port"), Some(&RecordValue::Integer(443)));
    assert_eq!(decoded.get("sync"), Some(&RecordValue::Boolean(true)));
    assert_eq!(
        decoded.get("data"),
        Some(&RecordValue::Blob(vec![0xde, 0xad]))
    );
}

#[test]
fn timestamps_fall_through_to_the_time_grammar() {
    let body = [
        field("cdat", &tlv(0x18, b"20240131120000Z")),
        field("mdat", &tlv(0x17, b"240131120000Z")),
        field("sdat", &tlv(0x17, b"240131120000+0100")),
    ]
    .concat();
    let decoded = record::decode(&tlv(0x31, &body));

    let expected = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
    assert_eq!(decoded.get("cdat"), Some(&RecordValue::Timestamp(expected)));
    assert_eq!(decoded.get("mdat"), Some(&RecordValue::Timestamp(expected)));

    // Explicit offsets are normalized to UTC.
    let shifted = Utc.with_ymd_and_hms(2024, 1, 31, 11, 0, 0).unwrap();
    assert_eq!(decoded.get("sdat"), Some(&RecordValue::Timestamp(shifted)));
}

#[test]
fn undecodable_values_become_absent() {
    // NULL is in neither grammar.
    let body = field("agrp", &tlv(0x05, &[]));
    let decoded = record::decode(&tlv(0x31, &body));
    assert_eq!(decoded.get("agrp"), Some(&RecordValue::Absent));
}

#[test]
fn diagnostics_record_order_and_types() {
    let body = [
        field("svce", &tlv(0x0c, b"wifi")),
        field("cdat", &tlv(0x18, b"20240131120000Z")),
        field("port", &tlv(0x02, &[0x50])),
    ]
    .concat();
    let decoded = record::decode(&tlv(0x31, &body));

    assert_eq!(
        decoded.get(record::FIELD_ORDER),
        Some(&RecordValue::String("svce,cdat,port".to_string()))
    );
    assert_eq!(
        decoded.get(record::FIELD_TYPES),
        Some(&RecordValue::String("string,timestamp,integer".to_string()))
    );
}

#[test]
fn non_set_input_yields_only_diagnostics() {
    let decoded = record::decode(b"not der at all");
    assert_eq!(decoded.len(), 2);
    assert_eq!(
        decoded.get(record::FIELD_ORDER),
        Some(&RecordValue::String(String::new()))
    );
}

#[test]
fn malformed_members_stop_decoding_without_failing() {
    let mut body = field("acct", &tlv(0x0c, b"alice"));
    // A member whose declared length overruns the buffer.
    body.extend_from_slice(&[0x30, 0x7f, 0x00]);
    let decoded = record::decode(&tlv(0x31, &body));

    assert_eq!(
        decoded.get("acct"),
        Some(&RecordValue::String("alice".to_string()))
    );
    // acct plus the two diagnostics.
    assert_eq!(decoded.len(), 3);
}

#[test]
fn serialization_keeps_field_order_and_encodes_by_type() {
    let body = [
        field("acct", &tlv(0x0c, b"alice")),
        field("data", &tlv(0x04, &[0xde, 0xad, 0xbe, 0xef])),
        field("cdat", &tlv(0x18, b"20240131120000Z")),
        field("agrp", &tlv(0x05, &[])),
    ]
    .concat();
    let decoded = record::decode(&tlv(0x31, &body));

    let json = serde_json::to_string(&decoded).unwrap();
    assert_eq!(
        json,
        concat!(
            r#"{"acct":"alice","data":"3q2+7w==","cdat":"2024-01-31T12:00:00Z","agrp":null,"#,
            r#""_fieldOrder":"acct,data,cdat,agrp","_fieldTypes":"string,blob,timestamp,absent"}"#
        )
    );
}

#[test]
fn long_form_lengths_are_handled() {
    let big = vec![0x42u8; 300];
    let body = field("data", &tlv(0x04, &big));
    let decoded = record::decode(&tlv(0x31, &body));
    assert_eq!(decoded.get("data"), Some(&RecordValue::Blob(big)));
}
