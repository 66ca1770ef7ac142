//! The exported keychain property list.
//!
//! A keychain export is a plist dictionary with four entry groups: `genp`
//! (general passwords), `inet` (internet passwords), `cert`, and `keys`. Each
//! entry carries an encrypted blob (`v_Data`) and an opaque persistent
//! reference (`v_PersistentRef`). Groups a backup does not use may be missing
//! from the plist; they parse as empty.

use serde::Deserialize;

use crate::error::Error;

/// One encrypted keychain entry as stored in the export.
#[derive(Debug, Clone)]
pub struct KeychainEntry {
    /// The versioned encrypted blob handed to the entry decryptor.
    pub data: Vec<u8>,
    /// Opaque identifier, carried through to decrypted output unchanged.
    pub persistent_ref: Vec<u8>,
}

/// All four entry groups of a keychain export.
#[derive(Debug, Default)]
pub struct KeychainTable {
    pub general: Vec<KeychainEntry>,
    pub internet: Vec<KeychainEntry>,
    pub certs: Vec<KeychainEntry>,
    pub keys: Vec<KeychainEntry>,
}

/// The four keychain entry groups, under their conventional display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    General,
    Internet,
    Certs,
    Keys,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::General,
        Category::Internet,
        Category::Certs,
        Category::Keys,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::General => "General",
            Category::Internet => "Internet",
            Category::Certs => "Certs",
            Category::Keys => "Keys",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "General" => Ok(Category::General),
            "Internet" => Ok(Category::Internet),
            "Certs" => Ok(Category::Certs),
            "Keys" => Ok(Category::Keys),
            _ => Err(Error::UnknownCategory {
                name: name.to_string(),
            }),
        }
    }
}

impl KeychainTable {
    /// Parse a keychain export plist (XML or binary).
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let raw: RawKeychain = plist::from_bytes(bytes)?;
        Ok(Self {
            general: convert(raw.general),
            internet: convert(raw.internet),
            certs: convert(raw.certs),
            keys: convert(raw.keys),
        })
    }

    pub fn group(&self, category: Category) -> &[KeychainEntry] {
        match category {
            Category::General => &self.general,
            Category::Internet => &self.internet,
            Category::Certs => &self.certs,
            Category::Keys => &self.keys,
        }
    }
}

// Wire shape of the export. Data fields deserialize as plist::Data and are
// converted to plain byte vectors afterwards.
#[derive(Debug, Deserialize)]
struct RawKeychain {
    #[serde(rename = "genp", default)]
    general: Vec<RawEntry>,
    #[serde(rename = "inet", default)]
    internet: Vec<RawEntry>,
    #[serde(rename = "cert", default)]
    certs: Vec<RawEntry>,
    #[serde(rename = "keys", default)]
    keys: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "v_Data")]
    data: plist::Data,
    #[serde(rename = "v_PersistentRef")]
    persistent_ref: plist::Data,
}

fn convert(raw: Vec<RawEntry>) -> Vec<KeychainEntry> {
    raw.into_iter()
        .map(|entry| KeychainEntry {
            data: entry.data.into(),
            persistent_ref: entry.persistent_ref.into(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_name(category.name()).unwrap(), category);
        }
        assert!(matches!(
            Category::from_name("Passwords"),
            Err(Error::UnknownCategory { .. })
        ));
    }

    #[test]
    fn missing_groups_parse_as_empty() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>genp</key>
    <array>
        <dict>
            <key>v_Data</key>
            <data>AwAAAA==</data>
            <key>v_PersistentRef</key>
            <data>cmVmMQ==</data>
        </dict>
    </array>
</dict>
</plist>"#;
        let table = KeychainTable::parse(xml).unwrap();
        assert_eq!(table.general.len(), 1);
        assert_eq!(table.general[0].data, [3, 0, 0, 0]);
        assert_eq!(table.general[0].persistent_ref, b"ref1");
        assert!(table.internet.is_empty());
        assert!(table.certs.is_empty());
        assert!(table.keys.is_empty());
    }
}
