//! Backup keybag parsing and password unlock.
//!
//! The keybag is a flat stream of records, each a 4-byte ASCII tag, a 4-byte
//! big-endian length, and that many bytes of value. Header records come first;
//! the first `UUID` record names the keybag itself, and every `UUID` after
//! that starts a new class-key entry. The parser runs an explicit three-phase
//! state machine over the stream rather than re-reading bytes at the
//! header/key boundary.
//!
//! Unlocking stretches the backup password through an optional
//! PBKDF2-HMAC-SHA256 stage (the `DPSL`/`DPIC` auxiliary salt and iteration
//! count) followed by PBKDF2-HMAC-SHA1 (the primary `SALT`/`ITER`), then
//! unwraps every password-protected class key under the result. A 64-character
//! hex password is taken as the already-stretched key, skipping derivation.

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::aeswrap;
use crate::error::Error;

#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wrap-method code: the class key is protected by the device-bound key only.
pub const WRAP_DEVICE: u32 = 1;
/// Wrap-method code: the class key is protected by the password-derived key.
pub const WRAP_PASSCODE: u32 = 2;

const PASSKEY_LEN: usize = 32;

#[cfg(test)]
static DERIVATION_RUNS: AtomicUsize = AtomicUsize::new(0);

/// One class-key entry of the keybag.
///
/// `wrap` is a bitset of wrap-method codes: 1 = device-bound key required,
/// 2 = password-derived key required, 3 = both. Only code-2 keys can be
/// recovered by [`Keybag::set_password`]; the rest keep `key() == None`.
#[derive(Debug, Clone)]
pub struct ClassKey {
    pub uuid: Vec<u8>,
    pub class: u32,
    pub wrap: u32,
    pub key_type: u32,
    pub wrapped_key: Vec<u8>,
    key: Option<Zeroizing<Vec<u8>>>,
}

impl ClassKey {
    fn new(uuid: Vec<u8>) -> Self {
        Self {
            uuid,
            class: 0,
            wrap: 0,
            key_type: 0,
            wrapped_key: Vec::new(),
            key: None,
        }
    }

    /// The recovered plaintext key, if unlock succeeded for this entry.
    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref().map(|k| &k[..])
    }
}

/// A parsed backup keybag: header fields plus its ordered class keys.
///
/// `aux_salt`/`aux_iterations` are the optional second derivation stage; an
/// empty salt and zero count mean the keybag does not carry one.
#[derive(Debug, Default)]
pub struct Keybag {
    pub version: u32,
    pub bag_type: u32,
    pub uuid: Vec<u8>,
    pub hmac_check: Vec<u8>,
    pub wrap: u32,
    pub salt: Vec<u8>,
    pub iterations: u32,
    pub aux_salt: Vec<u8>,
    pub aux_iterations: u32,
    pub keys: Vec<ClassKey>,
}

/// Parser phase. `HeaderUuidSeen` still accepts header tags; the next `UUID`
/// after it belongs to the first class key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    HeaderUuidSeen,
    KeyRecords,
}

struct Records<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Records<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Next (tag, value) record, or `None` at a clean end of stream.
    fn next(&mut self) -> Result<Option<([u8; 4], &'a [u8])>, Error> {
        let remaining = self.bytes.len() - self.pos;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < 8 {
            return Err(Error::MalformedKeybag {
                context: "record header",
            });
        }
        let header = &self.bytes[self.pos..self.pos + 8];
        let tag = [header[0], header[1], header[2], header[3]];
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let start = self.pos + 8;
        let end = start.checked_add(len).filter(|&e| e <= self.bytes.len());
        let Some(end) = end else {
            return Err(Error::MalformedKeybag {
                context: "record value",
            });
        };
        self.pos = end;
        Ok(Some((tag, &self.bytes[start..end])))
    }
}

fn be_u32(value: &[u8], context: &'static str) -> Result<u32, Error> {
    let bytes: [u8; 4] = value
        .try_into()
        .map_err(|_| Error::MalformedKeybag { context })?;
    Ok(u32::from_be_bytes(bytes))
}

fn unhandled(tag: [u8; 4]) -> Error {
    Error::UnhandledField {
        fourcc: String::from_utf8_lossy(&tag).into_owned(),
    }
}

impl Keybag {
    /// Parse a keybag container buffer.
    ///
    /// Strict by design: an unknown tag in either phase and any truncation
    /// inside a record are errors, not conditions to skip over. The only tag
    /// that is read and dropped is `DPWT`, whose meaning is unknown but whose
    /// presence is expected.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let mut kb = Keybag::default();
        let mut phase = Phase::Header;
        let mut records = Records::new(data);

        while let Some((tag, value)) = records.next()? {
            match phase {
                Phase::Header | Phase::HeaderUuidSeen => match &tag {
                    b"VERS" => kb.version = be_u32(value, "VERS value")?,
                    b"TYPE" => kb.bag_type = be_u32(value, "TYPE value")?,
                    b"WRAP" => kb.wrap = be_u32(value, "WRAP value")?,
                    b"HMCK" => kb.hmac_check = value.to_vec(),
                    b"SALT" => kb.salt = value.to_vec(),
                    b"ITER" => kb.iterations = be_u32(value, "ITER value")?,
                    // Purpose unknown; present in real keybags. Recognized so
                    // it does not trip the unhandled-tag error, then dropped.
                    b"DPWT" => {}
                    b"DPIC" => kb.aux_iterations = be_u32(value, "DPIC value")?,
                    b"DPSL" => kb.aux_salt = value.to_vec(),
                    b"UUID" => {
                        if phase == Phase::Header {
                            kb.uuid = value.to_vec();
                            phase = Phase::HeaderUuidSeen;
                        } else {
                            kb.keys.push(ClassKey::new(value.to_vec()));
                            phase = Phase::KeyRecords;
                        }
                    }
                    _ => return Err(unhandled(tag)),
                },
                Phase::KeyRecords => {
                    if &tag == b"UUID" {
                        kb.keys.push(ClassKey::new(value.to_vec()));
                        continue;
                    }
                    let Some(key) = kb.keys.last_mut() else {
                        return Err(Error::MalformedKeybag {
                            context: "class key record before UUID",
                        });
                    };
                    match &tag {
                        b"CLAS" => key.class = be_u32(value, "CLAS value")?,
                        b"WRAP" => key.wrap = be_u32(value, "key WRAP value")?,
                        b"KTYP" => key.key_type = be_u32(value, "KTYP value")?,
                        b"WPKY" => key.wrapped_key = value.to_vec(),
                        _ => return Err(unhandled(tag)),
                    }
                }
            }
        }

        Ok(kb)
    }

    /// The recovered plaintext key for `class`, if unlock populated one.
    pub fn class_key(&self, class: u32) -> Option<&[u8]> {
        self.keys
            .iter()
            .find(|key| key.class == class)
            .and_then(|key| key.key())
    }

    /// Derive the stretched key from `password` and unwrap every class key
    /// whose wrap method is the password path (code 2).
    ///
    /// The first unwrap integrity failure aborts with [`Error::BadPassword`];
    /// this is how a wrong password is detected. Keys requiring the
    /// device-bound path (codes 1 and 3) are left unrecovered. Safe to retry
    /// with a different password; the keybag structure is not invalidated.
    pub fn set_password(&mut self, password: &str) -> Result<(), Error> {
        let passkey = derive_passkey(
            password,
            &self.salt,
            self.iterations,
            &self.aux_salt,
            self.aux_iterations,
        );

        for key in &mut self.keys {
            if key.wrap != WRAP_PASSCODE {
                continue;
            }
            match aeswrap::unwrap(&passkey, &key.wrapped_key) {
                Some(plain) => key.key = Some(plain),
                None => return Err(Error::BadPassword),
            }
        }
        Ok(())
    }
}

/// Stretch `password` into the 32-byte keybag passkey.
///
/// A 64-character valid-hex password decodes straight to the passkey. This is
/// the escape hatch for callers that already ran the derivation once: the
/// PBKDF2 chain runs tens of thousands of iterations and dominates unlock
/// latency.
fn derive_passkey(
    password: &str,
    salt: &[u8],
    iterations: u32,
    aux_salt: &[u8],
    aux_iterations: u32,
) -> Zeroizing<Vec<u8>> {
    if password.len() == 64 {
        if let Ok(raw) = hex::decode(password) {
            return Zeroizing::new(raw);
        }
    }

    #[cfg(test)]
    DERIVATION_RUNS.fetch_add(1, Ordering::Relaxed);

    let mut passkey = Zeroizing::new(password.as_bytes().to_vec());
    if aux_iterations > 0 {
        let mut stretched = Zeroizing::new(vec![0u8; PASSKEY_LEN]);
        pbkdf2_hmac::<Sha256>(&passkey, aux_salt, aux_iterations, &mut stretched);
        passkey = stretched;
    }

    let mut out = Zeroizing::new(vec![0u8; PASSKEY_LEN]);
    pbkdf2_hmac::<Sha1>(&passkey, salt, iterations, &mut out);
    out
}
