//! AES key wrapping (RFC 3394).
//!
//! Every key in the pipeline travels wrapped: class keys under the stretched
//! passkey, per-entry keys under their class key. Wrapping is deterministic
//! and integrity-checked, and the ciphertext is always 8 bytes longer than the
//! key it protects.
//!
//! [`unwrap`] reports an integrity-check mismatch as `None` rather than an
//! error: at the call sites a failed unwrap means "wrong key" (most often a
//! wrong password), which is a condition to branch on, not to abort on.

use aes::cipher::consts::U16;
use aes::cipher::{BlockCipher, BlockDecrypt, BlockEncrypt, BlockSizeUser, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use aes_kw::Kek;
use zeroize::Zeroizing;

use crate::error::Error;

const SEMIBLOCK: usize = 8;
const MIN_WRAPPED_LEN: usize = 24;

/// Wrap `key` under `kek`, producing `key.len() + 8` bytes.
///
/// `key` must be at least 16 bytes and a multiple of 8; `kek` must be a valid
/// AES key length.
pub fn wrap(kek: &[u8], key: &[u8]) -> Result<Vec<u8>, Error> {
    if key.len() < 16 || key.len() % SEMIBLOCK != 0 {
        return Err(Error::InvalidWrapInput);
    }
    match kek.len() {
        16 => wrap_with(Kek::<Aes128>::from(array16(kek)), key),
        24 => wrap_with(Kek::<Aes192>::from(array24(kek)), key),
        32 => wrap_with(Kek::<Aes256>::from(array32(kek)), key),
        len => Err(Error::InvalidKeyLength { len }),
    }
}

/// Unwrap `wrapped` under `kek`, recovering `wrapped.len() - 8` bytes of key.
///
/// Returns `None` when the embedded integrity check does not match after
/// decryption, or when `wrapped`/`kek` are not shaped like key-wrap data at
/// all. Callers treat `None` as "wrong key", a soft failure.
pub fn unwrap(kek: &[u8], wrapped: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
    if wrapped.len() < MIN_WRAPPED_LEN || wrapped.len() % SEMIBLOCK != 0 {
        return None;
    }
    match kek.len() {
        16 => unwrap_with(Kek::<Aes128>::from(array16(kek)), wrapped),
        24 => unwrap_with(Kek::<Aes192>::from(array24(kek)), wrapped),
        32 => unwrap_with(Kek::<Aes256>::from(array32(kek)), wrapped),
        _ => None,
    }
}

fn wrap_with<C>(kek: Kek<C>, key: &[u8]) -> Result<Vec<u8>, Error>
where
    C: KeyInit + BlockCipher + BlockSizeUser<BlockSize = U16> + BlockEncrypt + BlockDecrypt,
{
    let mut out = vec![0u8; key.len() + SEMIBLOCK];
    kek.wrap(key, &mut out).map_err(|_| Error::InvalidWrapInput)?;
    Ok(out)
}

fn unwrap_with<C>(kek: Kek<C>, wrapped: &[u8]) -> Option<Zeroizing<Vec<u8>>>
where
    C: KeyInit + BlockCipher + BlockSizeUser<BlockSize = U16> + BlockEncrypt + BlockDecrypt,
{
    let mut out = Zeroizing::new(vec![0u8; wrapped.len() - SEMIBLOCK]);
    kek.unwrap(wrapped, &mut out).ok()?;
    Some(out)
}

// Lengths are checked by the dispatch above.
fn array16(bytes: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(bytes);
    out
}

fn array24(bytes: &[u8]) -> [u8; 24] {
    let mut out = [0u8; 24];
    out.copy_from_slice(bytes);
    out
}

fn array32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    out
}
