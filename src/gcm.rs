//! Authenticated encryption for keychain entry payloads.
//!
//! Entry bodies are AES-GCM ciphertexts with the 16-byte tag appended, but the
//! backup format stores no nonce and authenticates no associated data; every
//! payload is sealed with a zero-length IV. That is a fixed, non-standard
//! usage of GCM, workable only because each entry is encrypted under its own
//! freshly wrapped key, so this module pins the nonce size to zero
//! (`AesGcm<_, U0>`) instead of exposing a general-purpose GCM wrapper.

use aes::cipher::consts::{U0, U16};
use aes::cipher::{BlockCipher, BlockEncrypt, BlockSizeUser};
use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{AesGcm, Nonce};

use crate::error::Error;

type EntryCipher<C> = AesGcm<C, U0>;

/// Decrypt `ciphertext_and_tag`, verifying the trailing authentication tag.
///
/// Fails with [`Error::DecryptFailed`] when the tag does not verify; no
/// partial plaintext is ever returned.
pub fn open(key: &[u8], ciphertext_and_tag: &[u8]) -> Result<Vec<u8>, Error> {
    match key.len() {
        16 => open_with::<Aes128>(key, ciphertext_and_tag),
        24 => open_with::<Aes192>(key, ciphertext_and_tag),
        32 => open_with::<Aes256>(key, ciphertext_and_tag),
        len => Err(Error::InvalidKeyLength { len }),
    }
}

/// Encrypt `plaintext`, appending the authentication tag.
pub fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    match key.len() {
        16 => seal_with::<Aes128>(key, plaintext),
        24 => seal_with::<Aes192>(key, plaintext),
        32 => seal_with::<Aes256>(key, plaintext),
        len => Err(Error::InvalidKeyLength { len }),
    }
}

fn open_with<C>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error>
where
    C: BlockCipher + BlockSizeUser<BlockSize = U16> + BlockEncrypt + KeyInit,
{
    let cipher = EntryCipher::<C>::new_from_slice(key)
        .map_err(|_| Error::InvalidKeyLength { len: key.len() })?;
    cipher
        .decrypt(&Nonce::<U0>::default(), data)
        .map_err(|_| Error::DecryptFailed)
}

fn seal_with<C>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error>
where
    C: BlockCipher + BlockSizeUser<BlockSize = U16> + BlockEncrypt + KeyInit,
{
    let cipher = EntryCipher::<C>::new_from_slice(key)
        .map_err(|_| Error::InvalidKeyLength { len: key.len() })?;
    cipher
        .encrypt(&Nonce::<U0>::default(), data)
        .map_err(|_| Error::DecryptFailed)
}
