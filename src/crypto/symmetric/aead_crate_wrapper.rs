//! Generic [Cipher] implementation for any RustCrypto `aead` crate type:
//! AES-GCM (AES itself, or any other 128-bit block cipher instantiated
//! through `aes_gcm::AesGcm<_, _>`), and ChaCha-family AEADs.

use aead::{Aead, NewAead, Payload};
use anyhow::{ensure, Result};
use generic_array::typenum::Unsigned;
use generic_array::GenericArray;
use rand::RngCore;

use super::{Cipher, EncryptionKey};
use crate::blockstore::integrity_error;
use crate::data::Data;

pub struct AeadCipher<C: NewAead + Aead> {
    cipher: C,
}

impl<C: NewAead + Aead> Cipher for AeadCipher<C> {
    type KeySize = C::KeySize;

    const CIPHERTEXT_OVERHEAD: usize =
        C::NonceSize::USIZE + C::TagSize::USIZE + C::CiphertextOverhead::USIZE;

    fn new(key: EncryptionKey<Self::KeySize>) -> Self {
        Self {
            cipher: C::new(key.as_bytes()),
        }
    }

    fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Data> {
        let mut nonce = GenericArray::<u8, C::NonceSize>::default();
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| integrity_error("AEAD encryption failed"))?;
        let mut result = Vec::with_capacity(nonce.len() + ciphertext.len());
        result.extend_from_slice(&nonce);
        result.extend_from_slice(&ciphertext);
        Ok(result.into())
    }

    fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Data> {
        let nonce_size = C::NonceSize::to_usize();
        ensure!(
            ciphertext.len() >= nonce_size,
            "IntegrityError: ciphertext shorter than nonce"
        );
        let (nonce, rest) = ciphertext.split_at(nonce_size);
        let plaintext = self
            .cipher
            .decrypt(
                GenericArray::from_slice(nonce),
                Payload {
                    msg: rest,
                    aad: associated_data,
                },
            )
            .map_err(|_| integrity_error("AEAD authentication failed"))?;
        Ok(plaintext.into())
    }
}
