use anyhow::Result;
use generic_array::ArrayLength;

use crate::data::Data;

/// A block cipher bound to a single master key, able to authenticate and
/// encrypt one block's plaintext at a time.
///
/// `associated_data` is always `block_id || format_version` (§3, §4.3): it is
/// not secret, but binding it into the authentication tag means an attacker
/// who swaps two ciphertext files on disk gets `IntegrityError` instead of a
/// silently-wrong decryption.
pub trait Cipher: Sized {
    type KeySize: ArrayLength<u8>;

    // How many bytes is a ciphertext larger than a plaintext?
    const CIPHERTEXT_OVERHEAD: usize;

    fn new(key: EncryptionKey<Self::KeySize>) -> Self;

    fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Data>;

    fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Data>;
}

// TODO https://github.com/shadowsocks/crypto2 looks pretty fast, maybe we can use them for faster implementations?

/// Object-safe facade over [Cipher], so the config layer can pick a concrete
/// cipher type at runtime from the closed set of cipher names (`config::cipher_registry`)
/// without the caller needing to know `KeySize` at compile time.
pub trait DynCipher {
    fn ciphertext_overhead(&self) -> usize;
    fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Data>;
    fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Data>;
}

impl<C: Cipher> DynCipher for C {
    fn ciphertext_overhead(&self) -> usize {
        C::CIPHERTEXT_OVERHEAD
    }

    fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Data> {
        Cipher::encrypt(self, plaintext, associated_data)
    }

    fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Data> {
        Cipher::decrypt(self, ciphertext, associated_data)
    }
}

impl DynCipher for Box<dyn DynCipher> {
    fn ciphertext_overhead(&self) -> usize {
        (**self).ciphertext_overhead()
    }

    fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Data> {
        (**self).encrypt(plaintext, associated_data)
    }

    fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Data> {
        (**self).decrypt(ciphertext, associated_data)
    }
}

mod aead_crate_wrapper;
mod aesgcm;
mod cfb;
mod key;

#[cfg(test)]
mod cipher_tests;

pub use key::EncryptionKey;

// export ciphers
pub use aesgcm::{Aes128Gcm, Aes256Gcm};
pub use cfb::{Aes256Cfb, Twofish256Cfb};
pub type XChaCha20Poly1305 = aead_crate_wrapper::AeadCipher<chacha20poly1305::XChaCha20Poly1305>;
pub type Twofish256Gcm =
    aead_crate_wrapper::AeadCipher<aes_gcm::AesGcm<twofish::Twofish, generic_array::typenum::U12>>;
pub type Twofish128Gcm =
    aead_crate_wrapper::AeadCipher<aes_gcm::AesGcm<twofish::Twofish128, generic_array::typenum::U12>>;
pub type Serpent256Gcm =
    aead_crate_wrapper::AeadCipher<aes_gcm::AesGcm<serpent::Serpent, generic_array::typenum::U12>>;
