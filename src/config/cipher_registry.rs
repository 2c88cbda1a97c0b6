//! The closed set of cipher names a config file's `cryfs.cipher` entry may
//! hold (§6 "Supported ciphers (closed set)"). Adding a cipher means adding a
//! variant here and nowhere else gets to invent a new name string.

use anyhow::{bail, Result};
use generic_array::typenum::{U16, U32};

use crate::crypto::symmetric::{
    Aes128Gcm, Aes256Cfb, Aes256Gcm, Cipher, DynCipher, EncryptionKey, Serpent256Gcm,
    Twofish128Gcm, Twofish256Cfb, Twofish256Gcm, XChaCha20Poly1305,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherId {
    Aes256Gcm,
    Aes128Gcm,
    Twofish256Gcm,
    Twofish128Gcm,
    Serpent256Gcm,
    XChaCha20Poly1305,
    Aes256Cfb,
    Twofish256Cfb,
}

/// Every cipher name the config format can name, in the order they're
/// offered to an interactive console (§4.6 "Creation contract").
pub const ALL_CIPHERS: &[CipherId] = &[
    CipherId::Aes256Gcm,
    CipherId::Aes128Gcm,
    CipherId::Twofish256Gcm,
    CipherId::Twofish128Gcm,
    CipherId::Serpent256Gcm,
    CipherId::XChaCha20Poly1305,
    CipherId::Aes256Cfb,
    CipherId::Twofish256Cfb,
];

impl CipherId {
    pub fn name(self) -> &'static str {
        match self {
            CipherId::Aes256Gcm => "aes-256-gcm",
            CipherId::Aes128Gcm => "aes-128-gcm",
            CipherId::Twofish256Gcm => "twofish-256-gcm",
            CipherId::Twofish128Gcm => "twofish-128-gcm",
            CipherId::Serpent256Gcm => "serpent-256-gcm",
            CipherId::XChaCha20Poly1305 => "xchacha20-poly1305",
            CipherId::Aes256Cfb => "aes-256-cfb",
            CipherId::Twofish256Cfb => "twofish-256-cfb",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        ALL_CIPHERS
            .iter()
            .copied()
            .find(|c| c.name() == name)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "FilesystemInvalid: unknown cipher '{}'. Supported ciphers: {}",
                    name,
                    ALL_CIPHERS
                        .iter()
                        .map(|c| c.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }

    /// CFB gives no authentication of its own (§6): only the outer
    /// envelope's block-id binding protects against swapping ciphertexts.
    pub fn is_weak(self) -> bool {
        matches!(self, CipherId::Aes256Cfb | CipherId::Twofish256Cfb)
    }

    pub fn key_size_bytes(self) -> usize {
        match self {
            CipherId::Aes256Gcm
            | CipherId::Twofish256Gcm
            | CipherId::Serpent256Gcm
            | CipherId::XChaCha20Poly1305
            | CipherId::Aes256Cfb
            | CipherId::Twofish256Cfb => 32,
            CipherId::Aes128Gcm | CipherId::Twofish128Gcm => 16,
        }
    }

    /// Generates a fresh random key of this cipher's size, hex-encoded for
    /// storage in [crate::config::CryConfig::encryption_key].
    pub fn generate_key_hex(self) -> String {
        match self {
            CipherId::Aes256Gcm => EncryptionKey::<U32>::generate(&mut rand::rngs::OsRng).to_hex(),
            CipherId::Aes128Gcm => EncryptionKey::<U16>::generate(&mut rand::rngs::OsRng).to_hex(),
            CipherId::Twofish256Gcm => {
                EncryptionKey::<U32>::generate(&mut rand::rngs::OsRng).to_hex()
            }
            CipherId::Twofish128Gcm => {
                EncryptionKey::<U16>::generate(&mut rand::rngs::OsRng).to_hex()
            }
            CipherId::Serpent256Gcm => {
                EncryptionKey::<U32>::generate(&mut rand::rngs::OsRng).to_hex()
            }
            CipherId::XChaCha20Poly1305 => {
                EncryptionKey::<U32>::generate(&mut rand::rngs::OsRng).to_hex()
            }
            CipherId::Aes256Cfb => EncryptionKey::<U32>::generate(&mut rand::rngs::OsRng).to_hex(),
            CipherId::Twofish256Cfb => {
                EncryptionKey::<U32>::generate(&mut rand::rngs::OsRng).to_hex()
            }
        }
    }
}

/// Builds the concrete cipher implementation named by `cipher_name`, keyed
/// with `key_hex` (as stored in `CryConfig`). Returns a boxed [DynCipher] so
/// callers (`CryDevice`) don't need to know the cipher's key size at compile
/// time -- it was only known once the config file had been read.
pub fn build_cipher(cipher_name: &str, key_hex: &str) -> Result<Box<dyn DynCipher>> {
    let id = CipherId::from_name(cipher_name)?;
    Ok(match id {
        CipherId::Aes256Gcm => Box::new(Aes256Gcm::new(EncryptionKey::<U32>::from_hex(key_hex)?)),
        CipherId::Aes128Gcm => Box::new(Aes128Gcm::new(EncryptionKey::<U16>::from_hex(key_hex)?)),
        CipherId::Twofish256Gcm => Box::new(Twofish256Gcm::new(EncryptionKey::<U32>::from_hex(
            key_hex,
        )?)),
        CipherId::Twofish128Gcm => Box::new(Twofish128Gcm::new(EncryptionKey::<U16>::from_hex(
            key_hex,
        )?)),
        CipherId::Serpent256Gcm => Box::new(Serpent256Gcm::new(EncryptionKey::<U32>::from_hex(
            key_hex,
        )?)),
        CipherId::XChaCha20Poly1305 => Box::new(XChaCha20Poly1305::new(
            EncryptionKey::<U32>::from_hex(key_hex)?,
        )),
        CipherId::Aes256Cfb => Box::new(Aes256Cfb::new(EncryptionKey::<U32>::from_hex(key_hex)?)),
        CipherId::Twofish256Cfb => Box::new(Twofish256Cfb::new(EncryptionKey::<U32>::from_hex(
            key_hex,
        )?)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_cipher_name_round_trips_through_from_name() {
        for &id in ALL_CIPHERS {
            assert_eq!(id, CipherId::from_name(id.name()).unwrap());
        }
    }

    #[test]
    fn unknown_cipher_name_is_rejected() {
        assert!(CipherId::from_name("rot13").is_err());
    }

    #[test]
    fn build_cipher_roundtrips_for_every_registered_cipher() {
        for &id in ALL_CIPHERS {
            let key_hex = id.generate_key_hex();
            let cipher = build_cipher(id.name(), &key_hex).unwrap();
            let ciphertext = cipher.encrypt(b"hello", b"ad").unwrap();
            let plaintext = cipher.decrypt(ciphertext.as_ref(), b"ad").unwrap();
            assert_eq!(b"hello".to_vec(), plaintext.as_ref());
        }
    }

    #[test]
    fn cfb_ciphers_are_flagged_weak_and_gcm_ciphers_are_not() {
        assert!(CipherId::Aes256Cfb.is_weak());
        assert!(CipherId::Twofish256Cfb.is_weak());
        assert!(!CipherId::Aes256Gcm.is_weak());
    }
}
