//! `aes-256-gcm` / `aes-128-gcm`, the default and recommended AEAD ciphers
//! (§6). Both are thin aliases over the generic [AeadCipher] wrapper, backed
//! by the `aes-gcm` crate's concrete AES instantiations.

use super::aead_crate_wrapper::AeadCipher;

pub type Aes256Gcm = AeadCipher<aes_gcm::Aes256Gcm>;
pub type Aes128Gcm = AeadCipher<aes_gcm::Aes128Gcm>;
