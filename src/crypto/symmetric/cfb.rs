//! Legacy, non-AEAD ciphers kept for compatibility with filesystems created
//! by older cryfs-core versions (§6 "CFB variants for legacy"). CFB gives no
//! authentication of its own — only the outer envelope's block-id binding
//! protects against *swapping* ciphertexts, not against bit-flipping within
//! one. `CryConfigCreator` (config/cipher_registry.rs) warns and requires
//! confirmation before a filesystem is created with one of these.

use anyhow::{ensure, Result};
use cipher::{BlockCipher, BlockEncrypt, NewBlockCipher};
use generic_array::typenum::Unsigned;
use generic_array::GenericArray;
use rand::RngCore;

use super::{Cipher, EncryptionKey};
use crate::data::Data;

pub struct CfbCipher<C: BlockCipher + NewBlockCipher + BlockEncrypt> {
    cipher: C,
}

impl<C: BlockCipher + NewBlockCipher + BlockEncrypt> Cipher for CfbCipher<C> {
    type KeySize = C::KeySize;

    const CIPHERTEXT_OVERHEAD: usize = 0; // the IV is stored separately, see below

    fn new(key: EncryptionKey<Self::KeySize>) -> Self {
        Self {
            cipher: C::new(key.as_bytes()),
        }
    }

    fn encrypt(&self, plaintext: &[u8], _associated_data: &[u8]) -> Result<Data> {
        let mut iv = GenericArray::<u8, C::BlockSize>::default();
        rand::rngs::OsRng.fill_bytes(&mut iv);
        let ciphertext = cfb_crypt(&self.cipher, iv.clone(), plaintext, true);
        let mut result = Vec::with_capacity(iv.len() + ciphertext.len());
        result.extend_from_slice(&iv);
        result.extend_from_slice(&ciphertext);
        Ok(result.into())
    }

    fn decrypt(&self, ciphertext: &[u8], _associated_data: &[u8]) -> Result<Data> {
        let block_size = C::BlockSize::to_usize();
        ensure!(
            ciphertext.len() >= block_size,
            "IntegrityError: ciphertext shorter than IV"
        );
        let (iv, rest) = ciphertext.split_at(block_size);
        let iv = GenericArray::clone_from_slice(iv);
        let plaintext = cfb_crypt(&self.cipher, iv, rest, false);
        Ok(plaintext.into())
    }
}

/// Textbook CFB: each block's keystream is `E(feedback)`, XORed with the
/// input block; the feedback for the next block is always the *ciphertext*
/// block, whichever direction we're going.
fn cfb_crypt<C: BlockCipher + BlockEncrypt>(
    cipher: &C,
    mut feedback: GenericArray<u8, C::BlockSize>,
    input: &[u8],
    encrypting: bool,
) -> Vec<u8> {
    let block_size = C::BlockSize::to_usize();
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks(block_size) {
        let mut keystream = feedback.clone();
        cipher.encrypt_block(&mut keystream);
        let out_chunk: Vec<u8> = chunk
            .iter()
            .zip(keystream.iter())
            .map(|(b, k)| b ^ k)
            .collect();
        let ciphertext_chunk = if encrypting { &out_chunk } else { chunk };
        feedback = GenericArray::default();
        feedback[..ciphertext_chunk.len()].copy_from_slice(ciphertext_chunk);
        output.extend_from_slice(&out_chunk);
    }
    output
}

pub type Aes256Cfb = CfbCipher<aes::Aes256>;
pub type Twofish256Cfb = CfbCipher<twofish::Twofish>;
