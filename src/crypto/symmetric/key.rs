use anyhow::{ensure, Result};
use generic_array::{ArrayLength, GenericArray};
use rand::RngCore;
use zeroize::Zeroize;

/// Cipher-sized key material. Zeroized on drop so the master key doesn't
/// linger in freed memory after unmount (§5 "Shared resources").
pub struct EncryptionKey<KeySize: ArrayLength<u8>> {
    key: GenericArray<u8, KeySize>,
}

impl<KeySize: ArrayLength<u8>> EncryptionKey<KeySize> {
    pub fn from_array(key: GenericArray<u8, KeySize>) -> Self {
        Self { key }
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        ensure!(
            data.len() == KeySize::to_usize(),
            "expected a {}-byte key, got {}",
            KeySize::to_usize(),
            data.len()
        );
        Ok(Self {
            key: GenericArray::clone_from_slice(data),
        })
    }

    pub fn generate(rng: &mut impl RngCore) -> Self {
        let mut key = GenericArray::default();
        rng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn as_bytes(&self) -> &GenericArray<u8, KeySize> {
        &self.key
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.key)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)?;
        Self::from_slice(&bytes)
    }
}

impl<KeySize: ArrayLength<u8>> Drop for EncryptionKey<KeySize> {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use generic_array::typenum::U32;

    #[test]
    fn hex_roundtrips() {
        let key: EncryptionKey<U32> = EncryptionKey::generate(&mut rand::thread_rng());
        let hex = key.to_hex();
        let restored: EncryptionKey<U32> = EncryptionKey::from_hex(&hex).unwrap();
        assert_eq!(key.as_bytes(), restored.as_bytes());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(EncryptionKey::<U32>::from_slice(&[0u8; 16]).is_err());
    }
}
