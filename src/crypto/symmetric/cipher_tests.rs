use rand::RngCore;

use super::*;

fn random_key<KeySize: generic_array::ArrayLength<u8>>() -> EncryptionKey<KeySize> {
    EncryptionKey::generate(&mut rand::thread_rng())
}

fn roundtrips<C: Cipher>() {
    let cipher = C::new(random_key());
    let mut plaintext = vec![0u8; 1000];
    rand::thread_rng().fill_bytes(&mut plaintext);
    let ad = b"some-associated-data";
    let ciphertext = cipher.encrypt(&plaintext, ad).unwrap();
    assert_eq!(
        plaintext.len() + C::CIPHERTEXT_OVERHEAD,
        ciphertext.len()
    );
    let decrypted = cipher.decrypt(ciphertext.as_ref(), ad).unwrap();
    assert_eq!(plaintext, decrypted.as_ref());
}

fn empty_plaintext_roundtrips<C: Cipher>() {
    let cipher = C::new(random_key());
    let ciphertext = cipher.encrypt(&[], b"ad").unwrap();
    let decrypted = cipher.decrypt(ciphertext.as_ref(), b"ad").unwrap();
    assert_eq!(0, decrypted.len());
}

macro_rules! cipher_test_suite {
    ($modname:ident, $ty:ty) => {
        mod $modname {
            use super::*;

            #[test]
            fn roundtrips() {
                super::roundtrips::<$ty>();
            }

            #[test]
            fn empty_plaintext_roundtrips() {
                super::empty_plaintext_roundtrips::<$ty>();
            }
        }
    };
}

cipher_test_suite!(aes256gcm, Aes256Gcm);
cipher_test_suite!(aes128gcm, Aes128Gcm);
cipher_test_suite!(twofish256gcm, Twofish256Gcm);
cipher_test_suite!(twofish128gcm, Twofish128Gcm);
cipher_test_suite!(serpent256gcm, Serpent256Gcm);
cipher_test_suite!(xchacha20poly1305, XChaCha20Poly1305);

#[test]
fn aead_tampering_is_detected() {
    let cipher = Aes256Gcm::new(random_key());
    let mut ciphertext = cipher.encrypt(b"hello world", b"ad").unwrap();
    let last = ciphertext.len() - 1;
    ciphertext.as_mut()[last] ^= 0xFF;
    assert!(cipher.decrypt(ciphertext.as_ref(), b"ad").is_err());
}

#[test]
fn aead_wrong_associated_data_is_detected() {
    let cipher = Aes256Gcm::new(random_key());
    let ciphertext = cipher.encrypt(b"hello world", b"ad-1").unwrap();
    assert!(cipher.decrypt(ciphertext.as_ref(), b"ad-2").is_err());
}

#[test]
fn cfb_ciphers_roundtrip_without_authentication() {
    let cipher = Aes256Cfb::new(random_key());
    let ciphertext = cipher.encrypt(b"hello world", b"unused").unwrap();
    let decrypted = cipher.decrypt(ciphertext.as_ref(), b"unused").unwrap();
    assert_eq!(b"hello world".to_vec(), decrypted.as_ref());
}
