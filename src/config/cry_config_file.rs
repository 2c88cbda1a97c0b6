//! Sealing and opening the on-disk config file (§4.6, §6 "Config file").
//!
//! Layout: `magic || file_format_version(u16) || kdf_params || ciphertext`,
//! where `ciphertext = AEAD(scrypt(password, kdf_params), plaintext_body, AD=file_format_version)`.
//! Mirrors the block envelope's "header, then AD-bound ciphertext" shape
//! (`blockstore::encrypted`), just at the config-file granularity instead of
//! per-block.

use anyhow::{bail, ensure, Context, Result};
use rand::RngCore;

use super::cry_config::CryConfig;
use crate::crypto::symmetric::{EncryptionKey, XChaCha20Poly1305};

const MAGIC: &[u8] = b"CRYFS-CONFIG";
const FILE_FORMAT_VERSION: u16 = 1;
const SCRYPT_KEY_LEN: usize = 32;

/// scrypt cost parameters. `INTERACTIVE` matches the widely used
/// password-hashing recommendation (`N=2^14, r=8, p=1`); tests use a much
/// cheaper profile so the suite doesn't spend seconds per test case.
#[derive(Debug, Clone, Copy)]
pub struct ScryptCost {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl ScryptCost {
    pub const INTERACTIVE: ScryptCost = ScryptCost {
        log_n: 14,
        r: 8,
        p: 1,
    };

    /// Drastically cheaper than [Self::INTERACTIVE]. Never use this for a
    /// real filesystem -- it exists so test suites (including integration
    /// tests outside this crate) don't spend seconds per test case deriving
    /// scrypt keys.
    pub const TEST_ONLY_WEAK: ScryptCost = ScryptCost {
        log_n: 4,
        r: 8,
        p: 1,
    };
}

struct KdfParams {
    salt: Vec<u8>,
    cost: ScryptCost,
}

impl KdfParams {
    fn generate(cost: ScryptCost) -> Self {
        let mut salt = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self { salt, cost }
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.salt.len() + 1 + 4 + 4);
        out.push(self.salt.len() as u8);
        out.extend_from_slice(&self.salt);
        out.push(self.cost.log_n);
        out.extend_from_slice(&self.cost.r.to_le_bytes());
        out.extend_from_slice(&self.cost.p.to_le_bytes());
        out
    }

    /// Parses the params and returns them along with the number of bytes
    /// consumed.
    fn parse(data: &[u8]) -> Result<(Self, usize)> {
        ensure!(!data.is_empty(), "FilesystemInvalid: config file truncated in KDF params");
        let salt_len = data[0] as usize;
        let mut offset = 1;
        ensure!(
            data.len() >= offset + salt_len + 1 + 4 + 4,
            "FilesystemInvalid: config file truncated in KDF params"
        );
        let salt = data[offset..offset + salt_len].to_vec();
        offset += salt_len;
        let log_n = data[offset];
        offset += 1;
        let r = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
        offset += 4;
        let p = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
        offset += 4;
        Ok((
            Self {
                salt,
                cost: ScryptCost { log_n, r, p },
            },
            offset,
        ))
    }

    fn derive_key(&self, password: &str) -> Result<[u8; SCRYPT_KEY_LEN]> {
        let params = scrypt::Params::new(self.cost.log_n, self.cost.r, self.cost.p)
            .context("invalid scrypt cost parameters")?;
        let mut key = [0u8; SCRYPT_KEY_LEN];
        scrypt::scrypt(password.as_bytes(), &self.salt, &params, &mut key)
            .context("scrypt key derivation failed")?;
        Ok(key)
    }
}

/// Seals `config` under `password`, returning the bytes to write to the
/// config file.
pub fn seal(config: &CryConfig, password: &str, cost: ScryptCost) -> Result<Vec<u8>> {
    let kdf_params = KdfParams::generate(cost);
    let key_bytes = kdf_params.derive_key(password)?;
    let cipher = XChaCha20Poly1305::new(EncryptionKey::from_slice(&key_bytes)?);
    let ad = FILE_FORMAT_VERSION.to_le_bytes();
    let ciphertext = cipher.encrypt(config.serialize().as_bytes(), &ad)?;

    let mut out = Vec::with_capacity(MAGIC.len() + 2 + 64 + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FILE_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&kdf_params.serialize());
    out.extend_from_slice(ciphertext.as_ref());
    Ok(out)
}

/// Opens a sealed config file, deriving the key from `password`. Returns
/// `DecryptionFailed`-shaped errors (via the `IntegrityError:`-prefixed
/// anyhow message convention used throughout this crate) on wrong password
/// or a tampered file; the two are indistinguishable by design (§7
/// "Authentication").
pub fn open(data: &[u8], password: &str) -> Result<CryConfig> {
    ensure!(
        data.len() >= MAGIC.len() + 2,
        "FilesystemInvalid: config file too short"
    );
    let (magic, rest) = data.split_at(MAGIC.len());
    if magic != MAGIC {
        bail!("FilesystemInvalid: not a cryfs config file (bad magic)");
    }
    let (version_bytes, rest) = rest.split_at(2);
    let file_format_version = u16::from_le_bytes(version_bytes.try_into().unwrap());
    if file_format_version != FILE_FORMAT_VERSION {
        bail!(
            "FilesystemIncompatibleVersion: config file format version {} is not supported by this build (expects {})",
            file_format_version,
            FILE_FORMAT_VERSION
        );
    }
    let (kdf_params, consumed) = KdfParams::parse(rest)?;
    let ciphertext = &rest[consumed..];

    let key_bytes = kdf_params.derive_key(password)?;
    let cipher = XChaCha20Poly1305::new(EncryptionKey::from_slice(&key_bytes)?);
    let ad = file_format_version.to_le_bytes();
    let plaintext = cipher
        .decrypt(ciphertext, &ad)
        .map_err(|_| anyhow::anyhow!("DecryptionFailed: wrong password or corrupted config file"))?;
    let body = std::str::from_utf8(plaintext.as_ref())
        .context("FilesystemInvalid: decrypted config body is not valid UTF-8")?;
    let config = CryConfig::parse(body)?;
    check_version_compatible(&config.version)?;
    Ok(config)
}

/// A filesystem created by a newer major version, or a newer minor version
/// within the same major, is rejected (§4.6's semver-ish compatibility
/// policy): same major, config minor <= running minor.
fn check_version_compatible(config_version: &str) -> Result<()> {
    let running_version = env!("CARGO_PKG_VERSION");
    let (config_major, config_minor) = parse_major_minor(config_version)?;
    let (running_major, running_minor) = parse_major_minor(running_version)
        .expect("CARGO_PKG_VERSION must always be a valid semver string");
    if config_major != running_major || config_minor > running_minor {
        bail!(
            "FilesystemIncompatibleVersion: filesystem was created with version {} which is incompatible with the running version {}",
            config_version,
            running_version
        );
    }
    Ok(())
}

fn parse_major_minor(version: &str) -> Result<(u64, u64)> {
    let mut parts = version.split('.');
    let major = parts
        .next()
        .context("FilesystemInvalid: version string is empty")?
        .parse::<u64>()
        .context("FilesystemInvalid: version string has a non-numeric major component")?;
    let minor = parts
        .next()
        .context("FilesystemInvalid: version string is missing a minor component")?
        .parse::<u64>()
        .context("FilesystemInvalid: version string has a non-numeric minor component")?;
    Ok((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cry_config::ROOT_BLOB_UNSET;

    fn sample() -> CryConfig {
        CryConfig {
            cipher: "aes-256-gcm".to_string(),
            encryption_key: "deadbeef".to_string(),
            root_blob: ROOT_BLOB_UNSET.to_string(),
            block_size_bytes: 32768,
            version: "0.1.0".to_string(),
        }
    }

    #[test]
    fn seals_and_opens_with_correct_password() {
        let config = sample();
        let sealed = seal(&config, "correct horse", ScryptCost::TEST_ONLY_WEAK).unwrap();
        let opened = open(&sealed, "correct horse").unwrap();
        assert_eq!(config, opened);
    }

    #[test]
    fn wrong_password_fails_to_decrypt() {
        let config = sample();
        let sealed = seal(&config, "correct horse", ScryptCost::TEST_ONLY_WEAK).unwrap();
        assert!(open(&sealed, "wrong password").is_err());
    }

    #[test]
    fn tampering_the_ciphertext_is_detected() {
        let config = sample();
        let mut sealed = seal(&config, "pw", ScryptCost::TEST_ONLY_WEAK).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(open(&sealed, "pw").is_err());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut sealed = seal(&sample(), "pw", ScryptCost::TEST_ONLY_WEAK).unwrap();
        sealed[0] ^= 0xFF;
        assert!(open(&sealed, "pw").is_err());
    }

    #[test]
    fn newer_minor_version_than_running_is_rejected() {
        let mut config = sample();
        config.version = "99.99.0".to_string();
        let sealed = seal(&config, "pw", ScryptCost::TEST_ONLY_WEAK).unwrap();
        assert!(open(&sealed, "pw").is_err());
    }

    #[test]
    fn same_major_lower_minor_version_is_accepted() {
        let mut config = sample();
        config.version = "0.0.0".to_string();
        let sealed = seal(&config, "pw", ScryptCost::TEST_ONLY_WEAK).unwrap();
        assert!(open(&sealed, "pw").is_ok());
    }
}
