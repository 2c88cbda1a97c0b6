//! The plaintext structure sealed inside a config file (§4.6).

use std::collections::HashMap;

use anyhow::{ensure, Context, Result};

/// The sentinel stored in `cryfs.rootblob` before a filesystem's root
/// directory blob has been created. `CryDevice` replaces this with a real
/// blob id on first mount.
pub const ROOT_BLOB_UNSET: &str = "";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryConfig {
    pub cipher: String,
    pub encryption_key: String,
    pub root_blob: String,
    pub block_size_bytes: u32,
    pub version: String,
}

impl CryConfig {
    pub fn serialize(&self) -> String {
        format!(
            "cryfs.cipher={}\n\
             cryfs.encryptionKey={}\n\
             cryfs.rootblob={}\n\
             cryfs.blocksizeBytes={}\n\
             cryfs.version={}\n",
            self.cipher, self.encryption_key, self.root_blob, self.block_size_bytes, self.version
        )
    }

    pub fn parse(body: &str) -> Result<Self> {
        let mut fields: HashMap<&str, &str> = HashMap::new();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .with_context(|| format!("FilesystemInvalid: malformed config line: '{}'", line))?;
            fields.insert(key.trim(), value.trim());
        }

        let get = |key: &str| -> Result<String> {
            fields
                .get(key)
                .map(|v| v.to_string())
                .with_context(|| format!("FilesystemInvalid: config is missing '{}'", key))
        };

        let block_size_bytes: u32 = get("cryfs.blocksizeBytes")?
            .parse()
            .context("FilesystemInvalid: cryfs.blocksizeBytes is not a valid number")?;
        ensure!(block_size_bytes > 0, "FilesystemInvalid: cryfs.blocksizeBytes must be positive");

        Ok(Self {
            cipher: get("cryfs.cipher")?,
            encryption_key: get("cryfs.encryptionKey")?,
            root_blob: fields
                .get("cryfs.rootblob")
                .map(|v| v.to_string())
                .unwrap_or_default(),
            block_size_bytes,
            version: get("cryfs.version")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn serialize_then_parse_roundtrips() {
        let config = sample();
        let parsed = CryConfig::parse(&config.serialize()).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn missing_field_is_rejected() {
        let body = "cryfs.cipher=aes-256-gcm\ncryfs.encryptionKey=deadbeef\n";
        assert!(CryConfig::parse(body).is_err());
    }

    #[test]
    fn rootblob_defaults_to_unset_sentinel_when_absent() {
        let body = "cryfs.cipher=aes-256-gcm\ncryfs.encryptionKey=deadbeef\ncryfs.blocksizeBytes=1024\ncryfs.version=0.1.0\n";
        let parsed = CryConfig::parse(body).unwrap();
        assert_eq!(ROOT_BLOB_UNSET, parsed.root_blob);
    }
}
