//! End-to-end scenarios for `CryDevice::create`/`load`, mirroring the
//! original library's create-then-load contract: wrong password, a missing
//! root blob, a missing config file, an incompatible version, and the
//! external-config-wins-over-internal rule (in both directions).

use cryfs_core::config::console::NonInteractiveConsole;
use cryfs_core::config::cry_config_file;
use cryfs_core::device::CryDevice;
use cryfs_core::error::CryfsError;
use cryfs_core::runtime_config::RuntimeConfig;

const PASSWORD: &str = "mypassword";

fn runtime_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    // Keep scrypt cheap so the suite runs fast.
    config.new_filesystem_kdf_cost = cry_config_file::ScryptCost::TEST_ONLY_WEAK;
    config
}

fn create_filesystem(basedir: &std::path::Path) {
    CryDevice::create(
        basedir,
        PASSWORD,
        Some("aes-256-gcm"),
        &NonInteractiveConsole,
        &runtime_config(),
    )
    .unwrap();
}

#[test]
fn load_succeeds_after_create() {
    let dir = tempfile::tempdir().unwrap();
    create_filesystem(dir.path());
    let device = CryDevice::load(dir.path(), PASSWORD, None, &runtime_config()).unwrap();
    assert_eq!("aes-256-gcm", device.cipher_name());
}

#[test]
fn load_with_external_config_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let external = tempfile::NamedTempFile::new().unwrap();
    std::fs::remove_file(external.path()).ok();
    CryDevice::create(
        dir.path(),
        PASSWORD,
        Some("aes-256-gcm"),
        &NonInteractiveConsole,
        &runtime_config(),
    )
    .unwrap();
    std::fs::copy(dir.path().join("cryfs.config"), external.path()).unwrap();

    let device = CryDevice::load(dir.path(), PASSWORD, Some(external.path()), &runtime_config()).unwrap();
    assert_eq!("aes-256-gcm", device.cipher_name());
}

#[test]
fn load_wrong_password_fails() {
    let dir = tempfile::tempdir().unwrap();
    create_filesystem(dir.path());
    let result = CryDevice::load(dir.path(), "wrong password", None, &runtime_config());
    assert!(matches!(result, Err(CryfsError::DecryptionFailed)));
}

#[test]
fn load_missing_root_blob_fails() {
    let dir = tempfile::tempdir().unwrap();
    create_filesystem(dir.path());
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let entry = entry.unwrap();
        if entry.file_name() != "cryfs.config" {
            std::fs::remove_dir_all(entry.path()).unwrap();
        }
    }
    let result = CryDevice::load(dir.path(), PASSWORD, None, &runtime_config());
    assert!(matches!(result, Err(CryfsError::FilesystemInvalid(_))));
}

#[test]
fn load_missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    create_filesystem(dir.path());
    std::fs::remove_file(dir.path().join("cryfs.config")).unwrap();
    let result = CryDevice::load(dir.path(), PASSWORD, None, &runtime_config());
    assert!(matches!(result, Err(CryfsError::ConfigFileDoesntExist)));
}

#[test]
fn load_incompatible_version_fails() {
    use cryfs_core::config::{CryConfig, ROOT_BLOB_UNSET};

    let dir = tempfile::tempdir().unwrap();
    let config = CryConfig {
        cipher: "aes-256-gcm".to_string(),
        encryption_key: cryfs_core::config::cipher_registry::CipherId::Aes256Gcm.generate_key_hex(),
        root_blob: ROOT_BLOB_UNSET.to_string(),
        block_size_bytes: 32 * 1024,
        // Much newer than this crate's own version: same major, higher
        // minor, so it's rejected by the semver-ish compatibility check.
        version: "0.99.0".to_string(),
    };
    let sealed = cry_config_file::seal(&config, PASSWORD, cry_config_file::ScryptCost::TEST_ONLY_WEAK).unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();
    std::fs::write(dir.path().join("cryfs.config"), sealed).unwrap();

    let result = CryDevice::load(dir.path(), PASSWORD, None, &runtime_config());
    assert!(matches!(
        result,
        Err(CryfsError::FilesystemIncompatibleVersion { .. })
    ));
}

#[test]
fn load_uses_external_config_cipher_over_internal() {
    let dir = tempfile::tempdir().unwrap();
    CryDevice::create(
        dir.path(),
        PASSWORD,
        Some("aes-256-gcm"),
        &NonInteractiveConsole,
        &runtime_config(),
    )
    .unwrap();

    let external = tempfile::NamedTempFile::new().unwrap();
    use cryfs_core::config::{CryConfig, ROOT_BLOB_UNSET};
    let external_config = CryConfig {
        cipher: "twofish-256-cfb".to_string(),
        encryption_key: cryfs_core::config::cipher_registry::CipherId::Twofish256Cfb.generate_key_hex(),
        root_blob: ROOT_BLOB_UNSET.to_string(),
        block_size_bytes: 32 * 1024,
        version: "0.1.0".to_string(),
    };
    let sealed = cry_config_file::seal(&external_config, PASSWORD, cry_config_file::ScryptCost::TEST_ONLY_WEAK).unwrap();
    std::fs::write(external.path(), sealed).unwrap();

    let device = CryDevice::load(dir.path(), PASSWORD, Some(external.path()), &runtime_config()).unwrap();
    assert_eq!("twofish-256-cfb", device.cipher_name());
}

#[test]
fn created_filesystem_persists_and_reloads_written_data() {
    let dir = tempfile::tempdir().unwrap();
    let device = CryDevice::create(
        dir.path(),
        PASSWORD,
        Some("aes-256-gcm"),
        &NonInteractiveConsole,
        &runtime_config(),
    )
    .unwrap();
    let root_id = device.root_blob_id();
    {
        let mut root = device.blobstore().load(root_id).unwrap().unwrap();
        root.write(b"hello world", 0).unwrap();
        device.flush().unwrap();
    }

    let device2 = CryDevice::load(dir.path(), PASSWORD, None, &runtime_config()).unwrap();
    let mut root = device2.blobstore().load(root_id).unwrap().unwrap();
    let mut buf = [0u8; 11];
    root.read(&mut buf, 0).unwrap();
    assert_eq!(b"hello world", &buf);
}
