//! Master key handling.
//!
//! The master key is generated once at first run, persisted with
//! owner-only access, and never auto-rotated. Every per-purpose
//! encryption key is sealed under it before touching disk.

use std::path::{Path, PathBuf};

use rand::RngCore;
use tokio::fs;

use crate::envelope::KEY_LEN;
use crate::error::CryptoError;

/// File name of the persisted master key inside the key store directory.
const MASTER_KEY_FILE: &str = "master.key";

/// The master key protecting all stored encryption keys.
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Loads the master key from the key store directory, generating and
    /// persisting a new one on first run.
    ///
    /// The key store directory is created with owner-only permissions if
    /// it does not exist; the key file itself is written with mode 0600.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the key file
    /// cannot be read or written, or an existing file has the wrong size.
    pub async fn load_or_generate(dir: &Path) -> Result<Self, CryptoError> {
        fs::create_dir_all(dir).await?;
        restrict_permissions(dir, 0o700).await?;

        let path = master_key_path(dir);
        match fs::read(&path).await {
            Ok(bytes) => {
                let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
                    CryptoError::Io {
                        message: format!("master key at {} has invalid length", path.display()),
                    }
                })?;
                tracing::info!("master key loaded from key store");
                Ok(Self { bytes })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let mut bytes = [0u8; KEY_LEN];
                rand::thread_rng().fill_bytes(&mut bytes);

                fs::write(&path, bytes).await?;
                restrict_permissions(&path, 0o600).await?;

                tracing::info!("new master key generated and stored");
                Ok(Self { bytes })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The raw key bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

// Key material must never leak through Debug output.
impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Path of the master key file inside the key store directory.
pub(crate) fn master_key_path(dir: &Path) -> PathBuf {
    dir.join(MASTER_KEY_FILE)
}

/// Applies owner-only permissions where the platform supports it.
pub(crate) async fn restrict_permissions(path: &Path, mode: u32) -> Result<(), CryptoError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(mode);
        fs::set_permissions(path, perms).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_then_reload() {
        let dir = tempfile::tempdir().unwrap();

        let first = MasterKey::load_or_generate(dir.path()).await.unwrap();
        let second = MasterKey::load_or_generate(dir.path()).await.unwrap();

        assert_eq!(first.bytes(), second.bytes());
        assert!(master_key_path(dir.path()).exists());
    }

    #[tokio::test]
    async fn test_distinct_stores_get_distinct_keys() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();

        let key_a = MasterKey::load_or_generate(a.path()).await.unwrap();
        let key_b = MasterKey::load_or_generate(b.path()).await.unwrap();

        assert_ne!(key_a.bytes(), key_b.bytes());
    }

    #[tokio::test]
    async fn test_corrupt_master_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(master_key_path(dir.path()), b"short")
            .await
            .unwrap();

        let result = MasterKey::load_or_generate(dir.path()).await;
        assert!(matches!(result, Err(CryptoError::Io { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        MasterKey::load_or_generate(dir.path()).await.unwrap();

        let mode = std::fs::metadata(master_key_path(dir.path()))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let key = MasterKey { bytes: [7u8; KEY_LEN] };
        assert_eq!(format!("{key:?}"), "MasterKey(..)");
    }
}
