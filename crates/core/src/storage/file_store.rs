use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;

use super::encryption::{KdfParams, SealedKey};
use super::format;
use super::table::{Table, TableStore};
use crate::errors::CoreError;

const FILE_EXTENSION: &str = "pldg";

/// Directory of encrypted tables, one `<name>.pldg` file per table.
///
/// Every table is encrypted with its own Argon2id-derived key (its own salt),
/// all derived from the same password.
pub struct EncryptedFileStore {
    dir: PathBuf,
    password: String,
    kdf_params: KdfParams,
}

impl std::fmt::Debug for EncryptedFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStore")
            .field("dir", &self.dir)
            .field("kdf_params", &self.kdf_params)
            .finish_non_exhaustive()
    }
}

impl EncryptedFileStore {
    /// Open (and create if needed) a store directory.
    pub fn open(dir: impl AsRef<Path>, password: &str) -> Result<Self, CoreError> {
        Self::with_params(dir, password, KdfParams::default())
    }

    /// Same as [`open`](Self::open) with explicit KDF costs for newly created tables.
    pub fn with_params(
        dir: impl AsRef<Path>,
        password: &str,
        kdf_params: KdfParams,
    ) -> Result<Self, CoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            password: password.to_string(),
            kdf_params,
        })
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{FILE_EXTENSION}"))
    }
}

impl TableStore for EncryptedFileStore {
    fn open_table(&self, name: &str) -> Result<Box<dyn Table>, CoreError> {
        let path = self.table_path(name);
        if !path.exists() {
            debug!("Creating table '{name}' at {}", path.display());
            let key = SealedKey::generate(&self.password, self.kdf_params)?;
            return Ok(Box::new(EncryptedFileTable {
                name: name.to_string(),
                path,
                key,
                staged: BTreeMap::new(),
            }));
        }

        let bytes = std::fs::read(&path)?;
        let (header, ciphertext) = format::read_table_file(&bytes)?;
        if header.table != name {
            return Err(CoreError::InvalidFileFormat(format!(
                "{} holds table '{}', expected '{name}'",
                path.display(),
                header.table
            )));
        }

        let key = SealedKey::derive(&self.password, header.salt, header.kdf_params)?;
        let plaintext = key.open(ciphertext, &header.nonce)?;
        let staged: BTreeMap<String, Vec<u8>> = bincode::deserialize(&plaintext).map_err(|e| {
            CoreError::Deserialization(format!("Failed to decode table '{name}': {e}"))
        })?;
        debug!("Opened table '{name}' with {} entries", staged.len());

        Ok(Box::new(EncryptedFileTable {
            name: name.to_string(),
            path,
            key,
            staged,
        }))
    }
}

struct EncryptedFileTable {
    name: String,
    path: PathBuf,
    key: SealedKey,
    staged: BTreeMap<String, Vec<u8>>,
}

impl Table for EncryptedFileTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn items(&self) -> Vec<(String, Vec<u8>)> {
        self.staged.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    fn clear(&mut self) {
        self.staged.clear();
    }

    fn update(&mut self, entries: Vec<(String, Vec<u8>)>) {
        self.staged.extend(entries);
    }

    fn commit(&mut self) -> Result<(), CoreError> {
        let plaintext = bincode::serialize(&self.staged).map_err(|e| {
            CoreError::Serialization(format!("Failed to encode table '{}': {e}", self.name))
        })?;
        let (nonce, ciphertext) = self.key.seal(&plaintext)?;
        let bytes = format::write_table_file(
            &self.name,
            &self.key.params,
            &self.key.salt,
            &nonce,
            &ciphertext,
        )?;

        // A torn write must never replace the last good commit.
        let tmp = self.path.with_extension(format!("{FILE_EXTENSION}.tmp"));
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Committed table '{}' ({} entries)", self.name, self.staged.len());
        Ok(())
    }
}
