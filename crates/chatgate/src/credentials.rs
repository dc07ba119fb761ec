//! Session credential persistence.
//!
//! The messaging library owns the credential format. Chatgate treats it as an
//! opaque JSON document: loaded once per connect, saved whenever the library
//! reports an update.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Opaque credential document produced by the messaging library.
pub type Credentials = serde_json::Value;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed credentials at {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("failed to serialize credentials: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CredentialError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type CredentialResult<T> = Result<T, CredentialError>;

// ============================================================================
// Store Trait
// ============================================================================

/// Storage backend for session credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load stored credentials, or `None` if the session was never paired.
    async fn load(&self) -> CredentialResult<Option<Credentials>>;

    /// Replace stored credentials.
    async fn save(&self, credentials: &Credentials) -> CredentialResult<()>;
}

// ============================================================================
// File Store
// ============================================================================

/// Credentials kept in a single JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> CredentialResult<Option<Credentials>> {
        let contents = match fs::read(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CredentialError::io(&self.path, e)),
        };

        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|e| CredentialError::Malformed {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    async fn save(&self, credentials: &Credentials) -> CredentialResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CredentialError::io(parent, e))?;
        }

        let data = serde_json::to_vec_pretty(credentials)?;
        atomic_write_file(&self.path, &data).await
    }
}

/// Write data to a temp file, fsync it, then atomically rename to the final path.
async fn atomic_write_file(final_path: &Path, data: &[u8]) -> CredentialResult<()> {
    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("credentials");
    let temp_path = final_path.with_file_name(format!("{}.{}.tmp", file_name, ulid::Ulid::new()));

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| CredentialError::io(&temp_path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| CredentialError::io(&temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| CredentialError::io(&temp_path, e))?;
    fs::rename(&temp_path, final_path)
        .await
        .map_err(|e| CredentialError::io(final_path, e))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
