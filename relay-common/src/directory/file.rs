//! Directory persisted to a shared JSON file.
//!
//! Layout:
//!
//! ```json
//! { "workers": { "gateway": { "publicKey": "68747470...", "timestamp": 1700000000000, "status": "active" } } }
//! ```
//!
//! Several processes may read and write the file. Writes go through a temp
//! file in the same directory and an atomic rename, so a reader sees either
//! the previous or the next version, never a partial one. Cross-process
//! read-modify-write cycles are not locked against each other.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{DirectoryError, PeerAddress, ServiceDirectory, WorkerDescriptor, WorkerStatus};

#[derive(Debug, Default, Serialize, Deserialize)]
struct DiscoveryFile {
    #[serde(default)]
    workers: BTreeMap<String, FileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    public_key: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    status: WorkerStatus,
}

impl FileEntry {
    fn descriptor(&self, name: &str) -> Option<WorkerDescriptor> {
        match PeerAddress::from_hex(&self.public_key) {
            Ok(address) => Some(WorkerDescriptor {
                name: name.to_string(),
                address,
                registered_at: self.timestamp,
                status: self.status,
            }),
            Err(e) => {
                tracing::warn!("Ignoring discovery entry {}: {}", name, e);
                None
            }
        }
    }
}

/// File-backed directory.
#[derive(Debug)]
pub struct FileDirectory {
    path: PathBuf,
    /// Serializes this process's read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl FileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file. A missing file is empty and an unparsable one is
    /// repaired by the next write; any other read failure is an error, so a
    /// write never replaces entries it could not see.
    async fn load(&self) -> Result<DiscoveryFile, DirectoryError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(
                    "Could not parse discovery file {}: {}",
                    self.path.display(),
                    e
                );
                DiscoveryFile::default()
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DiscoveryFile::default()),
            Err(e) => {
                tracing::error!(
                    "Could not read discovery file {}: {}",
                    self.path.display(),
                    e
                );
                Err(DirectoryError::Store(format!(
                    "Could not read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        }
    }

    async fn store(&self, file: &DiscoveryFile) -> Result<(), DirectoryError> {
        let bytes = serde_json::to_vec_pretty(file)
            .map_err(|e| DirectoryError::Store(e.to_string()))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || persist_atomically(&path, &bytes))
            .await
            .map_err(|e| DirectoryError::Store(e.to_string()))?
    }
}

fn persist_atomically(path: &Path, bytes: &[u8]) -> Result<(), DirectoryError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| DirectoryError::Store(e.to_string()))?;

    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| DirectoryError::Store(e.to_string()))?;
    tmp.write_all(bytes)
        .map_err(|e| DirectoryError::Store(e.to_string()))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| DirectoryError::Store(e.to_string()))?;
    tmp.persist(path)
        .map_err(|e| DirectoryError::Store(e.error.to_string()))?;
    Ok(())
}

#[async_trait]
impl ServiceDirectory for FileDirectory {
    async fn register(&self, name: &str, address: PeerAddress) -> Result<(), DirectoryError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;
        file.workers.insert(
            name.to_string(),
            FileEntry {
                public_key: address.to_hex(),
                timestamp: Utc::now(),
                status: WorkerStatus::Active,
            },
        );
        self.store(&file).await?;
        tracing::info!(
            "Saved {} worker to discovery file {}",
            name,
            self.path.display()
        );
        Ok(())
    }

    async fn resolve(&self, name: &str) -> Result<PeerAddress, DirectoryError> {
        self.load()
            .await?
            .workers
            .get(name)
            .and_then(|entry| entry.descriptor(name))
            .filter(|d| d.is_live())
            .map(|d| d.address)
            .ok_or_else(|| DirectoryError::NotFound(name.to_string()))
    }

    async fn deregister(&self, name: &str, address: &PeerAddress) -> Result<(), DirectoryError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;
        let matches = file
            .workers
            .get(name)
            .map(|entry| entry.public_key == address.to_hex())
            .unwrap_or(false);
        if !matches {
            return Ok(());
        }
        if let Some(entry) = file.workers.get_mut(name) {
            entry.status = WorkerStatus::Stopped;
            entry.timestamp = Utc::now();
        }
        self.store(&file).await
    }

    async fn list(&self) -> Result<Vec<WorkerDescriptor>, DirectoryError> {
        Ok(self
            .load()
            .await?
            .workers
            .iter()
            .filter_map(|(name, entry)| entry.descriptor(name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registration_visible_to_other_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("discovery.json");

        let writer = FileDirectory::new(&path);
        writer
            .register("auth", PeerAddress::new("http://127.0.0.1:9001"))
            .await
            .unwrap();

        let reader = FileDirectory::new(&path);
        assert_eq!(
            reader.resolve("auth").await.unwrap(),
            PeerAddress::new("http://127.0.0.1:9001")
        );
    }

    #[tokio::test]
    async fn test_register_twice_keeps_second_and_other_workers() {
        let dir = tempfile::tempdir().unwrap();
        let directory = FileDirectory::new(dir.path().join("discovery.json"));

        directory
            .register("auth", PeerAddress::new("http://auth:1"))
            .await
            .unwrap();
        directory
            .register("gateway", PeerAddress::new("http://gw:1"))
            .await
            .unwrap();
        directory
            .register("gateway", PeerAddress::new("http://gw:2"))
            .await
            .unwrap();

        assert_eq!(
            directory.resolve("gateway").await.unwrap(),
            PeerAddress::new("http://gw:2")
        );
        assert_eq!(
            directory.resolve("auth").await.unwrap(),
            PeerAddress::new("http://auth:1")
        );
    }

    #[tokio::test]
    async fn test_missing_file_resolves_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let directory = FileDirectory::new(dir.path().join("absent.json"));
        assert_eq!(
            directory.resolve("inference").await,
            Err(DirectoryError::NotFound("inference".to_string()))
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_empty_and_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discovery.json");
        std::fs::write(&path, b"{not json").unwrap();

        let directory = FileDirectory::new(&path);
        assert!(directory.resolve("auth").await.is_err());

        directory
            .register("auth", PeerAddress::new("http://auth:1"))
            .await
            .unwrap();
        assert!(directory.resolve("auth").await.is_ok());
    }

    #[tokio::test]
    async fn test_unreadable_file_is_an_error_and_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discovery.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let directory = FileDirectory::new(&path);
        assert!(matches!(
            directory.register("auth", PeerAddress::new("http://auth:1")).await,
            Err(DirectoryError::Store(message)) if message.starts_with("Could not read")
        ));
        assert!(matches!(
            directory.resolve("auth").await,
            Err(DirectoryError::Store(_))
        ));
        assert!(directory.list().await.is_err());
        assert!(path.join("keep").exists());
    }

    #[tokio::test]
    async fn test_reads_entries_without_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discovery.json");
        let key = PeerAddress::new("http://inf:1").to_hex();
        std::fs::write(
            &path,
            format!(
                r#"{{"workers":{{"inference":{{"publicKey":"{}","timestamp":1700000000000}}}}}}"#,
                key
            ),
        )
        .unwrap();

        let directory = FileDirectory::new(&path);
        assert_eq!(
            directory.resolve("inference").await.unwrap(),
            PeerAddress::new("http://inf:1")
        );
    }

    #[tokio::test]
    async fn test_deregister_only_matching_address() {
        let dir = tempfile::tempdir().unwrap();
        let directory = FileDirectory::new(dir.path().join("discovery.json"));
        let addr = PeerAddress::new("http://auth:1");
        directory.register("auth", addr.clone()).await.unwrap();

        directory
            .deregister("auth", &PeerAddress::new("http://other:1"))
            .await
            .unwrap();
        assert!(directory.resolve("auth").await.is_ok());

        directory.deregister("auth", &addr).await.unwrap();
        assert!(directory.resolve("auth").await.is_err());
        let listed = directory.list().await.unwrap();
        assert_eq!(listed[0].status, WorkerStatus::Stopped);
    }
}
