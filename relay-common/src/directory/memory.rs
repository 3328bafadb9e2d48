//! In-process directory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DirectoryError, PeerAddress, ServiceDirectory, WorkerDescriptor, WorkerStatus};

/// Directory kept in memory. Descriptors are swapped whole behind an `Arc`,
/// so readers never observe a partially written entry.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    workers: RwLock<HashMap<String, Arc<WorkerDescriptor>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceDirectory for MemoryDirectory {
    async fn register(&self, name: &str, address: PeerAddress) -> Result<(), DirectoryError> {
        let descriptor = Arc::new(WorkerDescriptor::active(name, address));
        self.workers
            .write()
            .await
            .insert(name.to_string(), descriptor);
        Ok(())
    }

    async fn resolve(&self, name: &str) -> Result<PeerAddress, DirectoryError> {
        self.workers
            .read()
            .await
            .get(name)
            .filter(|d| d.is_live())
            .map(|d| d.address.clone())
            .ok_or_else(|| DirectoryError::NotFound(name.to_string()))
    }

    async fn deregister(&self, name: &str, address: &PeerAddress) -> Result<(), DirectoryError> {
        let mut workers = self.workers.write().await;
        if let Some(current) = workers.get(name) {
            if &current.address == address {
                let mut stopped = WorkerDescriptor::clone(current);
                stopped.status = WorkerStatus::Stopped;
                workers.insert(name.to_string(), Arc::new(stopped));
            }
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkerDescriptor>, DirectoryError> {
        Ok(self
            .workers
            .read()
            .await
            .values()
            .map(|d| WorkerDescriptor::clone(d))
            .collect())
    }
}
