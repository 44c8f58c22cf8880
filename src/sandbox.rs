//! Sandbox lifecycle: directory layout, fixture resets, case snapshots
//! and retention pruning.
//!
//! One run owns one active sandbox root for its whole lifetime; every
//! case starts from a reset of that root to the suite fixture.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::storage::{
    self, create_folders, read_tree, StorageError, VaultStorage,
};

/// Number of historical runs kept by default.
pub const DEFAULT_KEEP_RUNS: usize = 10;

/// Errors from sandbox operations.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Sandbox setup failed: {0}")]
    Setup(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Resolved storage keys for one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    /// Suite-scoped base folder.
    pub base: String,
    /// The live sandbox the agent may mutate.
    pub active_root: String,
    /// Parent of all per-run artifact folders.
    pub runs_root: String,
    /// Artifact folder for this run.
    pub run_path: String,
}

/// Manages the active sandbox and the per-run artifact subtrees.
pub struct SandboxManager {
    storage: std::sync::Arc<dyn VaultStorage>,
    base: String,
}

impl SandboxManager {
    pub fn new(storage: std::sync::Arc<dyn VaultStorage>, base: impl Into<String>) -> Self {
        Self {
            storage,
            base: base.into(),
        }
    }

    /// Creates the base, active and run folders. Idempotent.
    pub fn ensure_directories(&self, run_id: &str) -> Result<RunPaths, SandboxError> {
        let paths = RunPaths {
            base: self.base.clone(),
            active_root: storage::join(&self.base, "active"),
            runs_root: storage::join(&self.base, "runs"),
            run_path: storage::join(&storage::join(&self.base, "runs"), run_id),
        };
        for dir in [&paths.base, &paths.active_root, &paths.runs_root, &paths.run_path] {
            create_folders(self.storage.as_ref(), dir)
                .map_err(|e| SandboxError::Setup(format!("cannot create '{}': {}", dir, e)))?;
        }
        debug!(run_id, active = %paths.active_root, "Sandbox directories ready");
        Ok(paths)
    }

    /// Resets the active sandbox to the fixture.
    ///
    /// Clears every leftover entry under the root, then materializes each
    /// fixture file byte for byte. A pre-existing file at the root path
    /// itself is removed first.
    pub fn reset_active_sandbox(
        &self,
        active_root: &str,
        fixture: &BTreeMap<String, String>,
    ) -> Result<(), SandboxError> {
        match self.storage.list(active_root) {
            Ok(listing) => {
                for file in &listing.files {
                    self.storage.remove(file)?;
                }
                for folder in &listing.folders {
                    self.remove_subtree(folder)?;
                }
            }
            Err(StorageError::NotAFolder(_)) => {
                self.storage.remove(active_root)?;
                self.storage.create_folder(active_root)?;
            }
            Err(StorageError::NotFound(_)) => {
                self.storage.create_folder(active_root)?;
            }
            Err(StorageError::Unsupported(_)) => {
                // Adapter cannot enumerate; fixture files still overwrite below.
                warn!(active_root, "Adapter cannot list; stale entries may remain");
            }
            Err(e) => return Err(e.into()),
        }

        for (path, content) in fixture {
            let full = storage::join(active_root, path);
            if let Some(dir) = storage::parent(&full) {
                create_folders(self.storage.as_ref(), dir)?;
            }
            self.storage.write(&full, content)?;
        }

        debug!(active_root, files = fixture.len(), "Active sandbox reset");
        Ok(())
    }

    /// Copies the active tree into `run_path/cases/<case_id>/vault/`.
    ///
    /// Read-only with respect to the sandbox itself.
    pub fn snapshot_active_case(
        &self,
        active_root: &str,
        run_path: &str,
        case_id: &str,
    ) -> Result<(), SandboxError> {
        let tree = read_tree(self.storage.as_ref(), active_root)?;
        let dest_root = format!("{}/cases/{}/vault", run_path, case_id);
        create_folders(self.storage.as_ref(), &dest_root)?;

        for (path, content) in &tree {
            let dest = storage::join(&dest_root, path);
            if let Some(dir) = storage::parent(&dest) {
                create_folders(self.storage.as_ref(), dir)?;
            }
            self.storage.write(&dest, content)?;
        }
        debug!(case_id, files = tree.len(), "Sandbox snapshot written");
        Ok(())
    }

    /// Removes all but the most recent `keep` run folders.
    ///
    /// Run ids sort chronologically by name. Best-effort: one folder
    /// failing to delete does not stop the others. Returns the number of
    /// folders removed.
    pub fn prune_old_runs(&self, runs_root: &str, keep: usize) -> Result<usize, SandboxError> {
        let listing = match self.storage.list(runs_root) {
            Ok(listing) => listing,
            Err(StorageError::Unsupported(_)) | Err(StorageError::NotFound(_)) => {
                debug!(runs_root, "Skipping retention pruning");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let mut folders = listing.folders;
        folders.sort();
        if folders.len() <= keep {
            return Ok(0);
        }

        let victims = folders.len() - keep;
        let mut removed = 0;
        for folder in folders.into_iter().take(victims) {
            match self.remove_subtree(&folder) {
                Ok(()) => removed += 1,
                Err(e) => warn!(folder, error = %e, "Failed to prune run folder"),
            }
        }
        info!(runs_root, removed, keep, "Retention pruning complete");
        Ok(removed)
    }

    /// Removes a folder and everything under it, falling back to a manual
    /// walk when the adapter lacks recursive removal.
    fn remove_subtree(&self, folder: &str) -> Result<(), SandboxError> {
        match self.storage.remove_recursive(folder) {
            Ok(()) => Ok(()),
            Err(StorageError::Unsupported(_)) => {
                let listing = self.storage.list(folder)?;
                for file in &listing.files {
                    self.storage.remove(file)?;
                }
                for sub in &listing.folders {
                    self.remove_subtree(sub)?;
                }
                self.storage.remove(folder)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Listing, MemoryVault};
    use std::sync::Arc;

    fn fixture() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("a.md".to_string(), "A".to_string()),
            ("dir/b.md".to_string(), "B".to_string()),
        ])
    }

    fn manager() -> (Arc<MemoryVault>, SandboxManager) {
        let vault = Arc::new(MemoryVault::new());
        let manager = SandboxManager::new(vault.clone(), "bench");
        (vault, manager)
    }

    #[test]
    fn test_ensure_directories_idempotent() {
        let (vault, manager) = manager();
        let paths = manager.ensure_directories("20260825-120000").unwrap();
        assert_eq!(paths.active_root, "bench/active");
        assert_eq!(paths.run_path, "bench/runs/20260825-120000");
        assert!(vault.exists("bench/runs/20260825-120000").unwrap());

        // Second call over existing folders is fine.
        manager.ensure_directories("20260825-120000").unwrap();
    }

    #[test]
    fn test_reset_clears_strays_and_materializes_fixture() {
        let (vault, manager) = manager();
        vault.write("bench/active/stray.md", "STRAY").unwrap();
        vault.write("bench/active/deep/old.md", "OLD").unwrap();

        manager
            .reset_active_sandbox("bench/active", &fixture())
            .unwrap();

        let tree = read_tree(vault.as_ref(), "bench/active").unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree["a.md"], "A");
        assert_eq!(tree["dir/b.md"], "B");
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (vault, manager) = manager();
        manager
            .reset_active_sandbox("bench/active", &fixture())
            .unwrap();
        let first = read_tree(vault.as_ref(), "bench/active").unwrap();

        manager
            .reset_active_sandbox("bench/active", &fixture())
            .unwrap();
        let second = read_tree(vault.as_ref(), "bench/active").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reset_tolerates_file_at_root() {
        let (vault, manager) = manager();
        vault.write("bench/active", "i am a file").unwrap();

        manager
            .reset_active_sandbox("bench/active", &fixture())
            .unwrap();
        let tree = read_tree(vault.as_ref(), "bench/active").unwrap();
        assert_eq!(tree["a.md"], "A");
    }

    #[test]
    fn test_snapshot_preserves_relative_paths() {
        let (vault, manager) = manager();
        manager
            .reset_active_sandbox("bench/active", &fixture())
            .unwrap();
        manager
            .snapshot_active_case("bench/active", "bench/runs/r1", "case-1")
            .unwrap();

        assert_eq!(
            vault.read("bench/runs/r1/cases/case-1/vault/a.md").unwrap(),
            "A"
        );
        assert_eq!(
            vault
                .read("bench/runs/r1/cases/case-1/vault/dir/b.md")
                .unwrap(),
            "B"
        );
        // Sandbox untouched.
        assert_eq!(vault.read("bench/active/a.md").unwrap(), "A");
    }

    #[test]
    fn test_prune_removes_exactly_the_oldest() {
        let (vault, manager) = manager();
        for day in 1..=14 {
            vault
                .write(
                    &format!("bench/runs/202608{:02}-120000/run.json", day),
                    "{}",
                )
                .unwrap();
        }

        let removed = manager.prune_old_runs("bench/runs", 10).unwrap();
        assert_eq!(removed, 4);
        assert!(!vault.exists("bench/runs/20260801-120000").unwrap());
        assert!(!vault.exists("bench/runs/20260804-120000").unwrap());
        assert!(vault.exists("bench/runs/20260805-120000").unwrap());
        assert!(vault.exists("bench/runs/20260814-120000").unwrap());
    }

    #[test]
    fn test_prune_under_keep_is_noop() {
        let (vault, manager) = manager();
        vault.write("bench/runs/20260801-120000/run.json", "{}").unwrap();
        assert_eq!(manager.prune_old_runs("bench/runs", 10).unwrap(), 0);
        assert!(vault.exists("bench/runs/20260801-120000").unwrap());
    }

    /// Adapter with no listing support: pruning degrades to a no-op.
    struct OpaqueVault(MemoryVault);

    impl VaultStorage for OpaqueVault {
        fn exists(&self, path: &str) -> Result<bool, StorageError> {
            self.0.exists(path)
        }
        fn read(&self, path: &str) -> Result<String, StorageError> {
            self.0.read(path)
        }
        fn write(&self, path: &str, text: &str) -> Result<(), StorageError> {
            self.0.write(path, text)
        }
        fn create_folder(&self, path: &str) -> Result<(), StorageError> {
            self.0.create_folder(path)
        }
        fn remove(&self, path: &str) -> Result<(), StorageError> {
            self.0.remove(path)
        }
        fn list(&self, _path: &str) -> Result<Listing, StorageError> {
            Err(StorageError::Unsupported("list"))
        }
    }

    #[test]
    fn test_prune_degrades_without_listing() {
        let inner = MemoryVault::new();
        inner.write("bench/runs/20260801-120000/run.json", "{}").unwrap();
        let vault = Arc::new(OpaqueVault(inner));
        let manager = SandboxManager::new(vault.clone(), "bench");

        assert_eq!(manager.prune_old_runs("bench/runs", 0).unwrap(), 0);
        assert!(vault.exists("bench/runs/20260801-120000").unwrap());
    }

    #[test]
    fn test_remove_subtree_falls_back_to_manual_walk() {
        struct NoRecursive(MemoryVault);
        impl VaultStorage for NoRecursive {
            fn exists(&self, p: &str) -> Result<bool, StorageError> {
                self.0.exists(p)
            }
            fn read(&self, p: &str) -> Result<String, StorageError> {
                self.0.read(p)
            }
            fn write(&self, p: &str, t: &str) -> Result<(), StorageError> {
                self.0.write(p, t)
            }
            fn create_folder(&self, p: &str) -> Result<(), StorageError> {
                self.0.create_folder(p)
            }
            fn remove(&self, p: &str) -> Result<(), StorageError> {
                self.0.remove(p)
            }
            fn list(&self, p: &str) -> Result<Listing, StorageError> {
                self.0.list(p)
            }
        }

        let inner = MemoryVault::new();
        inner.write("bench/runs/r1/cases/c1/vault/a.md", "A").unwrap();
        inner.write("bench/runs/r2/run.json", "{}").unwrap();
        let vault = Arc::new(NoRecursive(inner));
        let manager = SandboxManager::new(vault.clone(), "bench");

        let removed = manager.prune_old_runs("bench/runs", 1).unwrap();
        assert_eq!(removed, 1);
        assert!(!vault.exists("bench/runs/r1").unwrap());
        assert!(vault.exists("bench/runs/r2").unwrap());
    }
}
