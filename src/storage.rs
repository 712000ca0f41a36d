use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{IntakeError, Result};
use crate::naming::{PDF_EXT, upload_candidate};

// Upper bound on "(n)" suffixes tried before giving up.
const MAX_COLLISIONS: usize = 10_000;

/// File store used for uploads and merged outputs.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn ensure_dir(&self) -> Result<()>;
    /// Stored PDF names, sorted.
    async fn list(&self) -> Result<Vec<String>>;
    async fn read(&self, name: &str) -> Result<Vec<u8>>;
    /// Remove the given names; absent names are ignored. Returns how many were removed.
    async fn delete(&self, names: &[String]) -> Result<usize>;
    /// Remove every stored PDF.
    async fn clear(&self) -> Result<usize>;
    /// Write `bytes` under `name`, or under the first free `name (n).ext`.
    async fn save_unique(&self, name: &str, bytes: &[u8]) -> Result<String>;
}

/// Storage rooted at one local directory.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a caller-supplied name to a path directly inside the root.
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let base = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty() && *n != "." && *n != "..")
            .ok_or_else(|| IntakeError::NotFound(name.to_string()))?;
        if base != name {
            // "a/../b.pdf" and friends
            return Err(IntakeError::NotFound(name.to_string()));
        }
        Ok(self.root.join(base))
    }

    fn is_pdf(name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(PDF_EXT))
    }

    async fn try_create(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        // create_new claims the name atomically; a failed write gives it back.
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        let written = async {
            file.write_all(bytes).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            let _ = fs::remove_file(path).await;
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if Self::is_pdf(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(IntakeError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, names: &[String]) -> Result<usize> {
        let mut removed = 0;
        for name in names {
            let Ok(path) = self.resolve(name) else {
                warn!(name = %name, "Refusing to delete outside storage root");
                continue;
            };
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(requested = names.len(), removed, "Deleted stored files");
        Ok(removed)
    }

    async fn clear(&self) -> Result<usize> {
        let names = self.list().await?;
        self.delete(&names).await
    }

    async fn save_unique(&self, name: &str, bytes: &[u8]) -> Result<String> {
        self.resolve(name)
            .map_err(|_| IntakeError::validation(format!("invalid file name: {name}")))?;
        self.ensure_dir().await?;

        for attempt in 0..MAX_COLLISIONS {
            let candidate = upload_candidate(name, attempt);
            let path = self.root.join(&candidate);
            match self.try_create(&path, bytes).await {
                Ok(()) => {
                    info!(name = %candidate, bytes = bytes.len(), "Stored file");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(IntakeError::processing(format!(
            "no free name for {name} after {MAX_COLLISIONS} attempts"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_unique_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path().join("uploads"));

        let first = store.save_unique("IMP_1.pdf", b"one").await.unwrap();
        let second = store.save_unique("IMP_1.pdf", b"two").await.unwrap();
        let third = store.save_unique("IMP_1.pdf", b"three").await.unwrap();

        assert_eq!(first, "IMP_1.pdf");
        assert_eq!(second, "IMP_1 (1).pdf");
        assert_eq!(third, "IMP_1 (2).pdf");
        assert_eq!(store.read("IMP_1 (1).pdf").await.unwrap(), b"two");
        assert_eq!(store.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_saves_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(LocalStorage::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.save_unique("same.pdf", &[i]).await.unwrap()
            }));
        }
        let mut names = Vec::new();
        for h in handles {
            names.push(h.await.unwrap());
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
    }

    #[tokio::test]
    async fn test_read_outside_root_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path());
        store.ensure_dir().await.unwrap();

        for name in ["../etc/passwd", "a/b.pdf", "..", "", "missing.pdf"] {
            let err = store.read(name).await.unwrap_err();
            assert!(matches!(err, IntakeError::NotFound(_)), "{name}: {err:?}");
        }
    }

    #[tokio::test]
    async fn test_list_only_pdfs_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path());
        store.save_unique("b.pdf", b"b").await.unwrap();
        store.save_unique("a.PDF", b"a").await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["a.PDF", "b.pdf"]);
        assert_eq!(store.delete(&["b.pdf".to_string(), "gone.pdf".to_string()]).await.unwrap(), 1);
        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.list().await.unwrap().is_empty());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path().join("never-created"));
        assert!(store.list().await.unwrap().is_empty());
    }
}
