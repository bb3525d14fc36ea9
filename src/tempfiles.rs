use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

const FALLBACK_NAME: &str = "upload.pdf";

/// Keep only the last path component and replace anything outside
/// `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}

/// Scratch directory for uploads while they are being processed.
#[derive(Debug, Clone)]
pub struct TempStorage {
    dir: PathBuf,
}

impl TempStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create temp directory {}", self.dir.display()))
    }

    /// Write `bytes` to a uniquely named file and return its path.
    pub async fn save(&self, bytes: &[u8], file_name: &str) -> Result<PathBuf> {
        self.ensure_dir().await?;
        let path = self
            .dir
            .join(format!("{}_{}", Uuid::new_v4(), sanitize_file_name(file_name)));
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write temp file {}", path.display()))?;
        tracing::info!("Saved temporary file at {}", path.display());
        Ok(path)
    }

    /// Remove a temp file. Returns `false` if it was already gone.
    pub async fn delete(&self, path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::info!("Deleted temporary file at {}", path.display());
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Temporary file {} not found", path.display());
                false
            }
            Err(e) => {
                tracing::error!("Failed to delete temporary file {}: {}", path.display(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\Q3 report.pdf"), "Q3_report.pdf");
        assert_eq!(sanitize_file_name("résumé.pdf"), "r_sum_.pdf");
        assert_eq!(sanitize_file_name(""), "upload.pdf");
        assert_eq!(sanitize_file_name("dir/"), "upload.pdf");
        assert_eq!(sanitize_file_name(".."), "upload.pdf");
    }

    #[tokio::test]
    async fn test_save_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TempStorage::new(dir.path().join("uploads"));

        let a = storage.save(b"%PDF-1.4", "doc.pdf").await.unwrap();
        let b = storage.save(b"%PDF-1.4", "doc.pdf").await.unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with(storage.dir()));
        assert!(a.file_name().unwrap().to_string_lossy().ends_with("_doc.pdf"));
        assert_eq!(std::fs::read(&a).unwrap(), b"%PDF-1.4");

        assert!(storage.delete(&a).await);
        assert!(!a.exists());
        assert!(!storage.delete(&a).await);
        assert!(storage.delete(&b).await);
    }
}
