use std::io;
use std::path::{Path, PathBuf};

/// The single directory holding every uploaded artefact.
///
/// Map and activity files are named after their record id so callers can find
/// them without a lookup: `image_<map_id>.jpg`, `points_<map_id>.json` and
/// `gpx_<activity_id>.gpx`.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn image_file_name(map_id: &str) -> String {
        format!("image_{}.jpg", map_id)
    }

    pub fn points_file_name(map_id: &str) -> String {
        format!("points_{}.json", map_id)
    }

    pub fn gpx_file_name(activity_id: i32) -> String {
        format!("gpx_{}.gpx", activity_id)
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub async fn write_bytes(&self, file_name: &str, contents: &[u8]) -> io::Result<PathBuf> {
        self.ensure_root().await?;
        let path = self.path_for(file_name);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    /// Copy an already-spooled upload (e.g. a multipart temp file) into place.
    pub async fn copy_from(&self, source: &Path, file_name: &str) -> io::Result<PathBuf> {
        self.ensure_root().await?;
        let path = self.path_for(file_name);
        tokio::fs::copy(source, &path).await?;
        Ok(path)
    }

    /// Remove a stored file. Returns `false` when there was nothing to remove.
    pub async fn remove_if_exists(&self, file_name: &str) -> io::Result<bool> {
        match tokio::fs::remove_file(self.path_for(file_name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn exists(&self, file_name: &str) -> bool {
        self.path_for(file_name).is_file()
    }
}

/// Files written during a multi-step create, removed again if the step that
/// follows them fails.
#[derive(Debug, Default)]
pub struct WrittenFiles {
    paths: Vec<PathBuf>,
}

impl WrittenFiles {
    pub fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    pub async fn discard(self) {
        for path in self.paths {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != io::ErrorKind::NotFound {
                    log::warn!("Failed to clean up {}: {}", path.display(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let id = "0b7a6f4e-6f0e-4b7e-9a51-3f2a4d9c1e10";
        assert_eq!(
            UploadStore::image_file_name(id),
            "image_0b7a6f4e-6f0e-4b7e-9a51-3f2a4d9c1e10.jpg"
        );
        assert_eq!(
            UploadStore::points_file_name(id),
            "points_0b7a6f4e-6f0e-4b7e-9a51-3f2a4d9c1e10.json"
        );
        assert_eq!(UploadStore::gpx_file_name(42), "gpx_42.gpx");
    }

    #[actix_web::test]
    async fn test_write_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("nested"));

        let path = store.write_bytes("points_a.json", b"[]").await.unwrap();
        assert!(path.is_file());
        assert!(store.exists("points_a.json"));

        assert!(store.remove_if_exists("points_a.json").await.unwrap());
        assert!(!store.remove_if_exists("points_a.json").await.unwrap());
    }

    #[actix_web::test]
    async fn test_discard_removes_tracked_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        let mut written = WrittenFiles::default();
        written.track(store.write_bytes("gpx_1.gpx", b"<gpx/>").await.unwrap());
        written.track(store.path_for("gpx_2.gpx"));
        written.discard().await;

        assert!(!store.exists("gpx_1.gpx"));
    }
}
