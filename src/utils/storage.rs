use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::HttpError;

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Subdirectory of the upload folder a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    ProfilePics,
    PostPics,
    CategoryPics,
}

impl UploadKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            UploadKind::ProfilePics => "ProfilePics",
            UploadKind::PostPics => "PostPics",
            UploadKind::CategoryPics => "CategoryPics",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            UploadKind::ProfilePics => "profile_picture",
            UploadKind::PostPics => "post",
            UploadKind::CategoryPics => "cat",
        }
    }
}

/// Lower-cased extension of `filename` if it is an accepted image type.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// ASCII-only, path-free version of a user supplied name.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// `{prefix}_{stem}_{8 hex}.{ext}`; the random part keeps two uploads of
/// the same name apart.
pub fn unique_filename(kind: UploadKind, stem_hint: &str, ext: &str) -> String {
    let stem = secure_filename(stem_hint);
    let stem = stem.rsplit_once('.').map(|(s, _)| s).unwrap_or(&stem);
    let id = Uuid::new_v4().simple().to_string();
    if stem.is_empty() {
        format!("{}_{}.{}", kind.prefix(), &id[..8], ext)
    } else {
        format!("{}_{}_{}.{}", kind.prefix(), stem, &id[..8], ext)
    }
}

/// Local uploads directory and the public URL it is served from.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    base_url: String,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Storage {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, kind: UploadKind, filename: &str) -> PathBuf {
        self.root.join(kind.dir_name()).join(filename)
    }

    /// Validate and write an uploaded image, returning the stored filename.
    ///
    /// `stem_hint` feeds the readable part of the name (username for profile
    /// pictures, the original filename otherwise).
    pub async fn save(
        &self,
        kind: UploadKind,
        original_name: &str,
        stem_hint: &str,
        bytes: &[u8],
    ) -> Result<String, HttpError> {
        let ext = allowed_extension(original_name)
            .ok_or_else(|| HttpError::bad_request("Invalid image file type"))?;

        let filename = unique_filename(kind, stem_hint, &ext);
        let dir = self.root.join(kind.dir_name());

        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            tracing::error!("could not create upload dir {}: {}", dir.display(), e);
            HttpError::server_error("Failed to save image")
        })?;

        let path = dir.join(&filename);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            tracing::error!("could not write upload {}: {}", path.display(), e);
            HttpError::server_error("Failed to save image")
        })?;

        tracing::debug!("stored upload {}", path.display());
        Ok(filename)
    }

    /// Best effort; a missing file is not an error.
    pub async fn remove(&self, kind: UploadKind, filename: &str) {
        if filename.is_empty() || filename.starts_with("http") {
            return;
        }
        let path = self.path_for(kind, &secure_filename(filename));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!("removed upload {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("could not remove {}: {}", path.display(), e),
        }
    }

    /// Public URL for a stored filename. Absolute URLs (Google avatars) pass
    /// through unchanged.
    pub fn url(&self, kind: UploadKind, filename: &str) -> String {
        if filename.starts_with("http://") || filename.starts_with("https://") {
            return filename.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        format!("{}/{}/{}", base, kind.dir_name(), filename)
    }

    pub fn url_opt(&self, kind: UploadKind, filename: Option<&str>) -> Option<String> {
        filename
            .filter(|f| !f.is_empty())
            .map(|f| self.url(kind, f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check() {
        assert_eq!(allowed_extension("me.PNG").as_deref(), Some("png"));
        assert_eq!(allowed_extension("a.b.jpeg").as_deref(), Some("jpeg"));
        assert_eq!(allowed_extension("evil.svg"), None);
        assert_eq!(allowed_extension("noext"), None);
    }

    #[test]
    fn secure_filename_drops_paths_and_odd_chars() {
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("my photo (1).png"), "my_photo_1.png");
        assert_eq!(secure_filename("C:\\x\\ü.gif"), "gif");
    }

    #[test]
    fn unique_names_differ_and_keep_prefix() {
        let a = unique_filename(UploadKind::ProfilePics, "jane doe", "png");
        let b = unique_filename(UploadKind::ProfilePics, "jane doe", "png");
        assert_ne!(a, b);
        assert!(a.starts_with("profile_picture_jane_doe_"));
        assert!(a.ends_with(".png"));

        let c = unique_filename(UploadKind::PostPics, "cover.jpg", "jpg");
        assert!(c.starts_with("post_cover_"));
    }

    #[test]
    fn urls() {
        let storage = Storage::new("/tmp/x", "http://host/static/uploads/");
        assert_eq!(
            storage.url(UploadKind::CategoryPics, "cat_a.png"),
            "http://host/static/uploads/CategoryPics/cat_a.png"
        );
        assert_eq!(
            storage.url(UploadKind::ProfilePics, "https://lh3.google/p.jpg"),
            "https://lh3.google/p.jpg"
        );
        assert_eq!(storage.url_opt(UploadKind::PostPics, Some("")), None);
    }

    #[tokio::test]
    async fn save_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path(), "http://host/");

        let name = storage
            .save(UploadKind::PostPics, "shot.png", "shot.png", b"png-bytes")
            .await
            .unwrap();
        let path = dir.path().join("PostPics").join(&name);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"png-bytes");

        storage.remove(UploadKind::PostPics, &name).await;
        assert!(!path.exists());
        // second removal is a no-op
        storage.remove(UploadKind::PostPics, &name).await;
    }

    #[tokio::test]
    async fn save_rejects_bad_type() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path(), "http://host/");
        let err = storage
            .save(UploadKind::PostPics, "x.exe", "x", b"MZ")
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }
}
