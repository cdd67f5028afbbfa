use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Container metadata for the fixed VP8 + Opus pairing.
pub const CONTAINER_MIME: &str = "video/webm";
pub const CONTAINER_EXT: &str = "webm";

/// The finalized recording: immutable bytes plus container metadata.
///
/// Cheap to clone so it can ride inside UI messages; the bytes are shared,
/// never copied.
#[derive(Debug, Clone)]
pub struct Artifact {
    data: Arc<Vec<u8>>,
    created_at: DateTime<Utc>,
}

impl Artifact {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            created_at: Utc::now(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn mime(&self) -> &'static str {
        CONTAINER_MIME
    }

    /// Default download name. The timestamp is ISO 8601 basic format in UTC,
    /// which stays valid on filesystems that reject colons.
    pub fn suggested_filename(&self) -> String {
        format!(
            "screen-recording-{}.{}",
            self.created_at.format("%Y%m%dT%H%M%SZ"),
            CONTAINER_EXT
        )
    }

    /// Write the recording to `path`.
    ///
    /// The write is staged through a temporary file in the destination
    /// directory and atomically persisted, so a failure can never leave a
    /// partial recording or a stray temporary behind.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        staged.write_all(&self.data)?;
        staged.flush()?;
        staged.persist(path)?;
        Ok(())
    }

    /// Materialize the recording into a temporary file for playback.
    ///
    /// The returned handle deletes the file when dropped; the caller keeps it
    /// alive for as long as the preview should remain readable.
    pub fn materialize_preview(&self) -> Result<tempfile::TempPath> {
        let mut file = tempfile::Builder::new()
            .prefix("screenrec-preview-")
            .suffix(&format!(".{}", CONTAINER_EXT))
            .tempfile()?;
        file.write_all(&self.data)?;
        file.flush()?;
        Ok(file.into_temp_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggested_filename_pattern() {
        let artifact = Artifact::new(vec![1, 2, 3]);
        let name = artifact.suggested_filename();

        assert!(name.starts_with("screen-recording-"));
        assert!(name.ends_with(".webm"));

        // screen-recording-20260807T103015Z.webm
        let stamp = name
            .strip_prefix("screen-recording-")
            .and_then(|s| s.strip_suffix(".webm"))
            .unwrap();
        assert_eq!(stamp.len(), 16);
        assert_eq!(&stamp[8..9], "T");
        assert!(stamp.ends_with('Z'));
        assert!(stamp[..8].chars().all(|c| c.is_ascii_digit()));
        assert!(stamp[9..15].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_write_to_round_trips_and_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = Artifact::new(b"webm bytes".to_vec());
        let path = dir.path().join("out.webm");

        artifact.write_to(&path).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"webm bytes");
        // Only the persisted file remains; the staging temp is gone.
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_to_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = Artifact::new(vec![0u8; 16]);
        let path = dir.path().join("nested").join("deep").join("out.webm");

        artifact.write_to(&path).unwrap();

        assert_eq!(fs::read(&path).unwrap().len(), 16);
    }

    #[test]
    fn test_preview_file_is_removed_on_drop() {
        let artifact = Artifact::new(b"preview".to_vec());
        let temp = artifact.materialize_preview().unwrap();
        let path = temp.to_path_buf();

        assert_eq!(fs::read(&path).unwrap(), b"preview");
        drop(temp);
        assert!(!path.exists());
    }
}
