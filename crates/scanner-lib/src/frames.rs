//! Video frame sources
//!
//! A frame source stands in for the camera. `None` from [`FrameSource::next_frame`]
//! means "no frame ready yet", which the scan loop treats as a skipped tick
//! rather than an error.

use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// A decoded video frame, shared so inference can run off the async runtime
pub type Frame = Arc<DynamicImage>;

/// File extensions picked up by [`DirectoryFrameSource`]
const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Trait for anything that can hand the scan loop its next frame
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Return the most recent frame, or `None` if the source is not ready
    async fn next_frame(&self) -> Option<Frame>;
}

/// Frame source that cycles through the image files of a directory
///
/// The directory is rescanned each time the current listing is exhausted, so
/// frames dropped into it while the scanner runs are picked up on the next pass.
pub struct DirectoryFrameSource {
    dir: PathBuf,
    cursor: Mutex<DirectoryCursor>,
}

#[derive(Default)]
struct DirectoryCursor {
    files: Vec<PathBuf>,
    position: usize,
}

impl DirectoryFrameSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cursor: Mutex::new(DirectoryCursor::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List candidate frame files in a stable order
    fn scan_dir(dir: &Path) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Frame directory not readable");
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        files
    }

    fn next_path(&self) -> Option<PathBuf> {
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());

        if cursor.position >= cursor.files.len() {
            cursor.files = Self::scan_dir(&self.dir);
            cursor.position = 0;
        }

        let path = cursor.files.get(cursor.position).cloned()?;
        cursor.position += 1;
        Some(path)
    }
}

#[async_trait]
impl FrameSource for DirectoryFrameSource {
    async fn next_frame(&self) -> Option<Frame> {
        let path = self.next_path()?;

        let decoded = tokio::task::spawn_blocking(move || {
            let result = image::open(&path);
            (path, result)
        })
        .await;

        match decoded {
            Ok((_, Ok(image))) => Some(Arc::new(image)),
            Ok((path, Err(e))) => {
                debug!(path = %path.display(), error = %e, "Skipping undecodable frame");
                None
            }
            Err(e) => {
                warn!(error = %e, "Frame decode task failed");
                None
            }
        }
    }
}

/// Frame source that always returns the same frame, or never has one
pub struct StaticFrameSource {
    frame: Option<Frame>,
}

impl StaticFrameSource {
    pub fn new(frame: DynamicImage) -> Self {
        Self {
            frame: Some(Arc::new(frame)),
        }
    }

    /// A source whose video is never ready
    pub fn not_ready() -> Self {
        Self { frame: None }
    }

    /// A small blank RGB frame, enough to drive classifiers that ignore pixels
    pub fn blank() -> Self {
        Self::new(DynamicImage::new_rgb8(8, 8))
    }
}

#[async_trait]
impl FrameSource for StaticFrameSource {
    async fn next_frame(&self) -> Option<Frame> {
        self.frame.clone()
    }
}
