//! Durable storage backends for the override layer
//!
//! A backend holds exactly one serialized document under one named key.
//! Writes always replace the whole document.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Single-key durable storage
pub trait OverrideBackend: Send + Sync {
    /// Read the stored document, `None` when nothing has been written yet
    fn read(&self) -> io::Result<Option<String>>;

    /// Replace the stored document
    fn write(&self, contents: &str) -> io::Result<()>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// Lets a caller keep a handle on a backend the store owns
impl<B: OverrideBackend + ?Sized> OverrideBackend for Arc<B> {
    fn read(&self) -> io::Result<Option<String>> {
        (**self).read()
    }

    fn write(&self, contents: &str) -> io::Result<()> {
        (**self).write(contents)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// File-backed storage: `<dir>/<key>.json`, replaced atomically
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", key)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OverrideBackend for FileBackend {
    fn read(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, contents: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write atomically using temp file
        let temp_path = self.path.with_extension("json.tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        file.write_all(contents.as_bytes())?;
        file.sync_all()?;

        std::fs::rename(&temp_path, &self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory storage, optionally refusing writes
#[derive(Default)]
pub struct MemoryBackend {
    contents: Mutex<Option<String>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a stored document, e.g. to simulate corruption
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Currently stored document
    pub fn contents(&self) -> Option<String> {
        self.contents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl OverrideBackend for MemoryBackend {
    fn read(&self) -> io::Result<Option<String>> {
        Ok(self.contents())
    }

    fn write(&self, contents: &str) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "storage quota exceeded",
            ));
        }
        *self.contents.lock().unwrap_or_else(|e| e.into_inner()) = Some(contents.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
