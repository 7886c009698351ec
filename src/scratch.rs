//! Scratch storage for in-flight downloads.
//!
//! Every request gets its own [`ScratchFile`]: a UUID stem inside the
//! scratch directory. The extractor writes `<stem>.<ext>` (plus whatever
//! intermediate files the tool produces), and the guard deletes everything
//! carrying that stem when it goes out of scope. Unique stems mean
//! concurrent requests never touch each other's files, so the directory
//! needs no locking.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors raised while preparing the scratch directory
#[derive(Error, Debug)]
pub enum ScratchError {
    /// The directory could not be created or listed
    #[error("scratch directory {path}: {source}")]
    Io {
        /// Directory that failed
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },
}

/// Removes a file, treating an already-missing file as success.
///
/// Returns `true` when a file was actually deleted.
///
/// # Errors
///
/// Returns any I/O error other than `NotFound`.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Length of a slot stem: a hyphenless UUID
const STEM_LEN: usize = 32;

/// Whether a file name carries a slot stem, e.g. `<32 hex>.mp4` or
/// `<32 hex>.f137.mp4.part`
fn is_slot_file_name(name: &str) -> bool {
    let Some(stem) = name.get(..STEM_LEN) else {
        return false;
    };
    stem.bytes().all(|b| b.is_ascii_hexdigit())
        && name[STEM_LEN..].chars().next().is_none_or(|c| c == '.')
}

/// Doubles every `%` so yt-dlp reads the path literally.
#[cfg(unix)]
fn escape_template(raw: &OsStr) -> OsString {
    use std::os::unix::ffi::{OsStrExt, OsStringExt};

    let mut escaped = Vec::with_capacity(raw.len());
    for &b in raw.as_bytes() {
        if b == b'%' {
            escaped.push(b'%');
        }
        escaped.push(b);
    }
    OsString::from_vec(escaped)
}

/// Doubles every `%` so yt-dlp reads the path literally.
#[cfg(not(unix))]
fn escape_template(raw: &OsStr) -> OsString {
    raw.to_string_lossy().replace('%', "%%").into()
}

/// Handle to the shared scratch directory
#[derive(Debug, Clone)]
pub struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    /// Opens the scratch directory, creating it if absent.
    ///
    /// The stored path is canonical, so file paths reported back by the
    /// extractor compare equal to the slot's directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScratchError::Io`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ScratchError> {
        let dir = dir.into();
        let io_err = |source| ScratchError::Io {
            path: dir.clone(),
            source,
        };
        fs::create_dir_all(&dir).map_err(io_err)?;
        let dir = fs::canonicalize(&dir).map_err(io_err)?;
        Ok(Self { dir })
    }

    /// Scratch directory path
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserves a uniquely named slot for one request.
    #[must_use]
    pub fn allocate(&self) -> ScratchFile {
        ScratchFile {
            target: ScratchTarget {
                dir: self.dir.clone(),
                stem: Uuid::new_v4().as_simple().to_string(),
            },
            armed: true,
        }
    }

    /// Deletes slot files left in the directory.
    ///
    /// Meant for startup only: a process killed mid-download leaves its
    /// files behind, and no request can own them any more. Files without a
    /// slot stem, such as downloads kept by `clip-fetch`, are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`ScratchError::Io`] if the directory cannot be listed.
    pub fn purge(&self) -> Result<usize, ScratchError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| ScratchError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_slot = entry
                .file_name()
                .to_str()
                .is_some_and(is_slot_file_name);
            if !is_slot || !path.is_file() {
                continue;
            }
            match remove_if_exists(&path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale scratch file"),
            }
        }
        Ok(removed)
    }
}

/// Owned, cloneable description of a scratch slot.
///
/// This is what crosses into the worker thread; the [`ScratchFile`] guard
/// itself stays with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchTarget {
    dir: PathBuf,
    stem: String,
}

impl ScratchTarget {
    /// Directory the slot lives in
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Unique file stem of the slot
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Path of the slot with the given extension
    #[must_use]
    pub fn with_extension(&self, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{ext}", self.stem))
    }

    /// yt-dlp output template, e.g. `downloads/3f2a….%(ext)s`
    #[must_use]
    pub fn output_template(&self) -> OsString {
        let mut template = escape_template(self.dir.as_os_str());
        template.push(std::path::MAIN_SEPARATOR_STR);
        template.push(format!("{}.%(ext)s", self.stem));
        template
    }

    /// Whether `path` is one of the files this slot may produce
    #[must_use]
    pub fn owns(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path())
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&self.stem))
    }
}

/// Scoped temp-file guard.
///
/// Dropping the guard deletes every file in the scratch directory whose
/// name starts with the slot's stem: the final file, `.part` leftovers and
/// unmerged streams alike. This runs on early returns, `?` propagation and
/// unwinding.
#[derive(Debug)]
pub struct ScratchFile {
    target: ScratchTarget,
    armed: bool,
}

impl ScratchFile {
    /// Cloneable view of the slot for the extractor
    #[must_use]
    pub fn target(&self) -> ScratchTarget {
        self.target.clone()
    }

    /// Whether `path` belongs to this slot
    #[must_use]
    pub fn owns(&self, path: &Path) -> bool {
        self.target.owns(path)
    }

    /// Deletes the slot's files now. Safe to call repeatedly.
    pub fn release(&self) -> usize {
        let entries = match fs::read_dir(&self.target.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(dir = %self.target.dir.display(), error = %e, "Failed to list scratch directory");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !self.target.owns(&path) {
                continue;
            }
            match remove_if_exists(&path) {
                Ok(true) => {
                    info!(path = %path.display(), "Temporary file removed");
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary file"),
            }
        }
        removed
    }

    /// Disarms the guard and hands the slot over to the caller.
    ///
    /// Used by the command-line fetcher, which keeps its downloads.
    #[must_use]
    pub fn persist(mut self) -> ScratchTarget {
        self.armed = false;
        self.target.clone()
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.armed {
            let removed = self.release();
            debug!(stem = %self.target.stem, removed, "Scratch slot released");
        }
    }
}
