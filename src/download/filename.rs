//! Filename sanitization and destination path resolution.
//!
//! File names come from an external naming policy and are treated as opaque;
//! this module only strips filesystem-invalid characters and picks a
//! destination that collides neither with an existing file nor with another
//! transfer still in flight.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;
use url::Url;

/// Name used when sanitization leaves nothing usable.
pub const FALLBACK_FILENAME: &str = "stream.mp4";

/// Replaces filesystem-invalid characters with `_` and trims whitespace.
///
/// Invalid characters are `\ / : * ? " < > |` plus control characters. Names
/// that would resolve to `.` or `..` have their dots replaced as well.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let sanitized = sanitized.trim().to_string();

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

/// Destination names handed out to transfers that have not finished yet.
///
/// A name is free only when no file exists at that path and no in-flight
/// transfer holds it. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct DestinationReservations {
    reserved: Arc<DashSet<PathBuf>>,
}

impl DestinationReservations {
    /// Creates an empty reservation set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a destination inside `dir` that neither exists nor is held.
    ///
    /// `name.ext` is taken as-is when free; otherwise `name (1).ext`,
    /// `name (2).ext`, ... are tried in order. A name that sanitizes to
    /// nothing becomes [`FALLBACK_FILENAME`]. The name stays reserved until
    /// the returned guard is dropped.
    #[must_use]
    pub fn reserve(&self, dir: &Path, filename: &str) -> Reservation {
        let path = first_free_path(dir, filename, |candidate| {
            candidate.exists() || !self.reserved.insert(candidate.to_path_buf())
        });
        Reservation {
            reserved: Arc::clone(&self.reserved),
            path,
        }
    }

    /// Whether `path` is currently held by a transfer.
    #[must_use]
    pub fn is_reserved(&self, path: &Path) -> bool {
        self.reserved.contains(path)
    }
}

/// A held destination name, released on drop.
#[derive(Debug)]
pub struct Reservation {
    reserved: Arc<DashSet<PathBuf>>,
    path: PathBuf,
}

impl Reservation {
    /// The reserved destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.reserved.remove(&self.path);
    }
}

/// First `name.ext`, `name (1).ext`, ... inside `dir` for which `taken`
/// returns false.
fn first_free_path(dir: &Path, filename: &str, mut taken: impl FnMut(&Path) -> bool) -> PathBuf {
    let filename = {
        let sanitized = sanitize_filename(filename);
        if sanitized.trim_matches(|c| c == '_' || c == '.').is_empty() {
            FALLBACK_FILENAME.to_string()
        } else {
            sanitized
        }
    };
    let base_path = dir.join(&filename);

    if !taken(&base_path) {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename.as_str(), ""),
    };

    let mut index = 1usize;
    loop {
        let candidate = dir.join(format!("{stem} ({index}){ext}"));
        if !taken(&candidate) {
            return candidate;
        }
        index += 1;
    }
}

/// Appends `suffix` to the final component of `path` (`a.mp4` → `a.mp4.part`).
#[must_use]
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Derives a human-readable title from the last URL path segment.
///
/// `https://cdn.test/videos/My%20Clip.mp4` → `My Clip`.
#[must_use]
pub fn title_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    let stem = match decoded.rfind('.') {
        Some(pos) if pos > 0 => decoded[..pos].to_string(),
        _ => decoded,
    };
    let stem = stem.trim().to_string();
    (!stem.is_empty()).then_some(stem)
}

/// Lower-cased extension (without the dot) of a file name, if any.
#[must_use]
pub fn extension_of(name: &str) -> Option<String> {
    let pos = name.rfind('.')?;
    let ext = &name[pos + 1..];
    (pos > 0 && !ext.is_empty() && ext.len() <= 8).then(|| ext.to_ascii_lowercase())
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
