//! Destination file naming.

use super::item::{MediaKind, MediaUnit};

/// Inputs available when naming one unit's output file.
#[derive(Debug, Clone, Copy)]
pub struct NamingInput<'a> {
    /// Item title.
    pub title: &'a str,
    /// Movie or series.
    pub kind: MediaKind,
    /// The unit being named.
    pub unit: &'a MediaUnit,
    /// Release year, if known.
    pub year: Option<&'a str>,
    /// Extension suggested by the resolved URL (without the dot).
    pub extension: Option<&'a str>,
}

/// Produces a file name for a unit. The result is sanitized by the caller.
pub trait NamingPolicy: Send + Sync {
    /// File name (with extension) for `input`.
    fn file_name(&self, input: &NamingInput<'_>) -> String;
}

/// `Title (Year).mp4` for movies, `Title 01x02.mp4` for episodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNaming;

const DEFAULT_EXTENSION: &str = "mp4";

impl NamingPolicy for DefaultNaming {
    fn file_name(&self, input: &NamingInput<'_>) -> String {
        let extension = input.extension.unwrap_or(DEFAULT_EXTENSION);
        let title = input.title.trim();
        match input.kind {
            MediaKind::Movie => {
                let year: String = input
                    .year
                    .unwrap_or_default()
                    .chars()
                    .filter(char::is_ascii_digit)
                    .collect();
                if year.is_empty() {
                    format!("{title}.{extension}")
                } else {
                    format!("{title} ({year}).{extension}")
                }
            }
            MediaKind::Series => format!(
                "{title} {}x{}.{extension}",
                pad_two(&input.unit.season),
                pad_two(&input.unit.index)
            ),
        }
    }
}

/// Zero-pads the digits of a label to two places (`"S1"` → `01`).
///
/// A blank label becomes `00`; one without usable digits is kept verbatim.
fn pad_two(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return "00".to_string();
    }
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    match digits.parse::<u32>() {
        Ok(number) => format!("{number:02}"),
        Err(_) => value.to_string(),
    }
}

/// Extensions taken from the resolved URL when naming; others fall back to mp4.
#[must_use]
pub fn media_extension(url: &str) -> Option<&'static str> {
    let path = url::Url::parse(url).ok()?.path().to_ascii_lowercase();
    ["mp4", "mkv", "webm", "mov", "ts", "m4a"]
        .into_iter()
        .find(|ext| path.ends_with(&format!(".{ext}")))
}
