//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use mediafetch_core::download::SpeedLevel;

/// `key = value` file configuration for mediafetch defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Default output directory for downloads.
    pub output_dir: Option<PathBuf>,
    /// Default remux speed level.
    pub speed_level: Option<SpeedLevel>,
    /// Quality requested when an item names none.
    pub default_quality: Option<String>,
    /// Parallel ranges for chunked transfers (same range as CLI).
    pub chunk_count: Option<usize>,
    /// Size above which transfers are chunked.
    pub chunk_threshold_bytes: Option<u64>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Stream-copy binary.
    pub remux_binary: Option<PathBuf>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(chunk_count) = self.chunk_count
            && !(1..=32).contains(&chunk_count)
        {
            bail!("Invalid config value for `chunk_count`: {chunk_count}. Expected range: 1..=32");
        }
        if let Some(threshold) = self.chunk_threshold_bytes
            && threshold == 0
        {
            bail!("Invalid config value for `chunk_threshold_bytes`: 0. Expected a positive size");
        }
        if let Some(timeout) = self.connect_timeout_secs
            && !(1..=3600).contains(&timeout)
        {
            bail!("Invalid config value for `connect_timeout_secs`: {timeout}. Expected range: 1..=3600");
        }
        if let Some(quality) = &self.default_quality
            && quality.trim().is_empty()
        {
            bail!("Invalid config value for `default_quality`: must not be empty");
        }
        Ok(())
    }
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Returns the `EnvFilter` directive for this setting.
    #[must_use]
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/mediafetch/config.toml`
/// 2. `$HOME/.config/mediafetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("mediafetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("mediafetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads `explicit` (which must exist), or the default path when present.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return read_file_config(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => read_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let line_no = line_index + 1;

        match key {
            "output_dir" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `output_dir` value on line {line_no}"))?;
                cfg.output_dir = Some(PathBuf::from(parsed));
            }
            "speed_level" => {
                let parsed = parse_integer_u64(value)
                    .and_then(|n| n.to_string().parse::<SpeedLevel>().map_err(anyhow::Error::msg))
                    .with_context(|| format!("Invalid `speed_level` value on line {line_no}"))?;
                cfg.speed_level = Some(parsed);
            }
            "default_quality" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `default_quality` value on line {line_no}")
                })?;
                cfg.default_quality = Some(parsed);
            }
            "chunk_count" => {
                let parsed = parse_integer_u64(value)
                    .with_context(|| format!("Invalid `chunk_count` value on line {line_no}"))?;
                let n = usize::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("chunk_count out of range for usize"))?;
                cfg.chunk_count = Some(n);
            }
            "chunk_threshold_bytes" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `chunk_threshold_bytes` value on line {line_no}")
                })?;
                cfg.chunk_threshold_bytes = Some(parsed);
            }
            "connect_timeout_secs" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `connect_timeout_secs` value on line {line_no}")
                })?;
                cfg.connect_timeout_secs = Some(parsed);
            }
            "remux_binary" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `remux_binary` value on line {line_no}"))?;
                cfg.remux_binary = Some(PathBuf::from(parsed));
            }
            "verbosity" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `verbosity` value on line {line_no}"))?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}
