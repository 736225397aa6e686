//! # Configuration
//!
//! Every tunable constant of the engine lives in [`ToyConfig`]. A config is
//! usually loaded from a small YAML document:
//!
//! ```yaml
//! bpm: 96
//! beats-per-bar: 3
//! ball-radius: 12
//! root-note: D4
//! scale: minor-pentatonic
//! ```
//!
//! Missing keys fall back to the defaults below. Keys that are present but out
//! of range are rejected with [`BouncerError::ConfigError`] naming the key, so a
//! typo in a scene file is reported instead of silently producing a toy that
//! plays at the wrong speed.
//!
//! ## Example
//! ```rust
//! use bouncer::ToyConfig;
//!
//! let config = ToyConfig::from_yaml("bpm: 90\nblock-count: 3")?;
//! assert_eq!(config.bpm, 90.0);
//! assert_eq!(config.block_count, 3);
//! assert_eq!(config.beats_per_bar, 4); // default
//! # Ok::<(), bouncer::BouncerError>(())
//! ```

use crate::error::BouncerError;
use crate::notes::{parse_note_name, Scale};
use crate::transport::{DEFAULT_BPM, MAX_BPM, MIN_BPM};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_FPS: f64 = 60.0;
pub const MIN_SPEED_FACTOR: f64 = 0.2;
pub const MAX_SPEED_FACTOR: f64 = 1.6;
pub const MIN_BALL_RADIUS: f64 = 0.5;
pub const MAX_BALL_RADIUS: f64 = 200.0;
/// Global presentation multiplier applied on top of the musical base speed.
pub const PRESENTATION_MULTIPLIER: f64 = 3.2;

/// Typed, validated engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ToyConfig {
    pub bpm: f64,
    pub beats_per_bar: u32,
    pub steps_per_beat: u32,
    /// Reference frame rate; velocities are expressed in px per reference frame.
    pub fps: f64,
    pub ball_radius: f64,
    /// How many bars a launched (or ghost) ball lives before it expires.
    pub bars_per_life: f64,
    pub speed_factor: f64,
    /// Grid divisions per beat used to quantize hits; 0 disables quantization.
    pub quant_divisor: u32,
    /// Number of note blocks seeded by the first layout.
    pub block_count: usize,
    pub edge_thickness: f64,
    /// Minimum seconds between two notes from the same block or edge.
    pub refractory: f64,
    pub lookahead: f64,
    pub lead_time: f64,
    pub damping: f64,
    pub presentation_multiplier: f64,
    /// Upper bound for `|v|` in px per reference frame.
    pub max_speed: f64,
    /// MIDI number of note index 0.
    pub root_note: u8,
    pub scale: Scale,
}

impl Default for ToyConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            beats_per_bar: 4,
            steps_per_beat: 4,
            fps: DEFAULT_FPS,
            ball_radius: 10.0,
            bars_per_life: 1.0,
            speed_factor: 1.0,
            quant_divisor: 4,
            block_count: 5,
            edge_thickness: 8.0,
            refractory: 0.08,
            lookahead: 0.1,
            lead_time: 0.00045,
            damping: 0.999,
            presentation_multiplier: PRESENTATION_MULTIPLIER,
            max_speed: 400.0,
            root_note: 60,
            scale: Scale::MajorPentatonic,
        }
    }
}

/// Raw config for YAML deserialization
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawConfig {
    pub bpm: Option<f64>,
    pub beats_per_bar: Option<u32>,
    pub steps_per_beat: Option<u32>,
    pub fps: Option<f64>,
    pub ball_radius: Option<f64>,
    pub bars_per_life: Option<f64>,
    pub speed_factor: Option<f64>,
    pub quant_divisor: Option<u32>,
    pub block_count: Option<usize>,
    pub edge_thickness: Option<f64>,
    pub refractory: Option<f64>,
    pub lookahead: Option<f64>,
    pub lead_time: Option<f64>,
    pub damping: Option<f64>,
    pub presentation_multiplier: Option<f64>,
    pub max_speed: Option<f64>,
    pub root_note: Option<String>, // "C4", "F#3", "Bb2"
    pub scale: Option<String>,
}

impl ToyConfig {
    /// Parse a YAML config document.
    ///
    /// An empty document yields the defaults.
    pub fn from_yaml(content: &str) -> Result<Self, BouncerError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| BouncerError::ConfigError(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Read and parse a YAML config file.
    pub fn load(path: &Path) -> Result<Self, BouncerError> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Validate raw values and fill in defaults.
    pub fn from_raw(raw: RawConfig) -> Result<Self, BouncerError> {
        let defaults = Self::default();

        let root_note = match raw.root_note {
            Some(ref name) => parse_note_name(name).ok_or_else(|| {
                BouncerError::ConfigError(format!("Invalid root-note: {}", name))
            })?,
            None => defaults.root_note,
        };

        let scale = match raw.scale {
            Some(ref name) => Scale::from_str(name)
                .ok_or_else(|| BouncerError::ConfigError(format!("Unknown scale: {}", name)))?,
            None => defaults.scale,
        };

        let lead_time = check_range("lead-time", raw.lead_time, 0.0, 0.05, defaults.lead_time)?;
        let lookahead = check_range("lookahead", raw.lookahead, 0.0, 2.0, defaults.lookahead)?;
        if lookahead <= lead_time {
            return Err(BouncerError::ConfigError(format!(
                "lookahead ({}) must be greater than lead-time ({})",
                lookahead, lead_time
            )));
        }

        Ok(Self {
            bpm: check_range("bpm", raw.bpm, MIN_BPM, MAX_BPM, defaults.bpm)?,
            beats_per_bar: check_count("beats-per-bar", raw.beats_per_bar, 1, 16, defaults.beats_per_bar)?,
            steps_per_beat: check_count("steps-per-beat", raw.steps_per_beat, 1, 8, defaults.steps_per_beat)?,
            fps: check_range("fps", raw.fps, 1.0, 240.0, defaults.fps)?,
            ball_radius: check_range("ball-radius", raw.ball_radius, MIN_BALL_RADIUS, MAX_BALL_RADIUS, defaults.ball_radius)?,
            bars_per_life: check_range("bars-per-life", raw.bars_per_life, 0.25, 16.0, defaults.bars_per_life)?,
            speed_factor: check_range(
                "speed-factor",
                raw.speed_factor,
                MIN_SPEED_FACTOR,
                MAX_SPEED_FACTOR,
                defaults.speed_factor,
            )?,
            quant_divisor: check_count("quant-divisor", raw.quant_divisor, 0, 16, defaults.quant_divisor)?,
            block_count: check_count("block-count", raw.block_count, 0, 32, defaults.block_count)?,
            edge_thickness: check_range("edge-thickness", raw.edge_thickness, 0.0, 64.0, defaults.edge_thickness)?,
            refractory: check_range("refractory", raw.refractory, 0.0, 1.0, defaults.refractory)?,
            lookahead,
            lead_time,
            damping: check_range("damping", raw.damping, 0.5, 1.0, defaults.damping)?,
            presentation_multiplier: check_range(
                "presentation-multiplier",
                raw.presentation_multiplier,
                0.1,
                16.0,
                defaults.presentation_multiplier,
            )?,
            max_speed: check_range("max-speed", raw.max_speed, 1.0, 10_000.0, defaults.max_speed)?,
            root_note,
            scale,
        })
    }
}

fn check_range(key: &str, value: Option<f64>, min: f64, max: f64, default: f64) -> Result<f64, BouncerError> {
    match value {
        None => Ok(default),
        Some(v) if v.is_finite() && v >= min && v <= max => Ok(v),
        Some(v) => Err(BouncerError::ConfigError(format!(
            "{} must be between {} and {} (got {})",
            key, min, max, v
        ))),
    }
}

fn check_count<T>(key: &str, value: Option<T>, min: T, max: T, default: T) -> Result<T, BouncerError>
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) if v >= min && v <= max => Ok(v),
        Some(v) => Err(BouncerError::ConfigError(format!(
            "{} must be between {} and {} (got {})",
            key, min, max, v
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_is_default() {
        let config = ToyConfig::from_yaml("").unwrap();
        assert_eq!(config, ToyConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config = ToyConfig::from_yaml("bpm: 96\nbeats-per-bar: 3\nscale: minor-pentatonic").unwrap();
        assert_eq!(config.bpm, 96.0);
        assert_eq!(config.beats_per_bar, 3);
        assert_eq!(config.scale, Scale::MinorPentatonic);
        assert_eq!(config.steps_per_beat, 4);
    }

    #[test]
    fn test_root_note_name() {
        let config = ToyConfig::from_yaml("root-note: A3").unwrap();
        assert_eq!(config.root_note, 57);
    }

    #[test]
    fn test_bpm_out_of_range() {
        let err = ToyConfig::from_yaml("bpm: 900").unwrap_err();
        assert!(err.to_string().contains("bpm must be between"));
    }

    #[test]
    fn test_speed_factor_out_of_range() {
        assert!(ToyConfig::from_yaml("speed-factor: 2.5").is_err());
        assert!(ToyConfig::from_yaml("speed-factor: 0.1").is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(ToyConfig::from_yaml("tempo: 120").is_err());
    }

    #[test]
    fn test_invalid_root_note() {
        let err = ToyConfig::from_yaml("root-note: H2").unwrap_err();
        assert!(matches!(err, BouncerError::ConfigError(_)));
    }

    #[test]
    fn test_lookahead_must_exceed_lead() {
        assert!(ToyConfig::from_yaml("lookahead: 0.0001\nlead-time: 0.001").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bpm: 140").unwrap();
        writeln!(file, "block-count: 2").unwrap();
        let config = ToyConfig::load(file.path()).unwrap();
        assert_eq!(config.bpm, 140.0);
        assert_eq!(config.block_count, 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ToyConfig::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, BouncerError::Io(_)));
    }
}
