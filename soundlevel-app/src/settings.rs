//! Persistent application settings (JSON file in app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use soundlevel_core::{BandSet, CalibrationReference, EngineConfig, WindowType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    pub reference_rms: f64,
    pub reference_level_db: f64,
    /// Device correction on top of the reference tone (dB).
    pub gain_db: f64,
    pub live_window_secs: f64,
    pub live_max_frequency: f64,
    pub delayed_window_secs: f64,
    pub delayed_overlap: f64,
    pub delayed_window_type: WindowType,
    pub delayed_bands: BandSet,
    pub a_weighting: bool,
    pub chunk_secs: f64,
}

impl Default for AppSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            preferred_input_device: None,
            reference_rms: engine.calibration.reference_rms,
            reference_level_db: engine.calibration.reference_level_db,
            gain_db: engine.calibration.gain_db,
            live_window_secs: engine.live.window_secs,
            live_max_frequency: engine.live.max_frequency,
            delayed_window_secs: engine.delayed.window_secs,
            delayed_overlap: engine.delayed.overlap,
            delayed_window_type: engine.delayed.window_type,
            delayed_bands: engine.delayed.bands,
            a_weighting: engine.delayed.a_weighting,
            chunk_secs: engine.chunk_secs,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let defaults = Self::default();
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.reference_rms = finite_or(self.reference_rms, defaults.reference_rms).clamp(1.0, 32_767.0);
        self.reference_level_db =
            finite_or(self.reference_level_db, defaults.reference_level_db).clamp(0.0, 160.0);
        self.gain_db = finite_or(self.gain_db, 0.0).clamp(-40.0, 40.0);
        self.live_window_secs =
            finite_or(self.live_window_secs, defaults.live_window_secs).clamp(0.02, 1.0);
        self.live_max_frequency =
            finite_or(self.live_max_frequency, defaults.live_max_frequency).clamp(1_000.0, 20_000.0);
        self.delayed_window_secs =
            finite_or(self.delayed_window_secs, defaults.delayed_window_secs).clamp(0.125, 10.0);
        self.delayed_overlap = finite_or(self.delayed_overlap, defaults.delayed_overlap).clamp(0.0, 0.9);
        self.chunk_secs = finite_or(self.chunk_secs, defaults.chunk_secs).clamp(0.01, 1.0);
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig {
            calibration: CalibrationReference {
                reference_rms: self.reference_rms,
                reference_level_db: self.reference_level_db,
                gain_db: self.gain_db,
            },
            chunk_secs: self.chunk_secs,
            ..EngineConfig::default()
        };
        config.live.window_secs = self.live_window_secs;
        config.live.max_frequency = self.live_max_frequency;
        config.delayed.window_secs = self.delayed_window_secs;
        config.delayed.overlap = self.delayed_overlap;
        config.delayed.window_type = self.delayed_window_type;
        config.delayed.bands = self.delayed_bands;
        config.delayed.a_weighting = self.a_weighting;
        config
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("soundlevel")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("soundlevel")
            .join("settings.json")
    }
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
