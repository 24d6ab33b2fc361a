use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{GuardianError, Result};

/// Picked up from the working directory when no config file is named.
pub const DEFAULT_CONFIG_FILE: &str = "focus-guardian.toml";

/// Values given on the command line. They win over the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Overrides {
    pub camera_id: Option<i32>,
    pub look_away_limit: Option<f64>,
}

/// Startup configuration. Resolved once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera_id: i32,
    pub model_path: PathBuf,
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    /// Seconds of continuous look-away before the penalty starts.
    pub look_away_limit: f64,
    pub threshold_down: f32,
    pub threshold_side: f32,
    pub threshold_up: f32,
    pub threshold_head_pitch: f32,
    /// Sigmoid of the model's presence logit below which no face is reported.
    pub min_face_presence: f32,
    pub window_title: String,
    pub penalty_window_title: String,
    /// Penalty window size as `[width, height]`.
    pub penalty_frame_size: [u32; 2],
    pub key_poll_ms: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_id: 0,
            model_path: PathBuf::from("data/face_landmarker.onnx"),
            video_path: PathBuf::from("data/video.mp4"),
            audio_path: PathBuf::from("data/video.wav"),
            look_away_limit: 0.5,
            threshold_down: 0.5,
            threshold_side: 0.6,
            threshold_up: 0.5,
            threshold_head_pitch: 0.30,
            min_face_presence: 0.5,
            window_title: "Anty-Doom-Scrolling".to_string(),
            penalty_window_title: "VIDEO PENALTY".to_string(),
            penalty_frame_size: [800, 600],
            key_poll_ms: 5,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    /// Loads `path` and returns it with the directory its relative paths hang off.
    pub fn from_file_with_base(path: &Path) -> Result<(Self, PathBuf)> {
        info!("loading config: {}", path.display());
        let config = Self::load(path)?;
        Ok((config, base_dir_of(path)))
    }

    /// Defaults, then the config file, then `overrides`. The result is validated
    /// and its asset paths resolved.
    ///
    /// With no `file`, [`DEFAULT_CONFIG_FILE`] in `cwd` is used if it exists.
    pub fn layered(file: Option<&Path>, overrides: &Overrides, cwd: &Path) -> Result<Self> {
        let (config, base_dir) = match file {
            Some(path) => Self::from_file_with_base(path)?,
            None => {
                let local = cwd.join(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    Self::from_file_with_base(&local)?
                } else {
                    debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    (Self::default(), cwd.to_path_buf())
                }
            }
        };

        let config = config.with_overrides(overrides);
        config.validate()?;
        Ok(config.resolve(&base_dir))
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(camera_id) = overrides.camera_id {
            self.camera_id = camera_id;
        }
        if let Some(limit) = overrides.look_away_limit {
            self.look_away_limit = limit;
        }
        self
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Anchors relative asset paths at `base_dir`. Absolute paths are kept.
    #[must_use]
    pub fn resolve(mut self, base_dir: &Path) -> Self {
        for path in [&mut self.model_path, &mut self.video_path, &mut self.audio_path] {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let unit_thresholds = [
            ("threshold_down", self.threshold_down),
            ("threshold_side", self.threshold_side),
            ("threshold_up", self.threshold_up),
            ("min_face_presence", self.min_face_presence),
        ];
        for (name, value) in unit_thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(GuardianError::Config(format!(
                    "{name} must be 0.0-1.0, got {value}"
                )));
            }
        }
        if !self.threshold_head_pitch.is_finite() {
            return Err(GuardianError::Config(
                "threshold_head_pitch must be finite".to_string(),
            ));
        }
        self.look_away_limit()?;
        let [width, height] = self.penalty_frame_size;
        if width == 0 || height == 0 || width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(GuardianError::Config(format!(
                "penalty_frame_size must be non-zero, got {width}x{height}"
            )));
        }
        if self.key_poll_ms <= 0 {
            return Err(GuardianError::Config(format!(
                "key_poll_ms must be positive, got {}",
                self.key_poll_ms
            )));
        }
        Ok(())
    }

    pub fn look_away_limit(&self) -> Result<Duration> {
        match Duration::try_from_secs_f64(self.look_away_limit) {
            Ok(limit) if !limit.is_zero() => Ok(limit),
            _ => Err(GuardianError::Config(format!(
                "look_away_limit must be a positive number of seconds, got {}",
                self.look_away_limit
            ))),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            down: self.threshold_down,
            side: self.threshold_side,
            up: self.threshold_up,
            head_pitch: self.threshold_head_pitch,
        }
    }
}

/// The four cutoffs the focus classifier compares against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub down: f32,
    pub side: f32,
    pub up: f32,
    pub head_pitch: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Config::default().thresholds()
    }
}

fn base_dir_of(path: &Path) -> PathBuf {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
