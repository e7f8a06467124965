//! Conversion configuration.
//!
//! A [`ConversionConfig`] can only be obtained through [`ConversionConfig::new`]
//! (or deserialization, which goes through the same checks), so every value in
//! circulation satisfies the range constraints below.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Vertical resolutions the encoder accepts.
pub const SUPPORTED_RESOLUTIONS: [u32; 4] = [720, 1080, 1440, 2160];

/// Frame rate bounds (inclusive).
pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 60;

/// Per-slide duration bounds in seconds (inclusive).
pub const MIN_DURATION_SECS: u32 = 1;
pub const MAX_DURATION_SECS: u32 = 60;

/// Parameters for one deck-to-video conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConversionConfig", rename_all = "camelCase")]
pub struct ConversionConfig {
    fps: u32,
    resolution: u32,
    duration: u32,
    transition_duration: f64,
}

/// Unchecked wire form, validated into [`ConversionConfig`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConversionConfig {
    fps: u32,
    resolution: u32,
    duration: u32,
    #[serde(default)]
    transition_duration: f64,
}

impl TryFrom<RawConversionConfig> for ConversionConfig {
    type Error = ModelError;

    fn try_from(raw: RawConversionConfig) -> Result<Self, Self::Error> {
        Self::new(raw.fps, raw.resolution, raw.duration, raw.transition_duration)
    }
}

impl ConversionConfig {
    /// Validate and build a configuration.
    pub fn new(fps: u32, resolution: u32, duration: u32, transition_duration: f64) -> ModelResult<Self> {
        if !(MIN_FPS..=MAX_FPS).contains(&fps) {
            return Err(ModelError::invalid_config(
                "fps",
                format!("must be between {} and {}, got {}", MIN_FPS, MAX_FPS, fps),
            ));
        }

        if !SUPPORTED_RESOLUTIONS.contains(&resolution) {
            return Err(ModelError::invalid_config(
                "resolution",
                format!("must be one of {:?}, got {}", SUPPORTED_RESOLUTIONS, resolution),
            ));
        }

        if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&duration) {
            return Err(ModelError::invalid_config(
                "duration",
                format!(
                    "must be between {} and {} seconds, got {}",
                    MIN_DURATION_SECS, MAX_DURATION_SECS, duration
                ),
            ));
        }

        // NaN fails both comparisons, so check finiteness explicitly
        if !transition_duration.is_finite()
            || transition_duration < 0.0
            || transition_duration >= f64::from(duration)
        {
            return Err(ModelError::invalid_config(
                "transitionDuration",
                format!(
                    "must be in [0, {}) seconds, got {}",
                    duration, transition_duration
                ),
            ));
        }

        Ok(Self {
            fps,
            resolution,
            duration,
            transition_duration,
        })
    }

    /// Output frame rate.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Output height in pixels.
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// How long each slide is held, in seconds.
    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// Cross-fade length in seconds; zero means hard cuts.
    pub fn transition_duration(&self) -> f64 {
        self.transition_duration
    }

    /// Whether slides are blended rather than hard-cut.
    pub fn has_transition(&self) -> bool {
        self.transition_duration > 0.0
    }

    /// Expected length of the rendered video for `slide_count` slides.
    ///
    /// Cross-fades overlap neighbouring slides, so each of the `n - 1` fades
    /// shortens the timeline by one transition length.
    pub fn expected_video_duration(&self, slide_count: usize) -> f64 {
        if slide_count == 0 {
            return 0.0;
        }
        let n = slide_count as f64;
        let d = f64::from(self.duration);
        if slide_count > 1 && self.has_transition() {
            n * d - (n - 1.0) * self.transition_duration
        } else {
            n * d
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            fps: 24,
            resolution: 1080,
            duration: 5,
            transition_duration: 1.0,
        }
    }
}
