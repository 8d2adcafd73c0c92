//! Host-supplied guidance configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! advance_threshold_m  = 15.0
//! announce_distance_m  = 20.0
//! update_interval_ms   = 2000
//! relay_interval_ms    = 3000
//! reconnect_backoff_ms = 5000
//! arrival_grace_ms     = 3000
//!
//! [speech]
//! rate   = 0.9
//! pitch  = 1.0
//! volume = 1.0
//!
//! [channel]
//! address = "127.0.0.1:8765"
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::{NavError, NavResult};

/// Permitted range for the fix/update cadences.
pub const CADENCE_RANGE_MS: std::ops::RangeInclusive<u64> = 2_000..=3_000;

/// Tunable constants for proximity evaluation, transport cadence, and timers.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuidanceConfig {
    /// Distance to the current step's end below which the step is complete.
    pub advance_threshold_m: f64,

    /// Distance to the next step's start below which it is announced.
    pub announce_distance_m: f64,

    /// Cadence at which fixes are streamed on the guidance channel.
    pub update_interval_ms: u64,

    /// Cadence at which the location-only relay forwards fixes.
    pub relay_interval_ms: u64,

    /// Fixed delay before the single reconnect attempt after a close.
    pub reconnect_backoff_ms: u64,

    /// Delay between arrival and full teardown, so the arrival utterance
    /// can finish.
    pub arrival_grace_ms: u64,

    /// How long a position source may go without a fix before reporting
    /// `AcquisitionTimeout`.
    pub acquisition_timeout_ms: u64,

    pub speech: SpeechProfile,

    pub channel: ChannelConfig,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            advance_threshold_m:    15.0,
            announce_distance_m:    20.0,
            update_interval_ms:     2_000,
            relay_interval_ms:      3_000,
            reconnect_backoff_ms:   5_000,
            arrival_grace_ms:       3_000,
            acquisition_timeout_ms: 10_000,
            speech:                 SpeechProfile::default(),
            channel:                ChannelConfig::default(),
        }
    }
}

impl GuidanceConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> NavResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "loaded guidance configuration");
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> NavResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> NavResult<()> {
        if !(self.advance_threshold_m > 0.0) {
            return Err(NavError::Config(format!(
                "advance_threshold_m must be positive, got {}",
                self.advance_threshold_m
            )));
        }
        if !(self.announce_distance_m > 0.0) {
            return Err(NavError::Config(format!(
                "announce_distance_m must be positive, got {}",
                self.announce_distance_m
            )));
        }
        for (name, value) in [
            ("update_interval_ms", self.update_interval_ms),
            ("relay_interval_ms", self.relay_interval_ms),
        ] {
            if !CADENCE_RANGE_MS.contains(&value) {
                return Err(NavError::Config(format!(
                    "{name} must be within {}..={} ms, got {value}",
                    CADENCE_RANGE_MS.start(),
                    CADENCE_RANGE_MS.end()
                )));
            }
        }
        if self.acquisition_timeout_ms == 0 {
            return Err(NavError::Config("acquisition_timeout_ms must be non-zero".into()));
        }
        self.speech.validate()
    }
}

// ── SpeechProfile ─────────────────────────────────────────────────────────────

/// Fixed speech parameters applied to every utterance.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpeechProfile {
    /// Speaking rate multiplier, `0.1..=10.0`.
    pub rate: f32,
    /// Pitch, `0.0..=2.0`.
    pub pitch: f32,
    /// Volume, `0.0..=1.0`.
    pub volume: f32,
}

impl Default for SpeechProfile {
    fn default() -> Self {
        Self { rate: 0.9, pitch: 1.0, volume: 1.0 }
    }
}

impl SpeechProfile {
    fn validate(&self) -> NavResult<()> {
        let ok = (0.1..=10.0).contains(&self.rate)
            && (0.0..=2.0).contains(&self.pitch)
            && (0.0..=1.0).contains(&self.volume);
        if ok {
            Ok(())
        } else {
            Err(NavError::Config(format!("speech profile out of range: {self:?}")))
        }
    }
}

// ── ChannelConfig ─────────────────────────────────────────────────────────────

/// Where the guidance server lives.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// `host:port` of the guidance socket.
    pub address: String,
    /// `host:port` of the location-only relay socket.  `None` disables it.
    pub relay_address: Option<String>,
    /// Connect timeout, milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            address:            "127.0.0.1:8765".to_owned(),
            relay_address:      None,
            connect_timeout_ms: 5_000,
        }
    }
}
