use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::blink::EAR_CLOSED_THRESHOLD;
use crate::engine::{EngineSettings, DEFAULT_BLINK_COOLDOWN, DEFAULT_BLINK_RATE_LIMIT};
use crate::ingest::SourceSettings;
use crate::monitor::MonitorSettings;
use crate::profile::{DetectionProfile, ProfileSet};

const DEFAULT_LOOP_INTERVAL_MS: u64 = 50;
const DEFAULT_READ_BACKOFF_MS: u64 = 1_000;
const DEFAULT_MAX_READ_FAILURES: u32 = 5;
const DEFAULT_STOP_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MonitorConfigFile {
    source: Option<SourceConfigFile>,
    runtime: Option<RuntimeConfigFile>,
    profiles: Option<ProfilesConfigFile>,
    blink: Option<BlinkConfigFile>,
    voice: Option<VoiceConfigFile>,
    health_mode: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RuntimeConfigFile {
    loop_interval_ms: Option<u64>,
    read_backoff_ms: Option<u64>,
    max_read_failures: Option<u32>,
    stop_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ProfilesConfigFile {
    normal: Option<ProfileConfigFile>,
    intensive: Option<ProfileConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ProfileConfigFile {
    motion_threshold: Option<u32>,
    fall_height_ratio: Option<f32>,
    consecutive_frames: Option<u32>,
    motion_confirm_frames: Option<u32>,
    fall_confirm_frames: Option<u32>,
    alert_cooldown_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BlinkConfigFile {
    rate_limit: Option<u32>,
    cooldown_secs: Option<u64>,
    ear_threshold: Option<f32>,
    model_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VoiceConfigFile {
    command: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub source: SourceSettings,
    pub runtime: MonitorSettings,
    pub profiles: ProfileSet,
    pub blink: BlinkSettings,
    /// Local TTS command line; alerts are only logged when unset.
    pub voice_command: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlinkSettings {
    pub ear_threshold: f32,
    /// Face-mesh ONNX model. Blink detection is disabled when unset.
    pub model_path: Option<PathBuf>,
}

impl MonitorConfig {
    /// Defaults, then the file named by `CAREWATCH_CONFIG`, then environment
    /// overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAREWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let defaults = SourceSettings::default();
        let source_file = file.source.unwrap_or_default();
        let source = SourceSettings {
            url: source_file.url.unwrap_or(defaults.url),
            width: source_file.width.unwrap_or(defaults.width),
            height: source_file.height.unwrap_or(defaults.height),
            target_fps: source_file.target_fps.unwrap_or(defaults.target_fps),
        };

        let blink_file = file.blink.unwrap_or_default();
        let runtime_file = file.runtime.unwrap_or_default();
        let runtime = MonitorSettings {
            loop_interval: Duration::from_millis(
                runtime_file
                    .loop_interval_ms
                    .unwrap_or(DEFAULT_LOOP_INTERVAL_MS),
            ),
            read_backoff: Duration::from_millis(
                runtime_file
                    .read_backoff_ms
                    .unwrap_or(DEFAULT_READ_BACKOFF_MS),
            ),
            max_read_failures: runtime_file
                .max_read_failures
                .unwrap_or(DEFAULT_MAX_READ_FAILURES),
            stop_timeout: Duration::from_millis(
                runtime_file
                    .stop_timeout_ms
                    .unwrap_or(DEFAULT_STOP_TIMEOUT_MS),
            ),
            processing_width: source.width,
            processing_height: source.height,
            engine: EngineSettings {
                blink_rate_limit: blink_file.rate_limit.unwrap_or(DEFAULT_BLINK_RATE_LIMIT),
                blink_cooldown: blink_file
                    .cooldown_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_BLINK_COOLDOWN),
            },
        };

        let profiles_file = file.profiles.unwrap_or_default();
        let mut profiles = ProfileSet::new(
            overlay_profile(DetectionProfile::normal(), profiles_file.normal),
            overlay_profile(DetectionProfile::intensive(), profiles_file.intensive),
        );
        profiles.health_mode = file.health_mode.unwrap_or(false);

        let blink = BlinkSettings {
            ear_threshold: blink_file.ear_threshold.unwrap_or(EAR_CLOSED_THRESHOLD),
            model_path: blink_file.model_path,
        };

        Self {
            source,
            runtime,
            profiles,
            blink,
            voice_command: file.voice.and_then(|voice| voice.command),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CAREWATCH_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(value) = std::env::var("CAREWATCH_HEALTH_MODE") {
            self.profiles.health_mode = parse_bool(&value).ok_or_else(|| {
                anyhow!("CAREWATCH_HEALTH_MODE must be one of true/false/1/0/on/off")
            })?;
        }
        if let Ok(path) = std::env::var("CAREWATCH_LANDMARK_MODEL") {
            if !path.trim().is_empty() {
                self.blink.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(command) = std::env::var("CAREWATCH_TTS_COMMAND") {
            if !command.trim().is_empty() {
                self.voice_command = Some(command);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source.url must not be empty"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source.width and source.height must be greater than zero"));
        }
        if self.runtime.max_read_failures == 0 {
            return Err(anyhow!("runtime.max_read_failures must be at least 1"));
        }
        if self.runtime.stop_timeout.is_zero() {
            return Err(anyhow!("runtime.stop_timeout_ms must be greater than zero"));
        }
        self.profiles.normal.validate("normal")?;
        self.profiles.intensive.validate("intensive")?;
        if !(0.0..1.0).contains(&self.blink.ear_threshold) {
            return Err(anyhow!("blink.ear_threshold must be in [0, 1)"));
        }
        if self.runtime.engine.blink_cooldown < DEFAULT_BLINK_COOLDOWN {
            return Err(anyhow!(
                "blink.cooldown_secs must be at least {}",
                DEFAULT_BLINK_COOLDOWN.as_secs()
            ));
        }
        Ok(())
    }
}

fn overlay_profile(base: DetectionProfile, file: Option<ProfileConfigFile>) -> DetectionProfile {
    let Some(file) = file else {
        return base;
    };
    let mut profile = DetectionProfile::new(
        file.motion_threshold.unwrap_or(base.motion_threshold),
        file.fall_height_ratio.unwrap_or(base.fall_height_ratio),
        file.consecutive_frames.unwrap_or(base.consecutive_frames),
        file.alert_cooldown_secs.unwrap_or(base.alert_cooldown_secs),
    );
    if let Some(frames) = file.motion_confirm_frames {
        profile.motion_confirm_frames = frames;
    }
    if let Some(frames) = file.fall_confirm_frames {
        profile.fall_confirm_frames = frames;
    }
    profile
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
