use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::capture_loop::LoopSettings;
use crate::detect::{DetectorSettings, FaceBox};
use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::gate::DEFAULT_MIN_FACE_PX;
use crate::guard::RateLimitPolicy;
use crate::ingest::CameraConfig;

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
const DEFAULT_CAMERA_URL: &str = "stub://kiosk_camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_DETECTOR: &str = "scripted";
const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 3_000;
const DEFAULT_LOCKOUT_SECS: u64 = 300;
const DEFAULT_API_ADDR: &str = "127.0.0.1:8798";
const DEFAULT_REPORT_DIR: &str = ".";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize, Default)]
struct KioskConfigFile {
    backend: Option<BackendConfigFile>,
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    sampler: Option<SamplerConfigFile>,
    guard: Option<GuardConfigFile>,
    api: Option<ApiConfigFile>,
    reports: Option<ReportsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct BackendConfigFile {
    url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    name: Option<String>,
    model_path: Option<PathBuf>,
    script: Option<Vec<Vec<FaceBox>>>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplerConfigFile {
    interval_ms: Option<u64>,
    min_face_px: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct GuardConfigFile {
    lockout_secs: Option<u64>,
    rate_limit_pattern: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ReportsConfigFile {
    dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct KioskConfig {
    pub backend_url: String,
    pub http_timeout: Duration,
    pub camera: CameraSettings,
    pub detector: DetectorSelection,
    pub sampler: SamplerSettings,
    pub lockout: Duration,
    /// Free-text rate-limit regex; `None` keeps the built-in phrase match.
    pub rate_limit_pattern: Option<String>,
    pub api_addr: String,
    pub report_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSelection {
    pub name: String,
    pub model_path: Option<PathBuf>,
    pub script: Option<Vec<Vec<FaceBox>>>,
}

#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub interval: Duration,
    pub min_face_px: u32,
    pub jpeg_quality: u8,
}

impl KioskConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("KIOSK_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: KioskConfigFile) -> Self {
        let backend = file.backend.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let sampler = file.sampler.unwrap_or_default();
        let guard = file.guard.unwrap_or_default();
        Self {
            backend_url: backend
                .url
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            http_timeout: Duration::from_secs(
                backend.timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
            camera: CameraSettings {
                url: camera.url.unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            },
            detector: DetectorSelection {
                name: detector
                    .name
                    .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
                model_path: detector.model_path,
                script: detector.script,
            },
            sampler: SamplerSettings {
                interval: Duration::from_millis(
                    sampler.interval_ms.unwrap_or(DEFAULT_SAMPLE_INTERVAL_MS),
                ),
                min_face_px: sampler.min_face_px.unwrap_or(DEFAULT_MIN_FACE_PX),
                jpeg_quality: sampler.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
            lockout: Duration::from_secs(guard.lockout_secs.unwrap_or(DEFAULT_LOCKOUT_SECS)),
            rate_limit_pattern: guard.rate_limit_pattern,
            api_addr: file
                .api
                .and_then(|api| api.addr)
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            report_dir: file
                .reports
                .and_then(|reports| reports.dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR)),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_string("KIOSK_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Some(url) = env_string("KIOSK_CAMERA_URL") {
            self.camera.url = url;
        }
        if let Some(name) = env_string("KIOSK_DETECTOR") {
            self.detector.name = name;
        }
        if let Some(path) = env_string("KIOSK_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = env_number::<u64>("KIOSK_SAMPLE_INTERVAL_MS", "milliseconds")? {
            self.sampler.interval = Duration::from_millis(ms);
        }
        if let Some(px) = env_number::<u32>("KIOSK_MIN_FACE_PX", "pixels")? {
            self.sampler.min_face_px = px;
        }
        if let Some(secs) = env_number::<u64>("KIOSK_LOCKOUT_SECS", "seconds")? {
            self.lockout = Duration::from_secs(secs);
        }
        if let Some(quality) = env_number::<u8>("KIOSK_JPEG_QUALITY", "quality level")? {
            self.sampler.jpeg_quality = quality;
        }
        if let Some(pattern) = env_string("KIOSK_RATE_LIMIT_PATTERN") {
            self.rate_limit_pattern = Some(pattern);
        }
        if let Some(addr) = env_string("KIOSK_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(dir) = env_string("KIOSK_REPORT_DIR") {
            self.report_dir = PathBuf::from(dir);
        }
        if let Some(secs) = env_number::<u64>("KIOSK_HTTP_TIMEOUT_SECS", "seconds")? {
            self.http_timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.sampler.interval.is_zero() {
            return Err(anyhow!("sample interval must be greater than zero"));
        }
        if self.lockout.is_zero() {
            return Err(anyhow!("lockout must be greater than zero"));
        }
        if !(1..=100).contains(&self.sampler.jpeg_quality) {
            return Err(anyhow!(
                "jpeg quality must be within 1..=100, got {}",
                self.sampler.jpeg_quality
            ));
        }
        if self.http_timeout.is_zero() {
            return Err(anyhow!("http timeout must be greater than zero"));
        }
        let backend = Url::parse(&self.backend_url)
            .map_err(|e| anyhow!("invalid backend url '{}': {}", self.backend_url, e))?;
        if !matches!(backend.scheme(), "http" | "https") {
            return Err(anyhow!("backend url must use http or https"));
        }
        if !self.camera.url.starts_with("stub://") {
            Url::parse(&self.camera.url)
                .map_err(|e| anyhow!("invalid camera url '{}': {}", self.camera.url, e))?;
        }
        self.detector.name = self.detector.name.trim().to_lowercase();
        self.check_detector_camera()?;
        self.rate_limit_policy()?;
        Ok(())
    }

    /// Replace the configured detector, keeping the camera pairing rule.
    pub fn select_detector(&mut self, name: &str) -> Result<()> {
        self.detector.name = name.trim().to_lowercase();
        self.check_detector_camera()
    }

    // The scripted detector replays canned boxes whatever the frame shows, so a
    // real camera needs a real detector.
    fn check_detector_camera(&self) -> Result<()> {
        if self.detector.name == "scripted" && !self.camera.url.starts_with("stub://") {
            return Err(anyhow!(
                "detector 'scripted' only runs against a stub:// camera, got '{}'; \
                 choose a model-backed detector (KIOSK_DETECTOR)",
                self.camera.url
            ));
        }
        Ok(())
    }

    pub fn rate_limit_policy(&self) -> Result<RateLimitPolicy> {
        match self.rate_limit_pattern.as_deref() {
            Some(pattern) => RateLimitPolicy::with_pattern(pattern),
            None => Ok(RateLimitPolicy::default()),
        }
    }

    pub fn loop_settings(&self) -> Result<LoopSettings> {
        Ok(LoopSettings {
            interval: self.sampler.interval,
            min_face_px: self.sampler.min_face_px,
            jpeg_quality: self.sampler.jpeg_quality,
            lockout: self.lockout,
            rate_limit: self.rate_limit_policy()?,
        })
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            url: self.camera.url.clone(),
            width: self.camera.width,
            height: self.camera.height,
            ..CameraConfig::default()
        }
    }

    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            model_path: self.detector.model_path.clone(),
            script: self.detector.script.clone(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<KioskConfigFile> {
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

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_number<T: FromStr>(key: &str, unit: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be an integer number of {}", key, unit)),
        None => Ok(None),
    }
}
