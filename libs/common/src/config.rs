//! iosrv configuration
//!
//! Priority (highest to lowest):
//! 1. Environment variables, `IOSRV_` prefix, `__` between nested keys
//!    (`IOSRV_SHM__AREA_SIZE=1024`)
//! 2. YAML file (`--config`, or `config/iosrv.yaml` if present)
//! 3. Built-in defaults

use errors::{DriverError, DriverResult};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "IOSRV_";
pub const DEFAULT_CONFIG_PATH: &str = "config/iosrv.yaml";

/// Environment override for the segment file location
pub const SHM_PATH_ENV: &str = "IOSRV_SHM_PATH";
pub const DEFAULT_SEGMENT_NAME: &str = "iosrv-process-data.shm";

/// Default segment file location
///
/// Priority:
/// 1. `IOSRV_SHM_PATH` environment variable
/// 2. Linux RAM-backed tmpfs `/dev/shm/iosrv-process-data.shm`
/// 3. Fallback to `/tmp/iosrv-process-data.shm`
pub fn default_shm_path() -> PathBuf {
    if let Ok(path) = std::env::var(SHM_PATH_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    #[cfg(target_os = "linux")]
    {
        let dev_shm = Path::new("/dev/shm");
        if dev_shm.exists() {
            return dev_shm.join(DEFAULT_SEGMENT_NAME);
        }
    }

    Path::new("/tmp").join(DEFAULT_SEGMENT_NAME)
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Daily-rolling log files go here when set
    pub dir: Option<PathBuf>,
    /// JSON lines in the log file instead of the bracketed text format
    pub json: bool,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json: false,
            file_prefix: "iosrv".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShmConfig {
    pub path: PathBuf,
    /// Bytes per area
    pub area_size: usize,
    pub reply_timeout_ms: u64,
    pub lock_timeout_ms: u64,
    /// Server polling interval
    pub poll_interval_ms: u64,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            path: default_shm_path(),
            area_size: 5000,
            reply_timeout_ms: 5000,
            lock_timeout_ms: 1000,
            poll_interval_ms: 10,
        }
    }
}

impl ShmConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    /// Registers per table; the image has twice as many bytes per area
    pub register_count: usize,
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
    /// Updater polling interval
    pub poll_interval_ms: u64,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 502,
            unit_id: 1,
            register_count: 2500,
            connect_timeout_ms: 3000,
            response_timeout_ms: 1000,
            poll_interval_ms: 100,
        }
    }
}

impl ModbusConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Which backend a driver set is opened on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Shm,
    Modbus,
}

impl FromStr for BackendKind {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shm" => Ok(BackendKind::Shm),
            "modbus" => Ok(BackendKind::Modbus),
            other => Err(DriverError::config(format!("unknown backend: {other}"))),
        }
    }
}

/// Settings of one concrete backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Shm(ShmConfig),
    Modbus(ModbusConfig),
}

// ============================================================================
// IoConfig
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    pub backend: BackendKind,
    pub logging: LoggingConfig,
    pub shm: ShmConfig,
    pub modbus: ModbusConfig,
}

impl IoConfig {
    /// Load defaults, then the YAML file, then `IOSRV_` environment overrides.
    ///
    /// An explicit `path` must exist; without one, `config/iosrv.yaml` is
    /// used only if present.
    pub fn load(path: Option<&Path>) -> DriverResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(IoConfig::default()));

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(DriverError::config(format!(
                        "config file {path:?} does not exist"
                    )));
                }
                info!("Loading config from {:?}", path);
                figment = figment.merge(Yaml::file(path));
            },
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                info!("Loading config from {}", DEFAULT_CONFIG_PATH);
                figment = figment.merge(Yaml::file(DEFAULT_CONFIG_PATH));
            },
            None => debug!("No config file, using defaults"),
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: IoConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DriverResult<()> {
        if self.shm.area_size == 0 || u32::try_from(self.shm.area_size).is_err() {
            return Err(DriverError::config(format!(
                "shm.area_size must be in 1..={}, got {}",
                u32::MAX,
                self.shm.area_size
            )));
        }
        if self.modbus.register_count == 0 || self.modbus.register_count > 65_535 {
            return Err(DriverError::config(format!(
                "modbus.register_count must be in 1..=65535, got {}",
                self.modbus.register_count
            )));
        }

        let timeouts = [
            ("shm.reply_timeout_ms", self.shm.reply_timeout_ms),
            ("shm.lock_timeout_ms", self.shm.lock_timeout_ms),
            ("shm.poll_interval_ms", self.shm.poll_interval_ms),
            ("modbus.connect_timeout_ms", self.modbus.connect_timeout_ms),
            ("modbus.response_timeout_ms", self.modbus.response_timeout_ms),
            ("modbus.poll_interval_ms", self.modbus.poll_interval_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(DriverError::config(format!("{name} must be greater than 0")));
        }

        if self.modbus.host.is_empty() {
            return Err(DriverError::config("modbus.host cannot be empty"));
        }
        Ok(())
    }

    /// Settings of the selected backend
    pub fn backend_config(&self) -> BackendConfig {
        match self.backend {
            BackendKind::Shm => BackendConfig::Shm(self.shm.clone()),
            BackendKind::Modbus => BackendConfig::Modbus(self.modbus.clone()),
        }
    }

    /// Effective configuration as YAML
    pub fn to_yaml(&self) -> DriverResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| DriverError::config(format!("failed to serialize config: {e}")))
    }
}
