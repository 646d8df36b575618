//! Configuration, logging and shutdown plumbing shared by the iosrv binaries

pub mod config;
pub mod logging;
pub mod shutdown;

pub use config::{
    default_shm_path, BackendConfig, BackendKind, IoConfig, LoggingConfig, ModbusConfig,
    ShmConfig,
};
pub use logging::init_logging;
pub use shutdown::{spawn_shutdown_watcher, wait_for_shutdown};
