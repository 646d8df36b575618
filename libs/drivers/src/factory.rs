//! Explicit construction of a backend's capability set

use crate::capability::{ProcessDataReader, ProcessDataUpdater, ProcessDataWriter};
use crate::modbus::{ModbusReader, ModbusUpdater, ModbusWriter};
use crate::shm::{ShmReader, ShmUpdater, ShmWriter};
use common::config::{BackendConfig, ModbusConfig, ShmConfig};
use errors::DriverResult;
use modbus_backend::{ModbusBackend, ModbusTcpLink, RegisterLink, TcpLinkConfig};
use shm_transport::{ShmClient, ShmOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One reader, one shared writer and one updater on the same backend.
///
/// The updater owns the buffer readers copy from; keep it alive as long as
/// the readers are used.
pub struct DriverSet {
    pub reader: Box<dyn ProcessDataReader>,
    pub writer: Arc<dyn ProcessDataWriter>,
    pub updater: Box<dyn ProcessDataUpdater>,
}

impl std::fmt::Debug for DriverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverSet")
            .field("backend", &self.updater.describe())
            .finish()
    }
}

/// Attach to the shm server at `path`
pub fn open_shm_driver(path: &Path, options: ShmOptions) -> DriverResult<DriverSet> {
    let client = Arc::new(ShmClient::attach(path, options)?);
    let updater = ShmUpdater::new(Arc::clone(&client));
    let reader = ShmReader::new(updater.access(), client.area_size());
    info!("Shm driver attached to {:?}", path);

    Ok(DriverSet {
        reader: Box::new(reader),
        writer: Arc::new(ShmWriter::new(client)),
        updater: Box::new(updater),
    })
}

/// Modbus driver over any register link
pub fn open_modbus_driver(
    link: Box<dyn RegisterLink>,
    register_count: usize,
) -> DriverResult<DriverSet> {
    let backend = Arc::new(ModbusBackend::new(link, register_count)?);
    let updater = ModbusUpdater::new(Arc::clone(&backend));
    let reader = ModbusReader::new(updater.access(), register_count);
    info!(
        "Modbus driver on {} ({} registers)",
        backend.describe(),
        register_count
    );

    Ok(DriverSet {
        reader: Box::new(reader),
        writer: Arc::new(ModbusWriter::new(backend)),
        updater: Box::new(updater),
    })
}

pub fn shm_options(config: &ShmConfig) -> ShmOptions {
    ShmOptions::default()
        .with_reply_timeout(config.reply_timeout())
        .with_lock_timeout(config.lock_timeout())
}

pub fn tcp_link_config(config: &ModbusConfig) -> TcpLinkConfig {
    TcpLinkConfig::new(config.host.clone(), config.port)
        .with_unit_id(config.unit_id)
        .with_timeouts(config.connect_timeout(), config.response_timeout())
}

/// Open the backend described by `config`; Modbus goes over TCP
pub fn open_driver(config: &BackendConfig) -> DriverResult<DriverSet> {
    match config {
        BackendConfig::Shm(shm) => open_shm_driver(&shm.path, shm_options(shm)),
        BackendConfig::Modbus(modbus) => {
            let link = ModbusTcpLink::new(tcp_link_config(modbus))?;
            open_modbus_driver(Box::new(link), modbus.register_count)
        },
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use errors::DriverError;
    use modbus_backend::MemoryLink;
    use procdata::{Address, Area};

    #[test]
    fn test_open_shm_without_server() {
        let dir = tempfile::tempdir().unwrap();
        let config = ShmConfig {
            path: dir.path().join("missing.shm"),
            ..ShmConfig::default()
        };
        let err = open_driver(&BackendConfig::Shm(config)).unwrap_err();
        assert!(matches!(err, DriverError::NotInitialized(_)), "{err:?}");
    }

    #[test]
    fn test_open_modbus_rejects_zero_registers() {
        let err = open_modbus_driver(Box::new(MemoryLink::new(0)), 0).unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
    }

    #[test]
    fn test_modbus_set_roundtrip() {
        let mut set = open_modbus_driver(Box::new(MemoryLink::new(8)), 8).unwrap();
        set.writer
            .write_real(Address::byte(Area::Output, 4), 1.5)
            .unwrap();
        set.updater.update().unwrap();
        set.reader.update_process_data().unwrap();
        assert_eq!(set.reader.get_real(Address::byte(Area::Output, 4)).unwrap(), 1.5);
        assert!(format!("{set:?}").contains("memory"));
    }

    #[test]
    fn test_tcp_link_config_from_settings() {
        let config = ModbusConfig {
            host: "10.1.2.3".to_string(),
            port: 1502,
            unit_id: 9,
            ..ModbusConfig::default()
        };
        let link = tcp_link_config(&config);
        assert_eq!(link.host, "10.1.2.3");
        assert_eq!(link.port, 1502);
        assert_eq!(link.unit_id, 9);
        assert_eq!(link.response_timeout, config.response_timeout());
    }
}
