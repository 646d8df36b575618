//! Modbus TCP register link
//!
//! Framing, transaction matching and exception decoding come from
//! `tokio-modbus`. Its sync client drives the socket on a private
//! current-thread runtime, so every call blocks the calling OS thread for one
//! round trip. A single link serves one request at a time; the backend
//! serializes callers.

use crate::constants::{
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_REGISTERS,
    MAX_READ_REGISTERS, MAX_WRITE_REGISTERS,
};
use crate::link::RegisterLink;
use errors::{DriverError, DriverResult, TransportError};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;
use tokio_modbus::client::sync::{self, Reader, Writer};
use tokio_modbus::{ExceptionCode, Slave};
use tracing::{debug, error, info, warn};

/// Where and how to reach one Modbus TCP slave
#[derive(Debug, Clone)]
pub struct TcpLinkConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
}

impl TcpLinkConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id: 1,
            connect_timeout: Duration::from_secs(3),
            response_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, response: Duration) -> Self {
        self.connect_timeout = connect;
        self.response_timeout = response;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn socket_addr(&self) -> DriverResult<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                DriverError::connection(format!("Invalid address {}: {e}", self.endpoint()))
            })?
            .next()
            .ok_or_else(|| {
                DriverError::connection(format!("{} did not resolve", self.endpoint()))
            })
    }
}

/// Blocking Modbus TCP client for register tables
pub struct ModbusTcpLink {
    config: TcpLinkConfig,
    context: Option<sync::Context>,
}

impl std::fmt::Debug for ModbusTcpLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusTcpLink")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl ModbusTcpLink {
    /// Build the link; the connection is opened on first use
    pub fn new(config: TcpLinkConfig) -> DriverResult<Self> {
        Ok(Self {
            config,
            context: None,
        })
    }

    pub fn config(&self) -> &TcpLinkConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    pub fn connect(&mut self) -> DriverResult<()> {
        let addr = self.config.socket_addr()?;
        debug!("TCP connecting: {}", addr);

        let mut context = sync::tcp::connect_slave_with_timeout(
            addr,
            Slave(self.config.unit_id),
            Some(self.config.connect_timeout),
        )
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                warn!("TCP timeout: {}", addr);
                DriverError::from(TransportError::LinkTimeout(format!(
                    "Connection to {addr} timed out"
                )))
            } else {
                error!("TCP err: {} - {}", addr, e);
                DriverError::connection(format!("Failed to connect to {addr}: {e}"))
            }
        })?;
        context.set_timeout(Some(self.config.response_timeout));

        info!("TCP connected: {}", addr);
        self.context = Some(context);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.context.take().is_some() {
            info!("TCP disconnected: {}", self.config.endpoint());
        }
    }

    /// Run one request on a live context, connecting first if needed.
    ///
    /// Link failures drop the connection; the next call reconnects. A
    /// Modbus exception is a device answer and keeps it.
    fn call<T>(
        &mut self,
        function: u8,
        request: impl FnOnce(&mut sync::Context) -> tokio_modbus::Result<T>,
    ) -> DriverResult<T> {
        if self.context.is_none() {
            self.connect()?;
        }
        let context = self
            .context
            .as_mut()
            .ok_or(DriverError::Transport(TransportError::NotConnected))?;

        let result = match request(context) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(code)) => Err(exception(function, code)),
            Err(e) => Err(link_error(&e)),
        };
        if let Err(e) = &result {
            if e.needs_reconnect() {
                warn!(
                    "Modbus link {} failed, reconnecting on next request: {}",
                    self.describe(),
                    e
                );
                self.disconnect();
            }
        }
        result
    }

    fn read_registers(&mut self, function: u8, start: u16, out: &mut [u16]) -> DriverResult<()> {
        for (i, chunk) in out.chunks_mut(MAX_READ_REGISTERS).enumerate() {
            let chunk_start = offset_start(start, i * MAX_READ_REGISTERS)?;
            let quantity = chunk.len() as u16;
            let values = self.call(function, |ctx| {
                if function == FC_READ_INPUT_REGISTERS {
                    ctx.read_input_registers(chunk_start, quantity)
                } else {
                    ctx.read_holding_registers(chunk_start, quantity)
                }
            })?;
            if values.len() != chunk.len() {
                let e = DriverError::malformed(format!(
                    "asked for {} registers at {chunk_start}, got {}",
                    chunk.len(),
                    values.len()
                ));
                self.disconnect();
                return Err(e);
            }
            chunk.copy_from_slice(&values);
        }
        Ok(())
    }
}

impl RegisterLink for ModbusTcpLink {
    fn read_holding(&mut self, start: u16, out: &mut [u16]) -> DriverResult<()> {
        self.read_registers(FC_READ_HOLDING_REGISTERS, start, out)
    }

    fn read_input(&mut self, start: u16, out: &mut [u16]) -> DriverResult<()> {
        self.read_registers(FC_READ_INPUT_REGISTERS, start, out)
    }

    fn write_holding(&mut self, start: u16, values: &[u16]) -> DriverResult<()> {
        for (i, chunk) in values.chunks(MAX_WRITE_REGISTERS).enumerate() {
            let chunk_start = offset_start(start, i * MAX_WRITE_REGISTERS)?;
            self.call(FC_WRITE_MULTIPLE_REGISTERS, |ctx| {
                ctx.write_multiple_registers(chunk_start, chunk)
            })?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("modbus-tcp://{} unit {}", self.config.endpoint(), self.config.unit_id)
    }
}

fn offset_start(start: u16, offset: usize) -> DriverResult<u16> {
    u16::try_from(start as usize + offset).map_err(|_| {
        DriverError::malformed(format!("register {start} + {offset} exceeds 16-bit addressing"))
    })
}

fn exception(function: u8, code: ExceptionCode) -> DriverError {
    debug!("Modbus exception on FC{:02X}: {:?}", function, code);
    TransportError::Exception {
        function,
        code: u8::from(code),
    }
    .into()
}

fn link_error(err: &tokio_modbus::Error) -> DriverError {
    match err {
        tokio_modbus::Error::Transport(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            TransportError::LinkTimeout(format!("TCP response timeout: {io}")).into()
        },
        tokio_modbus::Error::Transport(io) => TransportError::Io(io.to_string()).into(),
        tokio_modbus::Error::Protocol(e) => DriverError::malformed(e.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_offset_start_overflow() {
        assert_eq!(offset_start(100, 125).unwrap(), 225);
        assert!(offset_start(65_500, 125).is_err());
    }

    #[test]
    fn test_new_does_not_connect() {
        let link = ModbusTcpLink::new(TcpLinkConfig::new("127.0.0.1", 1)).unwrap();
        assert!(!link.is_connected());
        assert_eq!(link.describe(), "modbus-tcp://127.0.0.1:1 unit 1");
    }

    #[test]
    fn test_exception_keeps_code() {
        let err = exception(FC_READ_HOLDING_REGISTERS, ExceptionCode::IllegalDataAddress);
        assert_eq!(
            err,
            DriverError::Transport(TransportError::Exception {
                function: 0x03,
                code: 0x02
            })
        );
        assert!(!err.needs_reconnect());
    }

    #[test]
    fn test_link_errors_need_reconnect() {
        let timeout = tokio_modbus::Error::Transport(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "slow slave",
        ));
        assert!(matches!(
            link_error(&timeout),
            DriverError::Transport(TransportError::LinkTimeout(_))
        ));
        let reset = tokio_modbus::Error::Transport(std::io::ErrorKind::ConnectionReset.into());
        assert!(link_error(&reset).needs_reconnect());
    }
}
