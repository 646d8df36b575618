//! Command line definition

use clap::{Parser, Subcommand};
use common::config::BackendKind;
use procdata::{Address, DataType, Value};
use std::path::PathBuf;

/// Process-data I/O server and client tool
#[derive(Debug, Parser)]
#[command(name = "iosrv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true, env = "IOSRV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend override (shm, modbus)
    #[arg(short, long, global = true)]
    pub backend: Option<BackendKind>,

    /// Log level override (ignored when RUST_LOG is set)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the shm segment and serve client commands until stopped
    Serve {
        /// Segment file override
        #[arg(long)]
        path: Option<PathBuf>,

        /// Bytes per area override
        #[arg(long)]
        area_size: Option<usize>,
    },

    /// Poll the backend periodically and log every changed byte
    Poll {
        /// Polling interval override in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Send one command through the configured backend
    Send {
        #[command(subcommand)]
        request: SendCommand,
    },

    /// Read addresses after one update (e.g. `I12.3`, `MW10`)
    Read {
        #[arg(required = true)]
        addresses: Vec<Address>,

        /// Data type of every address
        #[arg(long = "as", default_value = "byte")]
        data_type: DataType,

        /// Print one JSON object per address
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as YAML
    Config,
}

#[derive(Debug, Clone, Subcommand)]
pub enum SendCommand {
    /// Liveness check (shm only)
    Ping,
    /// Ask the shm server to stop
    Exit,
    /// Set one bit
    Set { address: Address },
    /// Reset one bit
    Reset { address: Address },
    /// Invert one bit
    Invert { address: Address },
    /// Set several bits in one command
    SetBits {
        #[arg(required = true)]
        addresses: Vec<Address>,
    },
    WriteByte { address: Address, value: String },
    WriteWord { address: Address, value: String },
    WriteDword { address: Address, value: String },
    WriteInt { address: Address, value: String },
    WriteReal { address: Address, value: String },
}

/// Parsed form of a [`SendCommand`]
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Ping,
    Exit,
    SetBit(Address),
    ResetBit(Address),
    InvertBit(Address),
    SetBits(Vec<Address>),
    Write(Address, Value),
}

impl SendCommand {
    pub fn into_request(self) -> errors::DriverResult<Request> {
        let write = |address, data_type, text: &str| {
            Value::parse(data_type, text).map(|value| Request::Write(address, value))
        };
        match self {
            SendCommand::Ping => Ok(Request::Ping),
            SendCommand::Exit => Ok(Request::Exit),
            SendCommand::Set { address } => Ok(Request::SetBit(address)),
            SendCommand::Reset { address } => Ok(Request::ResetBit(address)),
            SendCommand::Invert { address } => Ok(Request::InvertBit(address)),
            SendCommand::SetBits { addresses } => Ok(Request::SetBits(addresses)),
            SendCommand::WriteByte { address, value } => write(address, DataType::Byte, &value),
            SendCommand::WriteWord { address, value } => write(address, DataType::Word, &value),
            SendCommand::WriteDword { address, value } => write(address, DataType::DWord, &value),
            SendCommand::WriteInt { address, value } => write(address, DataType::Int, &value),
            SendCommand::WriteReal { address, value } => write(address, DataType::Real, &value),
        }
    }
}
