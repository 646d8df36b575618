//! Client side of the mailbox handshake
//!
//! ```text
//! Idle ──post request──▶ AwaitingReply ──reply consumed──▶ Idle
//!                              │
//!                              └──timeout──▶ ReplyTimeout (mailbox left as-is)
//! ```
//!
//! A timed-out request stays in the mailbox. The server still serves it on
//! its next poll. The client remembers the command it gave up on and consumes
//! that late reply at the start of its next `send`, so one timeout never
//! blocks later requests. [`ShmClient::drain_stale_reply`] does the same on
//! demand.

use crate::command::{command_name, reply, Command};
use crate::segment::Segment;
use errors::{DriverResult, ProtocolError, TransportError};
use parking_lot::Mutex;
use procdata::codec::width;
use procdata::{Address, Area, ProcessData, ProcessDataView};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Client-side timing knobs
#[derive(Debug, Clone, Copy)]
pub struct ShmOptions {
    /// Bounded wait for the server's reply
    pub reply_timeout: Duration,
    /// Bounded wait for any segment lock
    pub lock_timeout: Duration,
}

impl Default for ShmOptions {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(5),
            lock_timeout: Duration::from_secs(1),
        }
    }
}

impl ShmOptions {
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

/// Attached client of one shm server
#[derive(Debug)]
pub struct ShmClient {
    segment: Segment,
    options: ShmOptions,
    /// One outstanding request per process. Holds the command id of a
    /// request that timed out before its reply was consumed.
    gate: Mutex<Option<i32>>,
}

impl ShmClient {
    pub fn attach(path: &Path, options: ShmOptions) -> DriverResult<Self> {
        Ok(Self {
            segment: Segment::attach(path)?,
            options,
            gate: Mutex::new(None),
        })
    }

    #[inline]
    pub fn area_size(&self) -> usize {
        self.segment.area_size()
    }

    pub fn options(&self) -> &ShmOptions {
        &self.options
    }

    /// True if the server refreshed its heartbeat within `max_age`
    pub fn is_server_alive(&self, max_age: Duration) -> bool {
        u128::from(self.segment.heartbeat_age_ms()) < max_age.as_millis()
    }

    // ========== Handshake ==========

    /// Send one command and wait for its reply.
    ///
    /// Addresses are range-checked against the segment geometry before the
    /// mailbox is touched. Returns the reply code on success.
    pub fn send(&self, command: &Command) -> DriverResult<i32> {
        self.prevalidate(command)?;
        let values = command.encode()?;
        let id = command.id();
        let block = self.segment.block();

        let mut stale = self.gate.lock();

        let observed = {
            let mut mailbox = block.mailbox.lock_timeout(self.options.lock_timeout)?;
            if let Some(stale_id) = *stale {
                let late_reply = !mailbox.request_pending()
                    && mailbox.reply_pending()
                    && mailbox.command == stale_id;
                if late_reply {
                    warn!(
                        "discarding late shm reply for {} (code {})",
                        command_name(stale_id),
                        mailbox.values[0]
                    );
                    mailbox.reply_pending = 0;
                    *stale = None;
                } else if !mailbox.request_pending() && !mailbox.reply_pending() {
                    *stale = None;
                }
            }
            if mailbox.request_pending() || mailbox.reply_pending() {
                return Err(ProtocolError::NotReady {
                    request_pending: mailbox.request_pending(),
                    reply_pending: mailbox.reply_pending(),
                }
                .into());
            }
            // Sampled before the request lock is released, so the server
            // cannot signal in between.
            let _reply = block.reply_lock.lock_timeout(self.options.lock_timeout)?;
            let observed = block.reply_signal.sequence();
            mailbox.post_request(id, &values);
            observed
        };
        debug!("shm request posted: {}", command);

        if !block
            .reply_signal
            .wait_for(observed, self.options.reply_timeout)
        {
            warn!(
                "shm reply timeout after {:?} for {}",
                self.options.reply_timeout,
                command_name(id)
            );
            *stale = Some(id);
            return Err(TransportError::ReplyTimeout(self.options.reply_timeout).into());
        }

        let (echo, code) = {
            let mut mailbox = block.mailbox.lock_timeout(self.options.lock_timeout)?;
            if mailbox.request_pending() || !mailbox.reply_pending() {
                return Err(ProtocolError::OutOfSequence {
                    request_pending: mailbox.request_pending(),
                    reply_pending: mailbox.reply_pending(),
                }
                .into());
            }
            let reply = (mailbox.command, mailbox.payload().map(<[i32]>::to_vec));
            mailbox.reply_pending = 0;
            reply
        };

        if echo != id {
            return Err(ProtocolError::CommandMismatch {
                expected: id,
                actual: echo,
            }
            .into());
        }
        let code = match code.as_deref() {
            Some([code]) => *code,
            Some(other) => {
                return Err(ProtocolError::LengthMismatch {
                    command: id,
                    expected: "1".to_string(),
                    actual: other.len() as i32,
                }
                .into())
            },
            None => {
                return Err(
                    ProtocolError::MalformedFrame("reply length out of bounds".into()).into(),
                )
            },
        };

        if code == command.success_code() {
            debug!("shm reply {} for {}", code, command_name(id));
            Ok(code)
        } else if code == reply::FAILED {
            Err(ProtocolError::CommandFailed { command: id, code }.into())
        } else {
            Err(ProtocolError::UnexpectedReply { command: id, code }.into())
        }
    }

    /// Consume a reply left behind by a request that timed out.
    ///
    /// Returns `true` if a stale reply was found and discarded.
    pub fn drain_stale_reply(&self) -> DriverResult<bool> {
        let mut stale = self.gate.lock();
        let mut mailbox = self
            .segment
            .block()
            .mailbox
            .lock_timeout(self.options.lock_timeout)?;
        if !mailbox.request_pending() && mailbox.reply_pending() {
            warn!(
                "discarding stale shm reply for {} (code {})",
                command_name(mailbox.command),
                mailbox.values[0]
            );
            mailbox.reply_pending = 0;
            *stale = None;
            return Ok(true);
        }
        Ok(false)
    }

    fn prevalidate(&self, command: &Command) -> DriverResult<()> {
        let max = self.area_size() as u32;
        let check = |addr: &Address, w: u32| addr.validate(&Area::ALL, max, w);
        match command {
            Command::Exit | Command::Ping => Ok(()),
            Command::SetBit(a) | Command::ResetBit(a) | Command::InvertBit(a) => check(a, width::BIT),
            Command::SetBits(addrs) => addrs.iter().try_for_each(|a| check(a, width::BIT)),
            Command::WriteByte(a, _) => check(a, width::BYTE),
            Command::WriteWord(a, _) => check(a, width::WORD),
            Command::WriteDWord(a, _) => check(a, width::DWORD),
            Command::WriteInt(a, _) => check(a, width::INT),
            Command::WriteReal(a, _) => check(a, width::REAL),
        }
    }

    // ========== Commands ==========

    pub fn ping(&self) -> DriverResult<()> {
        self.send(&Command::Ping).map(|_| ())
    }

    /// Ask the server loop to stop
    pub fn exit(&self) -> DriverResult<()> {
        self.send(&Command::Exit).map(|_| ())
    }

    pub fn set_bit(&self, addr: Address) -> DriverResult<()> {
        self.send(&Command::SetBit(addr)).map(|_| ())
    }

    pub fn reset_bit(&self, addr: Address) -> DriverResult<()> {
        self.send(&Command::ResetBit(addr)).map(|_| ())
    }

    pub fn invert_bit(&self, addr: Address) -> DriverResult<()> {
        self.send(&Command::InvertBit(addr)).map(|_| ())
    }

    pub fn set_bits(&self, addrs: &[Address]) -> DriverResult<()> {
        self.send(&Command::SetBits(addrs.to_vec())).map(|_| ())
    }

    pub fn write_byte(&self, addr: Address, value: u8) -> DriverResult<()> {
        self.send(&Command::WriteByte(addr, value)).map(|_| ())
    }

    pub fn write_word(&self, addr: Address, value: u16) -> DriverResult<()> {
        self.send(&Command::WriteWord(addr, value)).map(|_| ())
    }

    pub fn write_dword(&self, addr: Address, value: u32) -> DriverResult<()> {
        self.send(&Command::WriteDWord(addr, value)).map(|_| ())
    }

    pub fn write_int(&self, addr: Address, value: i32) -> DriverResult<()> {
        self.send(&Command::WriteInt(addr, value)).map(|_| ())
    }

    pub fn write_real(&self, addr: Address, value: f32) -> DriverResult<()> {
        self.send(&Command::WriteReal(addr, value)).map(|_| ())
    }

    // ========== Process data ==========

    /// Locked copy of the whole mirror into `dst`
    pub fn read_process_data(&self, dst: &mut ProcessData) -> DriverResult<()> {
        self.segment
            .with_data(self.options.lock_timeout, |view| view.copy_to(dst))?
    }

    /// Run `f` on the mirror under the data lock
    pub fn with_process_data<R>(
        &self,
        f: impl FnOnce(&mut ProcessDataView<'_>) -> R,
    ) -> DriverResult<R> {
        self.segment.with_data(self.options.lock_timeout, f)
    }
}
