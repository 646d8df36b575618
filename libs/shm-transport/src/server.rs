//! Server side of the mailbox handshake
//!
//! The server owns the segment: it creates and initializes it on startup and
//! removes the file when dropped. Its polling loop never blocks on the
//! request lock; a contended cycle is skipped.

use crate::command::{command_name, reply, Command};
use crate::layout::Mailbox;
use crate::segment::Segment;
use errors::{DriverResult, ProtocolError};
use parking_lot::Mutex;
use procdata::{ProcessDataView, ProcessImage};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one polling cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No request waiting
    Idle,
    /// Request lock held by a client; cycle skipped
    Contended,
    /// A request was dispatched and answered OK/PONG
    Served { command: i32 },
    /// Both flags were set; the mailbox was cleared
    Reset { lost_command: i32 },
}

/// Server-side counters
#[derive(Debug, Default)]
pub struct ServerStats {
    pub served: AtomicU64,
    pub failed: AtomicU64,
    pub resets: AtomicU64,
}

/// Owner of one shm segment
#[derive(Debug)]
pub struct ShmServer {
    segment: Segment,
    lock_timeout: Duration,
    exit_requested: AtomicBool,
    stats: ServerStats,
    /// `(command, code)` of an executed request whose reply is not posted yet
    unposted: Mutex<Option<(i32, i32)>>,
}

impl ShmServer {
    /// Create the segment at `path` with `area_size` bytes per area
    pub fn create(path: &Path, area_size: usize, lock_timeout: Duration) -> DriverResult<Self> {
        let segment = Segment::create(path, area_size)?;
        info!(
            "Shm server ready at {:?} ({} bytes per area)",
            path, area_size
        );
        Ok(Self {
            segment,
            lock_timeout,
            exit_requested: AtomicBool::new(false),
            stats: ServerStats::default(),
            unposted: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        self.segment.path()
    }

    pub fn area_size(&self) -> usize {
        self.segment.area_size()
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Set once an EXIT command has been served
    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::Acquire)
    }

    /// Copy of the mailbox, for diagnostics
    pub fn mailbox_snapshot(&self) -> DriverResult<Mailbox> {
        Ok(*self
            .segment
            .block()
            .mailbox
            .lock_timeout(self.lock_timeout)?)
    }

    /// Local access to the mirror (simulator/gateway side)
    pub fn with_process_data<R>(
        &self,
        f: impl FnOnce(&mut ProcessDataView<'_>) -> R,
    ) -> DriverResult<R> {
        self.segment.with_data(self.lock_timeout, f)
    }

    pub fn heartbeat(&self) {
        self.segment.block().header.touch();
    }

    // ========== Polling ==========

    /// One polling cycle.
    ///
    /// A request that fails validation or execution is still answered
    /// (with FAILED); the error is then returned to the caller of this cycle.
    /// A request is executed once: if its reply cannot be posted, the next
    /// cycle only retries the post.
    pub fn poll_once(&self) -> DriverResult<PollOutcome> {
        let block = self.segment.block();

        let mut unposted = self.unposted.lock();
        if let Some((command, code)) = *unposted {
            self.post_reply(command, code)?;
            *unposted = None;
            debug!("Posted deferred reply {} for {}", code, command_name(command));
            return if code == reply::FAILED {
                Err(ProtocolError::CommandFailed { command, code }.into())
            } else {
                Ok(PollOutcome::Served { command })
            };
        }

        let (command, payload) = {
            let Some(mut mailbox) = block.mailbox.try_lock() else {
                return Ok(PollOutcome::Contended);
            };
            match (mailbox.request_pending(), mailbox.reply_pending()) {
                (true, true) => {
                    let lost_command = mailbox.command;
                    mailbox.reset();
                    self.stats.resets.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Shm mailbox desync (both flags set), dropped {} ({})",
                        command_name(lost_command),
                        lost_command
                    );
                    return Ok(PollOutcome::Reset { lost_command });
                },
                (true, false) => (mailbox.command, mailbox.payload().map(<[i32]>::to_vec)),
                _ => return Ok(PollOutcome::Idle),
            }
        };

        let result = match payload {
            Some(values) => self.dispatch(command, &values),
            None => Err(
                ProtocolError::MalformedFrame("request length out of bounds".into()).into(),
            ),
        };
        let code = match &result {
            Ok(code) => *code,
            Err(_) => reply::FAILED,
        };

        if result.is_ok() {
            self.stats.served.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }

        *unposted = Some((command, code));
        if let Err(e) = self.post_reply(command, code) {
            warn!(
                "Reply for {} not posted, retrying next cycle: {}",
                command_name(command),
                e
            );
            return Err(e);
        }
        *unposted = None;

        result.map(|_| PollOutcome::Served { command })
    }

    /// Write the reply and wake the waiting client
    fn post_reply(&self, command: i32, code: i32) -> DriverResult<()> {
        let block = self.segment.block();
        {
            let mut mailbox = block.mailbox.lock_timeout(self.lock_timeout)?;
            mailbox.post_reply(command, code);
        }
        // The sequence counter is atomic; the lock only orders the wake-up
        // after a client that is still sampling it.
        match block.reply_lock.lock_timeout(self.lock_timeout) {
            Ok(_reply) => block.reply_signal.notify_all(),
            Err(e) => {
                warn!("Reply lock unavailable, signalling anyway: {}", e);
                block.reply_signal.notify_all();
            },
        }
        Ok(())
    }

    fn dispatch(&self, command: i32, values: &[i32]) -> DriverResult<i32> {
        let decoded = Command::decode(command, values)?;
        debug!("Shm dispatch: {}", decoded);

        match &decoded {
            Command::Exit => {
                self.exit_requested.store(true, Ordering::Release);
                info!("Shm server received EXIT");
            },
            Command::Ping => {},
            other => self.with_process_data(|view| apply(view, other))??,
        }
        Ok(decoded.success_code())
    }

    /// Poll until EXIT is served or `shutdown` is raised.
    ///
    /// Per-request errors are logged and the loop continues.
    pub fn run(&self, interval: Duration, shutdown: &AtomicBool) -> DriverResult<()> {
        info!("Shm server polling every {:?}", interval);
        while !shutdown.load(Ordering::Acquire) && !self.exit_requested() {
            self.heartbeat();
            match self.poll_once() {
                Ok(PollOutcome::Served { .. }) => continue,
                Ok(_) => {},
                Err(e) => warn!("Shm request failed [{}]: {}", e.error_code(), e),
            }
            std::thread::sleep(interval);
        }
        info!(
            "Shm server loop stopped (served {}, failed {}, resets {})",
            self.stats.served.load(Ordering::Relaxed),
            self.stats.failed.load(Ordering::Relaxed),
            self.stats.resets.load(Ordering::Relaxed)
        );
        Ok(())
    }
}

impl Drop for ShmServer {
    fn drop(&mut self) {
        match std::fs::remove_file(self.segment.path()) {
            Ok(()) => debug!("Removed shm segment {:?}", self.segment.path()),
            Err(e) => warn!("Failed to remove shm segment {:?}: {}", self.segment.path(), e),
        }
    }
}

fn apply(view: &mut ProcessDataView<'_>, command: &Command) -> DriverResult<()> {
    match command {
        Command::Exit | Command::Ping => Ok(()),
        Command::SetBit(addr) => view.set_bit(*addr),
        Command::ResetBit(addr) => view.reset_bit(*addr),
        Command::InvertBit(addr) => view.invert_bit(*addr),
        Command::SetBits(addrs) => view.set_bits(addrs),
        Command::WriteByte(addr, v) => view.write_byte(*addr, *v),
        Command::WriteWord(addr, v) => view.write_word(*addr, *v),
        Command::WriteDWord(addr, v) => view.write_dword(*addr, *v),
        Command::WriteInt(addr, v) => view.write_int(*addr, *v),
        Command::WriteReal(addr, v) => view.write_real(*addr, *v),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::command::id;
    use errors::DriverError;
    use procdata::{Address, Area};
    use tracing_test::traced_test;

    const LOCK: Duration = Duration::from_secs(1);

    fn server(dir: &tempfile::TempDir) -> ShmServer {
        ShmServer::create(&dir.path().join("srv.shm"), 32, LOCK).unwrap()
    }

    fn post(server: &ShmServer, command: i32, values: &[i32]) {
        let mut mailbox = server.segment.block().mailbox.try_lock().unwrap();
        mailbox.post_request(command, values);
    }

    #[test]
    fn test_idle_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(server(&dir).poll_once().unwrap(), PollOutcome::Idle);
    }

    #[test]
    fn test_contended_cycle_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(&dir);
        let _held = server.segment.block().mailbox.try_lock().unwrap();
        assert_eq!(server.poll_once().unwrap(), PollOutcome::Contended);
    }

    #[test]
    #[traced_test]
    fn test_desync_resets_mailbox() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(&dir);
        {
            let mut mailbox = server.segment.block().mailbox.try_lock().unwrap();
            mailbox.post_request(id::SET_BIT, &[2, 5, 3]);
            mailbox.reply_pending = 1;
        }

        assert_eq!(
            server.poll_once().unwrap(),
            PollOutcome::Reset {
                lost_command: id::SET_BIT
            }
        );
        let mailbox = server.mailbox_snapshot().unwrap();
        assert_eq!(mailbox, Mailbox::new());
        assert!(logs_contain("desync"));
        // Nothing was applied
        let byte = server
            .with_process_data(|v| v.get_byte(Address::byte(Area::Memory, 5)))
            .unwrap()
            .unwrap();
        assert_eq!(byte, 0);
    }

    #[test]
    fn test_set_bit_request_served() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(&dir);
        post(&server, id::SET_BIT, &[2, 5, 3]);

        assert_eq!(
            server.poll_once().unwrap(),
            PollOutcome::Served {
                command: id::SET_BIT
            }
        );
        let mailbox = server.mailbox_snapshot().unwrap();
        assert!(!mailbox.request_pending() && mailbox.reply_pending());
        assert_eq!(mailbox.payload(), Some(&[reply::OK][..]));
        let byte = server
            .with_process_data(|v| v.get_byte(Address::byte(Area::Memory, 5)))
            .unwrap()
            .unwrap();
        assert_eq!(byte, 8);
    }

    #[test]
    fn test_bad_request_still_answered() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(&dir);
        post(&server, id::WRITE_WORD, &[0, 31, 0, 1]); // straddles the area end

        let err = server.poll_once().unwrap_err();
        assert_eq!(err.error_code(), "BYTE_OUT_OF_RANGE");
        let mailbox = server.mailbox_snapshot().unwrap();
        assert!(mailbox.reply_pending());
        assert_eq!(mailbox.payload(), Some(&[reply::FAILED][..]));
        assert_eq!(server.stats().failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_unknown_area_answered_failed() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(&dir);
        post(&server, id::SET_BIT, &[9, 0, 0]);
        assert_eq!(
            server.poll_once().unwrap_err(),
            DriverError::Protocol(ProtocolError::UnknownArea(9))
        );
        assert_eq!(
            server.mailbox_snapshot().unwrap().payload(),
            Some(&[reply::FAILED][..])
        );
    }

    #[test]
    fn test_deferred_reply_is_not_executed_twice() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(&dir);
        let bit = Address::new(Area::Output, 1, 0);

        // A cycle that executed INVERT_BIT but could not post its reply
        post(&server, id::INVERT_BIT, &[1, 1, 0]);
        server
            .with_process_data(|v| v.invert_bit(bit))
            .unwrap()
            .unwrap();
        *server.unposted.lock() = Some((id::INVERT_BIT, reply::OK));

        assert_eq!(
            server.poll_once().unwrap(),
            PollOutcome::Served {
                command: id::INVERT_BIT
            }
        );
        // Inverted once, not again by the retry
        let set = server
            .with_process_data(|v| v.get_bit(bit))
            .unwrap()
            .unwrap();
        assert!(set);
        let mailbox = server.mailbox_snapshot().unwrap();
        assert!(!mailbox.request_pending() && mailbox.reply_pending());
        assert_eq!(mailbox.payload(), Some(&[reply::OK][..]));
        assert!(server.unposted.lock().is_none());
    }

    #[test]
    fn test_post_failure_keeps_reply_for_next_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("srv.shm");
        let server = ShmServer::create(&path, 32, Duration::from_millis(10)).unwrap();
        server.unposted.lock().replace((id::SET_BIT, reply::OK));

        // A client holds the mailbox: the retry fails and the reply is kept
        {
            let _held = server.segment.block().mailbox.try_lock().unwrap();
            assert!(server.poll_once().is_err());
        }
        assert_eq!(*server.unposted.lock(), Some((id::SET_BIT, reply::OK)));

        assert_eq!(
            server.poll_once().unwrap(),
            PollOutcome::Served {
                command: id::SET_BIT
            }
        );
        assert!(server.mailbox_snapshot().unwrap().reply_pending());
    }

    #[test]
    fn test_exit_sets_flag_and_stops_run() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(&dir);
        post(&server, id::EXIT, &[]);
        let shutdown = AtomicBool::new(false);
        server.run(Duration::from_millis(1), &shutdown).unwrap();
        assert!(server.exit_requested());
    }

    #[test]
    fn test_drop_removes_segment_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("srv.shm");
        let server = ShmServer::create(&path, 8, LOCK).unwrap();
        assert!(path.exists());
        drop(server);
        assert!(!path.exists());
    }
}
