//! Client/server handshake over two mappings of one segment file
//!
//! The server and the clients each map the file separately, the same way
//! two processes would.

// Allow unwrap() in tests for cleaner test code
#![allow(clippy::disallowed_methods)]

use errors::{DriverError, ProtocolError, TransportError};
use procdata::{Address, Area, ProcessData, ProcessImage};
use shm_transport::{id, reply, Command, PollOutcome, Segment, ShmClient, ShmOptions, ShmServer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const AREA_SIZE: usize = 64;
const POLL: Duration = Duration::from_millis(1);

fn segment_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("iosrv-test.shm")
}

fn options() -> ShmOptions {
    ShmOptions::default().with_reply_timeout(Duration::from_secs(5))
}

fn snapshot(client: &ShmClient) -> ProcessData {
    let mut data = ProcessData::new(client.area_size());
    client.read_process_data(&mut data).unwrap();
    data
}

/// Run the server loop on a scoped thread while `body` executes
fn with_running_server(server: &ShmServer, body: impl FnOnce()) {
    let shutdown = AtomicBool::new(false);
    std::thread::scope(|s| {
        let handle = s.spawn(|| server.run(POLL, &shutdown));
        body();
        shutdown.store(true, Ordering::Release);
        handle.join().unwrap().unwrap();
    });
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn test_ping_pong() {
    let dir = tempfile::tempdir().unwrap();
    let path = segment_path(&dir);
    let server = ShmServer::create(&path, AREA_SIZE, Duration::from_secs(1)).unwrap();
    let client = ShmClient::attach(&path, options()).unwrap();

    with_running_server(&server, || {
        assert_eq!(client.send(&Command::Ping).unwrap(), reply::PONG);
        assert!(client.is_server_alive(Duration::from_secs(5)));
    });
}

#[test]
fn test_set_bit_memory_byte_5() {
    let dir = tempfile::tempdir().unwrap();
    let path = segment_path(&dir);
    let server = ShmServer::create(&path, AREA_SIZE, Duration::from_secs(1)).unwrap();
    let client = ShmClient::attach(&path, options()).unwrap();

    with_running_server(&server, || {
        client.set_bit(Address::new(Area::Memory, 5, 3)).unwrap();
    });

    let data = snapshot(&client);
    assert_eq!(data.get_byte(Address::byte(Area::Memory, 5)).unwrap(), 8);
}

#[test]
fn test_set_bits_spans_input_and_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = segment_path(&dir);
    let server = ShmServer::create(&path, AREA_SIZE, Duration::from_secs(1)).unwrap();
    let client = ShmClient::attach(&path, options()).unwrap();

    let addrs = [
        Address::new(Area::Input, 10, 2),
        Address::new(Area::Output, 20, 7),
    ];
    let command = Command::SetBits(addrs.to_vec());
    assert_eq!(command.encode().unwrap().len(), 6);

    let before = snapshot(&client);
    with_running_server(&server, || {
        client.send(&command).unwrap();
    });
    let after = snapshot(&client);

    let mut expected = before;
    expected.area_mut(Area::Input)[10] = 0b0000_0100;
    expected.area_mut(Area::Output)[20] = 0b1000_0000;
    assert_eq!(after, expected);
}

#[test]
fn test_value_writes_reach_the_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let path = segment_path(&dir);
    let server = ShmServer::create(&path, AREA_SIZE, Duration::from_secs(1)).unwrap();
    let client = ShmClient::attach(&path, options()).unwrap();

    with_running_server(&server, || {
        client.write_byte(Address::byte(Area::Output, 0), 0x7F).unwrap();
        client.write_word(Address::byte(Area::Output, 1), 0xBEEF).unwrap();
        client.write_dword(Address::byte(Area::Memory, 8), 0xDEAD_BEEF).unwrap();
        client.write_int(Address::byte(Area::Memory, 12), -42).unwrap();
        client.write_real(Address::byte(Area::Input, 60), 3.25).unwrap();
        client.invert_bit(Address::new(Area::Output, 0, 7)).unwrap();
        client.reset_bit(Address::new(Area::Output, 0, 0)).unwrap();
    });

    let data = snapshot(&client);
    assert_eq!(data.get_byte(Address::byte(Area::Output, 0)).unwrap(), 0xFE);
    assert_eq!(data.get_word(Address::byte(Area::Output, 1)).unwrap(), 0xBEEF);
    assert_eq!(data.get_dword(Address::byte(Area::Memory, 8)).unwrap(), 0xDEAD_BEEF);
    assert_eq!(data.get_int(Address::byte(Area::Memory, 12)).unwrap(), -42);
    assert_eq!(data.get_real(Address::byte(Area::Input, 60)).unwrap(), 3.25);
}

#[test]
fn test_exit_stops_server_loop() {
    let dir = tempfile::tempdir().unwrap();
    let path = segment_path(&dir);
    let server = ShmServer::create(&path, AREA_SIZE, Duration::from_secs(1)).unwrap();
    let client = ShmClient::attach(&path, options()).unwrap();
    let shutdown = AtomicBool::new(false);

    std::thread::scope(|s| {
        let handle = s.spawn(|| server.run(POLL, &shutdown));
        client.exit().unwrap();
        handle.join().unwrap().unwrap();
    });
    assert!(server.exit_requested());
}

// ============================================================================
// Validation and failures
// ============================================================================

#[test]
fn test_out_of_range_rejected_before_mailbox() {
    let dir = tempfile::tempdir().unwrap();
    let path = segment_path(&dir);
    let server = ShmServer::create(&path, AREA_SIZE, Duration::from_secs(1)).unwrap();
    let client = ShmClient::attach(&path, options()).unwrap();

    // No server loop running: a request reaching the mailbox would time out
    let err = client
        .write_dword(Address::byte(Area::Output, AREA_SIZE as u32 - 3), 1)
        .unwrap_err();
    assert_eq!(err.error_code(), "BYTE_OUT_OF_RANGE");
    let mailbox = server.mailbox_snapshot().unwrap();
    assert!(!mailbox.request_pending() && !mailbox.reply_pending());
}

#[test]
fn test_failed_reply_surfaces_command_failed() {
    let dir = tempfile::tempdir().unwrap();
    let path = segment_path(&dir);
    let _server = ShmServer::create(&path, AREA_SIZE, Duration::from_secs(1)).unwrap();
    let client = ShmClient::attach(&path, options()).unwrap();
    let peer = Segment::attach(&path).unwrap();

    std::thread::scope(|s| {
        // Stand-in server that refuses everything
        s.spawn(|| loop {
            let block = peer.block();
            if let Some(mut mailbox) = block.mailbox.try_lock() {
                if mailbox.request_pending() {
                    let command = mailbox.command;
                    mailbox.post_reply(command, reply::FAILED);
                    drop(mailbox);
                    block.reply_signal.notify_all();
                    return;
                }
            }
            std::thread::sleep(POLL);
        });

        let err = client.set_bit(Address::new(Area::Input, 0, 0)).unwrap_err();
        assert_eq!(
            err,
            DriverError::Protocol(ProtocolError::CommandFailed {
                command: id::SET_BIT,
                code: reply::FAILED
            })
        );
    });
}

// ============================================================================
// Timeout and recovery
// ============================================================================

#[test]
fn test_timeout_then_not_ready_then_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let path = segment_path(&dir);
    let server = ShmServer::create(&path, AREA_SIZE, Duration::from_secs(1)).unwrap();
    let impatient = ShmClient::attach(
        &path,
        ShmOptions::default().with_reply_timeout(Duration::from_millis(50)),
    )
    .unwrap();
    let other = ShmClient::attach(&path, options()).unwrap();

    // Nobody polls: the request is left in the mailbox
    let err = impatient
        .set_bit(Address::new(Area::Memory, 1, 1))
        .unwrap_err();
    assert!(matches!(
        err,
        DriverError::Transport(TransportError::ReplyTimeout(_))
    ));

    // A second request before the first is consumed is refused
    let err = other.ping().unwrap_err();
    assert!(matches!(
        err,
        DriverError::Protocol(ProtocolError::NotReady {
            request_pending: true,
            reply_pending: false
        })
    ));

    // The server can still service the stale request
    assert_eq!(
        server.poll_once().unwrap(),
        PollOutcome::Served {
            command: id::SET_BIT
        }
    );
    assert_eq!(
        snapshot(&other)
            .get_byte(Address::byte(Area::Memory, 1))
            .unwrap(),
        0b10
    );

    // Its reply blocks the mailbox until drained
    assert!(matches!(
        other.ping(),
        Err(DriverError::Protocol(ProtocolError::NotReady {
            reply_pending: true,
            ..
        }))
    ));
    assert!(other.drain_stale_reply().unwrap());
    assert!(!other.drain_stale_reply().unwrap());

    with_running_server(&server, || {
        other.ping().unwrap();
    });
}

#[test]
fn test_late_reply_consumed_by_next_send() {
    let dir = tempfile::tempdir().unwrap();
    let path = segment_path(&dir);
    let server = ShmServer::create(&path, AREA_SIZE, Duration::from_secs(1)).unwrap();
    let client = ShmClient::attach(
        &path,
        ShmOptions::default().with_reply_timeout(Duration::from_millis(30)),
    )
    .unwrap();

    let err = client
        .invert_bit(Address::new(Area::Output, 2, 0))
        .unwrap_err();
    assert!(matches!(
        err,
        DriverError::Transport(TransportError::ReplyTimeout(_))
    ));
    assert_eq!(
        server.poll_once().unwrap(),
        PollOutcome::Served {
            command: id::INVERT_BIT
        }
    );

    // No explicit drain: the next request clears the late reply first
    with_running_server(&server, || {
        client.set_bit(Address::new(Area::Output, 2, 1)).unwrap();
        client.ping().unwrap();
    });
    assert_eq!(
        snapshot(&client)
            .get_byte(Address::byte(Area::Output, 2))
            .unwrap(),
        0b11
    );
    assert!(!client.drain_stale_reply().unwrap());
}

#[test]
fn test_concurrent_clients_in_one_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = segment_path(&dir);
    let server = ShmServer::create(&path, AREA_SIZE, Duration::from_secs(1)).unwrap();
    let client = ShmClient::attach(&path, options()).unwrap();

    with_running_server(&server, || {
        std::thread::scope(|s| {
            for byte in 0..8u32 {
                let client = &client;
                s.spawn(move || {
                    for bit in 0..8 {
                        client.set_bit(Address::new(Area::Output, byte, bit)).unwrap();
                    }
                });
            }
        });
    });

    let data = snapshot(&client);
    assert!(data.area(Area::Output)[..8].iter().all(|b| *b == 0xFF));
    assert!(data.area(Area::Output)[8..].iter().all(|b| *b == 0));
}

#[test]
fn test_attach_without_server() {
    let dir = tempfile::tempdir().unwrap();
    let err = ShmClient::attach(Path::new(&segment_path(&dir)), options()).unwrap_err();
    assert!(matches!(err, DriverError::NotInitialized(_)));
}
