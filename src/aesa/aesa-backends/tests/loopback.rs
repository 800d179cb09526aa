use aesa_backends::{LoopbackConfig, LoopbackDevice};
use aesa_core::constants::{CUBE_RECORDS, CUBE_WORDS, RECORD_BITS};
use aesa_core::memory::{DeviceFlag, FlagMode, HostFlag};
use aesa_core::shutdown::{self, ResetHook, ShutdownSignal};
use aesa_core::{Handshake, ProtocolError, State, Timing};
use std::io::{self, Cursor};
use std::time::Duration;

// --- Fixtures ---

fn cube_text() -> String {
    let mut lines = Vec::with_capacity(CUBE_RECORDS);
    for record in 0..CUBE_RECORDS {
        // Record number in the last 13 bits, a marker bit up front
        let mut line = String::with_capacity(RECORD_BITS);
        line.push('1');
        line.push_str(&"0".repeat(RECORD_BITS - 14));
        line.push_str(&format!("{:013b}", record));
        lines.push(line);
    }
    lines.join("\n")
}

fn timing(done_timeout: Option<Duration>) -> Timing {
    Timing {
        done_timeout,
        ..Timing::default()
    }
}

fn no_output() -> io::Result<Vec<u8>> {
    Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
}

// --- Runs ---

#[test]
fn full_cube_round_trip() {
    let device = LoopbackDevice::new(LoopbackConfig::default());
    let mut channels = device.channels();
    let text = cube_text();
    let mut saved = Vec::new();

    let report = {
        let sink = &mut saved;
        let limit = Some(Duration::from_secs(10));
        let mut hs = Handshake::new(&mut channels, timing(limit), ShutdownSignal::never());
        let report = hs.run(|| Ok(Cursor::new(text)), move || Ok(sink)).unwrap();
        assert_eq!(hs.state(), State::Acknowledged);
        report
    };

    assert_eq!(report.pack.records, CUBE_RECORDS);
    assert_eq!(report.transferred, CUBE_WORDS);
    assert_eq!(report.results, CUBE_WORDS);

    // Device returned to idle after seeing RECEIVED
    assert_eq!(device.host_status(), 0x0F);
    assert_eq!(device.device_status(), DeviceFlag::Idle.mask());

    // The marker bit sits above the 20 result bits; word 15 keeps the record number
    let output = device.output();
    assert_eq!(output[0], 0);
    assert_eq!(output[15], 0);
    assert_eq!(output[16 * 5 + 15], 5);

    let text = String::from_utf8(saved).unwrap();
    let first: Vec<&str> = text.lines().next().unwrap().split_whitespace().collect();
    assert_eq!(first.len(), 64);
    // Record 1 word 15 sits at index 31, emitted before index 30
    assert_eq!(first[30], "00001");
    assert_eq!(text.lines().count(), CUBE_WORDS / 64);
}

#[test]
fn device_that_never_starts() {
    let device = LoopbackDevice::new(LoopbackConfig {
        start: false,
        ..LoopbackConfig::default()
    });
    let mut channels = device.channels();
    let mut hs = Handshake::new(&mut channels, timing(None), ShutdownSignal::never());

    let err = hs.run(|| Ok(Cursor::new(String::new())), no_output).unwrap_err();
    assert!(matches!(err, ProtocolError::DeviceNotStarted { .. }));
    assert_eq!(hs.state(), State::DeviceNotStarted);

    // Clear RESETN, set RESETN, set ACTIVE; nothing after
    assert_eq!(device.host_writes(), 3);
    assert_eq!(device.host_status(), HostFlag::Resetn.mask() | HostFlag::Active.mask());
}

#[test]
fn device_that_never_acknowledges() {
    let device = LoopbackDevice::new(LoopbackConfig {
        ack: false,
        ..LoopbackConfig::default()
    });
    let mut channels = device.channels();
    let mut hs = Handshake::new(&mut channels, timing(None), ShutdownSignal::never());

    let err = hs.run(|| Ok(Cursor::new(String::new())), no_output).unwrap_err();
    assert!(matches!(err, ProtocolError::DeviceNoAck { status: 0x02 }));
    assert_eq!(device.host_writes(), 4);
}

#[test]
fn done_is_never_observed_early() {
    let done_after = Duration::from_millis(50);
    let device = LoopbackDevice::new(LoopbackConfig {
        done_after,
        ..LoopbackConfig::default()
    });
    let mut channels = device.channels();
    let mut hs = Handshake::new(&mut channels, timing(None), ShutdownSignal::never());

    let report = hs.run(|| Ok(Cursor::new(String::new())), || Ok(io::sink())).unwrap();
    assert!(report.completion >= done_after);
}

#[test]
fn slow_device_hits_the_done_timeout() {
    let device = LoopbackDevice::new(LoopbackConfig {
        done_after: Duration::from_secs(2),
        ..LoopbackConfig::default()
    });
    let mut channels = device.channels();
    let limit = Duration::from_millis(20);
    let mut hs = Handshake::new(&mut channels, timing(Some(limit)), ShutdownSignal::never());

    match hs.run(|| Ok(Cursor::new(String::new())), no_output) {
        Err(ProtocolError::DoneTimeout { waited }) => assert!(waited >= limit),
        other => panic!("unexpected {:?}", other),
    }

    // Let the worker notice the reset instead of running out its delay
    drop(hs);
    shutdown::deactivate(&mut channels.host);
}

#[test]
fn shutdown_during_processing_resets_the_device() {
    let device = LoopbackDevice::new(LoopbackConfig {
        done_after: Duration::from_secs(30),
        ..LoopbackConfig::default()
    });
    let mut channels = device.channels();
    let (trigger, signal) = shutdown::channel();

    let waker = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        trigger.request();
    });

    let result = Handshake::new(&mut channels, timing(None), signal)
        .run(|| Ok(Cursor::new(String::new())), no_output);
    match result {
        Err(ProtocolError::Cancelled { state }) => assert_eq!(state, State::AwaitingCompletion),
        other => panic!("unexpected {:?}", other),
    }
    waker.join().unwrap();

    shutdown::deactivate(&mut channels.host);
    assert_eq!(device.host_status() & HostFlag::Resetn.mask(), 0);
    assert_eq!(device.device_status(), DeviceFlag::Idle.mask());

    // Worker abandons the job promptly
    device.join();
    assert!(device.output().iter().all(|w| *w == 0));
}

#[test]
fn armed_reset_hook_stops_the_device_from_another_thread() {
    let device = LoopbackDevice::new(LoopbackConfig {
        done_after: Duration::from_secs(30),
        ..LoopbackConfig::default()
    });
    let mut channels = device.channels();
    for flag in [HostFlag::Resetn, HostFlag::Active, HostFlag::Sent].iter().copied() {
        channels.host.set_flag(flag, FlagMode::Set);
    }
    assert_eq!(
        device.device_status(),
        DeviceFlag::Active.mask() | DeviceFlag::Received.mask()
    );

    let hook = ResetHook::default();
    let _armed = hook.arm(device.host_port());
    let remote = hook.clone();
    assert!(std::thread::spawn(move || remote.fire()).join().unwrap());

    assert_eq!(device.host_status() & HostFlag::Resetn.mask(), 0);
    assert_eq!(device.device_status(), DeviceFlag::Idle.mask());
    device.join();
    assert!(device.output().iter().all(|w| *w == 0));
}
