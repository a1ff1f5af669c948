//! Host-side scenarios: listings, diagnostics and device teardown.

use std::fs;

use modsurfer_hw::sim::{Event, SimMachine, SimPlayer};
use modsurfer_hw::{HardwareSession, KeyboardState, SessionConfig};
use modsurfer_system::host::NodeKind;
use modsurfer_system::sim::{FailPoint, HostCall, SimHost};
use modsurfer_system::{list_drives, list_path, print_error, EntryKind, Environment, Error, InputTap, StdFs};

#[test]
fn listing_a_directory_tags_and_sorts_entries() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("TRACK.MOD"), b"M.K.").unwrap();
    fs::write(dir.path().join("readme.txt"), b"hello").unwrap();
    fs::create_dir(dir.path().join("Songs")).unwrap();

    let path = dir.path().to_str().unwrap();
    let list = list_path(&mut StdFs, path).unwrap();

    assert_eq!(list.names(), ["/", "README.TXT", "SONGS", "TRACK.MOD"]);
    let kinds: Vec<EntryKind> = list.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, [EntryKind::Dir, EntryKind::File, EntryKind::Dir, EntryKind::Module]);
}

#[test]
fn missing_directory_is_an_invalid_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");

    let err = list_path(&mut StdFs, missing.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, Error::InvalidPath(_)));
}

#[test]
fn drives_are_running_devices_only() {
    let host = SimHost::new()
        .with_device_node(NodeKind::Device, "DH0", true)
        .with_device_node(NodeKind::Device, "DF0", true)
        .with_device_node(NodeKind::Device, "DF1", false)
        .with_device_node(NodeKind::Volume, "Workbench", true)
        .with_device_node(NodeKind::Assign, "LIBS", true);
    let mut machine = SimMachine::new();
    let mut session = HardwareSession::new(SessionConfig::default());

    let drives = list_drives(&mut session, &mut machine, &host);

    assert_eq!(drives.names(), ["DF0", "DH0"]);
    assert!(drives.iter().all(|e| e.kind == EntryKind::Dir));
    assert_eq!(machine.trace(), &[Event::Forbid, Event::Permit]);
    assert!(!session.task_switch_suppressed());
}

#[test]
fn assertion_lends_the_blitter_to_the_console() {
    let mut host = SimHost::new();
    let mut env = Environment::init(&mut host).unwrap();
    let mut machine = SimMachine::new();
    let mut session = HardwareSession::new(SessionConfig::default());

    session.own_blitter(&mut machine);
    machine.clear_trace();

    let printed = print_error(&mut session, &mut machine, Some(&mut host), "x != 0");

    assert!(printed);
    assert_eq!(host.output(), "modsurfer: assert(x != 0) failed\n");
    assert_eq!(machine.trace(), &[Event::DisownBlitter, Event::OwnBlitter]);
    assert!(session.blitter_owned());

    session.disown_blitter(&mut machine);
    env.fini(&mut host);
}

#[test]
fn assertion_is_dropped_without_dos_or_with_switching_off() {
    let mut host = SimHost::new();
    let mut machine = SimMachine::new();
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();
    let mut session = HardwareSession::new(SessionConfig::default());

    assert!(!print_error(&mut session, &mut machine, None::<&mut SimHost>, "no dos"));

    session.own_blitter(&mut machine);
    session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut player);
    machine.clear_trace();

    assert!(!print_error(&mut session, &mut machine, Some(&mut host), "in control"));
    assert!(host.output().is_empty());
    assert!(machine.trace().is_empty());

    session.release_exclusive_control(&mut machine, &mut player);
}

#[test]
fn input_tap_unwinds_from_every_failure_point() {
    let cases = [
        (FailPoint::CreatePort, 0),
        (FailPoint::CreateRequest, 1),
        (FailPoint::OpenDevice(-3), 2),
        (FailPoint::AllocHandler, 3),
        (FailPoint::AddHandler(-5), 4),
    ];

    for (point, acquired) in cases {
        let mut host = SimHost::new();
        host.fail_at(point);

        let err = InputTap::open(&mut host, 0x0002_8000, 0).err().unwrap();
        match point {
            FailPoint::CreatePort => assert!(matches!(err, Error::PortUnavailable)),
            FailPoint::CreateRequest | FailPoint::AllocHandler => assert!(matches!(err, Error::OutOfMemory)),
            FailPoint::OpenDevice(code) => {
                assert!(matches!(err, Error::DeviceUnavailable { unit: 0, code: c, .. } if c == code))
            }
            FailPoint::AddHandler(code) => assert!(matches!(err, Error::HandlerRejected { code: c } if c == code)),
        }

        assert_eq!(host.outstanding(), 0, "{:?}", point);
        assert!(host.installed_handlers().is_empty());

        // Everything acquired is released, newest first.
        let calls = host.calls();
        assert_eq!(calls.len(), acquired * 2, "{:?}: {:?}", point, calls);
        for (taken, released) in calls[..acquired].iter().zip(calls[acquired..].iter().rev()) {
            let pair = match (taken, released) {
                (HostCall::CreatePort(a), HostCall::DeletePort(b)) => a == b,
                (HostCall::CreateRequest(a), HostCall::DeleteRequest(b)) => a == b,
                (HostCall::OpenDevice { .. }, HostCall::CloseDevice(_)) => true,
                (HostCall::AllocHandler(a), HostCall::FreeHandler(b)) => a == b,
                _ => false,
            };
            assert!(pair, "{:?} undone by {:?}", taken, released);
        }
    }
}

#[test]
fn open_tap_is_visible_to_the_input_chain() {
    let mut host = SimHost::new();
    let mut tap = InputTap::open(&mut host, 0x0002_8000, 0x0004_0000).unwrap();

    let micros = modsurfer_system::query_microsecond_clock(tap.devices()).unwrap();
    assert!(micros < 1_000_000);
    drop(tap);

    assert_eq!(host.outstanding(), 0);
    assert!(host.installed_handlers().is_empty());
}
