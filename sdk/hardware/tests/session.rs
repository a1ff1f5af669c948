//! Acquire/release brackets run against the simulated machine.

use modsurfer_hw::arbiter::{ACQUIRE_ORDER, STEP_COUNT};
use modsurfer_hw::blit::CopyMode;
use modsurfer_hw::input::service_ports;
use modsurfer_hw::regs::{COPCON, DMACON, INTREQ};
use modsurfer_hw::sim::{Event, SimMachine, SimPlayer, SimRasterizer, HOST_DMACON, HOST_INTREQ};
use modsurfer_hw::{
    DmaCon, HardwareSession, IntFlags, KeyboardState, PlaneRef, Rasterizer, SessionConfig, Step, VectorSlot,
};

const DISPATCHER: u32 = 0x0002_4000;

fn config() -> SessionConfig {
    SessionConfig::default().with_level2_handler(DISPATCHER)
}

/// Encode a keycode the way the keyboard shifts it out.
fn wire(code: u8, up: bool) -> u8 {
    let byte = code | if up { 0x80 } else { 0 };
    !byte.rotate_left(1)
}

fn position(trace: &[Event], wanted: impl Fn(&Event) -> bool) -> Option<usize> {
    trace.iter().position(wanted)
}

#[test]
fn full_bracket_hands_back_every_register() {
    let mut machine = SimMachine::new();
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();
    let before = machine.registers();

    let mut session = HardwareSession::new(config());
    session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut player);
    assert!(session.has_control());
    assert_eq!(session.completed(), &ACQUIRE_ORDER[..]);

    let during = machine.registers();
    assert_eq!(during.level2_vector, DISPATCHER);
    assert_eq!(during.level6_vector, SimPlayer::HANDLER);
    assert!(during.dmacon.contains(config().dma_channels));
    assert_eq!(during.intena, IntFlags::INTEN | IntFlags::PORTS | IntFlags::EXTER);
    assert!(during.intreq.is_empty());

    session.release_exclusive_control(&mut machine, &mut player);
    assert_eq!(machine.registers(), before);
    assert_eq!(machine.forbid_depth(), 0);
    assert!(!player.is_installed());
}

#[test]
fn bracket_follows_a_relocated_vector_table() {
    let mut machine = SimMachine::new().with_vbr(0x0800_0000);
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();
    let before = machine.registers();

    let mut session = HardwareSession::new(config().with_audio_unit(0));
    session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut player);
    assert_eq!(machine.vector(VectorSlot::LEVEL_2), DISPATCHER);
    assert_eq!(player.installed_with(), Some((0x0800_0000, 0)));

    session.release_exclusive_control(&mut machine, &mut player);
    assert_eq!(machine.registers(), before);
}

fn release_writes(trace: &[Event]) -> Vec<u16> {
    trace
        .iter()
        .filter_map(|e| match *e {
            Event::Write { offset, .. } => Some(offset),
            _ => None,
        })
        .collect()
}

/// Register offsets a release writes after `count` acquire steps, in order.
fn expected_release_writes(count: usize) -> Vec<u16> {
    let mut writes = Vec::new();
    if count >= 9 {
        writes.push(0x09A);
    }
    if count >= 8 {
        writes.push(0x09A);
    }
    if count >= 5 {
        writes.extend([0x09C, 0x09C, 0x09C, 0x09C, 0x09A, 0x09A]);
    }
    if count >= 4 {
        writes.push(0x096);
    }
    if count >= 3 {
        writes.extend([0x02E, 0x080, 0x082]);
    }
    writes
}

#[test]
fn partial_acquire_unwinds_cleanly_at_every_step() {
    for count in 0..=STEP_COUNT {
        let mut machine = SimMachine::new();
        let mut keyboard = KeyboardState::new();
        let mut player = SimPlayer::new();
        let before = machine.registers();

        let mut session = HardwareSession::new(config());
        session.acquire_steps(&mut machine, &mut keyboard, &mut player, count);
        assert_eq!(session.completed(), &ACQUIRE_ORDER[..count]);
        assert_eq!(session.task_switch_suppressed(), count > 0);

        machine.clear_trace();
        session.release_exclusive_control(&mut machine, &mut player);
        assert_eq!(release_writes(machine.trace()), expected_release_writes(count), "after {} steps", count);
        assert_eq!(machine.registers(), before, "after {} steps", count);
        assert_eq!(machine.forbid_depth(), 0, "after {} steps", count);
        assert_eq!(session.snapshot(), HardwareSession::new(config()).snapshot());
    }
}

#[test]
fn acquire_in_stages_matches_acquire_in_one_go() {
    let mut staged = SimMachine::new();
    let mut whole = SimMachine::new();
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();

    let mut a = HardwareSession::new(config());
    a.acquire_steps(&mut staged, &mut keyboard, &mut player, 4);
    a.acquire_steps(&mut staged, &mut keyboard, &mut player, 2);
    assert_eq!(a.completed().len(), 4);
    a.acquire_steps(&mut staged, &mut keyboard, &mut player, STEP_COUNT + 3);

    let mut player_b = SimPlayer::new();
    let mut b = HardwareSession::new(config());
    b.acquire_exclusive_control(&mut whole, &mut keyboard, &mut player_b);

    assert_eq!(a.snapshot(), b.snapshot());
    assert_eq!(staged.registers(), whole.registers());

    a.release_exclusive_control(&mut staged, &mut player);
    b.release_exclusive_control(&mut whole, &mut player_b);
}

#[test]
fn second_release_does_nothing() {
    let mut machine = SimMachine::new();
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();

    let mut session = HardwareSession::new(config());
    session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut player);
    session.release_exclusive_control(&mut machine, &mut player);
    let after_first = machine.registers();

    machine.clear_trace();
    session.release_exclusive_control(&mut machine, &mut player);
    assert!(machine.trace().is_empty());
    assert_eq!(machine.registers(), after_first);
}

#[test]
fn nothing_else_runs_between_forbid_and_permit() {
    let mut machine = SimMachine::new();
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();

    let mut session = HardwareSession::new(config());
    let runs = machine.background_runs();

    session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut player);
    assert_eq!(machine.trace().first(), Some(&Event::Forbid));
    machine.start_blit(100);
    modsurfer_hw::sync::wait_blit(&mut machine);
    session.release_exclusive_control(&mut machine, &mut player);

    assert_eq!(machine.background_runs(), runs);
    let permit = position(machine.trace(), |e| *e == Event::Permit);
    let last_write = machine.trace().iter().rposition(|e| matches!(e, Event::Write { .. }));
    assert!(last_write < permit);

    let _ = machine.registers();
    modsurfer_hw::sync::beam_position(&mut machine);
    assert_eq!(machine.background_runs(), runs + 1);
}

#[test]
fn interrupt_requests_are_written_twice() {
    let mut machine = SimMachine::new();
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();

    let mut session = HardwareSession::new(config());
    session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut player);
    assert_eq!(machine.writes_to(INTREQ.offset()), vec![0x7FFF, 0x7FFF]);

    machine.clear_trace();
    session.release_exclusive_control(&mut machine, &mut player);
    let restore = 0x8000 | HOST_INTREQ.bits();
    assert_eq!(machine.writes_to(INTREQ.offset()), vec![0x7FFF, 0x7FFF, restore, restore]);
}

#[test]
fn doubled_writes_survive_a_dropping_bus() {
    let mut machine = SimMachine::new().with_flaky_intreq();
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();
    let before = machine.registers();

    let mut session = HardwareSession::new(config());
    session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut player);
    assert!(machine.registers().intreq.is_empty());
    assert!(machine.trace().iter().any(|e| matches!(e, Event::WriteDropped { .. })));

    session.release_exclusive_control(&mut machine, &mut player);
    assert_eq!(machine.registers(), before);
}

#[test]
fn copper_danger_is_restored_after_a_frame_and_an_idle_blitter() {
    let mut machine = SimMachine::new().with_beam_at(20);
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();

    let mut session = HardwareSession::new(config());
    session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut player);
    assert_eq!(COPCON.read(&mut machine).bits(), 0x0002);

    // Longer than a frame, so the blitter wait has real work after the vblank.
    machine.start_blit(20_000);
    machine.clear_trace();
    session.release_exclusive_control(&mut machine, &mut player);

    let trace = machine.trace();
    let copcon = position(trace, |e| matches!(e, Event::Write { offset: 0x02E, .. })).unwrap();
    let frame = position(trace, |e| *e == Event::FrameStart).unwrap();
    let idle = position(trace, |e| *e == Event::BlitDone).unwrap();
    assert!(frame < copcon);
    assert!(idle < copcon);
    assert!(!machine.blitter_busy());
    assert_eq!(machine.registers().copcon, 0);
}

#[test]
fn dma_restore_only_clears_what_the_session_turned_on() {
    let mut machine = SimMachine::new();
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();

    let mut session = HardwareSession::new(config());
    session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut player);
    let during = machine.registers().dmacon;
    assert!(during.contains(DmaCon::SPREN | DmaCon::AUD0EN | DmaCon::DSKEN));

    machine.clear_trace();
    session.release_exclusive_control(&mut machine, &mut player);

    let writes = machine.writes_to(DMACON.offset());
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0] & 0x8000, 0);
    assert_eq!(machine.registers().dmacon, HOST_DMACON);
}

#[test]
fn keyboard_is_cleared_and_fed_by_the_dispatcher() {
    let mut machine = SimMachine::new().with_flaky_intreq();
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();
    keyboard.apply_raw(wire(0x40, false));

    let mut session = HardwareSession::new(config());
    session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut player);
    assert!(keyboard.is_empty());

    machine.raise(IntFlags::PORTS);
    service_ports(&mut machine, &mut keyboard, Some(wire(0x45, false)));
    assert!(keyboard.is_pressed(0x45));
    assert!(!machine.registers().intreq.contains(IntFlags::PORTS));

    // No request pending: the byte is not ours.
    service_ports(&mut machine, &mut keyboard, Some(wire(0x45, true)));
    assert!(keyboard.is_pressed(0x45));

    session.release_exclusive_control(&mut machine, &mut player);
}

#[test]
fn clean_session_draws_and_ends_without_the_blitter() {
    let mut machine = SimMachine::new();
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();
    let mut renderer = SimRasterizer::default();
    let before = machine.registers();

    let plane = PlaneRef::new(0x0001_0000, 40, 0, 0);
    let mut session = HardwareSession::new(config());
    assert!(session.blitter(&mut machine).is_none());

    session.own_blitter(&mut machine);
    session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut player);

    for frame in 0..3u16 {
        modsurfer_hw::sync::wait_vblank(&mut machine);
        let mut blitter = session.blitter(&mut machine).unwrap();
        renderer.blit_fill(&mut blitter, plane, 320, 256);
        blitter.wait_blit();
        renderer.blit_copy(&mut blitter, plane.at(16, frame), plane.at(32, frame), 64, 16, CopyMode::default());
        blitter.wait_blit();
        renderer.blit_char(&mut blitter, 0x0003_8000, u16::from(b'A'), plane.at(0, 240), 1, true);
        blitter.wait_blit();
    }

    session.release_exclusive_control(&mut machine, &mut player);

    assert_eq!(renderer.ops.len(), 9);
    assert!(!machine.trace().contains(&Event::BlitCollision));
    assert!(!session.blitter_owned());
    assert!(!machine.blitter_owned());
    assert!(!session.task_switch_suppressed());
    assert_eq!(machine.registers(), before);
}

#[test]
fn lending_the_blitter_restores_prior_ownership() {
    let mut machine = SimMachine::new();
    let mut session = HardwareSession::new(config());

    session.own_blitter(&mut machine);
    let inside = session.with_blitter_lent(&mut machine, |m| m.blitter_owned());
    assert!(!inside);
    assert!(session.blitter_owned());
    assert!(machine.blitter_owned());

    session.disown_blitter(&mut machine);
    session.with_blitter_lent(&mut machine, |_| ());
    assert!(!session.blitter_owned());
    assert!(!machine.blitter_owned());

    let owns = machine.trace().iter().filter(|e| **e == Event::OwnBlitter).count();
    assert_eq!(owns, 2);
}

#[test]
fn lending_inside_a_session_leaves_saved_state_alone() {
    let mut machine = SimMachine::new();
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();
    let before = machine.registers();

    let mut session = HardwareSession::new(config());
    session.own_blitter(&mut machine);
    session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut player);
    let saved = session.snapshot();
    let during = machine.registers();

    machine.clear_trace();
    let inside = session.with_blitter_lent(&mut machine, |m| m.blitter_owned());
    assert!(!inside);
    assert_eq!(machine.trace(), &[Event::DisownBlitter, Event::OwnBlitter]);
    assert_eq!(session.snapshot(), saved);
    assert_eq!(machine.registers(), during);
    assert!(session.has_control());

    session.release_exclusive_control(&mut machine, &mut player);
    assert_eq!(machine.registers(), before);
}

#[test]
fn scoped_forbid_inside_the_session_keeps_switching_off() {
    let mut machine = SimMachine::new();
    let mut keyboard = KeyboardState::new();
    let mut player = SimPlayer::new();

    let mut session = HardwareSession::new(config());
    session.acquire_steps(&mut machine, &mut keyboard, &mut player, 1);
    assert_eq!(session.completed(), &[Step::ForbidTaskSwitch]);

    let depth = session.forbidden(&mut machine, |m| m.forbid_depth());
    assert_eq!(depth, 1);
    assert!(session.task_switch_suppressed());
    assert_eq!(machine.forbid_depth(), 1);

    session.release_exclusive_control(&mut machine, &mut player);
    assert_eq!(machine.forbid_depth(), 0);
}
