//! # Hardware takeover
//!
//! [`HardwareSession`] takes the custom chips, the level-2 vector and the
//! scheduler away from the host, and gives them back.
//!
//! Acquisition is a fixed sequence of [`Step`]s run in [`ACQUIRE_ORDER`].
//! Every completed step is pushed onto the session's audit log along with
//! whatever it displaced; release pops that log, so undo runs in exact
//! reverse order and only for steps that actually happened. Releasing twice,
//! or releasing a session that only got part way, is therefore safe.
//!
//! The order is load-bearing:
//!
//! - task switching is off for the whole bracket, since none of the register
//!   writes below are atomic with respect to a context switch;
//! - the blitter is idle before the copper danger bit changes hands, and on
//!   the way out a full frame plus a blitter wait pass before `COPCON` is
//!   restored, so no copper-started blit is still running into memory the
//!   host has taken back;
//! - only one interrupt source is live while the session dispatcher settles
//!   in, and the music player is hooked last.

use heapless::Vec;
use log::{debug, error, info};

use crate::audio::PeriodicHooks;
use crate::blit::BlitterGuard;
use crate::custom::CustomChips;
use crate::exec::{Exec, Machine, TaskSwitch};
use crate::input::KeyboardState;
use crate::regs::{
    CopCon, DmaCon, IntFlags, COP1LC, COPCON, DMACON, DMACONR, INTENA, INTENAR, INTREQ, INTREQR, SET_CLR,
};
use crate::sync;
use crate::vectors::{RestoreToken, VectorSlot};

pub const STEP_COUNT: usize = 9;

/// One stage of acquisition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    /// Forbid task switching.
    ForbidTaskSwitch,
    /// Wait out any blit already in flight.
    QuiesceBlitter,
    /// Save `COPCON` and the host copper list, hand the copper the blitter.
    CopperDanger,
    /// Save `DMACONR`, enable the session's channels.
    DmaChannels,
    /// Save and clear `INTENA` and `INTREQ`.
    MaskInterrupts,
    /// Forget any keys held before the session.
    ClearKeyboard,
    /// Save the level-2 vector, point it at the session dispatcher.
    PatchLevel2,
    /// Enable the dispatcher's interrupt source.
    EnableSource,
    /// Hook the music player.
    AudioHooks,
}

pub const ACQUIRE_ORDER: [Step; STEP_COUNT] = [
    Step::ForbidTaskSwitch,
    Step::QuiesceBlitter,
    Step::CopperDanger,
    Step::DmaChannels,
    Step::MaskInterrupts,
    Step::ClearKeyboard,
    Step::PatchLevel2,
    Step::EnableSource,
    Step::AudioHooks,
];

/// What the session switches on while it runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Written to `COPCON`.
    pub copcon: CopCon,
    /// Channels set in `DMACON`. `DMAEN` must be among them.
    pub dma_channels: DmaCon,
    /// Sources enabled once the dispatcher is installed.
    pub interrupt_sources: IntFlags,
    /// Address of the session's level-2 dispatcher.
    pub level2_handler: u32,
    /// Timing base handed to the music player (`1` = PAL).
    pub audio_unit: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            copcon: CopCon::CDANG,
            dma_channels: DmaCon::DMAEN | DmaCon::BPLEN | DmaCon::COPEN | DmaCon::BLTEN | DmaCon::SPREN,
            interrupt_sources: IntFlags::PORTS,
            level2_handler: 0,
            audio_unit: 1,
        }
    }
}

impl SessionConfig {
    pub fn with_level2_handler(mut self, address: u32) -> Self {
        self.level2_handler = address;
        self
    }

    pub fn with_audio_unit(mut self, unit: u8) -> Self {
        self.audio_unit = unit;
        self
    }
}

/// Plain copy of everything a session has captured, for comparison.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub task_switch_suppressed: bool,
    pub blitter_owned: bool,
    pub saved_copcon: Option<CopCon>,
    pub saved_copper_list: Option<u32>,
    pub saved_dmacon: Option<DmaCon>,
    pub saved_intena: Option<IntFlags>,
    pub saved_intreq: Option<IntFlags>,
    pub saved_level2: Option<u32>,
    pub completed: Vec<Step, STEP_COUNT>,
}

/// One acquire/release cycle of exclusive hardware control.
#[derive(Debug)]
pub struct HardwareSession {
    config: SessionConfig,
    task_switch: TaskSwitch,
    blitter_owned: bool,

    vbr: Option<u32>,
    saved_copcon: Option<CopCon>,
    saved_copper_list: Option<u32>,
    saved_dmacon: Option<DmaCon>,
    saved_intena: Option<IntFlags>,
    saved_intreq: Option<IntFlags>,
    level2: Option<RestoreToken>,

    completed: Vec<Step, STEP_COUNT>,
}

impl HardwareSession {
    pub const fn new(config: SessionConfig) -> Self {
        Self {
            config,
            task_switch: TaskSwitch::new(),
            blitter_owned: false,
            vbr: None,
            saved_copcon: None,
            saved_copper_list: None,
            saved_dmacon: None,
            saved_intena: None,
            saved_intreq: None,
            level2: None,
            completed: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Steps run so far, in order.
    pub fn completed(&self) -> &[Step] {
        &self.completed
    }

    pub fn has_control(&self) -> bool {
        self.completed.len() == STEP_COUNT
    }

    pub fn task_switch_suppressed(&self) -> bool {
        self.task_switch.is_suppressed()
    }

    pub fn blitter_owned(&self) -> bool {
        self.blitter_owned
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            task_switch_suppressed: self.task_switch.is_suppressed(),
            blitter_owned: self.blitter_owned,
            saved_copcon: self.saved_copcon,
            saved_copper_list: self.saved_copper_list,
            saved_dmacon: self.saved_dmacon,
            saved_intena: self.saved_intena,
            saved_intreq: self.saved_intreq,
            saved_level2: self.level2.as_ref().map(RestoreToken::previous),
            completed: self.completed.clone(),
        }
    }

    /// Take the machine. Call once, and pair with
    /// [`release_exclusive_control`](Self::release_exclusive_control).
    pub fn acquire_exclusive_control<M, A>(&mut self, machine: &mut M, keyboard: &mut KeyboardState, audio: &mut A)
    where
        M: Machine + ?Sized,
        A: PeriodicHooks<M> + ?Sized,
    {
        self.acquire_steps(machine, keyboard, audio, STEP_COUNT);
        info!("hardware control acquired");
    }

    /// Run the first `count` steps of [`ACQUIRE_ORDER`], continuing from
    /// wherever an earlier call stopped.
    pub fn acquire_steps<M, A>(&mut self, machine: &mut M, keyboard: &mut KeyboardState, audio: &mut A, count: usize)
    where
        M: Machine + ?Sized,
        A: PeriodicHooks<M> + ?Sized,
    {
        let start = self.completed.len();
        let end = count.min(STEP_COUNT);
        if start >= end {
            return;
        }

        for &step in &ACQUIRE_ORDER[start..end] {
            self.take(step, machine, keyboard, audio);
            // Capacity is STEP_COUNT and each step is pushed once.
            let _ = self.completed.push(step);
        }
    }

    /// Give the machine back, undoing exactly the steps that ran, then drop
    /// blitter ownership. A second call does nothing.
    pub fn release_exclusive_control<M, A>(&mut self, machine: &mut M, audio: &mut A)
    where
        M: Machine + ?Sized,
        A: PeriodicHooks<M> + ?Sized,
    {
        let had_control = !self.completed.is_empty();

        while let Some(step) = self.completed.pop() {
            self.undo(step, machine, audio);
        }
        self.disown_blitter(machine);

        if had_control {
            info!("hardware control released");
        }
    }

    fn take<M, A>(&mut self, step: Step, machine: &mut M, keyboard: &mut KeyboardState, audio: &mut A)
    where
        M: Machine + ?Sized,
        A: PeriodicHooks<M> + ?Sized,
    {
        debug!("acquire: {:?}", step);
        match step {
            Step::ForbidTaskSwitch => {
                self.task_switch.allow(machine, false);
            }
            Step::QuiesceBlitter => {
                sync::wait_blit(machine);
            }
            Step::CopperDanger => {
                self.saved_copcon = Some(COPCON.read(machine));
                self.saved_copper_list = Some(machine.system_copper_list());
                COPCON.write(machine, self.config.copcon);
            }
            Step::DmaChannels => {
                self.saved_dmacon = Some(DMACONR.read(machine));
                DMACON.set(machine, self.config.dma_channels);
            }
            Step::MaskInterrupts => {
                self.saved_intena = Some(INTENAR.read(machine));
                self.saved_intreq = Some(INTREQR.read(machine));
                INTENA.clear(machine, IntFlags::CLEAR_ALL);
                write_intreq(machine, IntFlags::CLEAR_ALL.bits());
            }
            Step::ClearKeyboard => {
                keyboard.clear();
            }
            Step::PatchLevel2 => {
                let vbr = machine.vbr();
                self.vbr = Some(vbr);
                self.level2 = Some(VectorSlot::LEVEL_2.install(machine, vbr, self.config.level2_handler));
            }
            Step::EnableSource => {
                INTENA.set(machine, self.config.interrupt_sources);
            }
            Step::AudioHooks => {
                let vbr = match self.vbr {
                    Some(vbr) => vbr,
                    None => machine.vbr(),
                };
                audio.install(machine, vbr, self.config.audio_unit);
            }
        }
    }

    fn undo<M, A>(&mut self, step: Step, machine: &mut M, audio: &mut A)
    where
        M: Machine + ?Sized,
        A: PeriodicHooks<M> + ?Sized,
    {
        debug!("release: {:?}", step);
        match step {
            Step::AudioHooks => {
                audio.remove(machine);
            }
            Step::EnableSource => {
                INTENA.clear(machine, self.config.interrupt_sources);
            }
            Step::PatchLevel2 => {
                if let Some(token) = self.level2.take() {
                    token.restore(machine);
                }
                self.vbr = None;
            }
            Step::ClearKeyboard => {}
            Step::MaskInterrupts => {
                if let Some(intreq) = self.saved_intreq.take() {
                    write_intreq(machine, IntFlags::CLEAR_ALL.bits());
                    write_intreq(machine, SET_CLR | intreq.bits());
                }
                if let Some(intena) = self.saved_intena.take() {
                    INTENA.clear(machine, IntFlags::CLEAR_ALL);
                    INTENA.set(machine, intena);
                }
            }
            Step::DmaChannels => {
                if let Some(dmacon) = self.saved_dmacon.take() {
                    // Only bits that differ from the readback, so status
                    // bits and channels the host had on are left alone.
                    let current = DMACONR.read(machine);
                    DMACON.write_raw(machine, dmacon.bits() ^ current.bits());
                }
            }
            Step::CopperDanger => {
                sync::wait_vblank(machine);
                sync::wait_blit(machine);
                if let Some(copcon) = self.saved_copcon.take() {
                    COPCON.write(machine, copcon);
                }
                if let Some(copper_list) = self.saved_copper_list.take() {
                    machine.write_long(COP1LC, copper_list);
                }
            }
            Step::QuiesceBlitter => {}
            Step::ForbidTaskSwitch => {
                self.task_switch.allow(machine, true);
            }
        }
    }

    /// Take the blitter from the host. Does nothing if already owned.
    pub fn own_blitter<E: Exec + ?Sized>(&mut self, exec: &mut E) {
        if !self.blitter_owned {
            self.blitter_owned = true;
            exec.own_blitter();
        }
    }

    /// Hand the blitter back. Does nothing if not owned.
    pub fn disown_blitter<E: Exec + ?Sized>(&mut self, exec: &mut E) {
        if self.blitter_owned {
            self.blitter_owned = false;
            exec.disown_blitter();
        }
    }

    /// Blitter access for the rasterizer, if the session owns it.
    pub fn blitter<'a, C: CustomChips + ?Sized>(&self, chips: &'a mut C) -> Option<BlitterGuard<'a, C>> {
        if self.blitter_owned {
            Some(BlitterGuard { chips })
        } else {
            None
        }
    }

    /// Lend the blitter back to the host for the length of `f`.
    ///
    /// Ownership is returned to exactly what it was before; nothing else in
    /// the session changes.
    pub fn with_blitter_lent<E, R>(&mut self, exec: &mut E, f: impl FnOnce(&mut E) -> R) -> R
    where
        E: Exec + ?Sized,
    {
        let owned = self.blitter_owned;
        self.disown_blitter(exec);
        let result = f(exec);
        if owned {
            self.own_blitter(exec);
        }
        result
    }

    /// Run `f` with task switching forbidden, leaving an outer forbid in place.
    pub fn forbidden<E, R>(&mut self, exec: &mut E, f: impl FnOnce(&mut E) -> R) -> R
    where
        E: Exec + ?Sized,
    {
        self.task_switch.forbidden(exec, f)
    }
}

impl Drop for HardwareSession {
    fn drop(&mut self) {
        if !self.completed.is_empty() {
            error!("hardware session dropped holding {:?}", self.completed.as_slice());
        }
    }
}

/// `INTREQ` writes are issued twice: on 68040/060 boards a write landing on
/// the wrong bus edge can be dropped.
fn write_intreq<C: CustomChips + ?Sized>(chips: &mut C, word: u16) {
    for _ in 0..2 {
        INTREQ.write_raw(chips, word);
    }
}
