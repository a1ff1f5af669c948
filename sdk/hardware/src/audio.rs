//! Boundary to the music player.
//!
//! The player drives its replay from a CIA-B timer on the level-6 vector.
//! It is only ever installed inside the arbiter's acquire/release bracket,
//! after the level-2 vector has been captured.

use crate::exec::Machine;
use crate::regs::IntFlags;

/// CIA-B timer source the player hangs off.
pub const TIMER_SOURCE: IntFlags = IntFlags::EXTER;

pub trait PeriodicHooks<M: Machine + ?Sized> {
    /// Hook the player's timer interrupt. `unit` selects the timing base
    /// (`1` for PAL).
    fn install(&mut self, machine: &mut M, vbr: u32, unit: u8);

    /// Unhook it again, restoring whatever `install` displaced.
    fn remove(&mut self, machine: &mut M);
}

/// A session without music.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silence;

impl<M: Machine + ?Sized> PeriodicHooks<M> for Silence {
    fn install(&mut self, _machine: &mut M, _vbr: u32, _unit: u8) {}

    fn remove(&mut self, _machine: &mut M) {}
}
