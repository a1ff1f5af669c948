use log::debug;

use crate::custom::CustomChips;

/// The host kernel services the session needs.
pub trait Exec {
    /// Stop the scheduler from switching away from the calling task.
    fn forbid(&mut self);

    /// Undo one [`Exec::forbid`].
    fn permit(&mut self);

    /// Block until the blitter is free of other users, then take it.
    fn own_blitter(&mut self);

    fn disown_blitter(&mut self);

    /// Address of the copper list the host's display runs from.
    fn system_copper_list(&self) -> u32;
}

/// CPU state outside the custom chips.
pub trait Cpu {
    /// Vector base register. Always zero on a plain 68000.
    fn vbr(&mut self) -> u32;

    fn read_vector(&mut self, address: u32) -> u32;

    fn write_vector(&mut self, address: u32, value: u32);
}

/// Everything the arbiter drives.
pub trait Machine: CustomChips + Exec + Cpu {}

impl<T: CustomChips + Exec + Cpu + ?Sized> Machine for T {}

/// Flag-tracked Forbid/Permit.
///
/// Forbid is only issued when switching is currently allowed and Permit only
/// when this gate issued the Forbid, so redundant calls never unbalance the
/// host's nesting count.
#[derive(Debug, Default)]
pub struct TaskSwitch {
    disabled: bool,
}

impl TaskSwitch {
    pub const fn new() -> Self {
        Self { disabled: false }
    }

    #[inline(always)]
    pub fn is_suppressed(&self) -> bool {
        self.disabled
    }

    pub fn allow<E: Exec + ?Sized>(&mut self, exec: &mut E, allow: bool) {
        if allow && self.disabled {
            exec.permit();
            self.disabled = false;
            debug!("task switching permitted");
        } else if !allow && !self.disabled {
            exec.forbid();
            self.disabled = true;
            debug!("task switching forbidden");
        }
    }

    /// Run `f` with task switching forbidden.
    ///
    /// If switching was already forbidden it stays forbidden afterwards.
    pub fn forbidden<E, R>(&mut self, exec: &mut E, f: impl FnOnce(&mut E) -> R) -> R
    where
        E: Exec + ?Sized,
    {
        let was_suppressed = self.disabled;
        self.allow(exec, false);
        let result = f(exec);
        if !was_suppressed {
            self.allow(exec, true);
        }
        result
    }
}
