//! # Beam and blitter waits
//!
//! The only two places a session may block. Both poll hardware status and
//! are bounded by hardware timing (one frame, or one blit), so neither takes
//! a timeout.

use bitfield::bitfield;

use crate::custom::CustomChips;
use crate::regs::{DmaCon, DMACONR, VPOSR};

bitfield! {
    /// `VPOSR` and `VHPOSR` read together as one long-word.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct BeamPosition(u32);
    impl Debug;
    pub long_frame, _: 31;
    pub agnus_id, _: 30, 24;
    pub v8, _: 16;
    pub v_low, _: 15, 8;
    pub h, _: 7, 0;
}

impl BeamPosition {
    #[inline(always)]
    pub fn line(&self) -> u16 {
        ((self.v8() as u16) << 8) | self.v_low() as u16
    }
}

#[inline(always)]
pub fn beam_position<C: CustomChips + ?Sized>(chips: &mut C) -> BeamPosition {
    BeamPosition(chips.read_long(VPOSR))
}

/// Block until the beam has wrapped back to the top of the next frame.
pub fn wait_vblank<C: CustomChips + ?Sized>(chips: &mut C) {
    let mut last = beam_position(chips).line();
    loop {
        let line = beam_position(chips).line();
        if line < last {
            return;
        }
        last = line;
    }
}

/// Block until no blit is in flight.
pub fn wait_blit<C: CustomChips + ?Sized>(chips: &mut C) {
    // Early Agnus sets BBUSY one cycle after the blit starts; burn a read first.
    let _ = DMACONR.read(chips);
    while DMACONR.read(chips).contains(DmaCon::BBUSY) {}
}
