//! # Simulated machine
//!
//! A register-level stand-in for the chipset, CPU vector table and host
//! kernel, used by the tests and by `surfsim`. It models only what the
//! session touches:
//!
//! - SET/CLR latches for `DMACON`, `INTENA` and `INTREQ`, with `BBUSY` and
//!   `BZERO` as read-only status bits in `DMACONR`;
//! - a PAL beam counter that advances on every custom-chip access;
//! - a blitter that stays busy for a number of accesses once started;
//! - optionally, 68040/060 style `INTREQ` writes that are dropped unless
//!   immediately repeated;
//! - a background task that gets to run on every access while task
//!   switching is allowed, counted in [`SimMachine::background_runs`].
//!
//! Every state change is appended to [`SimMachine::trace`].

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use log::{debug, warn};

use crate::audio::PeriodicHooks;
use crate::blit::{BlitterGuard, CopyMode, PlaneRef, Rasterizer};
use crate::custom::CustomChips;
use crate::exec::{Cpu, Exec, Machine};
use crate::regs::{self, set_clr, DmaCon, IntFlags, DMACON, INTENA};
use crate::vectors::{RestoreToken, VectorSlot};

pub const PAL_LINES_PER_FRAME: u16 = 312;
pub const CCKS_PER_LINE: u16 = 227;
/// Beam movement per simulated bus access.
const CCKS_PER_ACCESS: u16 = 8;

/// Host state at the time the game starts, roughly what Workbench leaves.
pub const HOST_DMACON: DmaCon = DmaCon::DMAEN
    .union(DmaCon::BPLEN)
    .union(DmaCon::COPEN)
    .union(DmaCon::BLTEN)
    .union(DmaCon::DSKEN);
pub const HOST_INTENA: IntFlags = IntFlags::INTEN
    .union(IntFlags::EXTER)
    .union(IntFlags::VERTB)
    .union(IntFlags::PORTS)
    .union(IntFlags::SOFT);
pub const HOST_INTREQ: IntFlags = IntFlags::TBE;
pub const HOST_COPPER_LIST: u32 = 0x0000_0420;
pub const HOST_LEVEL2_HANDLER: u32 = 0x00FC_0C4E;
pub const HOST_LEVEL6_HANDLER: u32 = 0x00FC_0CA0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Write { offset: u16, value: u16 },
    /// A write the bus swallowed.
    WriteDropped { offset: u16, value: u16 },
    Forbid,
    Permit,
    OwnBlitter,
    DisownBlitter,
    VectorWrite { address: u32, value: u32 },
    FrameStart,
    BlitStart { words: u32 },
    BlitDone,
    /// A blit was started while another was still running.
    BlitCollision,
}

/// The registers a session must hand back untouched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    pub copcon: u16,
    pub dmacon: DmaCon,
    pub intena: IntFlags,
    pub intreq: IntFlags,
    pub cop1lc: u32,
    pub level2_vector: u32,
    pub level6_vector: u32,
}

#[derive(Debug)]
pub struct SimMachine {
    copcon: u16,
    dmacon: u16,
    intena: u16,
    intreq: u16,
    cop1lc: u32,

    vpos: u16,
    hpos: u16,

    blit_remaining: u32,
    bzero: bool,

    vbr: u32,
    vectors: BTreeMap<u32, u32>,

    forbid_depth: i32,
    blitter_owned: bool,
    system_copper_list: u32,

    flaky_intreq: bool,
    last_intreq_write: Option<u16>,

    background_runs: u64,
    trace: Vec<Event>,
}

impl Default for SimMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimMachine {
    pub fn new() -> Self {
        let mut vectors = BTreeMap::new();
        vectors.insert(VectorSlot::LEVEL_2.address(0), HOST_LEVEL2_HANDLER);
        vectors.insert(VectorSlot::LEVEL_6.address(0), HOST_LEVEL6_HANDLER);

        Self {
            copcon: 0,
            dmacon: HOST_DMACON.bits(),
            intena: HOST_INTENA.bits(),
            intreq: HOST_INTREQ.bits(),
            cop1lc: HOST_COPPER_LIST,
            vpos: 0,
            hpos: 0,
            blit_remaining: 0,
            bzero: false,
            vbr: 0,
            vectors,
            forbid_depth: 0,
            blitter_owned: false,
            system_copper_list: HOST_COPPER_LIST,
            flaky_intreq: false,
            last_intreq_write: None,
            background_runs: 0,
            trace: Vec::new(),
        }
    }

    /// Move the vector table, as on a 68010+ with VBR in fast RAM.
    pub fn with_vbr(mut self, vbr: u32) -> Self {
        let moved = self
            .vectors
            .iter()
            .map(|(&address, &value)| (address - self.vbr + vbr, value))
            .collect();
        self.vectors = moved;
        self.vbr = vbr;
        self
    }

    /// Drop any `INTREQ` write that is not an immediate repeat of the last.
    pub fn with_flaky_intreq(mut self) -> Self {
        self.flaky_intreq = true;
        self
    }

    pub fn with_beam_at(mut self, line: u16) -> Self {
        self.vpos = line % PAL_LINES_PER_FRAME;
        self
    }

    pub fn registers(&self) -> RegisterFile {
        RegisterFile {
            copcon: self.copcon,
            dmacon: DmaCon::from_bits_retain(self.dmacon),
            intena: IntFlags::from_bits_retain(self.intena),
            intreq: IntFlags::from_bits_retain(self.intreq),
            cop1lc: self.cop1lc,
            level2_vector: self.vector(VectorSlot::LEVEL_2),
            level6_vector: self.vector(VectorSlot::LEVEL_6),
        }
    }

    pub fn vector(&self, slot: VectorSlot) -> u32 {
        self.vectors.get(&slot.address(self.vbr)).copied().unwrap_or(0)
    }

    pub fn beam_line(&self) -> u16 {
        self.vpos
    }

    pub fn blitter_busy(&self) -> bool {
        self.blit_remaining > 0
    }

    pub fn blitter_owned(&self) -> bool {
        self.blitter_owned
    }

    pub fn forbid_depth(&self) -> i32 {
        self.forbid_depth
    }

    /// How often the simulated background task got the CPU.
    pub fn background_runs(&self) -> u64 {
        self.background_runs
    }

    pub fn trace(&self) -> &[Event] {
        &self.trace
    }

    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    /// Writes to `offset`, in order, that took effect.
    pub fn writes_to(&self, offset: u16) -> Vec<u16> {
        self.trace
            .iter()
            .filter_map(|event| match *event {
                Event::Write { offset: o, value } if o == offset => Some(value),
                _ => None,
            })
            .collect()
    }

    /// Kick off a blit that keeps the blitter busy for `words` accesses.
    pub fn start_blit(&mut self, words: u32) {
        if self.blit_remaining > 0 {
            warn!("blit started while blitter busy ({} words left)", self.blit_remaining);
            self.trace.push(Event::BlitCollision);
        }
        self.blit_remaining = words.max(1);
        self.bzero = false;
        self.trace.push(Event::BlitStart { words });
    }

    /// Latch an interrupt request, as the hardware source would.
    pub fn raise(&mut self, sources: IntFlags) {
        self.intreq |= sources.bits() & !IntFlags::INTEN.bits();
    }

    fn tick(&mut self) {
        self.hpos += CCKS_PER_ACCESS;
        if self.hpos >= CCKS_PER_LINE {
            self.hpos -= CCKS_PER_LINE;
            self.vpos += 1;
            if self.vpos >= PAL_LINES_PER_FRAME {
                self.vpos = 0;
                self.trace.push(Event::FrameStart);
            }
        }

        if self.blit_remaining > 0 {
            self.blit_remaining -= 1;
            if self.blit_remaining == 0 {
                self.bzero = true;
                self.trace.push(Event::BlitDone);
            }
        }

        if self.forbid_depth == 0 {
            self.background_runs += 1;
        }
    }

    fn dmaconr(&self) -> u16 {
        let mut value = self.dmacon;
        if self.blit_remaining > 0 {
            value |= DmaCon::BBUSY.bits();
        }
        if self.bzero {
            value |= DmaCon::BZERO.bits();
        }
        value
    }

    fn vposr(&self) -> u16 {
        (self.vpos >> 8) & 1
    }

    fn vhposr(&self) -> u16 {
        ((self.vpos & 0xFF) << 8) | ((self.hpos / 2) & 0xFF)
    }
}

impl CustomChips for SimMachine {
    fn read_word(&mut self, offset: u16) -> u16 {
        self.tick();
        match offset {
            0x002 => self.dmaconr(),
            0x004 => self.vposr(),
            0x006 => self.vhposr(),
            0x01C => self.intena,
            0x01E => self.intreq,
            0x02E => self.copcon,
            _ => {
                debug!("read of unmodelled register ${:03X}", offset);
                0
            }
        }
    }

    fn read_long(&mut self, offset: u16) -> u32 {
        if offset == regs::VPOSR {
            self.tick();
            return ((self.vposr() as u32) << 16) | self.vhposr() as u32;
        }
        let hi = self.read_word(offset) as u32;
        let lo = self.read_word(offset + 2) as u32;
        (hi << 16) | lo
    }

    fn write_word(&mut self, offset: u16, value: u16) {
        self.tick();

        if offset == INTREQ_OFFSET && self.flaky_intreq {
            let repeat = self.last_intreq_write == Some(value);
            self.last_intreq_write = Some(value);
            if !repeat {
                self.trace.push(Event::WriteDropped { offset, value });
                return;
            }
        } else {
            self.last_intreq_write = None;
        }

        self.trace.push(Event::Write { offset, value });
        match offset {
            0x02E => self.copcon = value,
            0x080 => self.cop1lc = (self.cop1lc & 0x0000_FFFF) | ((value as u32) << 16),
            0x082 => self.cop1lc = (self.cop1lc & 0xFFFF_0000) | value as u32,
            0x096 => {
                let writable = value & !DmaCon::STATUS.bits();
                set_clr(&mut self.dmacon, writable);
            }
            0x09A => set_clr(&mut self.intena, value),
            0x09C => set_clr(&mut self.intreq, value),
            _ => debug!("write to unmodelled register ${:03X} = ${:04X}", offset, value),
        }
    }
}

const INTREQ_OFFSET: u16 = 0x09C;

impl Exec for SimMachine {
    fn forbid(&mut self) {
        self.forbid_depth += 1;
        self.trace.push(Event::Forbid);
    }

    fn permit(&mut self) {
        self.forbid_depth -= 1;
        self.trace.push(Event::Permit);
    }

    fn own_blitter(&mut self) {
        self.blitter_owned = true;
        self.trace.push(Event::OwnBlitter);
    }

    fn disown_blitter(&mut self) {
        self.blitter_owned = false;
        self.trace.push(Event::DisownBlitter);
    }

    fn system_copper_list(&self) -> u32 {
        self.system_copper_list
    }
}

impl Cpu for SimMachine {
    fn vbr(&mut self) -> u32 {
        self.vbr
    }

    fn read_vector(&mut self, address: u32) -> u32 {
        self.vectors.get(&address).copied().unwrap_or(0)
    }

    fn write_vector(&mut self, address: u32, value: u32) {
        self.vectors.insert(address, value);
        self.trace.push(Event::VectorWrite { address, value });
    }
}

/// Stand-in for the music player: takes the level-6 vector, enables its
/// timer source and the master enable, and starts audio DMA.
#[derive(Debug)]
pub struct SimPlayer {
    handler: u32,
    level6: Option<RestoreToken>,
    installed_with: Option<(u32, u8)>,
}

impl SimPlayer {
    pub const HANDLER: u32 = 0x0003_0000;

    pub fn new() -> Self {
        Self { handler: Self::HANDLER, level6: None, installed_with: None }
    }

    pub fn is_installed(&self) -> bool {
        self.level6.is_some()
    }

    /// `(vbr, unit)` of the last install.
    pub fn installed_with(&self) -> Option<(u32, u8)> {
        self.installed_with
    }
}

impl Default for SimPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Machine + ?Sized> PeriodicHooks<M> for SimPlayer {
    fn install(&mut self, machine: &mut M, vbr: u32, unit: u8) {
        self.level6 = Some(VectorSlot::LEVEL_6.install(machine, vbr, self.handler));
        self.installed_with = Some((vbr, unit));
        INTENA.set(machine, IntFlags::INTEN | crate::audio::TIMER_SOURCE);
        DMACON.set(machine, DmaCon::AUD0EN | DmaCon::AUD1EN | DmaCon::AUD2EN | DmaCon::AUD3EN);
    }

    fn remove(&mut self, machine: &mut M) {
        INTENA.clear(machine, crate::audio::TIMER_SOURCE);
        if let Some(token) = self.level6.take() {
            token.restore(machine);
        }
    }
}

/// One rasterizer call, as recorded by [`SimRasterizer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlitOp {
    Copy { src: PlaneRef, dst: PlaneRef, width: u16, height: u16, mode: CopyMode },
    Rect { dst: PlaneRef, mask: PlaneRef, width: u16, height: u16, set_bits: bool },
    Line { dst: PlaneRef, x1: u16, y1: u16 },
    Fill { dst: PlaneRef, width: u16, height: u16 },
    Char { font_base: u32, glyph: u16, dst_row: PlaneRef, color: u16, replace_bg: bool },
}

/// Records every call and keeps the simulated blitter busy for roughly as
/// long as the real one would take.
#[derive(Debug, Default)]
pub struct SimRasterizer {
    pub ops: Vec<BlitOp>,
}

fn area_words(x: u16, width: u16, height: u16) -> u32 {
    if width == 0 {
        return 0;
    }
    let first = x as u32 / 16;
    let last = (x as u32 + width as u32).saturating_sub(1) / 16;
    (last - first + 1) * height as u32
}

impl Rasterizer<SimMachine> for SimRasterizer {
    fn blit_copy(
        &mut self,
        blitter: &mut BlitterGuard<'_, SimMachine>,
        src: PlaneRef,
        dst: PlaneRef,
        width: u16,
        height: u16,
        mode: CopyMode,
    ) {
        self.ops.push(BlitOp::Copy { src, dst, width, height, mode });
        blitter.chips().start_blit(area_words(dst.x, width, height) + 1);
    }

    fn blit_rect(
        &mut self,
        blitter: &mut BlitterGuard<'_, SimMachine>,
        dst: PlaneRef,
        mask: PlaneRef,
        width: u16,
        height: u16,
        set_bits: bool,
    ) {
        self.ops.push(BlitOp::Rect { dst, mask, width, height, set_bits });
        blitter.chips().start_blit(area_words(dst.x, width, height));
    }

    fn blit_line(&mut self, blitter: &mut BlitterGuard<'_, SimMachine>, dst: PlaneRef, x1: u16, y1: u16) {
        self.ops.push(BlitOp::Line { dst, x1, y1 });
        let dx = (x1 as i32 - dst.x as i32).unsigned_abs();
        let dy = (y1 as i32 - dst.y as i32).unsigned_abs();
        blitter.chips().start_blit(dx.max(dy) + 1);
    }

    fn blit_fill(&mut self, blitter: &mut BlitterGuard<'_, SimMachine>, dst: PlaneRef, width: u16, height: u16) {
        self.ops.push(BlitOp::Fill { dst, width, height });
        blitter.chips().start_blit(area_words(dst.x, width, height));
    }

    fn blit_char(
        &mut self,
        blitter: &mut BlitterGuard<'_, SimMachine>,
        font_base: u32,
        glyph: u16,
        dst_row: PlaneRef,
        color: u16,
        replace_bg: bool,
    ) {
        self.ops.push(BlitOp::Char { font_base, glyph, dst_row, color, replace_bg });
        blitter.chips().start_blit(5);
    }
}
