//! # Custom Chip Register Flags
//!
//! Bit layouts and word offsets (from `$DFF000`) of the registers the
//! session takes over.
//!
//! | Register  | Offset | Access | Contents                                |
//! |-----------|--------|--------|-----------------------------------------|
//! | `DMACONR` | `$002` | R      | DMA enables + blitter status            |
//! | `VPOSR`   | `$004` | R      | beam V8, chip id                        |
//! | `VHPOSR`  | `$006` | R      | beam V7-V0, H8-H1                       |
//! | `INTENAR` | `$01C` | R      | interrupt enables                       |
//! | `INTREQR` | `$01E` | R      | pending interrupt requests              |
//! | `COPCON`  | `$02E` | W*     | copper danger bit                       |
//! | `COP1LC`  | `$080` | W      | copper list 1 location (long)           |
//! | `DMACON`  | `$096` | W      | DMA enables, SET/CLR                    |
//! | `INTENA`  | `$09A` | W      | interrupt enables, SET/CLR              |
//! | `INTREQ`  | `$09C` | W      | interrupt requests, SET/CLR             |
//!
//! `*` latched; see [`Reg`].
//!
//! SET/CLR registers use bit 15 to choose between setting or clearing the
//! other bits written as 1. Bits written as 0 are left alone.

use core::marker::PhantomData;

use crate::custom::CustomChips;

pub const DMACONR: ReadReg<DmaCon> = ReadReg::at(0x002);
pub const VPOSR: u16 = 0x004;
pub const VHPOSR: u16 = 0x006;
pub const INTENAR: ReadReg<IntFlags> = ReadReg::at(0x01C);
pub const INTREQR: ReadReg<IntFlags> = ReadReg::at(0x01E);
pub const COPCON: Reg<CopCon> = Reg::at(0x02E);
pub const COP1LC: u16 = 0x080;
pub const DMACON: SetClrReg<DmaCon> = SetClrReg::at(0x096);
pub const INTENA: SetClrReg<IntFlags> = SetClrReg::at(0x09A);
pub const INTREQ: SetClrReg<IntFlags> = SetClrReg::at(0x09C);

/// Bit 15 of every SET/CLR register.
pub const SET_CLR: u16 = 0x8000;

bitflags::bitflags! {
    /// DMA control, written at `DMACON`, read back at `DMACONR`.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct DmaCon: u16 {
        /// Blitter busy. Read-only.
        const BBUSY  = 0x4000;
        /// Last blit produced only zero words. Read-only.
        const BZERO  = 0x2000;
        /// Blitter has priority over the CPU ("blitter nasty").
        const BLTPRI = 0x0400;
        /// Master DMA enable.
        const DMAEN  = 0x0200;
        /// Bitplane fetch.
        const BPLEN  = 0x0100;
        /// Copper fetch.
        const COPEN  = 0x0080;
        /// Blitter.
        const BLTEN  = 0x0040;
        /// Sprite fetch.
        const SPREN  = 0x0020;
        const DSKEN  = 0x0010;
        const AUD3EN = 0x0008;
        const AUD2EN = 0x0004;
        const AUD1EN = 0x0002;
        const AUD0EN = 0x0001;

        /// Bits that only ever reflect hardware status.
        const STATUS = Self::BBUSY.bits() | Self::BZERO.bits();
    }

    /// Interrupt enable / request bits, shared by `INTENA(R)` and `INTREQ(R)`.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct IntFlags: u16 {
        /// Master interrupt enable (only meaningful in `INTENA`).
        const INTEN   = 0x4000;
        /// Level 6: CIA-B and external.
        const EXTER   = 0x2000;
        const DSKSYNC = 0x1000;
        const RBF     = 0x0800;
        const AUD3    = 0x0400;
        const AUD2    = 0x0200;
        const AUD1    = 0x0100;
        const AUD0    = 0x0080;
        const BLIT    = 0x0040;
        const VERTB   = 0x0020;
        const COPER   = 0x0010;
        /// Level 2: CIA-A (keyboard, timers) and expansion ports.
        const PORTS   = 0x0008;
        const SOFT    = 0x0004;
        const DSKBLK  = 0x0002;
        const TBE     = 0x0001;
    }

    /// Copper control at `COPCON`.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct CopCon: u16 {
        /// Copper danger: lets the copper write blitter registers.
        const CDANG = 0x0002;
    }
}

impl IntFlags {
    /// Every bit a SET/CLR write can address, master enable included.
    pub const CLEAR_ALL: IntFlags = IntFlags::all();
}

/// A register value that is a plain 16-bit pattern.
pub trait RegValue: Copy {
    fn from_word(word: u16) -> Self;
    fn to_word(self) -> u16;
}

macro_rules! reg_value {
    ($($t:ty),*) => {
        $(impl RegValue for $t {
            #[inline(always)]
            fn from_word(word: u16) -> Self {
                Self::from_bits_retain(word)
            }

            #[inline(always)]
            fn to_word(self) -> u16 {
                self.bits()
            }
        })*
    };
}

reg_value!(DmaCon, IntFlags, CopCon);

/// Read-only custom register.
pub struct ReadReg<T> {
    offset: u16,
    _value: PhantomData<T>,
}

impl<T: RegValue> ReadReg<T> {
    pub const fn at(offset: u16) -> Self {
        Self { offset, _value: PhantomData }
    }

    pub const fn offset(&self) -> u16 {
        self.offset
    }

    #[inline(always)]
    pub fn read<C: CustomChips + ?Sized>(&self, chips: &mut C) -> T {
        T::from_word(chips.read_word(self.offset))
    }
}

/// Custom register taking the whole value on write.
///
/// `COPCON` is write-only on OCS; reading it back returns
/// whatever the chips latch, which later chipsets and the simulator keep.
pub struct Reg<T> {
    offset: u16,
    _value: PhantomData<T>,
}

impl<T: RegValue> Reg<T> {
    pub const fn at(offset: u16) -> Self {
        Self { offset, _value: PhantomData }
    }

    pub const fn offset(&self) -> u16 {
        self.offset
    }

    #[inline(always)]
    pub fn read<C: CustomChips + ?Sized>(&self, chips: &mut C) -> T {
        T::from_word(chips.read_word(self.offset))
    }

    #[inline(always)]
    pub fn write<C: CustomChips + ?Sized>(&self, chips: &mut C, value: T) {
        chips.write_word(self.offset, value.to_word());
    }
}

/// Write-only SET/CLR custom register.
pub struct SetClrReg<T> {
    offset: u16,
    _value: PhantomData<T>,
}

impl<T: RegValue> SetClrReg<T> {
    pub const fn at(offset: u16) -> Self {
        Self { offset, _value: PhantomData }
    }

    pub const fn offset(&self) -> u16 {
        self.offset
    }

    /// Set every bit of `bits`.
    #[inline(always)]
    pub fn set<C: CustomChips + ?Sized>(&self, chips: &mut C, bits: T) {
        chips.write_word(self.offset, SET_CLR | bits.to_word());
    }

    /// Clear every bit of `bits`.
    #[inline(always)]
    pub fn clear<C: CustomChips + ?Sized>(&self, chips: &mut C, bits: T) {
        chips.write_word(self.offset, !SET_CLR & bits.to_word());
    }

    /// Write a raw word, SET/CLR bit included.
    #[inline(always)]
    pub fn write_raw<C: CustomChips + ?Sized>(&self, chips: &mut C, word: u16) {
        chips.write_word(self.offset, word);
    }
}

/// Apply a SET/CLR write to a latched value.
#[inline(always)]
pub fn set_clr(latch: &mut u16, value: u16) {
    if value & SET_CLR != 0 {
        *latch |= value & !SET_CLR;
    } else {
        *latch &= !(value & !SET_CLR);
    }
}
