//! Memory-mapped custom chips.

use volatile_register::RW;

use crate::custom::CustomChips;

/// Base of the custom chip register block.
pub const CUSTOM_BASE: usize = 0xDF_F000;

const NUM_WORDS: usize = 0x100;

#[repr(C)]
struct CustomBlock {
    words: [RW<u16>; NUM_WORDS],
}

/// The real register block at `$DFF000`.
pub struct MmioChips {
    block: &'static mut CustomBlock,
}

impl MmioChips {
    /// # Safety
    ///
    /// Only one `MmioChips` may exist, and only on hardware that maps the
    /// custom chips at [`CUSTOM_BASE`].
    pub unsafe fn new() -> Self {
        Self { block: unsafe { &mut *(CUSTOM_BASE as *mut CustomBlock) } }
    }

    #[inline(always)]
    fn slot(offset: u16) -> usize {
        (offset as usize / 2) & (NUM_WORDS - 1)
    }
}

impl CustomChips for MmioChips {
    #[inline(always)]
    fn read_word(&mut self, offset: u16) -> u16 {
        self.block.words[Self::slot(offset)].read()
    }

    #[inline(always)]
    fn write_word(&mut self, offset: u16, value: u16) {
        unsafe { self.block.words[Self::slot(offset)].write(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_map_to_word_slots() {
        assert_eq!(MmioChips::slot(0x002), 1);
        assert_eq!(MmioChips::slot(0x096), 0x4B);
        assert_eq!(MmioChips::slot(0x1FE), NUM_WORDS - 1);
        assert_eq!(core::mem::size_of::<CustomBlock>(), 0x200);
    }
}
