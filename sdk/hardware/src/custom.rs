/// Word-addressed access to the custom chip register block.
///
/// Offsets are relative to the block base (`$DFF000` on real hardware) and
/// always even. Reads of write-only registers are implementation defined;
/// the typed wrappers in [`crate::regs`] only read registers that exist.
pub trait CustomChips {
    fn read_word(&mut self, offset: u16) -> u16;

    fn write_word(&mut self, offset: u16, value: u16);

    /// Long-word read of two adjacent registers, high word first.
    fn read_long(&mut self, offset: u16) -> u32 {
        let hi = self.read_word(offset) as u32;
        let lo = self.read_word(offset + 2) as u32;
        (hi << 16) | lo
    }

    /// Long-word write of a pointer register pair (`COP1LCH/L` and friends).
    fn write_long(&mut self, offset: u16, value: u32) {
        self.write_word(offset, (value >> 16) as u16);
        self.write_word(offset + 2, value as u16);
    }
}
