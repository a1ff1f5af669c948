use log::{debug, error};

use crate::exec::Cpu;

/// An entry of the 68k exception vector table, relative to VBR.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VectorSlot {
    offset: u32,
}

impl VectorSlot {
    /// Level 2 autovector: CIA-A and expansion `PORTS`.
    pub const LEVEL_2: VectorSlot = VectorSlot::at(0x68);
    /// Level 3 autovector: copper, vertical blank, blitter.
    pub const LEVEL_3: VectorSlot = VectorSlot::at(0x6C);
    /// Level 6 autovector: CIA-B and `EXTER`.
    pub const LEVEL_6: VectorSlot = VectorSlot::at(0x78);

    pub const fn at(offset: u32) -> Self {
        Self { offset }
    }

    #[inline(always)]
    pub fn address(&self, vbr: u32) -> u32 {
        vbr + self.offset
    }

    pub fn read<C: Cpu + ?Sized>(&self, cpu: &mut C, vbr: u32) -> u32 {
        cpu.read_vector(self.address(vbr))
    }

    /// Point the slot at `handler`, keeping the previous entry in the token.
    #[must_use = "the previous handler is lost unless the token is restored"]
    pub fn install<C: Cpu + ?Sized>(self, cpu: &mut C, vbr: u32, handler: u32) -> RestoreToken {
        let address = self.address(vbr);
        let previous = cpu.read_vector(address);
        cpu.write_vector(address, handler);
        debug!("vector ${:08X}: ${:08X} -> ${:08X}", address, previous, handler);
        RestoreToken { address, previous, restored: false }
    }
}

/// Proof that a vector slot was patched. Its only use is [`RestoreToken::restore`].
#[derive(Debug)]
pub struct RestoreToken {
    address: u32,
    previous: u32,
    restored: bool,
}

impl RestoreToken {
    /// Entry the slot held before it was patched.
    pub fn previous(&self) -> u32 {
        self.previous
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    /// Put the previous entry back.
    pub fn restore<C: Cpu + ?Sized>(mut self, cpu: &mut C) {
        cpu.write_vector(self.address, self.previous);
        self.restored = true;
        debug!("vector ${:08X} restored to ${:08X}", self.address, self.previous);
    }
}

impl Drop for RestoreToken {
    fn drop(&mut self) {
        if !self.restored {
            error!(
                "vector ${:08X} dropped while patched; host handler ${:08X} is lost",
                self.address, self.previous
            );
        }
    }
}
