use bit_field::BitField;

use crate::custom::CustomChips;
use crate::regs::{IntFlags, INTREQ, INTREQR};

/// Raw keycodes the keyboard can send: `$00`-`$77` plus the `$78`-`$7F`
/// status codes, which are never stored.
pub const NUM_KEYS: usize = 0x80;
const LAST_KEY: u8 = 0x77;

/// Keys held down, one bit per raw keycode.
///
/// Written by the level-2 dispatcher, read by the main loop once a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardState {
    keys: [u8; NUM_KEYS / 8],
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardState {
    pub const fn new() -> Self {
        Self { keys: [0; NUM_KEYS / 8] }
    }

    pub fn clear(&mut self) {
        self.keys = [0; NUM_KEYS / 8];
    }

    pub fn is_empty(&self) -> bool {
        self.keys.iter().all(|&b| b == 0)
    }

    #[inline(always)]
    pub fn is_pressed(&self, code: u8) -> bool {
        let code = code as usize & (NUM_KEYS - 1);
        self.keys[code / 8].get_bit(code % 8)
    }

    /// Apply one byte as shifted out by the keyboard (inverted, rotated left).
    ///
    /// Returns the keycode and whether it went down, or `None` for status
    /// codes such as "reset warning" or "lost sync".
    pub fn apply_raw(&mut self, raw: u8) -> Option<(u8, bool)> {
        let decoded = (!raw).rotate_right(1);
        let code = decoded.get_bits(0..7);
        let released = decoded.get_bit(7);

        if code > LAST_KEY {
            return None;
        }

        let idx = code as usize;
        self.keys[idx / 8].set_bit(idx % 8, !released);
        Some((code, !released))
    }
}

/// Body of the session's level-2 dispatcher.
///
/// Must stay short: it runs at interrupt priority 2 with the main loop
/// suspended. `raw` is the byte latched in CIA-A's serial register, if the
/// CIA flagged one.
pub fn service_ports<C: CustomChips + ?Sized>(chips: &mut C, keyboard: &mut KeyboardState, raw: Option<u8>) {
    if !INTREQR.read(chips).contains(IntFlags::PORTS) {
        return;
    }

    if let Some(raw) = raw {
        keyboard.apply_raw(raw);
    }

    // Acknowledge twice, same reason as the session's INTREQ writes.
    INTREQ.clear(chips, IntFlags::PORTS);
    INTREQ.clear(chips, IntFlags::PORTS);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode a keycode the way the keyboard shifts it out.
    fn wire(code: u8, up: bool) -> u8 {
        let byte = code | if up { 0x80 } else { 0 };
        !byte.rotate_left(1)
    }

    #[test]
    fn press_and_release() {
        let mut kb = KeyboardState::new();
        assert_eq!(kb.apply_raw(wire(0x45, false)), Some((0x45, true)));
        assert!(kb.is_pressed(0x45));

        assert_eq!(kb.apply_raw(wire(0x45, true)), Some((0x45, false)));
        assert!(!kb.is_pressed(0x45));
        assert!(kb.is_empty());
    }

    #[test]
    fn status_codes_are_ignored() {
        let mut kb = KeyboardState::new();
        // $78 reset warning, $F9 lost sync
        assert_eq!(kb.apply_raw(wire(0x78, false)), None);
        assert_eq!(kb.apply_raw(wire(0x79, true)), None);
        assert!(kb.is_empty());
    }

    #[test]
    fn clear_forgets_held_keys() {
        let mut kb = KeyboardState::new();
        kb.apply_raw(wire(0x00, false));
        kb.apply_raw(wire(0x77, false));
        assert!(kb.is_pressed(0x00) && kb.is_pressed(0x77));

        kb.clear();
        assert!(kb.is_empty());
    }
}
