//! # ModSurfer hardware layer
//!
//! Takes the custom chips away from the host for the duration of a play
//! session and gives them back untouched afterwards.
//!
//! ```ignore
//! let mut session = HardwareSession::new(SessionConfig::default());
//! session.own_blitter(&mut machine);
//! session.acquire_exclusive_control(&mut machine, &mut keyboard, &mut audio);
//!
//! loop {
//!     sync::wait_vblank(&mut machine);
//!     if let Some(mut blitter) = session.blitter(&mut machine) {
//!         renderer.blit_fill(&mut blitter, plane, 320, 256);
//!     }
//! }
//!
//! session.release_exclusive_control(&mut machine, &mut audio);
//! ```
//!
//! Everything that touches hardware goes through the [`CustomChips`], [`Exec`]
//! and [`Cpu`] traits, so the same code runs against the memory-mapped chips
//! ([`mmio`]) or the simulated machine ([`sim`]).

#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod arbiter;
pub mod audio;
pub mod blit;
pub mod custom;
pub mod exec;
pub mod input;
pub mod mmio;
pub mod regs;
pub mod sim;
pub mod sync;
pub mod vectors;

pub use arbiter::{HardwareSession, SessionConfig, Step};
pub use audio::PeriodicHooks;
pub use blit::{BlitterGuard, PlaneRef, Rasterizer};
pub use custom::CustomChips;
pub use exec::{Cpu, Exec, Machine};
pub use input::KeyboardState;
pub use regs::{CopCon, DmaCon, IntFlags};
pub use vectors::{RestoreToken, VectorSlot};
