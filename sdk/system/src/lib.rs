//! # ModSurfer system layer
//!
//! Host-side setup around the hardware session: the process environment,
//! the input handler and system clock, and the drive and directory
//! listings the module browser shows. All OS calls go through the traits in
//! [`host`].

pub mod dirlist;
pub mod environment;
pub mod error;
pub mod host;
pub mod peripheral;
pub mod sim;

pub use dirlist::{list_drives, list_path, DirEntry, DirList, EntryKind, StdFs};
pub use environment::{print_error, Environment};
pub use error::{Error, Result};
pub use peripheral::{query_microsecond_clock, seeded_rng, InputTap};
