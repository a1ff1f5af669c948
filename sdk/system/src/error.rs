//! Errors raised while setting up or tearing down the host environment.

use thiserror::Error;

/// Host-side setup failures
#[derive(Debug, Error)]
pub enum Error {
    /// A shared library could not be opened at the required version
    #[error("cannot open {name} version {version}")]
    LibraryUnavailable { name: &'static str, version: u16 },

    /// No message port could be created
    #[error("cannot create message port")]
    PortUnavailable,

    #[error("out of memory")]
    OutOfMemory,

    /// The device refused to open
    #[error("cannot open {name} unit {unit} (error {code})")]
    DeviceUnavailable { name: &'static str, unit: u32, code: i8 },

    /// The input device refused the handler
    #[error("input handler rejected (error {code})")]
    HandlerRejected { code: i8 },

    /// Empty, missing or unreadable directory
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
