//! # Host operating system services
//!
//! The calls the game makes into the host outside of the hardware bracket.
//! Each trait groups what one part of the OS provides; [`crate::sim::SimHost`]
//! implements all of them.

use bitflags::bitflags;

/// A shared library the environment binds.
pub trait Libraries {
    /// Open `name` at `min_version` or newer, returning the version opened.
    fn open_library(&mut self, name: &'static str, min_version: u16) -> Option<u16>;

    fn close_library(&mut self, name: &'static str);
}

/// Opaque address of a graphics view.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ViewHandle(pub u32);

/// Opaque address of a locked public screen.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScreenHandle(pub u32);

bitflags! {
    /// Bitmap attribute flags of a screen.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct BitMapFlags: u32 {
        const CLEAR       = 1 << 0;
        const DISPLAYABLE = 1 << 1;
        const INTERLEAVED = 1 << 2;
        /// Planar bitmap in chip RAM, drawable by the custom chips.
        const STANDARD    = 1 << 3;
        const MINPLANES   = 1 << 4;
    }
}

/// Windowing, display and per-process settings.
pub trait Shell {
    /// Returns whether Workbench actually closed.
    fn close_workbench(&mut self) -> bool;

    fn open_workbench(&mut self) -> bool;

    fn lock_public_screen(&mut self, name: &str) -> Option<ScreenHandle>;

    fn bitmap_flags(&mut self, screen: ScreenHandle) -> BitMapFlags;

    fn unlock_public_screen(&mut self, screen: ScreenHandle);

    /// Where the process sends error requesters. `-1` suppresses them.
    fn error_routing(&self) -> i32;

    fn set_error_routing(&mut self, token: i32);

    fn active_view(&self) -> Option<ViewHandle>;

    fn load_view(&mut self, view: Option<ViewHandle>);

    /// Wait for the top of the next frame.
    fn wait_tof(&mut self);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u32);

/// An input handler node, as handed to the input device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HandlerSpec {
    pub priority: i8,
    pub name: &'static str,
    /// Entry point.
    pub code: u32,
    /// Passed to `code` on every event.
    pub data: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IoCommand {
    AddHandler(HandlerId),
    RemoveHandler(HandlerId),
    GetSysTime,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeVal {
    pub secs: u32,
    pub micros: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IoReply {
    Done,
    SysTime(TimeVal),
}

/// Message ports, I/O requests and the devices behind them.
pub trait Devices {
    fn create_port(&mut self) -> Option<PortId>;

    fn delete_port(&mut self, port: PortId);

    fn create_request(&mut self, port: PortId) -> Option<RequestId>;

    fn delete_request(&mut self, request: RequestId);

    /// Returns the device's error code on failure.
    fn open_device(&mut self, name: &'static str, unit: u32, request: RequestId) -> Result<(), i8>;

    fn close_device(&mut self, request: RequestId);

    fn alloc_handler(&mut self, spec: HandlerSpec) -> Option<HandlerId>;

    fn free_handler(&mut self, handler: HandlerId);

    /// Issue `command` on an open request and wait for it.
    fn do_io(&mut self, request: RequestId, command: IoCommand) -> Result<IoReply, i8>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Device,
    Assign,
    Volume,
}

/// One entry of the DOS device list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceNode {
    pub kind: NodeKind,
    /// Name without the trailing colon.
    pub name: String,
    /// Whether a handler task is running for the device.
    pub has_task: bool,
}

/// The DOS library, once bound.
pub trait Dos {
    /// Write to the process's output stream. Returns bytes written.
    fn write_output(&mut self, bytes: &[u8]) -> usize;

    /// Walk the device list. Only safe with task switching forbidden.
    fn device_nodes(&self) -> Vec<DeviceNode>;
}
