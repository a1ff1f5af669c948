//! # Input handler and system clock
//!
//! Device sessions are built one resource at a time. Each resource is
//! recorded as soon as it exists, and `Drop` releases exactly the recorded
//! ones in reverse, so a failure at any point leaves nothing behind.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::host::{Devices, HandlerId, HandlerSpec, IoCommand, IoReply, PortId, RequestId};

pub const INPUT_DEVICE: &str = "input.device";
pub const TIMER_DEVICE: &str = "timer.device";
pub const UNIT_VBLANK: u32 = 1;

/// Ahead of Intuition (priority 50), so the game sees events first.
pub const HANDLER_PRIORITY: i8 = 100;
pub const HANDLER_NAME: &str = "ModSurfer";

/// A port with one I/O request on an open device.
struct DeviceIo<'d, D: Devices + ?Sized> {
    devices: &'d mut D,
    port: Option<PortId>,
    request: Option<RequestId>,
    device_open: bool,
}

impl<'d, D: Devices + ?Sized> DeviceIo<'d, D> {
    fn open(devices: &'d mut D, name: &'static str, unit: u32) -> Result<Self> {
        let mut io = Self { devices, port: None, request: None, device_open: false };

        let port = io.devices.create_port().ok_or(Error::PortUnavailable)?;
        io.port = Some(port);

        let request = io.devices.create_request(port).ok_or(Error::OutOfMemory)?;
        io.request = Some(request);

        io.devices
            .open_device(name, unit, request)
            .map_err(|code| Error::DeviceUnavailable { name, unit, code })?;
        io.device_open = true;

        Ok(io)
    }

    fn request(&self) -> Option<RequestId> {
        self.request.filter(|_| self.device_open)
    }
}

impl<D: Devices + ?Sized> Drop for DeviceIo<'_, D> {
    fn drop(&mut self) {
        if self.device_open {
            if let Some(request) = self.request {
                self.devices.close_device(request);
            }
            self.device_open = false;
        }
        if let Some(request) = self.request.take() {
            self.devices.delete_request(request);
        }
        if let Some(port) = self.port.take() {
            self.devices.delete_port(port);
        }
    }
}

/// The game's handler in the input device's chain.
///
/// While it is installed the handler sees every input event before
/// Intuition does. Dropping the tap (or [`InputTap::close`]) takes it out
/// again.
pub struct InputTap<'d, D: Devices + ?Sized> {
    io: DeviceIo<'d, D>,
    handler: Option<HandlerId>,
    handler_added: bool,
}

impl<'d, D: Devices + ?Sized> InputTap<'d, D> {
    /// Install `code` as an input handler, called with `data`.
    pub fn open(devices: &'d mut D, code: u32, data: u32) -> Result<Self> {
        let io = DeviceIo::open(devices, INPUT_DEVICE, 0)?;
        let mut tap = Self { io, handler: None, handler_added: false };

        let spec = HandlerSpec { priority: HANDLER_PRIORITY, name: HANDLER_NAME, code, data };
        let handler = tap.io.devices.alloc_handler(spec).ok_or(Error::OutOfMemory)?;
        tap.handler = Some(handler);

        if let Some(request) = tap.io.request() {
            tap.io
                .devices
                .do_io(request, IoCommand::AddHandler(handler))
                .map_err(|code| Error::HandlerRejected { code })?;
            tap.handler_added = true;
        }

        info!("input handler {:?} installed", handler);
        Ok(tap)
    }

    pub fn is_installed(&self) -> bool {
        self.handler_added
    }

    /// The device layer, for calls made while the tap is open.
    pub fn devices(&mut self) -> &mut D {
        &mut *self.io.devices
    }

    pub fn close(self) {}
}

impl<D: Devices + ?Sized> Drop for InputTap<'_, D> {
    fn drop(&mut self) {
        if self.handler_added {
            if let (Some(request), Some(handler)) = (self.io.request(), self.handler) {
                // Removal cannot be refused once added.
                let _ = self.io.devices.do_io(request, IoCommand::RemoveHandler(handler));
            }
            self.handler_added = false;
            debug!("input handler removed");
        }
        if let Some(handler) = self.handler.take() {
            self.io.devices.free_handler(handler);
        }
    }
}

/// Microsecond part of the system time. Enough to seed a generator, not to
/// measure anything.
pub fn query_microsecond_clock<D: Devices + ?Sized>(devices: &mut D) -> Result<u32> {
    let mut io = DeviceIo::open(devices, TIMER_DEVICE, UNIT_VBLANK)?;
    let request = io.request().ok_or(Error::DeviceUnavailable { name: TIMER_DEVICE, unit: UNIT_VBLANK, code: -1 })?;

    match io.devices.do_io(request, IoCommand::GetSysTime) {
        Ok(IoReply::SysTime(time)) => Ok(time.micros),
        Ok(_) => Err(Error::DeviceUnavailable { name: TIMER_DEVICE, unit: UNIT_VBLANK, code: -1 }),
        Err(code) => Err(Error::DeviceUnavailable { name: TIMER_DEVICE, unit: UNIT_VBLANK, code }),
    }
}

/// Random source for the game, seeded from the system clock.
pub fn seeded_rng<D: Devices + ?Sized>(devices: &mut D) -> Result<StdRng> {
    let seed = query_microsecond_clock(devices)?;
    debug!("rng seed {}", seed);
    Ok(StdRng::seed_from_u64(seed as u64))
}
