//! # Process environment
//!
//! Everything the game changes about the host before taking the hardware:
//! bound libraries, Workbench, error requesters and the active view.
//! [`Environment::fini`] undoes whatever [`Environment::init`] got done, so
//! it is also the cleanup path for a failed init.

use log::{debug, info, warn};
use modsurfer_hw::{Exec, HardwareSession};

use crate::error::{Error, Result};
use crate::host::{BitMapFlags, Dos, Libraries, Shell, ViewHandle};

pub const GRAPHICS_LIBRARY: &str = "graphics.library";
pub const INTUITION_LIBRARY: &str = "intuition.library";

/// Kickstart 1.2
pub const MIN_LIBRARY_VERSION: u16 = 33;
/// Kickstart 3.0, first with bitmap attributes
pub const BITMAP_ATTR_VERSION: u16 = 39;

/// Error routing that suppresses requesters. Nobody can answer them while the
/// game owns display and input.
pub const SUPPRESS_REQUESTERS: i32 = -1;

const WORKBENCH_SCREEN: &str = "Workbench";

#[derive(Debug, Default)]
pub struct Environment {
    graphics: Option<u16>,
    intuition: Option<u16>,
    workbench_closed: bool,
    saved_routing: Option<i32>,
    saved_view: Option<ViewHandle>,
}

impl Environment {
    /// Bind libraries, close Workbench unless the display is RTG, and
    /// suppress requesters. On failure nothing stays changed.
    pub fn init<H: Libraries + Shell + ?Sized>(host: &mut H) -> Result<Self> {
        let mut env = Self::default();
        if let Err(e) = env.setup(host) {
            warn!("environment setup failed: {}", e);
            env.fini(host);
            return Err(e);
        }
        info!("environment ready (graphics v{:?}, workbench closed: {})", env.graphics, env.workbench_closed);
        Ok(env)
    }

    fn setup<H: Libraries + Shell + ?Sized>(&mut self, host: &mut H) -> Result<()> {
        self.graphics = Some(open_library(host, GRAPHICS_LIBRARY)?);
        self.intuition = Some(open_library(host, INTUITION_LIBRARY)?);

        if !self.is_rtg(host) {
            self.workbench_closed = host.close_workbench();
        }

        self.saved_routing = Some(host.error_routing());
        host.set_error_routing(SUPPRESS_REQUESTERS);
        Ok(())
    }

    /// Undo [`init`](Self::init). Safe to call more than once.
    pub fn fini<H: Libraries + Shell + ?Sized>(&mut self, host: &mut H) {
        self.unload_view(host);

        if let Some(routing) = self.saved_routing.take() {
            host.set_error_routing(routing);
        }

        if self.workbench_closed {
            host.open_workbench();
            self.workbench_closed = false;
        }

        if self.intuition.take().is_some() {
            host.close_library(INTUITION_LIBRARY);
        }
        if self.graphics.take().is_some() {
            host.close_library(GRAPHICS_LIBRARY);
        }
    }

    pub fn is_bound(&self) -> bool {
        self.graphics.is_some() || self.intuition.is_some()
    }

    pub fn graphics_version(&self) -> Option<u16> {
        self.graphics
    }

    pub fn workbench_closed(&self) -> bool {
        self.workbench_closed
    }

    /// Whether Workbench runs on a retargetable graphics card rather than
    /// the custom chips. Always `false` before Kickstart 3.0.
    pub fn is_rtg<S: Shell + ?Sized>(&self, shell: &mut S) -> bool {
        if !self.graphics.is_some_and(|version| version >= BITMAP_ATTR_VERSION) {
            return false;
        }

        let Some(screen) = shell.lock_public_screen(WORKBENCH_SCREEN) else {
            return false;
        };
        let flags = shell.bitmap_flags(screen);
        shell.unlock_public_screen(screen);

        !flags.contains(BitMapFlags::STANDARD)
    }

    /// Switch the display to `view`, remembering the host's view.
    pub fn load_view<S: Shell + ?Sized>(&mut self, shell: &mut S, view: ViewHandle) {
        if self.saved_view.is_none() {
            self.saved_view = shell.active_view();
        }

        shell.load_view(None);
        shell.wait_tof();
        shell.wait_tof();

        shell.load_view(Some(view));
        shell.wait_tof();
        shell.wait_tof();
        debug!("view {:?} loaded", view);
    }

    /// Put the host's view back, once.
    pub fn unload_view<S: Shell + ?Sized>(&mut self, shell: &mut S) {
        if let Some(view) = self.saved_view.take() {
            shell.load_view(Some(view));
            debug!("host view {:?} restored", view);
        }
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if self.is_bound() {
            warn!("environment dropped without fini");
        }
    }
}

fn open_library<L: Libraries + ?Sized>(host: &mut L, name: &'static str) -> Result<u16> {
    let version = host
        .open_library(name, MIN_LIBRARY_VERSION)
        .ok_or(Error::LibraryUnavailable { name, version: MIN_LIBRARY_VERSION })?;
    debug!("{} v{} opened", name, version);
    Ok(version)
}

/// Report a failed assertion on the console.
///
/// Only possible while DOS is bound and task switching is allowed: DOS
/// needs the scheduler to service the write, and the console needs the
/// blitter to draw, so the session lends it back for the write. Returns
/// whether anything was written.
pub fn print_error<E, D>(session: &mut HardwareSession, exec: &mut E, dos: Option<&mut D>, msg: &str) -> bool
where
    E: Exec + ?Sized,
    D: Dos + ?Sized,
{
    warn!("assert({}) failed", msg);

    let Some(dos) = dos else {
        return false;
    };
    if session.task_switch_suppressed() {
        return false;
    }

    session.with_blitter_lent(exec, |_| {
        for part in ["modsurfer: assert(", msg, ") failed\n"] {
            dos.write_output(part.as_bytes());
        }
    });
    true
}
