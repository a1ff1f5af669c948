//! # Simulated host
//!
//! [`SimHost`] stands in for the OS libraries, devices and DOS. It keeps a
//! log of every resource call and can be told to fail any one of them, so
//! teardown after a partial setup can be checked.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::environment::GRAPHICS_LIBRARY;
use crate::host::{
    BitMapFlags, DeviceNode, Devices, Dos, HandlerId, HandlerSpec, IoCommand, IoReply, Libraries, NodeKind, PortId,
    RequestId, ScreenHandle, Shell, TimeVal, ViewHandle,
};

/// Resource call the host can be told to refuse.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FailPoint {
    CreatePort,
    CreateRequest,
    /// Refuse `open_device` with this error code.
    OpenDevice(i8),
    AllocHandler,
    /// Refuse `IND_ADDHANDLER` with this error code.
    AddHandler(i8),
}

/// Resource call, as recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostCall {
    CreatePort(PortId),
    DeletePort(PortId),
    CreateRequest(RequestId),
    DeleteRequest(RequestId),
    OpenDevice { name: &'static str, unit: u32 },
    CloseDevice(RequestId),
    AllocHandler(HandlerId),
    FreeHandler(HandlerId),
    AddHandler(HandlerId),
    RemoveHandler(HandlerId),
    GetSysTime,
}

#[derive(Debug)]
pub struct SimHost {
    available: BTreeMap<&'static str, u16>,
    open: Vec<&'static str>,

    workbench_open: bool,
    rtg: bool,
    locked_screens: u32,
    routing: i32,
    active_view: Option<ViewHandle>,
    frames_waited: u32,
    view_loads: u32,

    next_id: u32,
    ports: BTreeSet<PortId>,
    requests: BTreeSet<RequestId>,
    open_devices: BTreeMap<RequestId, &'static str>,
    handlers: BTreeMap<HandlerId, HandlerSpec>,
    installed_handlers: Vec<HandlerId>,
    fail: Option<FailPoint>,
    clock: TimeVal,
    calls: Vec<HostCall>,

    output: Vec<u8>,
    device_nodes: Vec<DeviceNode>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    pub const DEFAULT_ROUTING: i32 = 0;
    pub const HOST_VIEW: ViewHandle = ViewHandle(0x0000_0C00);

    /// A Kickstart 3.1 machine running Workbench on the custom chips.
    pub fn new() -> Self {
        let available = [
            (GRAPHICS_LIBRARY, 40),
            (crate::environment::INTUITION_LIBRARY, 40),
            ("dos.library", 40),
        ]
        .into_iter()
        .collect();

        Self {
            available,
            open: Vec::new(),
            workbench_open: true,
            rtg: false,
            locked_screens: 0,
            routing: Self::DEFAULT_ROUTING,
            active_view: Some(Self::HOST_VIEW),
            frames_waited: 0,
            view_loads: 0,
            next_id: 1,
            ports: BTreeSet::new(),
            requests: BTreeSet::new(),
            open_devices: BTreeMap::new(),
            handlers: BTreeMap::new(),
            installed_handlers: Vec::new(),
            fail: None,
            clock: TimeVal { secs: 1_000, micros: 421_337 },
            calls: Vec::new(),
            output: Vec::new(),
            device_nodes: Vec::new(),
        }
    }

    pub fn with_graphics_version(mut self, version: u16) -> Self {
        self.available.insert(GRAPHICS_LIBRARY, version);
        self
    }

    pub fn without_library(mut self, name: &'static str) -> Self {
        self.available.remove(name);
        self
    }

    pub fn with_rtg_workbench(mut self) -> Self {
        self.rtg = true;
        self
    }

    pub fn with_clock(mut self, time: TimeVal) -> Self {
        self.clock = time;
        self
    }

    pub fn with_device_node(mut self, kind: NodeKind, name: &str, has_task: bool) -> Self {
        self.device_nodes.push(DeviceNode { kind, name: name.to_string(), has_task });
        self
    }

    /// Refuse the next call matching `point`.
    pub fn fail_at(&mut self, point: FailPoint) {
        self.fail = Some(point);
    }

    fn should_fail(&mut self, point: impl Fn(FailPoint) -> bool) -> Option<FailPoint> {
        match self.fail {
            Some(f) if point(f) => self.fail.take(),
            _ => None,
        }
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn open_libraries(&self) -> &[&'static str] {
        &self.open
    }

    pub fn workbench_open(&self) -> bool {
        self.workbench_open
    }

    pub fn locked_screens(&self) -> u32 {
        self.locked_screens
    }

    pub fn frames_waited(&self) -> u32 {
        self.frames_waited
    }

    pub fn view_loads(&self) -> u32 {
        self.view_loads
    }

    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    pub fn installed_handlers(&self) -> Vec<HandlerSpec> {
        self.installed_handlers.iter().filter_map(|id| self.handlers.get(id).copied()).collect()
    }

    /// Ports, requests, open devices and handler nodes still alive.
    pub fn outstanding(&self) -> usize {
        self.ports.len() + self.requests.len() + self.open_devices.len() + self.handlers.len()
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Libraries for SimHost {
    fn open_library(&mut self, name: &'static str, min_version: u16) -> Option<u16> {
        let version = *self.available.get(name)?;
        if version < min_version {
            return None;
        }
        self.open.push(name);
        Some(version)
    }

    fn close_library(&mut self, name: &'static str) {
        if let Some(pos) = self.open.iter().rposition(|n| *n == name) {
            self.open.remove(pos);
        }
    }
}

impl Shell for SimHost {
    fn close_workbench(&mut self) -> bool {
        let was_open = self.workbench_open;
        self.workbench_open = false;
        was_open
    }

    fn open_workbench(&mut self) -> bool {
        self.workbench_open = true;
        true
    }

    fn lock_public_screen(&mut self, name: &str) -> Option<ScreenHandle> {
        if name != "Workbench" || !self.workbench_open {
            return None;
        }
        self.locked_screens += 1;
        Some(ScreenHandle(0x0000_8000))
    }

    fn bitmap_flags(&mut self, _screen: ScreenHandle) -> BitMapFlags {
        if self.rtg {
            BitMapFlags::DISPLAYABLE
        } else {
            BitMapFlags::DISPLAYABLE | BitMapFlags::STANDARD
        }
    }

    fn unlock_public_screen(&mut self, _screen: ScreenHandle) {
        self.locked_screens -= 1;
    }

    fn error_routing(&self) -> i32 {
        self.routing
    }

    fn set_error_routing(&mut self, token: i32) {
        self.routing = token;
    }

    fn active_view(&self) -> Option<ViewHandle> {
        self.active_view
    }

    fn load_view(&mut self, view: Option<ViewHandle>) {
        self.active_view = view;
        self.view_loads += 1;
    }

    fn wait_tof(&mut self) {
        self.frames_waited += 1;
    }
}

impl Devices for SimHost {
    fn create_port(&mut self) -> Option<PortId> {
        if self.should_fail(|f| f == FailPoint::CreatePort).is_some() {
            return None;
        }
        let port = PortId(self.next());
        self.ports.insert(port);
        self.calls.push(HostCall::CreatePort(port));
        Some(port)
    }

    fn delete_port(&mut self, port: PortId) {
        self.ports.remove(&port);
        self.calls.push(HostCall::DeletePort(port));
    }

    fn create_request(&mut self, port: PortId) -> Option<RequestId> {
        if !self.ports.contains(&port) || self.should_fail(|f| f == FailPoint::CreateRequest).is_some() {
            return None;
        }
        let request = RequestId(self.next());
        self.requests.insert(request);
        self.calls.push(HostCall::CreateRequest(request));
        Some(request)
    }

    fn delete_request(&mut self, request: RequestId) {
        self.requests.remove(&request);
        self.calls.push(HostCall::DeleteRequest(request));
    }

    fn open_device(&mut self, name: &'static str, unit: u32, request: RequestId) -> Result<(), i8> {
        if let Some(FailPoint::OpenDevice(code)) = self.should_fail(|f| matches!(f, FailPoint::OpenDevice(_))) {
            return Err(code);
        }
        self.open_devices.insert(request, name);
        self.calls.push(HostCall::OpenDevice { name, unit });
        Ok(())
    }

    fn close_device(&mut self, request: RequestId) {
        self.open_devices.remove(&request);
        self.calls.push(HostCall::CloseDevice(request));
    }

    fn alloc_handler(&mut self, spec: HandlerSpec) -> Option<HandlerId> {
        if self.should_fail(|f| f == FailPoint::AllocHandler).is_some() {
            return None;
        }
        let handler = HandlerId(self.next());
        self.handlers.insert(handler, spec);
        self.calls.push(HostCall::AllocHandler(handler));
        Some(handler)
    }

    fn free_handler(&mut self, handler: HandlerId) {
        self.handlers.remove(&handler);
        self.calls.push(HostCall::FreeHandler(handler));
    }

    fn do_io(&mut self, request: RequestId, command: IoCommand) -> Result<IoReply, i8> {
        let Some(device) = self.open_devices.get(&request).copied() else {
            return Err(-1);
        };
        debug!("{}: {:?}", device, command);

        match command {
            IoCommand::AddHandler(handler) => {
                if let Some(FailPoint::AddHandler(code)) = self.should_fail(|f| matches!(f, FailPoint::AddHandler(_)))
                {
                    return Err(code);
                }
                self.installed_handlers.push(handler);
                self.calls.push(HostCall::AddHandler(handler));
                Ok(IoReply::Done)
            }
            IoCommand::RemoveHandler(handler) => {
                self.installed_handlers.retain(|h| *h != handler);
                self.calls.push(HostCall::RemoveHandler(handler));
                Ok(IoReply::Done)
            }
            IoCommand::GetSysTime => {
                self.calls.push(HostCall::GetSysTime);
                Ok(IoReply::SysTime(self.clock))
            }
        }
    }
}

impl Dos for SimHost {
    fn write_output(&mut self, bytes: &[u8]) -> usize {
        self.output.extend_from_slice(bytes);
        bytes.len()
    }

    fn device_nodes(&self) -> Vec<DeviceNode> {
        self.device_nodes.clone()
    }
}
