// Shared fixtures for the integration tests
//
// RecordingProtocol stands in for the compositor: it records every request,
// keeps each buffer's release flag so tests can play `wl_buffer.release`, and
// hands out scripted events from a blocking dispatch.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use lumen::frame::damage::DamageRegion;
use lumen::protocol::{BufferId, Connector, Event, Protocol, ReleaseFlag, WindowId};
use lumen::{Driver, DriverError, LumenConfig, Result, Size};

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Roundtrip,
    CreateWindow(WindowId),
    DestroyWindow(WindowId),
    SetBufferScale(WindowId, i32),
    SetAppId(WindowId, String),
    SetTitle(WindowId, String),
    SetMinSize(WindowId, Size),
    SetMaxSize(WindowId, Size),
    SetMinimized(WindowId),
    AckConfigure(WindowId, u32),
    CreateBuffer(BufferId, Size),
    DestroyBuffer(BufferId),
    Attach(WindowId, BufferId),
    Damage(WindowId, DamageRegion),
    Frame(WindowId),
    Commit(WindowId),
    Shutdown,
}

#[derive(Default)]
struct EventQueue {
    pending: VecDeque<Event>,
    closed: bool,
    dispatches: usize,
}

#[derive(Default)]
pub struct RecordingProtocol {
    requests: Mutex<Vec<Request>>,
    buffers: Mutex<Vec<(BufferId, Size, ReleaseFlag)>>,
    queue: Mutex<EventQueue>,
    wakeup: Condvar,
    keyboard: AtomicBool,
}

impl RecordingProtocol {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connector(self: &Arc<Self>) -> Connector {
        let protocol = self.clone();
        Box::new(move || Ok(protocol.clone() as Arc<dyn Protocol>))
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    pub fn clear(&self) {
        self.requests.lock().clear();
    }

    pub fn count(&self, pred: impl Fn(&Request) -> bool) -> usize {
        self.requests.lock().iter().filter(|r| pred(r)).count()
    }

    /// Buffers attached to `window`, in order.
    pub fn attached(&self, window: WindowId) -> Vec<BufferId> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| match r {
                Request::Attach(w, b) if *w == window => Some(*b),
                _ => None,
            })
            .collect()
    }

    pub fn buffer_size(&self, buffer: BufferId) -> Option<Size> {
        self.buffers
            .lock()
            .iter()
            .find(|(id, _, _)| *id == buffer)
            .map(|(_, size, _)| *size)
    }

    pub fn is_free(&self, buffer: BufferId) -> bool {
        self.buffers
            .lock()
            .iter()
            .any(|(id, _, flag)| *id == buffer && flag.is_free())
    }

    /// Plays `wl_buffer.release` for one buffer.
    pub fn release(&self, buffer: BufferId) {
        for (id, _, flag) in self.buffers.lock().iter() {
            if *id == buffer {
                flag.release();
            }
        }
    }

    pub fn release_all(&self) {
        for (_, _, flag) in self.buffers.lock().iter() {
            flag.release();
        }
    }

    /// Queues an event for the next dispatch round.
    pub fn push_event(&self, event: Event) {
        self.queue.lock().pending.push_back(event);
        self.wakeup.notify_all();
    }

    /// Number of dispatch rounds entered so far.
    pub fn dispatches(&self) -> usize {
        self.queue.lock().dispatches
    }

    /// Blocks until a dispatch round is waiting for events.
    pub fn wait_for_dispatch(&self) {
        let mut queue = self.queue.lock();
        while queue.dispatches == 0 {
            self.wakeup.wait_for(&mut queue, Duration::from_millis(10));
        }
    }

    /// Plays a seat capability change adding or removing the keyboard.
    pub fn set_keyboard(&self, present: bool) {
        self.keyboard.store(present, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    fn record(&self, request: Request) -> Result<()> {
        self.requests.lock().push(request);
        Ok(())
    }
}

impl Protocol for RecordingProtocol {
    fn roundtrip(&self) -> Result<()> {
        self.record(Request::Roundtrip)
    }

    fn verify_globals(&self) -> Result<()> {
        Ok(())
    }

    fn create_window(&self, window: WindowId) -> Result<()> {
        self.record(Request::CreateWindow(window))
    }

    fn destroy_window(&self, window: WindowId) -> Result<()> {
        self.record(Request::DestroyWindow(window))
    }

    fn has_keyboard(&self) -> bool {
        self.keyboard.load(Ordering::Acquire)
    }

    fn set_buffer_scale(&self, window: WindowId, scale: i32) -> Result<()> {
        self.record(Request::SetBufferScale(window, scale))
    }

    fn set_app_id(&self, window: WindowId, app_id: &str) -> Result<()> {
        self.record(Request::SetAppId(window, app_id.to_string()))
    }

    fn set_title(&self, window: WindowId, title: &str) -> Result<()> {
        self.record(Request::SetTitle(window, title.to_string()))
    }

    fn set_min_size(&self, window: WindowId, size: Size) -> Result<()> {
        self.record(Request::SetMinSize(window, size))
    }

    fn set_max_size(&self, window: WindowId, size: Size) -> Result<()> {
        self.record(Request::SetMaxSize(window, size))
    }

    fn set_minimized(&self, window: WindowId) -> Result<()> {
        self.record(Request::SetMinimized(window))
    }

    fn ack_configure(&self, window: WindowId, serial: u32) -> Result<()> {
        self.record(Request::AckConfigure(window, serial))
    }

    fn create_buffer(
        &self,
        buffer: BufferId,
        _fd: BorrowedFd<'_>,
        size: Size,
        release: ReleaseFlag,
    ) -> Result<()> {
        self.buffers.lock().push((buffer, size, release));
        self.record(Request::CreateBuffer(buffer, size))
    }

    fn destroy_buffer(&self, buffer: BufferId) -> Result<()> {
        self.record(Request::DestroyBuffer(buffer))
    }

    fn attach(&self, window: WindowId, buffer: BufferId) -> Result<()> {
        self.record(Request::Attach(window, buffer))
    }

    fn damage_buffer(&self, window: WindowId, region: DamageRegion) -> Result<()> {
        self.record(Request::Damage(window, region))
    }

    fn request_frame(&self, window: WindowId) -> Result<()> {
        self.record(Request::Frame(window))
    }

    fn commit(&self, window: WindowId) -> Result<()> {
        self.record(Request::Commit(window))
    }

    fn dispatch(&self, events: &mut Vec<Event>) -> Result<bool> {
        let mut queue = self.queue.lock();
        queue.dispatches += 1;
        self.wakeup.notify_all();
        loop {
            if queue.closed {
                return Ok(false);
            }
            if !queue.pending.is_empty() {
                events.extend(queue.pending.drain(..));
                return Ok(true);
            }
            self.wakeup.wait(&mut queue);
        }
    }

    fn shutdown(&self) -> Vec<DriverError> {
        self.requests.lock().push(Request::Shutdown);
        self.queue.lock().closed = true;
        self.wakeup.notify_all();
        Vec::new()
    }
}

/// A driver whose windows open at `width`x`height` with scale 1.
pub fn driver(width: u32, height: u32) -> (Arc<RecordingProtocol>, Driver) {
    let protocol = RecordingProtocol::new();
    let mut config = LumenConfig::default();
    config.window.default_width = width;
    config.window.default_height = height;
    let driver = Driver::with_connector(config, protocol.connector());
    (protocol, driver)
}

pub fn configure(window: WindowId, serial: u32) -> Event {
    Event::SurfaceConfigure { window, serial }
}
