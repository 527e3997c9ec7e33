//! In-memory [`Protocol`] for unit tests.

use std::os::fd::BorrowedFd;

use parking_lot::Mutex;

use super::{BufferId, Event, Protocol, ReleaseFlag, WindowId};
use crate::error::{DriverError, Result};
use crate::frame::damage::DamageRegion;
use crate::geometry::Size;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateWindow(WindowId),
    DestroyWindow(WindowId),
    CreateBuffer(BufferId, Size),
    DestroyBuffer(BufferId),
    Attach(WindowId, BufferId),
    Damage(WindowId, DamageRegion),
    Frame(WindowId),
    Commit(WindowId),
    BufferScale(WindowId, i32),
    Other(&'static str),
}

#[derive(Default)]
pub struct MockProtocol {
    pub calls: Mutex<Vec<Call>>,
    pub releases: Mutex<Vec<(BufferId, ReleaseFlag)>>,
}

impl MockProtocol {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Simulates `wl_buffer.release` for every buffer created so far.
    pub fn release_all(&self) {
        for (_, flag) in self.releases.lock().iter() {
            flag.release();
        }
    }

    pub fn release(&self, buffer: BufferId) {
        for (id, flag) in self.releases.lock().iter() {
            if *id == buffer {
                flag.release();
            }
        }
    }

    fn record(&self, call: Call) -> Result<()> {
        self.calls.lock().push(call);
        Ok(())
    }
}

impl Protocol for MockProtocol {
    fn roundtrip(&self) -> Result<()> {
        self.record(Call::Other("roundtrip"))
    }

    fn verify_globals(&self) -> Result<()> {
        Ok(())
    }

    fn create_window(&self, window: WindowId) -> Result<()> {
        self.record(Call::CreateWindow(window))
    }

    fn destroy_window(&self, window: WindowId) -> Result<()> {
        self.record(Call::DestroyWindow(window))
    }

    fn has_keyboard(&self) -> bool {
        false
    }

    fn set_buffer_scale(&self, window: WindowId, scale: i32) -> Result<()> {
        self.record(Call::BufferScale(window, scale))
    }

    fn set_app_id(&self, _: WindowId, _: &str) -> Result<()> {
        self.record(Call::Other("set_app_id"))
    }

    fn set_title(&self, _: WindowId, _: &str) -> Result<()> {
        self.record(Call::Other("set_title"))
    }

    fn set_min_size(&self, _: WindowId, _: Size) -> Result<()> {
        self.record(Call::Other("set_min_size"))
    }

    fn set_max_size(&self, _: WindowId, _: Size) -> Result<()> {
        self.record(Call::Other("set_max_size"))
    }

    fn set_minimized(&self, _: WindowId) -> Result<()> {
        self.record(Call::Other("set_minimized"))
    }

    fn ack_configure(&self, _: WindowId, _: u32) -> Result<()> {
        self.record(Call::Other("ack_configure"))
    }

    fn create_buffer(
        &self,
        buffer: BufferId,
        _: BorrowedFd<'_>,
        size: Size,
        release: ReleaseFlag,
    ) -> Result<()> {
        self.releases.lock().push((buffer, release));
        self.record(Call::CreateBuffer(buffer, size))
    }

    fn destroy_buffer(&self, buffer: BufferId) -> Result<()> {
        self.record(Call::DestroyBuffer(buffer))
    }

    fn attach(&self, window: WindowId, buffer: BufferId) -> Result<()> {
        self.record(Call::Attach(window, buffer))
    }

    fn damage_buffer(&self, window: WindowId, region: DamageRegion) -> Result<()> {
        self.record(Call::Damage(window, region))
    }

    fn request_frame(&self, window: WindowId) -> Result<()> {
        self.record(Call::Frame(window))
    }

    fn commit(&self, window: WindowId) -> Result<()> {
        self.record(Call::Commit(window))
    }

    fn dispatch(&self, _: &mut Vec<Event>) -> Result<bool> {
        Ok(false)
    }

    fn shutdown(&self) -> Vec<DriverError> {
        Vec::new()
    }
}
