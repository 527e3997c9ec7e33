//! The wire seam between the driver and the compositor
//!
//! Everything above this module talks to the compositor through the
//! [`Protocol`] trait: requests are plain method calls naming objects by
//! [`WindowId`] or [`BufferId`], and compositor events come back out of
//! [`Protocol::dispatch`] as typed [`Event`]s carrying the same ids. No
//! protocol callback ever captures driver state; the only datum the protocol
//! layer writes behind the driver's back is a buffer's [`ReleaseFlag`].
//!
//! [`wayland::WaylandProtocol`] is the real implementation on top of
//! `wayland-client`. Tests substitute a recording implementation.
//!
//! # Usage
//!
//! ```no_run
//! use lumen::protocol::{wayland::WaylandProtocol, Event};
//!
//! let protocol = WaylandProtocol::connect()?;
//! protocol.roundtrip()?;
//! protocol.roundtrip()?;
//! protocol.verify_globals()?;
//!
//! let mut events = Vec::new();
//! while protocol.dispatch(&mut events)? {
//!     for event in events.drain(..) {
//!         if let Event::ToplevelClose(window) = event {
//!             println!("{window:?} wants to close");
//!         }
//!     }
//! }
//! # Ok::<(), lumen::DriverError>(())
//! ```

pub mod keymap;
pub mod wayland;

#[cfg(test)]
pub(crate) mod mock;

use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{DriverError, Result};
use crate::frame::damage::DamageRegion;
use crate::geometry::Size;
use crate::key::KeyEvent;

static NEXT_WINDOW_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one window and its surface/xdg_surface/toplevel triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u64);

impl WindowId {
    pub fn next() -> Self {
        WindowId(NEXT_WINDOW_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Identifies one `wl_buffer` backed by a [`crate::shm::SharedBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    pub fn next() -> Self {
        BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Whether the compositor has released a buffer.
///
/// Written by the dispatch thread when `wl_buffer.release` arrives and read by
/// whichever thread presents the next frame. It only goes busy to free through
/// [`ReleaseFlag::release`] and free to busy through [`ReleaseFlag::try_claim`].
#[derive(Debug, Clone)]
pub struct ReleaseFlag(Arc<AtomicBool>);

impl ReleaseFlag {
    /// A new flag starts busy: the buffer is about to be attached.
    pub fn new() -> Self {
        ReleaseFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn release(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_free(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Claims a free buffer, returning false if it was busy.
    pub fn try_claim(&self) -> bool {
        self.0
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for ReleaseFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Compositor events the driver reacts to, addressed by object id.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The frame callback registered for this window fired
    FrameDone(WindowId),
    /// `xdg_surface.configure`; must be acked with `serial`
    SurfaceConfigure { window: WindowId, serial: u32 },
    /// `xdg_toplevel.configure`; zero means the client picks
    ToplevelConfigure {
        window: WindowId,
        width: i32,
        height: i32,
    },
    /// `xdg_toplevel.close`
    ToplevelClose(WindowId),
    /// A key press or release on the seat's keyboard
    Key(KeyEvent),
}

impl Event {
    /// The window this event is addressed to, if any.
    pub fn window(&self) -> Option<WindowId> {
        match self {
            Event::FrameDone(window)
            | Event::SurfaceConfigure { window, .. }
            | Event::ToplevelConfigure { window, .. }
            | Event::ToplevelClose(window) => Some(*window),
            Event::Key(_) => None,
        }
    }
}

/// Requests the driver issues to the compositor.
///
/// Every method is safe to call from any thread. Implementations serialize
/// access to their own object tables; callers serialize access to the
/// session as a whole.
pub trait Protocol: Send + Sync {
    /// Blocks until the compositor has processed every request sent so far.
    fn roundtrip(&self) -> Result<()>;

    /// Fails with [`DriverError::MissingGlobal`] unless `wl_compositor`,
    /// `wl_shm` and `xdg_wm_base` are bound.
    fn verify_globals(&self) -> Result<()>;

    /// Whether the seat currently exposes a keyboard.
    fn has_keyboard(&self) -> bool;

    /// Creates a `wl_surface` with its `xdg_surface` and `xdg_toplevel`.
    fn create_window(&self, window: WindowId) -> Result<()>;

    /// Destroys the toplevel, the xdg_surface and the surface, in that order.
    fn destroy_window(&self, window: WindowId) -> Result<()>;

    /// Declares that buffers attached to the surface are `scale` times its
    /// surface-local size.
    fn set_buffer_scale(&self, window: WindowId, scale: i32) -> Result<()>;

    fn set_app_id(&self, window: WindowId, app_id: &str) -> Result<()>;

    fn set_title(&self, window: WindowId, title: &str) -> Result<()>;

    /// `0x0` removes the constraint.
    fn set_min_size(&self, window: WindowId, size: Size) -> Result<()>;

    /// `0x0` removes the constraint.
    fn set_max_size(&self, window: WindowId, size: Size) -> Result<()>;

    fn set_minimized(&self, window: WindowId) -> Result<()>;

    fn ack_configure(&self, window: WindowId, serial: u32) -> Result<()>;

    /// Wraps `fd` in a one-shot `wl_shm_pool` holding a single ARGB8888
    /// buffer of `size`. `release` is flipped to free on `wl_buffer.release`.
    fn create_buffer(
        &self,
        buffer: BufferId,
        fd: BorrowedFd<'_>,
        size: Size,
        release: ReleaseFlag,
    ) -> Result<()>;

    fn destroy_buffer(&self, buffer: BufferId) -> Result<()>;

    fn attach(&self, window: WindowId, buffer: BufferId) -> Result<()>;

    /// Marks a rectangle of the attached buffer as changed, in buffer pixels.
    fn damage_buffer(&self, window: WindowId, region: DamageRegion) -> Result<()>;

    /// Registers a frame callback; it fires as [`Event::FrameDone`].
    fn request_frame(&self, window: WindowId) -> Result<()>;

    fn commit(&self, window: WindowId) -> Result<()>;

    /// Blocks for one read/dispatch round and appends the resulting events.
    ///
    /// Returns `Ok(false)` once the connection is closed, either by the
    /// compositor or by [`Protocol::shutdown`].
    fn dispatch(&self, events: &mut Vec<Event>) -> Result<bool>;

    /// Releases every global and closes the connection. Each step is
    /// attempted; the failures are returned rather than propagated.
    fn shutdown(&self) -> Vec<DriverError>;
}

/// Opens a fresh [`Protocol`] connection. The real one is
/// [`wayland::WaylandProtocol::connect`].
pub type Connector = Box<dyn Fn() -> Result<Arc<dyn Protocol>> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_flag_transitions() {
        let flag = ReleaseFlag::new();
        assert!(!flag.is_free());
        assert!(!flag.try_claim(), "cannot claim a busy buffer");

        flag.clone().release();
        assert!(flag.is_free());

        assert!(flag.try_claim());
        assert!(!flag.is_free());
        assert!(!flag.try_claim(), "a buffer is claimed at most once");
    }

    #[test]
    fn test_ids_are_unique() {
        let a = WindowId::next();
        let b = WindowId::next();
        assert_ne!(a, b);
        assert_ne!(BufferId::next(), BufferId::next());
    }

    #[test]
    fn test_event_addressing() {
        let window = WindowId::next();
        assert_eq!(Event::FrameDone(window).window(), Some(window));
        assert_eq!(
            Event::SurfaceConfigure { window, serial: 7 }.window(),
            Some(window)
        );
    }
}
