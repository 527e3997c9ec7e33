//! [`Protocol`] on top of `wayland-client`
//!
//! Proxies created for a window or a buffer carry its id as user data, so
//! every handler below only turns the raw event into an [`Event`] and queues
//! it. The one exception is `wl_buffer.release`, which flips the buffer's
//! [`ReleaseFlag`] in place.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use wayland_client::backend::WaylandError;
use wayland_client::protocol::{
    wl_buffer, wl_callback, wl_compositor, wl_keyboard, wl_registry, wl_seat, wl_shm, wl_shm_pool,
    wl_surface,
};
use wayland_client::{
    delegate_noop, Connection, Dispatch, DispatchError, EventQueue, Proxy, QueueHandle, WEnum,
};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};

use super::keymap::{read_keymap, Keymap};
use super::{BufferId, Event, Protocol, ReleaseFlag, WindowId};
use crate::error::{DriverError, Result};
use crate::frame::damage::DamageRegion;
use crate::geometry::Size;
use crate::key::{key_name, KeyEvent};

const COMPOSITOR_VERSION: u32 = 4;
const SHM_VERSION: u32 = 1;
const WM_BASE_VERSION: u32 = 2;
const SEAT_VERSION: u32 = 5;

/// Globals bound from the registry. Shared between the dispatch thread, which
/// fills it in, and request methods called from any thread.
#[derive(Default)]
struct Globals {
    compositor: Option<wl_compositor::WlCompositor>,
    shm: Option<wl_shm::WlShm>,
    wm_base: Option<xdg_wm_base::XdgWmBase>,
    seat: Option<wl_seat::WlSeat>,
    keyboard: Option<wl_keyboard::WlKeyboard>,
    keymap: Option<Keymap>,
}

impl Globals {
    fn release_keyboard(&mut self) {
        if let Some(keyboard) = self.keyboard.take() {
            if keyboard.version() >= 3 {
                keyboard.release();
            }
        }
        self.keymap = None;
    }
}

/// Dispatch state handed to the event queue.
struct EventSink {
    globals: Arc<Mutex<Globals>>,
    events: Vec<Event>,
    fatal: Option<DriverError>,
}

struct EventLoop {
    queue: EventQueue<EventSink>,
    sink: EventSink,
}

struct SurfaceObjects {
    surface: wl_surface::WlSurface,
    xdg_surface: xdg_surface::XdgSurface,
    toplevel: xdg_toplevel::XdgToplevel,
}

/// A live connection to the compositor named by `WAYLAND_DISPLAY`.
pub struct WaylandProtocol {
    connection: Connection,
    registry: Mutex<Option<wl_registry::WlRegistry>>,
    qh: QueueHandle<EventSink>,
    globals: Arc<Mutex<Globals>>,
    event_loop: Mutex<EventLoop>,
    windows: Mutex<HashMap<WindowId, SurfaceObjects>>,
    buffers: Mutex<HashMap<BufferId, wl_buffer::WlBuffer>>,
    closed: AtomicBool,
}

impl WaylandProtocol {
    /// Connects and requests the registry. Globals are bound by the
    /// round-trips the caller performs next.
    pub fn connect() -> Result<Arc<dyn Protocol>> {
        let connection = Connection::connect_to_env()?;
        let queue = connection.new_event_queue();
        let qh = queue.handle();
        let registry = connection.display().get_registry(&qh, ());
        let globals = Arc::new(Mutex::new(Globals::default()));

        info!("Connected to Wayland display");

        Ok(Arc::new(Self {
            connection,
            registry: Mutex::new(Some(registry)),
            qh,
            globals: globals.clone(),
            event_loop: Mutex::new(EventLoop {
                queue,
                sink: EventSink {
                    globals,
                    events: Vec::new(),
                    fatal: None,
                },
            }),
            windows: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }))
    }

    fn flush(&self) -> Result<()> {
        match self.connection.flush() {
            Ok(()) => Ok(()),
            Err(WaylandError::Io(e)) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(_) if self.closed.load(Ordering::Acquire) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn with_surface<T>(
        &self,
        window: WindowId,
        f: impl FnOnce(&SurfaceObjects) -> T,
    ) -> Result<T> {
        let windows = self.windows.lock();
        let objects = windows
            .get(&window)
            .ok_or(DriverError::UnknownWindow(window))?;
        let value = f(objects);
        drop(windows);
        self.flush()?;
        Ok(value)
    }

    fn is_closed_error(err: &DispatchError) -> bool {
        match err {
            DispatchError::Backend(WaylandError::Io(e)) => matches!(
                e.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

impl Protocol for WaylandProtocol {
    fn roundtrip(&self) -> Result<()> {
        let mut event_loop = self.event_loop.lock();
        let EventLoop { queue, sink } = &mut *event_loop;
        queue.roundtrip(sink)?;
        match sink.fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn verify_globals(&self) -> Result<()> {
        let globals = self.globals.lock();
        if globals.compositor.is_none() {
            return Err(DriverError::MissingGlobal("wl_compositor"));
        }
        if globals.shm.is_none() {
            return Err(DriverError::MissingGlobal("wl_shm"));
        }
        if globals.wm_base.is_none() {
            return Err(DriverError::MissingGlobal("xdg_wm_base"));
        }
        if globals.seat.is_none() {
            debug!("No wl_seat advertised, keyboard input disabled");
        }
        Ok(())
    }

    fn create_window(&self, window: WindowId) -> Result<()> {
        let globals = self.globals.lock();
        let compositor = globals
            .compositor
            .as_ref()
            .ok_or(DriverError::MissingGlobal("wl_compositor"))?;
        let wm_base = globals
            .wm_base
            .as_ref()
            .ok_or(DriverError::MissingGlobal("xdg_wm_base"))?;

        let surface = compositor.create_surface(&self.qh, window);
        let xdg_surface = wm_base.get_xdg_surface(&surface, &self.qh, window);
        let toplevel = xdg_surface.get_toplevel(&self.qh, window);
        drop(globals);

        self.windows.lock().insert(
            window,
            SurfaceObjects {
                surface,
                xdg_surface,
                toplevel,
            },
        );
        self.flush()
    }

    fn destroy_window(&self, window: WindowId) -> Result<()> {
        let objects = self
            .windows
            .lock()
            .remove(&window)
            .ok_or(DriverError::UnknownWindow(window))?;
        objects.toplevel.destroy();
        objects.xdg_surface.destroy();
        objects.surface.destroy();
        self.flush()
    }

    fn has_keyboard(&self) -> bool {
        self.globals.lock().keyboard.is_some()
    }

    fn set_buffer_scale(&self, window: WindowId, scale: i32) -> Result<()> {
        self.with_surface(window, |o| {
            if o.surface.version() >= 3 {
                o.surface.set_buffer_scale(scale);
            } else if scale != 1 {
                warn!("wl_surface v{} cannot set buffer scale {}", o.surface.version(), scale);
            }
        })
    }

    fn set_app_id(&self, window: WindowId, app_id: &str) -> Result<()> {
        self.with_surface(window, |o| o.toplevel.set_app_id(app_id.to_string()))
    }

    fn set_title(&self, window: WindowId, title: &str) -> Result<()> {
        self.with_surface(window, |o| o.toplevel.set_title(title.to_string()))
    }

    fn set_min_size(&self, window: WindowId, size: Size) -> Result<()> {
        self.with_surface(window, |o| {
            o.toplevel
                .set_min_size(size.width as i32, size.height as i32)
        })
    }

    fn set_max_size(&self, window: WindowId, size: Size) -> Result<()> {
        self.with_surface(window, |o| {
            o.toplevel
                .set_max_size(size.width as i32, size.height as i32)
        })
    }

    fn set_minimized(&self, window: WindowId) -> Result<()> {
        self.with_surface(window, |o| o.toplevel.set_minimized())
    }

    fn ack_configure(&self, window: WindowId, serial: u32) -> Result<()> {
        self.with_surface(window, |o| o.xdg_surface.ack_configure(serial))
    }

    fn create_buffer(
        &self,
        buffer: BufferId,
        fd: BorrowedFd<'_>,
        size: Size,
        release: ReleaseFlag,
    ) -> Result<()> {
        let globals = self.globals.lock();
        let shm = globals
            .shm
            .as_ref()
            .ok_or(DriverError::MissingGlobal("wl_shm"))?;

        let pool = shm.create_pool(fd, size.byte_len() as i32, &self.qh, ());
        let wl_buffer = pool.create_buffer(
            0,
            size.width as i32,
            size.height as i32,
            size.stride() as i32,
            wl_shm::Format::Argb8888,
            &self.qh,
            release,
        );
        pool.destroy();
        drop(globals);

        self.buffers.lock().insert(buffer, wl_buffer);
        self.flush()
    }

    fn destroy_buffer(&self, buffer: BufferId) -> Result<()> {
        let wl_buffer = self
            .buffers
            .lock()
            .remove(&buffer)
            .ok_or(DriverError::UnknownBuffer(buffer))?;
        wl_buffer.destroy();
        self.flush()
    }

    fn attach(&self, window: WindowId, buffer: BufferId) -> Result<()> {
        let buffers = self.buffers.lock();
        let wl_buffer = buffers
            .get(&buffer)
            .ok_or(DriverError::UnknownBuffer(buffer))?;
        self.with_surface(window, |o| o.surface.attach(Some(wl_buffer), 0, 0))
    }

    fn damage_buffer(&self, window: WindowId, region: DamageRegion) -> Result<()> {
        let width = region.width.min(i32::MAX as u32) as i32;
        let height = region.height.min(i32::MAX as u32) as i32;
        self.with_surface(window, |o| {
            if o.surface.version() >= 4 {
                o.surface.damage_buffer(region.x, region.y, width, height);
            } else {
                o.surface.damage(region.x, region.y, width, height);
            }
        })
    }

    fn request_frame(&self, window: WindowId) -> Result<()> {
        self.with_surface(window, |o| {
            o.surface.frame(&self.qh, window);
        })
    }

    fn commit(&self, window: WindowId) -> Result<()> {
        self.with_surface(window, |o| o.surface.commit())
    }

    fn dispatch(&self, events: &mut Vec<Event>) -> Result<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(false);
        }

        let mut event_loop = self.event_loop.lock();
        let EventLoop { queue, sink } = &mut *event_loop;
        match queue.blocking_dispatch(sink) {
            Ok(_) => {}
            Err(_) if self.closed.load(Ordering::Acquire) => return Ok(false),
            Err(e) if Self::is_closed_error(&e) => {
                info!("Wayland connection closed by compositor");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(err) = sink.fatal.take() {
            return Err(err);
        }
        events.append(&mut sink.events);
        Ok(true)
    }

    fn shutdown(&self) -> Vec<DriverError> {
        let mut errors = Vec::new();

        {
            let mut globals = self.globals.lock();
            globals.release_keyboard();
            if let Some(seat) = globals.seat.take() {
                if seat.version() >= 5 {
                    seat.release();
                }
            }
            if let Some(wm_base) = globals.wm_base.take() {
                wm_base.destroy();
            }
            globals.shm = None;
            globals.compositor = None;
        }
        self.registry.lock().take();

        for (id, buffer) in self.buffers.lock().drain() {
            debug!("Destroying leaked buffer {:?} at shutdown", id);
            buffer.destroy();
        }

        if let Err(e) = self.flush() {
            errors.push(e);
        }
        self.closed.store(true, Ordering::Release);

        // Wakes a dispatch blocked on the socket.
        let fd = self.connection.backend().poll_fd().as_raw_fd();
        if unsafe { libc::shutdown(fd, libc::SHUT_RDWR) } != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != ErrorKind::NotConnected {
                warn!("Failed to shut down Wayland socket: {}", err);
                errors.push(WaylandError::Io(err).into());
            }
        }

        info!("Wayland connection closed");
        errors
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for EventSink {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_registry::Event::Global {
            name,
            interface,
            version,
        } = event
        else {
            return;
        };

        let mut globals = state.globals.lock();
        match interface.as_str() {
            "wl_compositor" if globals.compositor.is_none() => {
                globals.compositor =
                    Some(registry.bind(name, version.min(COMPOSITOR_VERSION), qh, ()));
            }
            "wl_shm" if globals.shm.is_none() => {
                globals.shm = Some(registry.bind(name, version.min(SHM_VERSION), qh, ()));
            }
            "xdg_wm_base" if globals.wm_base.is_none() => {
                globals.wm_base = Some(registry.bind(name, version.min(WM_BASE_VERSION), qh, ()));
            }
            "wl_seat" if globals.seat.is_none() => {
                globals.seat = Some(registry.bind(name, version.min(SEAT_VERSION), qh, ()));
            }
            _ => return,
        }
        debug!("Bound global {} v{}", interface, version);
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for EventSink {
    fn event(
        state: &mut Self,
        seat: &wl_seat::WlSeat,
        event: wl_seat::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_seat::Event::Capabilities {
            capabilities: WEnum::Value(capabilities),
        } = event
        else {
            return;
        };

        let mut globals = state.globals.lock();
        let has_keyboard = capabilities.contains(wl_seat::Capability::Keyboard);
        if has_keyboard && globals.keyboard.is_none() {
            globals.keyboard = Some(seat.get_keyboard(qh, ()));
        } else if !has_keyboard && globals.keyboard.is_some() {
            debug!("Seat lost its keyboard");
            globals.release_keyboard();
        }
    }
}

/// Compiles the keymap announced by `wl_keyboard.keymap`.
///
/// `no_keymap` yields `None` and leaves keys unnamed. XKB v1 is compiled from
/// the descriptor. Any other format is fatal to the session.
fn keymap_from_event(
    format: WEnum<wl_keyboard::KeymapFormat>,
    fd: OwnedFd,
    size: u32,
) -> Option<Result<Keymap>> {
    #[allow(unreachable_patterns)]
    match format {
        WEnum::Value(wl_keyboard::KeymapFormat::NoKeymap) => None,
        WEnum::Value(wl_keyboard::KeymapFormat::XkbV1) => {
            Some(read_keymap(fd, size).and_then(|data| Keymap::parse(&data)))
        }
        WEnum::Value(other) => Some(Err(DriverError::UnknownKeymapFormat(other.into()))),
        WEnum::Unknown(code) => Some(Err(DriverError::UnknownKeymapFormat(code))),
    }
}

impl Dispatch<wl_keyboard::WlKeyboard, ()> for EventSink {
    fn event(
        state: &mut Self,
        _: &wl_keyboard::WlKeyboard,
        event: wl_keyboard::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let mut globals = state.globals.lock();
        #[allow(unreachable_patterns)]
        match event {
            wl_keyboard::Event::Keymap { format, fd, size } => {
                match keymap_from_event(format, fd, size) {
                    Some(Ok(keymap)) => globals.keymap = Some(keymap),
                    Some(Err(err)) => state.fatal = Some(err),
                    None => {}
                }
            }
            wl_keyboard::Event::Key {
                serial,
                key,
                state: key_state,
                ..
            } => {
                let (name, text) = match &globals.keymap {
                    Some(keymap) => (key_name(keymap.one_sym(key)), keymap.utf8(key)),
                    None => (None, String::new()),
                };
                state.events.push(Event::Key(KeyEvent {
                    serial,
                    scancode: key,
                    name,
                    text,
                    pressed: key_state == WEnum::Value(wl_keyboard::KeyState::Pressed),
                }));
            }
            wl_keyboard::Event::Modifiers {
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
                ..
            } => {
                if let Some(keymap) = globals.keymap.as_mut() {
                    keymap.update_mask(mods_depressed, mods_latched, mods_locked, group);
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_callback::WlCallback, WindowId> for EventSink {
    fn event(
        state: &mut Self,
        _: &wl_callback::WlCallback,
        event: wl_callback::Event,
        window: &WindowId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            state.events.push(Event::FrameDone(*window));
        }
    }
}

impl Dispatch<wl_buffer::WlBuffer, ReleaseFlag> for EventSink {
    fn event(
        _: &mut Self,
        _: &wl_buffer::WlBuffer,
        event: wl_buffer::Event,
        release: &ReleaseFlag,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            release.release();
        }
    }
}

impl Dispatch<wl_surface::WlSurface, WindowId> for EventSink {
    fn event(
        _: &mut Self,
        _: &wl_surface::WlSurface,
        _: wl_surface::Event,
        _: &WindowId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for EventSink {
    fn event(
        _: &mut Self,
        wm_base: &xdg_wm_base::XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<xdg_surface::XdgSurface, WindowId> for EventSink {
    fn event(
        state: &mut Self,
        _: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        window: &WindowId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            state.events.push(Event::SurfaceConfigure {
                window: *window,
                serial,
            });
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, WindowId> for EventSink {
    fn event(
        state: &mut Self,
        _: &xdg_toplevel::XdgToplevel,
        event: xdg_toplevel::Event,
        window: &WindowId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                state.events.push(Event::ToplevelConfigure {
                    window: *window,
                    width,
                    height,
                });
            }
            xdg_toplevel::Event::Close => state.events.push(Event::ToplevelClose(*window)),
            _ => {}
        }
    }
}

delegate_noop!(EventSink: ignore wl_compositor::WlCompositor);
delegate_noop!(EventSink: ignore wl_shm::WlShm);
delegate_noop!(EventSink: ignore wl_shm_pool::WlShmPool);

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};

    fn keymap_fd(text: &[u8]) -> OwnedFd {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(text).unwrap();
        OwnedFd::from(file)
    }

    #[test]
    fn test_no_keymap_is_ignored() {
        let format = WEnum::Value(wl_keyboard::KeymapFormat::NoKeymap);
        assert!(keymap_from_event(format, keymap_fd(b""), 0).is_none());
    }

    #[test]
    fn test_unknown_keymap_format_is_fatal() {
        let result = keymap_from_event(WEnum::Unknown(7), keymap_fd(b""), 0);
        assert!(matches!(
            result,
            Some(Err(DriverError::UnknownKeymapFormat(7)))
        ));
    }

    #[test]
    fn test_unparsable_xkb_keymap_is_fatal() {
        let text = b"not a keymap\0";
        let format = WEnum::Value(wl_keyboard::KeymapFormat::XkbV1);
        let result = keymap_from_event(format, keymap_fd(text), text.len() as u32);
        assert!(matches!(result, Some(Err(DriverError::Keymap(_)))));
    }

    #[test]
    fn test_closed_error_kinds() {
        let io_error = |kind: ErrorKind| DispatchError::Backend(WaylandError::Io(io::Error::from(kind)));

        assert!(WaylandProtocol::is_closed_error(&io_error(ErrorKind::BrokenPipe)));
        assert!(WaylandProtocol::is_closed_error(&io_error(ErrorKind::ConnectionReset)));
        assert!(!WaylandProtocol::is_closed_error(&io_error(ErrorKind::PermissionDenied)));
        assert!(!WaylandProtocol::is_closed_error(&io_error(ErrorKind::WouldBlock)));
    }
}
