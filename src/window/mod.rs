//! Toplevel windows
//!
//! A [`Window`] is one `wl_surface` with its xdg toplevel role, one
//! [`FrameState`] and the toolkit-facing callbacks. It references the shared
//! [`DriverState`] for every protocol request and never owns the session.
//!
//! Compositor events reach a window through [`Window::handle_event`], called
//! by the dispatch loop with the window's id already resolved. Toolkit calls
//! (`refresh`, `redraw`, `close`, property setters) may come from any thread.
//!
//! # Closing
//!
//! Closing is a one-shot: the first caller of [`Window::close`] tears the
//! window down and signals completion, every later caller returns at once.
//! [`Window::wait_closed`] blocks until the teardown finished, which is how
//! quit waits for windows that are closing themselves concurrently. A window
//! remembers which thread is closing it, so quit called from that thread (from
//! the on-closed callback, say) does not wait on itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex, RwLock};
use tiny_skia::Pixmap;

use crate::error::Result;
use crate::frame::{FramePhase, FrameState};
use crate::geometry::{scale_int, unscale_size, LogicalSize, Position, Size};
use crate::key::KeyEvent;
use crate::painter::{Blank, Painter};
use crate::protocol::{Event, WindowId};
use crate::shm::PoolStats;
use crate::state::DriverState;

type Callback = Arc<dyn Fn() + Send + Sync>;
type CloseIntercept = Arc<dyn Fn(&Arc<Window>) + Send + Sync>;
type KeyCallback = Arc<dyn Fn(&KeyEvent) + Send + Sync>;
type RuneCallback = Arc<dyn Fn(char) + Send + Sync>;

/// Completion marker set once a window finished closing.
#[derive(Default)]
struct DeadSignal {
    dead: Mutex<bool>,
    cond: Condvar,
}

impl DeadSignal {
    fn signal(&self) {
        *self.dead.lock() = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut dead = self.dead.lock();
        while !*dead {
            self.cond.wait(&mut dead);
        }
    }

    fn is_set(&self) -> bool {
        *self.dead.lock()
    }
}

struct Surface {
    frame: FrameState,
    configured: bool,
}

struct Properties {
    title: String,
    app_id: String,
    fixed_size: bool,
}

#[derive(Default)]
struct Callbacks {
    on_closed: Option<Callback>,
    close_intercept: Option<CloseIntercept>,
    on_key_down: Option<KeyCallback>,
    on_key_up: Option<KeyCallback>,
    on_typed_key: Option<KeyCallback>,
    on_typed_rune: Option<RuneCallback>,
}

/// A toplevel window backed by shared-memory buffers.
pub struct Window {
    id: WindowId,
    state: Arc<DriverState>,
    surface: Mutex<Surface>,
    props: RwLock<Properties>,
    content: RwLock<Arc<dyn Painter>>,
    callbacks: RwLock<Callbacks>,
    closing: AtomicBool,
    closer: Mutex<Option<ThreadId>>,
    dead: DeadSignal,
}

impl Window {
    /// Creates the surface and its toplevel role, sets the app id and title,
    /// and performs the initial empty commit.
    pub fn create(state: Arc<DriverState>, title: &str) -> Result<Arc<Window>> {
        let config = state.config();
        let scale = config.window.scale as f32;
        let size = Size::new(
            scale_int(config.window.default_width as f32, scale).max(1) as u32,
            scale_int(config.window.default_height as f32, scale).max(1) as u32,
        );
        let frame = FrameState::new(size, scale, config.buffers.max_free_buffers)?;
        let app_id = config.general.app_id.clone();

        let window = Arc::new(Window {
            id: WindowId::next(),
            state: state.clone(),
            surface: Mutex::new(Surface {
                frame,
                configured: false,
            }),
            props: RwLock::new(Properties {
                title: title.to_string(),
                app_id,
                fixed_size: false,
            }),
            content: RwLock::new(Arc::new(Blank)),
            callbacks: RwLock::new(Callbacks::default()),
            closing: AtomicBool::new(false),
            closer: Mutex::new(None),
            dead: DeadSignal::default(),
        });

        // Registered first so the first configure finds it.
        state.add_window(window.clone());
        if let Err(e) = window.init_surface() {
            state.remove_window(window.id);
            return Err(e);
        }

        info!("Created window {:?} \"{}\" ({})", window.id, title, size);
        Ok(window)
    }

    fn init_surface(&self) -> Result<()> {
        let props = self.props.read();
        let buffer_scale = self.state.config().window.scale as i32;
        self.state.use_session(|session| {
            let protocol = session.protocol();
            protocol.create_window(self.id)?;
            protocol.set_buffer_scale(self.id, buffer_scale)?;
            protocol.set_app_id(self.id, &props.app_id)?;
            protocol.set_title(self.id, &props.title)?;
            protocol.commit(self.id)
        })
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn title(&self) -> String {
        self.props.read().title.clone()
    }

    pub fn set_title(&self, title: &str) -> Result<()> {
        self.props.write().title = title.to_string();
        if self.is_closing() {
            return Ok(());
        }
        self.state
            .use_session(|session| session.protocol().set_title(self.id, title))
    }

    pub fn app_id(&self) -> String {
        self.props.read().app_id.clone()
    }

    pub fn fixed_size(&self) -> bool {
        self.props.read().fixed_size
    }

    /// Pins the window to its current size, or lifts the constraint.
    pub fn set_fixed_size(&self, fixed: bool) -> Result<()> {
        self.props.write().fixed_size = fixed;
        if self.is_closing() {
            return Ok(());
        }
        let size = if fixed {
            let surface = self.surface.lock();
            unscale_size(surface.frame.size(), surface.frame.scale())
        } else {
            Size::ZERO
        };
        self.apply_size_hints(size)
    }

    /// `size` is in surface-local units, not buffer pixels.
    fn apply_size_hints(&self, size: Size) -> Result<()> {
        self.state.use_session(|session| {
            let protocol = session.protocol();
            protocol.set_min_size(self.id, size)?;
            protocol.set_max_size(self.id, size)
        })
    }

    /// Asks the compositor to minimize the window.
    pub fn hide(&self) -> Result<()> {
        if self.is_closing() {
            return Ok(());
        }
        self.state
            .use_session(|session| session.protocol().set_minimized(self.id))
    }

    /// Redraws everything; maps the window on its first configure.
    pub fn show(&self) -> Result<()> {
        self.redraw()
    }

    pub fn content(&self) -> Arc<dyn Painter> {
        self.content.read().clone()
    }

    pub fn set_content(&self, content: Arc<dyn Painter>) -> Result<()> {
        *self.content.write() = content;
        self.redraw()
    }

    /// Size of the canvas in toolkit coordinates
    pub fn size(&self) -> LogicalSize {
        self.surface.lock().frame.logical_size()
    }

    /// Size of the canvas in device pixels
    pub fn pixel_size(&self) -> Size {
        self.surface.lock().frame.size()
    }

    pub fn scale(&self) -> f32 {
        self.surface.lock().frame.scale()
    }

    pub fn pixel_coordinate_for_position(&self, position: Position) -> (i32, i32) {
        self.surface
            .lock()
            .frame
            .pixel_coordinate_for_position(position)
    }

    /// Copy of the logical image as last painted.
    pub fn capture(&self) -> Pixmap {
        self.surface.lock().frame.image().clone()
    }

    pub fn phase(&self) -> FramePhase {
        self.surface.lock().frame.phase()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.surface.lock().frame.pool_stats().clone()
    }

    /// Repaints after the given toolkit-space rectangle changed.
    pub fn refresh(&self, position: Position, size: LogicalSize) -> Result<()> {
        let mut surface = self.surface.lock();
        if self.is_closing() {
            return Ok(());
        }
        surface.frame.mark_damaged(position, size);
        self.queue_draw(&mut surface)
    }

    /// Repaints the whole canvas.
    pub fn redraw(&self) -> Result<()> {
        let mut surface = self.surface.lock();
        if self.is_closing() {
            return Ok(());
        }
        surface.frame.mark_all_damaged();
        self.queue_draw(&mut surface)
    }

    fn queue_draw(&self, surface: &mut Surface) -> Result<()> {
        let content = self.content.read().clone();
        if !surface.frame.request_redraw(content.as_ref()) {
            return Ok(());
        }
        if !surface.configured {
            // The first configure presents.
            return Ok(());
        }

        let frame = &mut surface.frame;
        self.state.use_session(|session| {
            let protocol = session.protocol().as_ref();
            if frame.has_presented() {
                protocol.request_frame(self.id)?;
                protocol.commit(self.id)
            } else {
                frame.present(protocol, self.id)
            }
        })
    }

    /// Applies one compositor event addressed to this window.
    pub fn handle_event(self: &Arc<Self>, event: Event) -> Result<()> {
        if self.is_closing() {
            return Ok(());
        }

        match event {
            Event::SurfaceConfigure { serial, .. } => self.handle_surface_configure(serial),
            Event::ToplevelConfigure { width, height, .. } => {
                self.handle_toplevel_configure(width, height)
            }
            Event::FrameDone(_) => self.handle_frame_done(),
            Event::ToplevelClose(_) => {
                self.handle_toplevel_close();
                Ok(())
            }
            Event::Key(key) => {
                self.handle_key(&key);
                Ok(())
            }
        }
    }

    fn handle_surface_configure(&self, serial: u32) -> Result<()> {
        let mut surface = self.surface.lock();
        if self.is_closing() {
            return Ok(());
        }
        surface.configured = true;

        let frame = &mut surface.frame;
        self.state.use_session(|session| {
            let protocol = session.protocol().as_ref();
            protocol.ack_configure(self.id, serial)?;
            if frame.is_queued() && !frame.has_presented() {
                debug!("Mapping {:?} on first configure", self.id);
                frame.present(protocol, self.id)
            } else {
                protocol.commit(self.id)
            }
        })
    }

    fn handle_toplevel_configure(&self, width: i32, height: i32) -> Result<()> {
        if width <= 0 || height <= 0 {
            return Ok(());
        }

        let mut surface = self.surface.lock();
        if self.is_closing() {
            return Ok(());
        }
        let scale = surface.frame.scale();
        let size = Size::new(
            scale_int(width as f32, scale).max(1) as u32,
            scale_int(height as f32, scale).max(1) as u32,
        );
        let frame = &mut surface.frame;
        let resized = self
            .state
            .use_session(|session| frame.resize(session.protocol().as_ref(), size))?;
        drop(surface);

        if !resized {
            return Ok(());
        }
        if self.fixed_size() {
            self.apply_size_hints(unscale_size(size, scale))?;
        }
        self.redraw()
    }

    fn handle_frame_done(&self) -> Result<()> {
        let mut surface = self.surface.lock();
        if self.is_closing() || !surface.frame.is_queued() {
            return Ok(());
        }
        let frame = &mut surface.frame;
        self.state
            .use_session(|session| frame.present(session.protocol().as_ref(), self.id))
    }

    fn handle_toplevel_close(self: &Arc<Self>) {
        let intercept = self.callbacks.read().close_intercept.clone();
        match intercept {
            Some(intercept) => intercept(self),
            None => self.close(),
        }
    }

    /// Delivers a key event to the key and typed-rune callbacks.
    pub fn handle_key(&self, key: &KeyEvent) {
        if self.is_closing() {
            return;
        }

        let (down, up, typed, rune) = {
            let callbacks = self.callbacks.read();
            (
                callbacks.on_key_down.clone(),
                callbacks.on_key_up.clone(),
                callbacks.on_typed_key.clone(),
                callbacks.on_typed_rune.clone(),
            )
        };

        if !key.pressed {
            if let Some(up) = up {
                up(key);
            }
            return;
        }

        if let Some(down) = down {
            down(key);
        }
        if let (Some(typed), Some(_)) = (typed, key.name) {
            typed(key);
        }
        if let Some(rune) = rune {
            for c in key.text.chars().filter(|c| !c.is_control()) {
                rune(c);
            }
        }
    }

    pub fn set_on_closed(&self, f: impl Fn() + Send + Sync + 'static) {
        self.callbacks.write().on_closed = Some(Arc::new(f));
    }

    /// Replaces the default close on `xdg_toplevel.close`. The interceptor
    /// decides whether and when to call [`Window::close`].
    pub fn set_close_intercept(&self, f: impl Fn(&Arc<Window>) + Send + Sync + 'static) {
        self.callbacks.write().close_intercept = Some(Arc::new(f));
    }

    pub fn set_on_key_down(&self, f: impl Fn(&KeyEvent) + Send + Sync + 'static) {
        self.callbacks.write().on_key_down = Some(Arc::new(f));
    }

    pub fn set_on_key_up(&self, f: impl Fn(&KeyEvent) + Send + Sync + 'static) {
        self.callbacks.write().on_key_up = Some(Arc::new(f));
    }

    /// Called on every press of a key the keymap resolves to a [`KeyName`].
    ///
    /// [`KeyName`]: crate::key::KeyName
    pub fn set_on_typed_key(&self, f: impl Fn(&KeyEvent) + Send + Sync + 'static) {
        self.callbacks.write().on_typed_key = Some(Arc::new(f));
    }

    pub fn set_on_typed_rune(&self, f: impl Fn(char) + Send + Sync + 'static) {
        self.callbacks.write().on_typed_rune = Some(Arc::new(f));
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.dead.is_set()
    }

    /// Destroys the buffers and the surface, runs the on-closed callback,
    /// leaves the open-window set and signals completion.
    ///
    /// Only the first call does anything.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.closer.lock() = Some(thread::current().id());

        {
            let mut surface = self.surface.lock();
            let frame = &mut surface.frame;
            let teardown = self.state.try_use_session(|session| {
                let protocol = session.protocol().as_ref();
                frame.destroy(protocol);
                protocol.destroy_window(self.id)
            });
            if let Some(Err(e)) = teardown {
                warn!("Failed to destroy window {:?}: {}", self.id, e);
            }
        }

        let on_closed = self.callbacks.write().on_closed.take();
        if let Some(on_closed) = on_closed {
            on_closed();
        }

        self.state.remove_window(self.id);
        self.dead.signal();
        info!("Closed window {:?}", self.id);
    }

    /// Blocks until the window finished closing.
    pub fn wait_closed(&self) {
        self.dead.wait();
    }

    /// Whether [`Window::close`] is running further up the calling thread's
    /// stack. Waiting for the close to finish would never return then.
    pub(crate) fn is_closing_on_current_thread(&self) -> bool {
        *self.closer.lock() == Some(thread::current().id())
    }

    /// Shows the window and runs the dispatch loop until every window closed.
    pub fn show_and_run(&self) -> Result<()> {
        self.show()?;
        self.state.run()
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.id)
            .field("title", &self.title())
            .field("closing", &self.is_closing())
            .finish()
    }
}
