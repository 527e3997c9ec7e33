//! Process-wide driver state and the dispatch loop
//!
//! One mutex guards the session slot and the open-window set. Every protocol
//! request goes through [`DriverState::use_session`], which holds that mutex
//! for the duration of the call, so requests from different threads never
//! interleave. The dispatch thread blocks on the connection without it.
//!
//! Lock order is window frame, then this state. Nothing here takes a window
//! lock while holding the state lock, and user callbacks run with neither.

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::config::LumenConfig;
use crate::error::{DriverError, Result};
use crate::protocol::{Connector, Event, Protocol, WindowId};
use crate::session::Session;
use crate::window::Window;

enum SessionSlot {
    Uninit,
    Live(Session),
    Destroyed,
}

struct Inner {
    slot: SessionSlot,
    windows: HashMap<WindowId, Arc<Window>>,
}

/// Shared by the driver facade and every window.
pub struct DriverState {
    inner: Mutex<Inner>,
    running: AtomicBool,
    connector: Connector,
    config: LumenConfig,
}

impl DriverState {
    pub fn new(config: LumenConfig, connector: Connector) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slot: SessionSlot::Uninit,
                windows: HashMap::new(),
            }),
            running: AtomicBool::new(false),
            connector,
            config,
        }
    }

    pub fn config(&self) -> &LumenConfig {
        &self.config
    }

    /// Runs `f` on the session under the state mutex, connecting first if
    /// this is the first use. Fails with [`DriverError::SessionClosed`] once
    /// the session has been destroyed.
    pub fn use_session<T>(&self, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let mut inner = self.inner.lock();
        if let SessionSlot::Uninit = inner.slot {
            inner.slot = SessionSlot::Live(Session::connect(&self.connector, &self.config.cursor)?);
        }
        match &mut inner.slot {
            SessionSlot::Live(session) => f(session),
            SessionSlot::Uninit | SessionSlot::Destroyed => Err(DriverError::SessionClosed),
        }
    }

    /// Like [`DriverState::use_session`] but never connects; `None` if there
    /// is no live session.
    pub fn try_use_session<T>(&self, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        match &mut self.inner.lock().slot {
            SessionSlot::Live(session) => Some(f(session)),
            _ => None,
        }
    }

    pub fn protocol(&self) -> Result<Arc<dyn Protocol>> {
        self.use_session(|session| Ok(session.protocol().clone()))
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.inner.lock().slot, SessionSlot::Live(_))
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.inner.lock().slot, SessionSlot::Destroyed)
    }

    /// Serial of the last key event, 0 before any.
    pub fn last_key_serial(&self) -> u32 {
        self.try_use_session(|session| session.last_key_serial())
            .unwrap_or(0)
    }

    pub(crate) fn add_window(&self, window: Arc<Window>) {
        self.inner.lock().windows.insert(window.id(), window);
    }

    pub(crate) fn remove_window(&self, id: WindowId) {
        self.inner.lock().windows.remove(&id);
    }

    pub fn window(&self, id: WindowId) -> Option<Arc<Window>> {
        self.inner.lock().windows.get(&id).cloned()
    }

    /// Open windows, ordered by creation.
    pub fn windows(&self) -> Vec<Arc<Window>> {
        let mut windows: Vec<_> = self.inner.lock().windows.values().cloned().collect();
        windows.sort_by_key(|w| w.id());
        windows
    }

    pub fn window_count(&self) -> usize {
        self.inner.lock().windows.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Dispatches compositor events until the connection closes or the last
    /// window is gone, then quits.
    ///
    /// A fatal error stops the loop; quit still runs best-effort before the
    /// error is returned.
    pub fn run(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DriverError::AlreadyRunning);
        }

        let result = self.dispatch_loop();
        if let Err(e) = &result {
            error!("Dispatch loop failed: {}", e);
        }

        self.quit();
        self.running.store(false, Ordering::Release);
        result
    }

    fn dispatch_loop(&self) -> Result<()> {
        let protocol = self.protocol()?;
        let mut events = Vec::new();

        while self.window_count() > 0 {
            if !protocol.dispatch(&mut events)? {
                debug!("Connection closed, leaving dispatch loop");
                break;
            }
            for event in events.drain(..) {
                self.route(event)?;
            }
        }
        Ok(())
    }

    fn route(&self, event: Event) -> Result<()> {
        if let Event::Key(key) = &event {
            self.try_use_session(|session| session.set_last_key_serial(key.serial));
            for window in self.windows() {
                window.handle_key(key);
            }
            return Ok(());
        }

        let Some(id) = event.window() else {
            return Ok(());
        };
        match self.window(id) {
            Some(window) => window.handle_event(event),
            None => {
                debug!("Dropping {:?} for closed window", event);
                Ok(())
            }
        }
    }

    /// Closes every open window, waits for each to finish closing, then
    /// destroys the session. A window whose close is running on this thread
    /// is not waited for. Later session access fails with
    /// [`DriverError::SessionClosed`]. Calling it again is a no-op.
    pub fn quit(&self) {
        // Snapshot under the lock; closing needs the lock to leave the set.
        let windows = self.windows();
        if !windows.is_empty() {
            info!("Closing {} window(s)", windows.len());
        }
        for window in windows {
            window.close();
            if window.is_closing_on_current_thread() {
                debug!("Quit from inside the close of {:?}, not waiting", window.id());
                continue;
            }
            window.wait_closed();
        }

        let slot = mem::replace(&mut self.inner.lock().slot, SessionSlot::Destroyed);
        match slot {
            SessionSlot::Live(session) => {
                let errors = session.destroy();
                if !errors.is_empty() {
                    warn!("Quit finished with {} teardown error(s)", errors.len());
                }
            }
            SessionSlot::Uninit => debug!("Quit before any session was created"),
            SessionSlot::Destroyed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::MockProtocol;

    fn state() -> DriverState {
        let protocol = Arc::new(MockProtocol::default());
        DriverState::new(
            LumenConfig::default(),
            Box::new(move || Ok(protocol.clone() as Arc<dyn Protocol>)),
        )
    }

    #[test]
    fn test_session_is_lazy() {
        let state = state();
        assert!(!state.is_connected());
        assert!(state.try_use_session(|_| ()).is_none());

        state.use_session(|_| Ok(())).unwrap();
        assert!(state.is_connected());
    }

    #[test]
    fn test_session_closed_after_quit() {
        let state = state();
        state.use_session(|_| Ok(())).unwrap();
        state.quit();
        state.quit();

        assert!(state.is_destroyed());
        assert!(matches!(
            state.use_session(|_| Ok(())),
            Err(DriverError::SessionClosed)
        ));
    }

    #[test]
    fn test_run_without_windows_returns() {
        let state = state();
        state.run().unwrap();
        assert!(!state.is_running());
        assert!(state.is_destroyed());
    }

    #[test]
    fn test_connect_failure_is_fatal() {
        let state = DriverState::new(
            LumenConfig::default(),
            Box::new(|| Err(DriverError::MissingGlobal("xdg_wm_base"))),
        );
        assert!(matches!(
            state.run(),
            Err(DriverError::MissingGlobal("xdg_wm_base"))
        ));
    }
}
