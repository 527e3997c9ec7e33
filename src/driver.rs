//! Toolkit-facing driver entry point

use std::sync::Arc;

use crate::config::LumenConfig;
use crate::error::Result;
use crate::protocol::wayland::WaylandProtocol;
use crate::protocol::Connector;
use crate::state::DriverState;
use crate::window::Window;

/// Owns the driver state; windows created through it share one session.
///
/// ```no_run
/// use lumen::{Driver, LumenConfig};
///
/// let driver = Driver::new(LumenConfig::default());
/// let window = driver.create_window("Hello")?;
/// window.show_and_run()?;
/// # Ok::<(), lumen::DriverError>(())
/// ```
#[derive(Clone)]
pub struct Driver {
    state: Arc<DriverState>,
}

impl Driver {
    /// A driver connecting to the compositor named by `WAYLAND_DISPLAY` on
    /// first use.
    pub fn new(config: LumenConfig) -> Self {
        Self::with_connector(config, Box::new(WaylandProtocol::connect))
    }

    pub fn with_connector(config: LumenConfig, connector: Connector) -> Self {
        Self {
            state: Arc::new(DriverState::new(config, connector)),
        }
    }

    pub fn config(&self) -> &LumenConfig {
        self.state.config()
    }

    pub fn state(&self) -> &Arc<DriverState> {
        &self.state
    }

    pub fn create_window(&self, title: &str) -> Result<Arc<Window>> {
        Window::create(self.state.clone(), title)
    }

    pub fn all_windows(&self) -> Vec<Arc<Window>> {
        self.state.windows()
    }

    /// Runs the dispatch loop on the calling thread until the last window
    /// closes or the compositor goes away.
    pub fn run(&self) -> Result<()> {
        self.state.run()
    }

    /// Closes every window and destroys the session. Safe from any thread.
    pub fn quit(&self) {
        self.state.quit()
    }

    pub fn last_key_serial(&self) -> u32 {
        self.state.last_key_serial()
    }

    /// Whether the seat exposes a keyboard. Connects if needed; `false` when
    /// the compositor cannot be reached.
    pub fn has_keyboard(&self) -> bool {
        self.state
            .protocol()
            .map(|protocol| protocol.has_keyboard())
            .unwrap_or(false)
    }

    /// Device pixels per toolkit unit for `window`.
    pub fn system_scale_for_window(&self, window: &Window) -> f32 {
        window.scale()
    }
}
