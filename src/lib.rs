//! # Lumen Wayland Presentation Backend
//!
//! Turns a retained-mode scene into pixels delivered to a Wayland compositor
//! through shared memory, and reconciles the compositor's asynchronous
//! lifecycle events (buffer release, frame done, configure, close) with one
//! frame state per window.
//!
//! ## Architecture
//!
//! - `shm`: memory-file-backed buffers and the per-window buffer pool
//! - `frame`: logical image, damage accumulation and the redraw pipeline
//! - `protocol`: the wire seam, with the `wayland-client` implementation
//! - `session`: the connection, bound globals and cursor theme
//! - `state`: the serialized session accessor, open windows and dispatch loop
//! - `window`: toplevel lifecycle and the canvas-facing API
//! - `painter`: the rasterizer interface and a small tiny-skia scene
//! - `config`: configuration parsing and management
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lumen::painter::{Rectangle, Scene};
//! use lumen::{Driver, LumenConfig};
//! use tiny_skia::Color;
//!
//! let driver = Driver::new(LumenConfig::default());
//! let window = driver.create_window("Hello")?;
//! window.set_content(Arc::new(Scene::new(Color::WHITE).with(Rectangle {
//!     x: 10.0,
//!     y: 10.0,
//!     width: 100.0,
//!     height: 50.0,
//!     fill: Color::BLACK,
//! })))?;
//! driver.run()?;
//! # Ok::<(), lumen::DriverError>(())
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod key;
pub mod painter;
pub mod protocol;
pub mod session;
pub mod shm;
pub mod state;
pub mod window;

// Re-export main types for easy access
pub use config::LumenConfig;
pub use driver::Driver;
pub use error::{DriverError, Result};
pub use frame::{FramePhase, FrameState};
pub use geometry::{LogicalSize, Position, Size};
pub use key::{KeyEvent, KeyName};
pub use painter::{Drawable, Painter, Scene};
pub use protocol::{Event, Protocol};
pub use shm::{BufferPool, SharedBuffer};
pub use window::Window;

/// Version information for Lumen
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
pub const BUILD_DATE: &str = env!("BUILD_DATE");
pub const GIT_COMMIT: &str = env!("GIT_COMMIT");
