//! The process-wide compositor session
//!
//! A [`Session`] owns the protocol connection together with everything bound
//! through it. It is created lazily by the driver state on first use, lives
//! until quit, and is destroyed exactly once.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tiny_skia::{
    Color, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Shader, Stroke, Transform,
};

use crate::config::CursorConfig;
use crate::error::{DriverError, Result};
use crate::geometry::Size;
use crate::protocol::{Connector, Event, Protocol};
use crate::shm::SharedBuffer;

/// Renders the default arrow cursor as RGBA.
fn generate_cursor_rgba(size: u32) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(size, size)?;
    pixmap.fill(Color::TRANSPARENT);

    let s = size as f32;
    let mut pb = PathBuilder::new();
    pb.move_to(1.0, 1.0);
    pb.line_to(1.0, s * 0.85);
    pb.line_to(s * 0.3, s * 0.65);
    pb.line_to(s * 0.5, s - 1.0);
    pb.line_to(s * 0.62, s * 0.94);
    pb.line_to(s * 0.43, s * 0.6);
    pb.line_to(s * 0.72, s * 0.6);
    pb.close();
    let path = pb.finish()?;

    let fill = Paint {
        shader: Shader::SolidColor(Color::from_rgba8(0, 0, 0, 230)),
        anti_alias: true,
        ..Default::default()
    };
    pixmap.fill_path(&path, &fill, FillRule::Winding, Transform::identity(), None);

    let outline = Paint {
        shader: Shader::SolidColor(Color::WHITE),
        anti_alias: true,
        ..Default::default()
    };
    let stroke = Stroke {
        width: (s / 24.0).max(1.0),
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Default::default()
    };
    pixmap.stroke_path(&path, &outline, &stroke, Transform::identity(), None);
    Some(pixmap)
}

/// The default cursor image, uploaded once per session.
#[derive(Debug)]
pub struct CursorTheme {
    size: u32,
    buffer: SharedBuffer,
}

impl CursorTheme {
    pub fn load(protocol: &dyn Protocol, config: &CursorConfig) -> Result<Self> {
        let pixmap = generate_cursor_rgba(config.size)
            .ok_or(DriverError::InvalidSize(Size::new(config.size, config.size)))?;
        let mut buffer = SharedBuffer::create(protocol, Size::new(config.size, config.size))?;
        buffer.flush(pixmap.data())?;
        debug!("Loaded {}px cursor theme", config.size);
        Ok(Self {
            size: config.size,
            buffer,
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// The arrow's tip
    pub fn hotspot(&self) -> (u32, u32) {
        (1, 1)
    }

    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    pub fn destroy(self, protocol: &dyn Protocol) {
        self.buffer.destroy(protocol);
    }
}

/// A connected, fully bound compositor session.
pub struct Session {
    protocol: Arc<dyn Protocol>,
    cursor: Option<CursorTheme>,
    last_key_serial: u32,
}

impl Session {
    /// Connects, performs the two round-trips that bind the globals and the
    /// seat's keyboard, verifies the required globals and loads the cursor.
    pub fn connect(connector: &Connector, cursor: &CursorConfig) -> Result<Self> {
        let protocol = connector()?;

        // The first round-trip delivers the registry globals, the second the
        // events of the objects bound in response (seat capabilities, keymap).
        protocol.roundtrip()?;
        protocol.roundtrip()?;
        protocol.verify_globals()?;

        let cursor = CursorTheme::load(protocol.as_ref(), cursor)?;
        info!("Wayland session established");

        Ok(Self {
            protocol,
            cursor: Some(cursor),
            last_key_serial: 0,
        })
    }

    pub fn protocol(&self) -> &Arc<dyn Protocol> {
        &self.protocol
    }

    pub fn cursor(&self) -> Option<&CursorTheme> {
        self.cursor.as_ref()
    }

    pub fn last_key_serial(&self) -> u32 {
        self.last_key_serial
    }

    pub(crate) fn set_last_key_serial(&mut self, serial: u32) {
        self.last_key_serial = serial;
    }

    /// One blocking read/dispatch round. `Ok(false)` means the connection is
    /// closed.
    pub fn dispatch_once(&self, events: &mut Vec<Event>) -> Result<bool> {
        self.protocol.dispatch(events)
    }

    /// Releases the cursor theme, then every global and the connection.
    /// Failures are logged and returned.
    pub fn destroy(mut self) -> Vec<DriverError> {
        if let Some(cursor) = self.cursor.take() {
            cursor.destroy(self.protocol.as_ref());
        }

        let errors = self.protocol.shutdown();
        for err in &errors {
            warn!("Error while destroying Wayland session: {}", err);
        }
        if errors.is_empty() {
            info!("Wayland session destroyed");
        } else {
            error!("Wayland session destroyed with {} error(s)", errors.len());
        }
        errors
    }
}
