//! Per-window frame state and the redraw pipeline
//!
//! A window paints into its logical image whenever the toolkit asks, but the
//! compositor sees at most one new buffer per frame callback:
//!
//! ```text
//!            request_redraw (returns true)
//!   Idle ───────────────────────────────────▶ PaintedPendingPresent
//!    ▲                                              │
//!    │        present (frame done / first map)      │
//!    └──────────────────────────────────────────────┘
//! ```
//!
//! Further redraw requests while a presentation is pending repaint the image
//! and widen the damage, nothing else. Damage is accumulated in device pixels
//! and sent with the buffer at present time.

pub mod damage;

use log::debug;
use tiny_skia::Pixmap;

use crate::error::{DriverError, Result};
use crate::geometry::{scale_int, unscale_int, LogicalSize, Position, Size};
use crate::painter::Painter;
use crate::protocol::{Protocol, WindowId};
use crate::shm::{check_size, BufferPool, PoolStats};
use damage::{DamageRegion, SurfaceDamage};

/// Presentation phase of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Nothing painted since the last presentation
    Idle,
    /// The image was repainted and a frame callback is outstanding
    PaintedPendingPresent,
}

/// Logical image, damage and buffers of one window.
#[derive(Debug)]
pub struct FrameState {
    image: Pixmap,
    pool: BufferPool,
    damage: SurfaceDamage,
    queued: bool,
    scale: f32,
    presented: bool,
}

impl FrameState {
    pub fn new(size: Size, scale: f32, max_free_buffers: usize) -> Result<Self> {
        Ok(Self {
            image: new_image(size)?,
            pool: BufferPool::new(max_free_buffers),
            damage: SurfaceDamage::new(),
            queued: false,
            scale,
            presented: false,
        })
    }

    /// Device pixel size of the logical image
    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    /// Size of the logical image in toolkit coordinates
    pub fn logical_size(&self) -> LogicalSize {
        LogicalSize::new(
            unscale_int(self.image.width(), self.scale),
            unscale_int(self.image.height(), self.scale),
        )
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn phase(&self) -> FramePhase {
        if self.queued {
            FramePhase::PaintedPendingPresent
        } else {
            FramePhase::Idle
        }
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    /// Whether a buffer was ever committed to the surface
    pub fn has_presented(&self) -> bool {
        self.presented
    }

    pub fn image(&self) -> &Pixmap {
        &self.image
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn pool_stats(&self) -> &PoolStats {
        self.pool.stats()
    }

    pub fn damage(&self) -> &SurfaceDamage {
        &self.damage
    }

    fn bounds(&self) -> DamageRegion {
        DamageRegion::new(0, 0, self.image.width(), self.image.height())
    }

    /// Device pixel coordinates of a toolkit position
    pub fn pixel_coordinate_for_position(&self, position: Position) -> (i32, i32) {
        (
            scale_int(position.x, self.scale),
            scale_int(position.y, self.scale),
        )
    }

    /// Records a toolkit-space rectangle as changed.
    pub fn mark_damaged(&mut self, position: Position, size: LogicalSize) {
        let (x, y) = self.pixel_coordinate_for_position(position);
        let width = scale_int(size.width, self.scale);
        let height = scale_int(size.height, self.scale);
        if width <= 0 || height <= 0 {
            return;
        }

        let region = DamageRegion::new(x, y, width as u32, height as u32);
        if let Some(clipped) = region.intersection(&self.bounds()) {
            self.damage.add_region(clipped);
        }
    }

    pub fn mark_all_damaged(&mut self) {
        self.damage.mark_full();
    }

    /// Repaints the logical image.
    ///
    /// Returns true when this moved the frame from idle to pending, in which
    /// case the caller registers exactly one frame callback.
    pub fn request_redraw(&mut self, painter: &dyn Painter) -> bool {
        painter.paint(&mut self.image.as_mut(), self.scale);

        if self.queued {
            return false;
        }
        self.queued = true;
        true
    }

    /// Copies the image into a free buffer, attaches it with the accumulated
    /// damage and commits.
    pub fn present(&mut self, protocol: &dyn Protocol, window: WindowId) -> Result<()> {
        self.queued = false;

        let size = self.size();
        let buffer = self.pool.take(protocol, size)?;
        if buffer.size() != size {
            return Err(DriverError::InvalidSize(buffer.size()));
        }
        buffer.flush(self.image.data())?;
        let id = buffer.id();

        protocol.attach(window, id)?;
        let regions = if self.presented {
            self.damage.take()
        } else {
            self.damage.clear();
            vec![DamageRegion::FULL]
        };
        for region in regions {
            protocol.damage_buffer(window, region)?;
        }
        protocol.commit(window)?;

        self.presented = true;
        debug!("Presented {:?} as {:?} ({})", window, id, size);
        Ok(())
    }

    /// Reallocates the image for a new device size.
    ///
    /// Returns false, doing nothing, for a zero size or the current size.
    /// Otherwise every pooled buffer is destroyed so no buffer of the old size
    /// is ever attached again.
    pub fn resize(&mut self, protocol: &dyn Protocol, size: Size) -> Result<bool> {
        if size.is_empty() || size == self.size() {
            return Ok(false);
        }

        self.image = new_image(size)?;
        self.pool.destroy_all(protocol);
        self.mark_all_damaged();
        debug!("Frame resized to {}", size);
        Ok(true)
    }

    /// Destroys every buffer. The frame must not be presented afterwards.
    pub fn destroy(&mut self, protocol: &dyn Protocol) {
        self.pool.destroy_all(protocol);
        self.damage.clear();
        self.queued = false;
    }
}

fn new_image(size: Size) -> Result<Pixmap> {
    check_size(size)?;
    Pixmap::new(size.width, size.height).ok_or(DriverError::InvalidSize(size))
}
