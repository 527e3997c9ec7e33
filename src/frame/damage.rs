//! Damage tracking for surface presentation
//!
//! Damage requests arrive between two presentations, possibly many of them.
//! They are accumulated here in buffer (device pixel) coordinates and replayed
//! as `wl_surface.damage_buffer` requests right before the next commit, so a
//! flood of requests still produces a single presentation covering their union.
//!
//! # Example
//!
//! ```
//! use lumen::frame::damage::{DamageRegion, SurfaceDamage};
//!
//! let mut damage = SurfaceDamage::new();
//! damage.add_region(DamageRegion::new(10, 10, 50, 50));
//! damage.add_region(DamageRegion::new(40, 40, 20, 20));
//!
//! assert!(damage.has_damage());
//! assert_eq!(damage.take(), vec![DamageRegion::new(10, 10, 50, 50)]);
//! ```

/// Maximum number of damage regions before coalescing to full damage
const MAX_DAMAGE_REGIONS: usize = 16;

/// Represents a rectangular region that needs repainting
///
/// Regions are axis-aligned rectangles in buffer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DamageRegion {
    /// X coordinate (pixels)
    pub x: i32,
    /// Y coordinate (pixels)
    pub y: i32,
    /// Width (pixels)
    pub width: u32,
    /// Height (pixels)
    pub height: u32,
}

impl DamageRegion {
    /// The largest representable rectangle; the compositor clips it to the
    /// surface, so it means "everything".
    pub const FULL: DamageRegion = DamageRegion {
        x: 0,
        y: 0,
        width: i32::MAX as u32,
        height: i32::MAX as u32,
    };

    /// Creates a new damage region
    ///
    /// ```
    /// use lumen::frame::damage::DamageRegion;
    ///
    /// let region = DamageRegion::new(100, 100, 200, 150);
    /// assert_eq!(region.area(), 30000);
    /// ```
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns the area of this region in pixels
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Checks if this region intersects another region
    ///
    /// Two regions intersect if they share any pixels.
    pub fn intersects(&self, other: &DamageRegion) -> bool {
        !(self.right() <= other.x as i64
            || other.right() <= self.x as i64
            || self.bottom() <= other.y as i64
            || other.bottom() <= self.y as i64)
    }

    /// Computes the union of two regions (smallest bounding box containing both)
    pub fn union(&self, other: &DamageRegion) -> DamageRegion {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());

        DamageRegion {
            x: x1,
            y: y1,
            width: (x2 - x1 as i64).min(u32::MAX as i64) as u32,
            height: (y2 - y1 as i64).min(u32::MAX as i64) as u32,
        }
    }

    /// Computes the intersection of two regions
    ///
    /// Returns `None` if the regions don't intersect.
    pub fn intersection(&self, other: &DamageRegion) -> Option<DamageRegion> {
        if !self.intersects(other) {
            return None;
        }

        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        Some(DamageRegion {
            x: x1,
            y: y1,
            width: (x2 - x1 as i64) as u32,
            height: (y2 - y1 as i64) as u32,
        })
    }

    /// Checks if this region completely contains another region
    pub fn contains_region(&self, other: &DamageRegion) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// Damage accumulated for one surface since its last presentation
///
/// The surface is either fully damaged or has a list of damaged regions.
#[derive(Debug, Clone, Default)]
pub struct SurfaceDamage {
    regions: Vec<DamageRegion>,
    full_damage: bool,
}

impl SurfaceDamage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds damage to a specific region
    ///
    /// A no-op if the surface is already fully damaged or the region is empty
    /// or already covered. Past the region limit the surface becomes fully
    /// damaged.
    pub fn add_region(&mut self, region: DamageRegion) {
        if self.full_damage || region.is_empty() {
            return;
        }

        if self.regions.iter().any(|r| r.contains_region(&region)) {
            return;
        }
        self.regions.retain(|r| !region.contains_region(r));
        self.regions.push(region);

        if self.regions.len() > MAX_DAMAGE_REGIONS {
            self.mark_full();
        }
    }

    /// Marks the entire surface as damaged
    pub fn mark_full(&mut self) {
        self.full_damage = true;
        self.regions.clear();
    }

    pub fn is_full(&self) -> bool {
        self.full_damage
    }

    /// Checks if the surface has any damage
    pub fn has_damage(&self) -> bool {
        self.full_damage || !self.regions.is_empty()
    }

    /// Returns the bounding box of all damage, if any
    pub fn bounds(&self) -> Option<DamageRegion> {
        if self.full_damage {
            return Some(DamageRegion::FULL);
        }
        self.regions.iter().copied().reduce(|a, b| a.union(&b))
    }

    /// Drains the accumulated damage as the regions to send on the next commit
    pub fn take(&mut self) -> Vec<DamageRegion> {
        let regions = if self.full_damage {
            vec![DamageRegion::FULL]
        } else {
            std::mem::take(&mut self.regions)
        };
        self.clear();
        regions
    }

    /// Clears all damage
    pub fn clear(&mut self) {
        self.full_damage = false;
        self.regions.clear();
    }
}
