//! Shared-memory buffers handed to the compositor
//!
//! A [`SharedBuffer`] is one anonymous memory file, mapped into this process
//! and wrapped in a single `wl_buffer`. The compositor reads the pixels
//! straight out of the file, so the mapping must not be written while the
//! compositor holds the buffer: [`SharedBuffer::is_free`] tells when it has
//! let go.
//!
//! The logical image is RGBA8 in memory order while `ARGB8888` on a
//! little-endian wire is B,G,R,A, so [`SharedBuffer::flush`] swaps red and
//! blue after copying.

pub mod pool;

use std::ffi::CStr;
use std::fs::File;
use std::os::fd::{AsFd, FromRawFd};

use log::{debug, warn};
use memmap2::MmapMut;

use crate::error::{DriverError, Result};
use crate::geometry::Size;
use crate::protocol::{BufferId, Protocol, ReleaseFlag};

pub use pool::{BufferPool, PoolStats};

const MEMFD_NAME: &CStr = c"lumen-shm";

/// Largest byte length a `wl_shm_pool` can describe.
pub const MAX_BUFFER_BYTES: u64 = i32::MAX as u64;

/// Swaps the first and third byte of every 4-byte pixel (RGBA <-> BGRA).
pub fn swizzle_rgba_bgra(pixels: &mut [u8]) {
    for pixel in pixels.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }
}

/// Fails unless `size` is non-empty and fits in a `wl_shm_pool`.
pub fn check_size(size: Size) -> Result<u64> {
    if size.is_empty() {
        return Err(DriverError::InvalidSize(size));
    }
    let bytes = size.byte_len();
    if bytes > MAX_BUFFER_BYTES {
        return Err(DriverError::BufferTooLarge { size, bytes });
    }
    Ok(bytes)
}

fn memfd() -> Result<File> {
    let fd = unsafe { libc::memfd_create(MEMFD_NAME.as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(DriverError::shm(
            "cannot create shared memory file",
            std::io::Error::last_os_error(),
        ));
    }
    Ok(unsafe { File::from_raw_fd(fd) })
}

/// One memory-file-backed `wl_buffer` of a fixed size.
pub struct SharedBuffer {
    id: BufferId,
    _file: File,
    mmap: MmapMut,
    size: Size,
    release: ReleaseFlag,
}

impl SharedBuffer {
    /// Allocates, maps and registers a buffer. It starts busy.
    pub fn create(protocol: &dyn Protocol, size: Size) -> Result<Self> {
        let bytes = check_size(size)?;

        let file = memfd()?;
        file.set_len(bytes)
            .map_err(|e| DriverError::shm("cannot size shared memory file", e))?;
        let mmap = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| DriverError::shm("cannot map shared memory file", e))?;

        let id = BufferId::next();
        let release = ReleaseFlag::new();
        protocol.create_buffer(id, file.as_fd(), size, release.clone())?;

        debug!("Allocated shared buffer {:?} ({}, {} bytes)", id, size, bytes);

        Ok(Self {
            id,
            _file: file,
            mmap,
            size,
            release,
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// True once the compositor has released the buffer.
    pub fn is_free(&self) -> bool {
        self.release.is_free()
    }

    pub(crate) fn try_claim(&self) -> bool {
        self.release.try_claim()
    }

    /// The mapped bytes, in wire (BGRA) order.
    pub fn pixels(&self) -> &[u8] {
        &self.mmap
    }

    /// Mutable access to the mapped bytes, in wire (BGRA) order.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Copies an RGBA image of exactly this buffer's size into the mapping and
    /// converts it to wire order.
    pub fn flush(&mut self, rgba: &[u8]) -> Result<()> {
        if rgba.len() != self.mmap.len() {
            return Err(DriverError::InvalidSize(self.size));
        }
        self.mmap.copy_from_slice(rgba);
        swizzle_rgba_bgra(&mut self.mmap);
        Ok(())
    }

    /// Destroys the protocol handle and unmaps. Failures are logged.
    pub fn destroy(self, protocol: &dyn Protocol) {
        if let Err(e) = protocol.destroy_buffer(self.id) {
            warn!("Failed to destroy buffer {:?}: {}", self.id, e);
        }
        debug!("Destroyed shared buffer {:?} ({})", self.id, self.size);
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("free", &self.is_free())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swizzle_swaps_red_and_blue() {
        let mut pixels = vec![1, 2, 3, 4, 10, 20, 30, 40];
        swizzle_rgba_bgra(&mut pixels);
        assert_eq!(pixels, vec![3, 2, 1, 4, 30, 20, 10, 40]);

        swizzle_rgba_bgra(&mut pixels);
        assert_eq!(pixels, vec![1, 2, 3, 4, 10, 20, 30, 40]);
    }

    #[test]
    fn test_check_size_limits() {
        assert_eq!(check_size(Size::new(100, 50)).unwrap(), 20_000);
        assert!(matches!(
            check_size(Size::new(0, 50)),
            Err(DriverError::InvalidSize(_))
        ));
        // 32768 * 16384 * 4 == 2^31, one past i32::MAX
        assert!(matches!(
            check_size(Size::new(32768, 16384)),
            Err(DriverError::BufferTooLarge { bytes: 2_147_483_648, .. })
        ));
    }

    #[test]
    fn test_memfd_is_writable() {
        use std::io::Write;
        let mut file = memfd().unwrap();
        file.write_all(b"pixels").unwrap();
        assert_eq!(file.metadata().unwrap().len(), 6);
    }
}
