//! Compiled XKB keymap received from the seat's keyboard.

use std::fs::File;
use std::os::fd::OwnedFd;

use memmap2::MmapOptions;
use xkbcommon::xkb;

use crate::error::{DriverError, Result};

/// Evdev scancodes are offset by 8 from XKB keycodes.
const EVDEV_OFFSET: u32 = 8;

/// An xkbcommon context, keymap and state. Dropped together with the session
/// that received it.
pub struct Keymap {
    _context: xkb::Context,
    _keymap: xkb::Keymap,
    state: xkb::State,
}

// The xkb handles are only used under the session's globals mutex, never
// from two threads at once.
unsafe impl Send for Keymap {}

impl Keymap {
    /// Compiles a text-v1 keymap blob as sent by `wl_keyboard.keymap`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| DriverError::Keymap(e.to_string()))?
            .trim_end_matches('\0');

        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_string(
            &context,
            text.to_string(),
            xkb::KEYMAP_FORMAT_TEXT_V1,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| DriverError::Keymap("xkbcommon rejected keymap".to_string()))?;
        let state = xkb::State::new(&keymap);

        Ok(Self {
            _context: context,
            _keymap: keymap,
            state,
        })
    }

    /// Resolves a scancode to a single keysym in the current state.
    pub fn one_sym(&self, scancode: u32) -> u32 {
        u32::from(self.state.key_get_one_sym((scancode + EVDEV_OFFSET).into()))
    }

    /// Returns the UTF-8 text obtained from pressing a key in the current state.
    pub fn utf8(&self, scancode: u32) -> String {
        self.state.key_get_utf8((scancode + EVDEV_OFFSET).into())
    }

    pub fn update_mask(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        self.state.update_mask(depressed, latched, locked, 0, 0, group);
    }
}

/// Reads `size` bytes of keymap text from the descriptor handed over by the
/// compositor.
pub fn read_keymap(fd: OwnedFd, size: u32) -> Result<Vec<u8>> {
    let file = File::from(fd);
    let map = unsafe { MmapOptions::new().len(size as usize).map(&file) }
        .map_err(|e| DriverError::shm("cannot read XKB keymap from fd", e))?;
    Ok(map.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::OwnedFd;

    #[test]
    fn test_rejects_garbage_keymap() {
        assert!(matches!(
            Keymap::parse(b"not a keymap\0"),
            Err(DriverError::Keymap(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        assert!(matches!(
            Keymap::parse(&[0xff, 0xfe, 0x00]),
            Err(DriverError::Keymap(_))
        ));
    }

    #[test]
    fn test_read_keymap_from_file() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"xkb_keymap {};\0").unwrap();
        let fd = OwnedFd::from(file);

        let data = read_keymap(fd, 15).unwrap();
        assert_eq!(&data, b"xkb_keymap {};\0");
    }
}
