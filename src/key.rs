//! Keysym to logical key lookup, plus the key event delivered to windows.

use xkbcommon::xkb::keysyms::*;

/// Logical key names exposed to toolkit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyName {
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Digit0, Digit1, Digit2, Digit3, Digit4,
    Digit5, Digit6, Digit7, Digit8, Digit9,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    Escape,
    Return,
    Enter,
    Tab,
    Backspace,
    Insert,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    Left,
    Right,
    Up,
    Down,
    Space,
    Apostrophe,
    Comma,
    Minus,
    Period,
    Slash,
    Semicolon,
    Equal,
    LeftBracket,
    RightBracket,
    Backslash,
    BackTick,
}

/// A key press or release delivered by the seat's keyboard.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEvent {
    /// Serial of the originating `wl_keyboard.key` event
    pub serial: u32,
    /// Raw evdev scancode
    pub scancode: u32,
    /// Logical key, if the keymap resolved the scancode to a known keysym
    pub name: Option<KeyName>,
    /// UTF-8 text produced by the key in the current modifier state
    pub text: String,
    pub pressed: bool,
}

/// Maps an XKB keysym to a logical key name. Upper and lower case letters map
/// to the same key.
#[allow(non_upper_case_globals)]
pub fn key_name(keysym: u32) -> Option<KeyName> {
    let name = match keysym {
        KEY_A | KEY_a => KeyName::A,
        KEY_B | KEY_b => KeyName::B,
        KEY_C | KEY_c => KeyName::C,
        KEY_D | KEY_d => KeyName::D,
        KEY_E | KEY_e => KeyName::E,
        KEY_F | KEY_f => KeyName::F,
        KEY_G | KEY_g => KeyName::G,
        KEY_H | KEY_h => KeyName::H,
        KEY_I | KEY_i => KeyName::I,
        KEY_J | KEY_j => KeyName::J,
        KEY_K | KEY_k => KeyName::K,
        KEY_L | KEY_l => KeyName::L,
        KEY_M | KEY_m => KeyName::M,
        KEY_N | KEY_n => KeyName::N,
        KEY_O | KEY_o => KeyName::O,
        KEY_P | KEY_p => KeyName::P,
        KEY_Q | KEY_q => KeyName::Q,
        KEY_R | KEY_r => KeyName::R,
        KEY_S | KEY_s => KeyName::S,
        KEY_T | KEY_t => KeyName::T,
        KEY_U | KEY_u => KeyName::U,
        KEY_V | KEY_v => KeyName::V,
        KEY_W | KEY_w => KeyName::W,
        KEY_X | KEY_x => KeyName::X,
        KEY_Y | KEY_y => KeyName::Y,
        KEY_Z | KEY_z => KeyName::Z,
        KEY_0 | KEY_KP_0 => KeyName::Digit0,
        KEY_1 | KEY_KP_1 => KeyName::Digit1,
        KEY_2 | KEY_KP_2 => KeyName::Digit2,
        KEY_3 | KEY_KP_3 => KeyName::Digit3,
        KEY_4 | KEY_KP_4 => KeyName::Digit4,
        KEY_5 | KEY_KP_5 => KeyName::Digit5,
        KEY_6 | KEY_KP_6 => KeyName::Digit6,
        KEY_7 | KEY_KP_7 => KeyName::Digit7,
        KEY_8 | KEY_KP_8 => KeyName::Digit8,
        KEY_9 | KEY_KP_9 => KeyName::Digit9,
        KEY_F1 => KeyName::F1,
        KEY_F2 => KeyName::F2,
        KEY_F3 => KeyName::F3,
        KEY_F4 => KeyName::F4,
        KEY_F5 => KeyName::F5,
        KEY_F6 => KeyName::F6,
        KEY_F7 => KeyName::F7,
        KEY_F8 => KeyName::F8,
        KEY_F9 => KeyName::F9,
        KEY_F10 => KeyName::F10,
        KEY_F11 => KeyName::F11,
        KEY_F12 => KeyName::F12,
        KEY_Escape => KeyName::Escape,
        KEY_Return => KeyName::Return,
        KEY_KP_Enter => KeyName::Enter,
        KEY_Tab => KeyName::Tab,
        KEY_BackSpace => KeyName::Backspace,
        KEY_Insert => KeyName::Insert,
        KEY_Delete => KeyName::Delete,
        KEY_Home => KeyName::Home,
        KEY_End => KeyName::End,
        KEY_Page_Up => KeyName::PageUp,
        KEY_Page_Down => KeyName::PageDown,
        KEY_Left => KeyName::Left,
        KEY_Right => KeyName::Right,
        KEY_Up => KeyName::Up,
        KEY_Down => KeyName::Down,
        KEY_space => KeyName::Space,
        KEY_apostrophe => KeyName::Apostrophe,
        KEY_comma => KeyName::Comma,
        KEY_minus => KeyName::Minus,
        KEY_period => KeyName::Period,
        KEY_slash => KeyName::Slash,
        KEY_semicolon => KeyName::Semicolon,
        KEY_equal => KeyName::Equal,
        KEY_bracketleft => KeyName::LeftBracket,
        KEY_bracketright => KeyName::RightBracket,
        KEY_backslash => KeyName::Backslash,
        KEY_grave => KeyName::BackTick,
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_ignore_case() {
        assert_eq!(key_name(KEY_q), Some(KeyName::Q));
        assert_eq!(key_name(KEY_Q), Some(KeyName::Q));
    }

    #[test]
    fn test_keypad_digits_share_names() {
        assert_eq!(key_name(KEY_KP_7), key_name(KEY_7));
        assert_eq!(key_name(KEY_KP_Enter), Some(KeyName::Enter));
    }

    #[test]
    fn test_unmapped_keysym() {
        assert_eq!(key_name(KEY_Shift_L), None);
        assert_eq!(key_name(0), None);
    }
}
