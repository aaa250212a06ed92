//! The fixed string-key-code → (scancode, default char) table (Glossary),
//! recovered from `KeyPacketHandler.cpp`'s `_InitKeyMap`. Consulted only
//! to fill in a missing `key_code` and/or missing char from `key_string`;
//! a nonzero wire value always wins (§4.7).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMapEntry {
    pub scancode: u32,
    pub default_char: Option<char>,
}

const fn e(scancode: u32, default_char: Option<char>) -> KeyMapEntry {
    KeyMapEntry { scancode, default_char }
}

/// `(string code, scancode, default char)`. Ordered by physical layout,
/// not alphabetically, matching the table the original driver builds.
const TABLE: &[(&str, u32, Option<char>)] = &[
    ("Escape", 0x01, None),
    ("F1", 0x02, None),
    ("F2", 0x03, None),
    ("F3", 0x04, None),
    ("F4", 0x05, None),
    ("F5", 0x06, None),
    ("F6", 0x07, None),
    ("F7", 0x08, None),
    ("F8", 0x09, None),
    ("F9", 0x0A, None),
    ("F10", 0x0B, None),
    ("F11", 0x0C, None),
    ("F12", 0x0D, None),
    ("Backquote", 0x11, Some('`')),
    ("Key1", 0x12, Some('1')),
    ("Key2", 0x13, Some('2')),
    ("Key3", 0x14, Some('3')),
    ("Key4", 0x15, Some('4')),
    ("Key5", 0x16, Some('5')),
    ("Key6", 0x17, Some('6')),
    ("Key7", 0x18, Some('7')),
    ("Key8", 0x19, Some('8')),
    ("Key9", 0x1A, Some('9')),
    ("Key0", 0x1B, Some('0')),
    ("Minus", 0x1C, Some('-')),
    ("Equal", 0x1D, Some('=')),
    ("Backspace", 0x1E, Some('\u{8}')),
    ("Insert", 0x1F, Some('\u{5}')),
    ("Home", 0x20, Some('\u{1}')),
    ("PageUp", 0x21, Some('\u{b}')),
    ("Tab", 0x26, Some('\t')),
    ("KeyQ", 0x27, Some('q')),
    ("KeyW", 0x28, Some('w')),
    ("KeyE", 0x29, Some('e')),
    ("KeyR", 0x2A, Some('r')),
    ("KeyT", 0x2B, Some('t')),
    ("KeyY", 0x2C, Some('y')),
    ("KeyU", 0x2D, Some('u')),
    ("KeyI", 0x2E, Some('i')),
    ("KeyO", 0x2F, Some('o')),
    ("KeyP", 0x30, Some('p')),
    ("BracketLeft", 0x31, Some('[')),
    ("BracketRight", 0x32, Some(']')),
    ("Backslash", 0x33, Some('\\')),
    ("Delete", 0x34, Some('\u{7f}')),
    ("End", 0x35, Some('\u{4}')),
    ("PageDown", 0x36, Some('\u{c}')),
    ("CapsLock", 0x3B, None),
    ("KeyA", 0x3C, Some('a')),
    ("KeyS", 0x3D, Some('s')),
    ("KeyD", 0x3E, Some('d')),
    ("KeyF", 0x3F, Some('f')),
    ("KeyG", 0x40, Some('g')),
    ("KeyH", 0x41, Some('h')),
    ("KeyJ", 0x42, Some('j')),
    ("KeyK", 0x43, Some('k')),
    ("KeyL", 0x44, Some('l')),
    ("Semicolon", 0x45, Some(';')),
    ("Quote", 0x46, Some('\'')),
    ("Enter", 0x47, Some('\n')),
    ("ShiftLeft", 0x4B, None),
    ("KeyZ", 0x4C, Some('z')),
    ("KeyX", 0x4D, Some('x')),
    ("KeyC", 0x4E, Some('c')),
    ("KeyV", 0x4F, Some('v')),
    ("KeyB", 0x50, Some('b')),
    ("KeyN", 0x51, Some('n')),
    ("KeyM", 0x52, Some('m')),
    ("Comma", 0x53, Some(',')),
    ("Period", 0x54, Some('.')),
    ("Slash", 0x55, Some('/')),
    ("ShiftRight", 0x56, None),
    ("ArrowUp", 0x57, Some('\u{1e}')),
    ("ControlLeft", 0x5C, None),
    ("AltLeft", 0x5D, None),
    ("Space", 0x5E, Some(' ')),
    ("AltRight", 0x5F, None),
    ("ControlRight", 0x60, None),
    ("ArrowLeft", 0x61, Some('\u{1c}')),
    ("ArrowDown", 0x62, Some('\u{1f}')),
    ("ArrowRight", 0x63, Some('\u{1d}')),
    ("MetaLeft", 0x66, None),
    ("MetaRight", 0x67, None),
];

/// Looks up a viewer-supplied string key code. `None` if the code is not
/// in the fixed table (the event's own `key_code`/`key_utf32` are used
/// unmodified in that case).
pub fn lookup(code: &str) -> Option<KeyMapEntry> {
    TABLE
        .iter()
        .find(|(name, _, _)| *name == code)
        .map(|(_, scancode, ch)| e(*scancode, *ch))
}
