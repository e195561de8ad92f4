use std::fmt;
use std::str::FromStr;

use crate::InputError;

/// Windows virtual-key code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualKey(pub u16);

impl VirtualKey {
    pub const BACKSPACE: VirtualKey = VirtualKey(0x08);
    pub const TAB: VirtualKey = VirtualKey(0x09);
    pub const ENTER: VirtualKey = VirtualKey(0x0D);
    pub const SHIFT: VirtualKey = VirtualKey(0x10);
    pub const CONTROL: VirtualKey = VirtualKey(0x11);
    pub const ALT: VirtualKey = VirtualKey(0x12);
    pub const ESCAPE: VirtualKey = VirtualKey(0x1B);
    pub const SPACE: VirtualKey = VirtualKey(0x20);
    pub const PAGE_UP: VirtualKey = VirtualKey(0x21);
    pub const PAGE_DOWN: VirtualKey = VirtualKey(0x22);
    pub const END: VirtualKey = VirtualKey(0x23);
    pub const HOME: VirtualKey = VirtualKey(0x24);
    pub const LEFT: VirtualKey = VirtualKey(0x25);
    pub const UP: VirtualKey = VirtualKey(0x26);
    pub const RIGHT: VirtualKey = VirtualKey(0x27);
    pub const DOWN: VirtualKey = VirtualKey(0x28);
    pub const INSERT: VirtualKey = VirtualKey(0x2D);
    pub const DELETE: VirtualKey = VirtualKey(0x2E);
    const F1: u16 = 0x70;

    pub fn code(&self) -> u16 {
        self.0
    }
}

const NAMED: &[(&str, VirtualKey)] = &[
    ("enter", VirtualKey::ENTER),
    ("return", VirtualKey::ENTER),
    ("space", VirtualKey::SPACE),
    ("tab", VirtualKey::TAB),
    ("esc", VirtualKey::ESCAPE),
    ("escape", VirtualKey::ESCAPE),
    ("backspace", VirtualKey::BACKSPACE),
    ("delete", VirtualKey::DELETE),
    ("del", VirtualKey::DELETE),
    ("insert", VirtualKey::INSERT),
    ("home", VirtualKey::HOME),
    ("end", VirtualKey::END),
    ("pageup", VirtualKey::PAGE_UP),
    ("pagedown", VirtualKey::PAGE_DOWN),
    ("up", VirtualKey::UP),
    ("down", VirtualKey::DOWN),
    ("left", VirtualKey::LEFT),
    ("right", VirtualKey::RIGHT),
    ("shift", VirtualKey::SHIFT),
    ("ctrl", VirtualKey::CONTROL),
    ("control", VirtualKey::CONTROL),
    ("alt", VirtualKey::ALT),
];

/// Resolve a key name like `"enter"`, `"f5"` or `"a"`, case-insensitively
pub fn parse_key(name: &str) -> Result<VirtualKey, InputError> {
    let lower = name.trim().to_ascii_lowercase();

    if let Some((_, key)) = NAMED.iter().find(|(n, _)| *n == lower) {
        return Ok(*key);
    }

    if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u16>().ok())
        && (1..=24).contains(&n)
    {
        return Ok(VirtualKey(VirtualKey::F1 + n - 1));
    }

    let mut chars = lower.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_lowercase() {
            return Ok(VirtualKey(c.to_ascii_uppercase() as u16));
        }
        if c.is_ascii_digit() {
            return Ok(VirtualKey(c as u16));
        }
    }

    Err(InputError::UnknownKey(name.to_string()))
}

impl FromStr for VirtualKey {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_key(s)
    }
}

impl fmt::Display for VirtualKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((name, _)) = NAMED.iter().find(|(_, k)| k == self) {
            return f.write_str(name);
        }
        match self.0 {
            code @ 0x70..=0x87 => write!(f, "f{}", code - VirtualKey::F1 + 1),
            code @ (0x30..=0x39 | 0x41..=0x5A) => {
                write!(f, "{}", (code as u8 as char).to_ascii_lowercase())
            }
            code => write!(f, "vk{code:#04x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_keys() {
        assert_eq!(parse_key("enter").unwrap(), VirtualKey::ENTER);
        assert_eq!(parse_key("Return").unwrap(), VirtualKey::ENTER);
        assert_eq!(parse_key(" ESC ").unwrap(), VirtualKey::ESCAPE);
        assert_eq!(parse_key("pagedown").unwrap(), VirtualKey::PAGE_DOWN);
    }

    #[test]
    fn test_function_letter_digit_keys() {
        assert_eq!(parse_key("f1").unwrap(), VirtualKey(0x70));
        assert_eq!(parse_key("F12").unwrap(), VirtualKey(0x7B));
        assert_eq!(parse_key("a").unwrap(), VirtualKey(0x41));
        assert_eq!(parse_key("Z").unwrap(), VirtualKey(0x5A));
        assert_eq!(parse_key("7").unwrap(), VirtualKey(0x37));
    }

    #[test]
    fn test_unknown_keys() {
        for name in ["", "f0", "f25", "enterr", "ab", "!"] {
            assert!(
                matches!(parse_key(name), Err(InputError::UnknownKey(_))),
                "{name}"
            );
        }
    }

    #[test]
    fn test_display_round_trips() {
        for name in ["enter", "f5", "q", "3", "space"] {
            assert_eq!(parse_key(name).unwrap().to_string(), name);
        }
    }
}
