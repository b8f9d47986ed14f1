//! Static mapping from macro-file button names to Linux gamepad key codes

// linux/input-event-codes.h
pub const BTN_0: u16 = 0x100;
pub const BTN_1: u16 = 0x101;
pub const BTN_2: u16 = 0x102;
pub const BTN_3: u16 = 0x103;
pub const BTN_4: u16 = 0x104;
pub const BTN_5: u16 = 0x105;
pub const BTN_6: u16 = 0x106;
pub const BTN_7: u16 = 0x107;
pub const BTN_8: u16 = 0x108;
pub const BTN_9: u16 = 0x109;

pub const BTN_A: u16 = 0x130;
pub const BTN_B: u16 = 0x131;
pub const BTN_X: u16 = 0x133;
pub const BTN_Y: u16 = 0x134;

pub const BTN_TL: u16 = 0x136;
pub const BTN_TR: u16 = 0x137;
pub const BTN_TL2: u16 = 0x138;
pub const BTN_TR2: u16 = 0x139;

pub const BTN_SELECT: u16 = 0x13a;
pub const BTN_START: u16 = 0x13b;

pub const BTN_THUMBL: u16 = 0x13d;
pub const BTN_THUMBR: u16 = 0x13e;

pub const BTN_DPAD_UP: u16 = 0x220;
pub const BTN_DPAD_DOWN: u16 = 0x221;
pub const BTN_DPAD_LEFT: u16 = 0x222;
pub const BTN_DPAD_RIGHT: u16 = 0x223;

/// Every button name a macro may use, paired with its key code
pub const BUTTONS: &[(&str, u16)] = &[
    ("0", BTN_0),
    ("1", BTN_1),
    ("2", BTN_2),
    ("3", BTN_3),
    ("4", BTN_4),
    ("5", BTN_5),
    ("6", BTN_6),
    ("7", BTN_7),
    ("8", BTN_8),
    ("9", BTN_9),
    ("A", BTN_A),
    ("B", BTN_B),
    ("X", BTN_X),
    ("Y", BTN_Y),
    ("TL", BTN_TL),
    ("TR", BTN_TR),
    ("TL2", BTN_TL2),
    ("TR2", BTN_TR2),
    ("START", BTN_START),
    ("SELECT", BTN_SELECT),
    ("THUMBL", BTN_THUMBL),
    ("THUMBR", BTN_THUMBR),
    ("DPAD_UP", BTN_DPAD_UP),
    ("DPAD_DOWN", BTN_DPAD_DOWN),
    ("DPAD_LEFT", BTN_DPAD_LEFT),
    ("DPAD_RIGHT", BTN_DPAD_RIGHT),
];

/// Resolve a button name (case-sensitive) to its key code
pub fn button_code(name: &str) -> Option<u16> {
    BUTTONS
        .iter()
        .find(|(button, _)| *button == name)
        .map(|(_, code)| *code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_lookup() {
        assert_eq!(button_code("A"), Some(BTN_A));
        assert_eq!(button_code("DPAD_UP"), Some(BTN_DPAD_UP));
        assert_eq!(button_code("0"), Some(BTN_0));
        assert_eq!(button_code("9"), Some(BTN_9));
        assert_eq!(button_code("a"), None);
        assert_eq!(button_code("TURBO"), None);
    }

    #[test]
    fn test_button_codes_unique() {
        for (i, (name, code)) in BUTTONS.iter().enumerate() {
            for (other, other_code) in &BUTTONS[i + 1..] {
                assert_ne!(name, other);
                assert_ne!(code, other_code, "{} and {} share a code", name, other);
            }
        }
    }
}
