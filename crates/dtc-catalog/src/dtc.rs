//! Trouble Code Value Type

use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// System a trouble code belongs to (first character of the code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DtcClass {
    /// `P` - engine and transmission
    Powertrain,
    /// `C`
    Chassis,
    /// `B`
    Body,
    /// `U` - network / communication
    Network,
}

impl DtcClass {
    pub fn letter(&self) -> char {
        match self {
            DtcClass::Powertrain => 'P',
            DtcClass::Chassis => 'C',
            DtcClass::Body => 'B',
            DtcClass::Network => 'U',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'P' => Some(DtcClass::Powertrain),
            'C' => Some(DtcClass::Chassis),
            'B' => Some(DtcClass::Body),
            'U' => Some(DtcClass::Network),
            _ => None,
        }
    }

    /// Top two bits of the first wire byte
    fn wire_bits(&self) -> u8 {
        match self {
            DtcClass::Powertrain => 0b00,
            DtcClass::Chassis => 0b01,
            DtcClass::Body => 0b10,
            DtcClass::Network => 0b11,
        }
    }

    fn from_wire_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => DtcClass::Powertrain,
            0b01 => DtcClass::Chassis,
            0b10 => DtcClass::Body,
            _ => DtcClass::Network,
        }
    }
}

/// A diagnostic trouble code such as `P0301`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dtc {
    class: DtcClass,
    /// The four hex digits after the class letter
    code: u16,
}

impl Dtc {
    pub fn new(class: DtcClass, code: u16) -> Self {
        Self { class, code }
    }

    /// Decode the two-byte form used in mode 03/07/0A replies
    pub fn from_bytes(a: u8, b: u8) -> Self {
        Self {
            class: DtcClass::from_wire_bits(a >> 6),
            code: u16::from_be_bytes([a & 0x3F, b]),
        }
    }

    /// Encode to the two-byte wire form. Codes whose first digit is above 3
    /// have no wire encoding.
    pub fn to_bytes(&self) -> Option<[u8; 2]> {
        if self.code > 0x3FFF {
            return None;
        }
        let [hi, lo] = self.code.to_be_bytes();
        Some([(self.class.wire_bits() << 6) | hi, lo])
    }

    pub fn class(&self) -> DtcClass {
        self.class
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    /// Class letter plus the first two digits, e.g. `P03` for `P0301`
    pub fn prefix(&self) -> String {
        format!("{}{:02X}", self.class.letter(), self.code >> 8)
    }

    /// First two digits as a byte, e.g. `0x03` for `P0301`
    pub(crate) fn group(&self) -> u8 {
        (self.code >> 8) as u8
    }
}

impl fmt::Display for Dtc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04X}", self.class.letter(), self.code)
    }
}

impl FromStr for Dtc {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CatalogError::InvalidCode(s.to_string());
        let text = s.trim();

        let mut chars = text.chars();
        let class = chars
            .next()
            .and_then(DtcClass::from_letter)
            .ok_or_else(invalid)?;
        let digits = chars.as_str();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let code = u16::from_str_radix(digits, 16).map_err(|_| invalid())?;

        Ok(Self { class, code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_text() {
        let dtc: Dtc = "P000A".parse().unwrap();
        assert_eq!(dtc.class(), DtcClass::Powertrain);
        assert_eq!(dtc.code(), 0x000A);
        assert_eq!(dtc.prefix(), "P00");
    }

    #[test]
    fn test_parse_case_insensitive() {
        let dtc: Dtc = " u0100 ".parse().unwrap();
        assert_eq!(dtc.to_string(), "U0100");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in ["", "P", "P001", "P00011", "X0001", "P00G1", "0001P"] {
            assert!(
                matches!(text.parse::<Dtc>(), Err(CatalogError::InvalidCode(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_wire_bytes() {
        // 0x01 0x71 => P0171, 0xC1 0x00 => U0100
        assert_eq!(Dtc::from_bytes(0x01, 0x71).to_string(), "P0171");
        assert_eq!(Dtc::from_bytes(0xC1, 0x00).to_string(), "U0100");
        assert_eq!(Dtc::from_bytes(0x43, 0x00).to_string(), "C0300");
        assert_eq!(Dtc::from_bytes(0x80, 0x01).to_string(), "B0001");
    }

    #[test]
    fn test_first_digit_above_three_not_encodable() {
        let dtc: Dtc = "P4000".parse().unwrap();
        assert!(dtc.to_bytes().is_none());
    }

    proptest! {
        #[test]
        fn prop_wire_encoding_preserves_text(a in any::<u8>(), b in any::<u8>()) {
            let dtc = Dtc::from_bytes(a, b);
            prop_assert_eq!(dtc.to_bytes(), Some([a, b]));
            let reparsed: Dtc = dtc.to_string().parse().unwrap();
            prop_assert_eq!(reparsed, dtc);
        }
    }
}
