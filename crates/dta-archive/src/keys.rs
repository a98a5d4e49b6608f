//! Known archive keys and key parsing.
//!
//! The retail archives of Hidden & Dangerous 2 and Mafia each use a fixed
//! key pair. Lookup is by archive file name.

use std::path::Path;

use thiserror::Error;

use crate::KeyPair;

/// A retail archive and its key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownArchive {
    pub game: &'static str,
    pub file_name: &'static str,
    pub keys: KeyPair,
}

const fn known(game: &'static str, file_name: &'static str, key1: u32, key2: u32) -> KnownArchive {
    KnownArchive {
        game,
        file_name,
        keys: KeyPair::new(key1, key2),
    }
}

const HD2: &str = "Hidden & Dangerous 2";
const MAFIA: &str = "Mafia";

/// Every archive with a published key pair.
pub const KNOWN_ARCHIVES: &[KnownArchive] = &[
    known(HD2, "Maps.dta", 0xF26527FA, 0xB438D0A5),
    known(HD2, "Missions.dta", 0x22BCDA98, 0x7654A3F0),
    known(HD2, "Models.dta", 0x10ACB252, 0x5D805259),
    known(HD2, "Others.dta", 0x65F7AB23, 0xEA85902A),
    known(HD2, "Sounds.dta", 0x8D2965CA, 0x4FE85106),
    known(HD2, "Scripts.dta", 0xCF761298, 0x0AB4E72D),
    known(MAFIA, "A0.dta", 0xD8D0A975, 0x467ACDE0),
    known(MAFIA, "A1.dta", 0x3D98766C, 0xDE7009CD),
    known(MAFIA, "A2.dta", 0x82A1C97B, 0x2D5085D4),
    known(MAFIA, "A3.dta", 0x43876FEA, 0x900CDBA8),
    known(MAFIA, "A4.dta", 0x43876FEA, 0x900CDBA8),
    known(MAFIA, "A5.dta", 0xDEAC5342, 0x760CE652),
    known(MAFIA, "A6.dta", 0x64CD8D0A, 0x4BC97B2D),
    known(MAFIA, "A7.dta", 0xD6FEA900, 0xCDB76CE6),
    known(MAFIA, "A8.dta", 0xD8DD8FAC, 0x5324ACE5),
    known(MAFIA, "A9.dta", 0x6FEE6324, 0xACDA4783),
    known(MAFIA, "AA.dta", 0x5342760C, 0xEDEAC652),
    known(MAFIA, "AB.dta", 0xD8D0A975, 0x467ACDE0),
    known(MAFIA, "AC.dta", 0x43876FEA, 0x900CDBA8),
];

/// Find the key pair for an archive by its file name (case-insensitive).
pub fn lookup(path: &Path) -> Option<&'static KnownArchive> {
    let file_name = path.file_name()?.to_str()?;
    KNOWN_ARCHIVES
        .iter()
        .find(|known| known.file_name.eq_ignore_ascii_case(file_name))
}

/// Errors from [`parse_key`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseKeyError {
    #[error("invalid hexadecimal key {0:?}")]
    NotHex(String),

    #[error("key must be non-zero")]
    Zero,
}

/// Parse a hexadecimal key, with or without a `0x` prefix.
pub fn parse_key(text: &str) -> Result<u32, ParseKeyError> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let key = u32::from_str_radix(digits, 16).map_err(|_| ParseKeyError::NotHex(text.to_string()))?;
    if key == 0 {
        return Err(ParseKeyError::Zero);
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_case_insensitive() {
        let known = lookup(Path::new("/games/Mafia/a2.DTA")).unwrap();
        assert_eq!(known.game, "Mafia");
        assert_eq!(known.keys, KeyPair::new(0x82A1C97B, 0x2D5085D4));

        assert_eq!(
            lookup(Path::new("Scripts.dta")).unwrap().keys,
            KeyPair::new(0xCF761298, 0x0AB4E72D)
        );
        assert!(lookup(Path::new("unknown.dta")).is_none());
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("0xF26527FA"), Ok(0xF26527FA));
        assert_eq!(parse_key("b438d0a5"), Ok(0xB438D0A5));
        assert_eq!(parse_key("0"), Err(ParseKeyError::Zero));
        assert!(matches!(parse_key("xyz"), Err(ParseKeyError::NotHex(_))));
        assert!(matches!(parse_key("1FFFFFFFF"), Err(ParseKeyError::NotHex(_))));
    }
}
