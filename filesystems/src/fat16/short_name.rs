// 8.3 short names as stored in directory entries

use fatkit_core::{FatError, FatResult};
use std::fmt;

pub const SHORT_NAME_LEN: usize = 11;

/// An 11-byte, space-padded, upper-case short name. Always a valid, occupied name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortName([u8; SHORT_NAME_LEN]);

impl ShortName {
    /// Parse a `NAME.EXT` style filename.
    ///
    /// ASCII letters are upper-cased. The base must be 1 to 8 characters and the
    /// extension at most 3, both drawn from the 8.3 character set.
    pub fn parse(filename: &str) -> FatResult<Self> {
        let mut raw = [b' '; SHORT_NAME_LEN];

        let upper = filename.trim().to_ascii_uppercase();
        let (base, ext) = match upper.split_once('.') {
            Some((base, ext)) => (base, ext),
            None => (upper.as_str(), ""),
        };

        if base.is_empty() || base.len() > 8 {
            return Err(FatError::InvalidName(format!(
                "{}: base name must be 1 to 8 characters",
                filename
            )));
        }
        if ext.len() > 3 {
            return Err(FatError::InvalidName(format!(
                "{}: extension must be at most 3 characters",
                filename
            )));
        }

        for (i, byte) in base.bytes().enumerate() {
            if !is_valid_83_char(byte) {
                return Err(FatError::InvalidName(format!(
                    "{}: invalid character {:?}",
                    filename, byte as char
                )));
            }
            raw[i] = byte;
        }
        for (i, byte) in ext.bytes().enumerate() {
            if !is_valid_83_char(byte) {
                return Err(FatError::InvalidName(format!(
                    "{}: invalid character {:?} in extension",
                    filename, byte as char
                )));
            }
            raw[8 + i] = byte;
        }

        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; SHORT_NAME_LEN] {
        &self.0
    }
}

impl fmt::Display for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&display_83_name(&self.0))
    }
}

/// Render padded directory bytes as `NAME.EXT`.
pub fn display_83_name(raw: &[u8; SHORT_NAME_LEN]) -> String {
    let mut result = String::new();

    for &byte in &raw[0..8] {
        if byte == b' ' || byte == 0x00 {
            break;
        }
        // 0x05 stands in for a leading 0xE5
        result.push(if byte == 0x05 { 0xE5 as char } else { byte as char });
    }

    let ext: String = raw[8..11]
        .iter()
        .take_while(|&&b| b != b' ' && b != 0x00)
        .map(|&b| b as char)
        .collect();
    if !ext.is_empty() {
        result.push('.');
        result.push_str(&ext);
    }

    result
}

fn is_valid_83_char(c: u8) -> bool {
    matches!(
        c,
        b'A'..=b'Z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'%'
            | b'&'
            | b'\''
            | b'('
            | b')'
            | b'-'
            | b'@'
            | b'^'
            | b'_'
            | b'`'
            | b'{'
            | b'}'
            | b'~'
    )
}
