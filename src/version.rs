//! SNMP protocol version.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// SNMP protocol version, with its on-the-wire integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    /// SNMPv1 (RFC 1157).
    V1,
    /// SNMPv2c (RFC 1901).
    #[default]
    V2c,
    /// SNMPv3 (RFC 3411-3418).
    V3,
}

impl Version {
    /// The msgVersion integer.
    pub fn as_i32(self) -> i32 {
        match self {
            Version::V1 => 0,
            Version::V2c => 1,
            Version::V3 => 3,
        }
    }

    /// Map a msgVersion integer back to a version.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Version::V1),
            1 => Some(Version::V2c),
            3 => Some(Version::V3),
            _ => None,
        }
    }

    /// Whether this version frames PDUs with a community string.
    pub fn uses_community(self) -> bool {
        !matches!(self, Version::V3)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Version::V1 => "v1",
            Version::V2c => "v2c",
            Version::V3 => "v3",
        })
    }
}

impl FromStr for Version {
    type Err = Error;

    /// Accepts `1`/`v1`, `2`/`2c`/`v2c`, `3`/`v3`, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "v1" => Ok(Version::V1),
            "2" | "2c" | "v2" | "v2c" => Ok(Version::V2c),
            "3" | "v3" => Ok(Version::V3),
            _ => Err(Error::Config(format!("unknown SNMP version {:?}", s))),
        }
    }
}
