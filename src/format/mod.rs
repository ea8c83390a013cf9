//! Formatting helpers.
//!
//! ```
//! use snmp_wire::format::hex;
//!
//! assert_eq!(hex::encode(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
//!
//! // Lazy formatting for logging
//! let data = [0x00, 0xff];
//! assert_eq!(hex::Bytes(&data).to_string(), "00ff");
//! ```

pub mod hex;
