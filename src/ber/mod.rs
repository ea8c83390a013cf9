//! ASN.1 BER encoding and decoding for SNMP.
//!
//! Encoding builds messages back to front in an [`EncodeBuf`] so lengths are
//! always known before their headers are written. Decoding is zero-copy over
//! [`bytes::Bytes`] via [`Decoder`].

mod decode;
mod encode;
pub mod length;

pub use decode::Decoder;
pub use encode::EncodeBuf;

/// BER tag constants used by SNMP.
pub mod tag {
    /// Universal class tags.
    pub mod universal {
        pub const INTEGER: u8 = 0x02;
        pub const OCTET_STRING: u8 = 0x04;
        pub const NULL: u8 = 0x05;
        pub const OBJECT_IDENTIFIER: u8 = 0x06;
        pub const SEQUENCE: u8 = 0x30;
    }

    /// SNMP application class tags (RFC 2578).
    pub mod application {
        pub const IP_ADDRESS: u8 = 0x40;
        pub const COUNTER32: u8 = 0x41;
        pub const GAUGE32: u8 = 0x42;
        pub const TIMETICKS: u8 = 0x43;
        pub const OPAQUE: u8 = 0x44;
        pub const COUNTER64: u8 = 0x46;
    }

    /// Context-specific primitive tags for v2c exception values (RFC 3416).
    pub mod context {
        pub const NO_SUCH_OBJECT: u8 = 0x80;
        pub const NO_SUCH_INSTANCE: u8 = 0x81;
        pub const END_OF_MIB_VIEW: u8 = 0x82;
    }

    /// Context-specific constructed tags for PDU kinds.
    pub mod pdu {
        pub const GET_REQUEST: u8 = 0xA0;
        pub const GET_NEXT_REQUEST: u8 = 0xA1;
        pub const RESPONSE: u8 = 0xA2;
        pub const SET_REQUEST: u8 = 0xA3;
        pub const GET_BULK_REQUEST: u8 = 0xA5;
        pub const INFORM_REQUEST: u8 = 0xA6;
        pub const TRAP: u8 = 0xA7;
        pub const REPORT: u8 = 0xA8;

        /// Whether `tag` falls in the PDU tag range.
        pub const fn is_pdu(tag: u8) -> bool {
            tag >= GET_REQUEST && tag <= REPORT
        }
    }
}
