// Error carries an Oid inline in `Report`; boxing it buys little.
#![allow(clippy::result_large_err)]

//! # snmp-wire
//!
//! Client-side SNMP protocol core for Rust.
//!
//! ## Features
//!
//! - SNMPv1, v2c and v3 message framing
//! - Zero-copy BER decoding with offset-carrying errors
//! - USM authentication (HMAC-MD5-96, HMAC-SHA1-96) and privacy
//!   (DES-CBC, AES-128-CFB)
//! - A correlation session that keeps one request in flight and resolves it
//!   from asynchronous transport completions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snmp_wire::oid;
//! use snmp_wire::session::{Options, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snmp_wire::Error> {
//!     let options = Options::new().with("community", "public")?;
//!     let session: Session = Session::open("192.0.2.1", 161, &options).await?;
//!
//!     let response = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await?;
//!     println!("sysDescr: {:?}", response.varbinds().first().map(|vb| &vb.value));
//!     Ok(())
//! }
//! ```
//!
//! ## SNMPv3
//!
//! ```rust,no_run
//! use snmp_wire::oid;
//! use snmp_wire::session::{Options, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snmp_wire::Error> {
//!     let options = Options::new()
//!         .with("version", "3")?
//!         .with("username", "admin")?
//!         .with("auth_protocol", "sha1")?
//!         .with("auth_password", "authpass123")?
//!         .with("priv_protocol", "aes")?
//!         .with("priv_password", "privpass123")?;
//!     let session: Session = Session::open("192.0.2.1", 161, &options).await?;
//!
//!     let response = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await?;
//!     println!("{:?}", response.varbinds());
//!     Ok(())
//! }
//! ```
//!
//! ## Wire level
//!
//! Every layer is usable on its own:
//!
//! ```
//! use snmp_wire::{Pdu, Version, oid};
//!
//! let pdu = Pdu::get_request(Version::V2c, "public", &[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]);
//! let decoded = Pdu::decode(pdu.to_bytes().unwrap()).unwrap();
//! assert_eq!(decoded, pdu);
//! ```

pub mod ber;
pub mod error;
pub mod format;
pub mod message;
pub mod oid;
pub mod pdu;
pub mod session;
pub mod transport;
pub mod v3;
pub mod value;
pub mod varbind;
pub mod version;

pub(crate) mod util;

pub use error::{
    AuthErrorKind, CryptoErrorKind, DecodeErrorKind, EncodeErrorKind, Error, ErrorStatus,
    OidErrorKind, Result,
};
pub use message::{Message, MessageOptions, SecurityLevel};
pub use oid::Oid;
pub use pdu::{Pdu, PduKind};
pub use session::{Options, Session, SessionConfig};
pub use transport::{Completion, Outcome, Transport, UdpTransport};
pub use v3::{AuthProtocol, PrivProtocol, UsmConfig};
pub use value::Value;
pub use varbind::VarBind;
pub use version::Version;

/// Helpers for integration tests and benches, behind the `testing` feature.
#[cfg(feature = "testing")]
pub mod testing {
    pub use crate::format::hex::{DecodeError as HexDecodeError, decode as decode_hex, encode as encode_hex};
    pub use crate::transport::{MockReply, MockTransport, RecordedRequest};
}
