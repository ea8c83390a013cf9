//! SNMPv3 User-based Security Model (RFC 3414, RFC 3826).
//!
//! - [`auth`]: password-to-key derivation, key localization and HMAC-96
//! - [`PrivKey`]: DES-CBC and AES-128-CFB privacy
//! - [`UsmSecurityParams`]: the msgSecurityParameters SEQUENCE
//! - [`EngineState`]: authoritative engine id, boots and time tracking
//!
//! The types here are pure: nothing touches the network, and a [`UsmKeys`]
//! bundle can be shared between sessions talking to the same engine.

pub mod auth;
mod engine;
mod privacy;
mod usm;

use bytes::Bytes;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::message::SecurityLevel;

pub use auth::LocalizedKey;
pub use engine::{
    EngineState, MAX_ENGINE_TIME, UsmReport, report_kind, usm_stats,
};
pub use privacy::{PrivKey, SaltCounter};
pub use usm::UsmSecurityParams;

/// Length of the truncated HMAC carried in msgAuthenticationParameters.
pub const MAC_LEN: usize = 12;

/// Length of msgPrivacyParameters for both DES and AES.
pub const PRIV_PARAMS_LEN: usize = 8;

/// Authentication protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthProtocol {
    /// HMAC-MD5-96 (RFC 3414)
    Md5,
    /// HMAC-SHA-96 (RFC 3414)
    Sha1,
}

impl std::fmt::Display for AuthProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha1 => write!(f, "SHA"),
        }
    }
}

impl std::str::FromStr for AuthProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Ok(Self::Md5),
            "SHA" | "SHA1" | "SHA-1" => Ok(Self::Sha1),
            _ => Err(Error::unsupported(s)),
        }
    }
}

impl AuthProtocol {
    /// Digest output length, which is also the localized key length.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
        }
    }

    /// Length of the truncated MAC placed on the wire.
    pub fn mac_len(self) -> usize {
        MAC_LEN
    }
}

/// Privacy protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivProtocol {
    /// CBC-DES (RFC 3414 Section 8)
    Des,
    /// CFB128-AES-128 (RFC 3826)
    Aes128,
}

impl std::fmt::Display for PrivProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Des => write!(f, "DES"),
            Self::Aes128 => write!(f, "AES"),
        }
    }
}

impl std::str::FromStr for PrivProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DES" => Ok(Self::Des),
            "AES" | "AES128" | "AES-128" => Ok(Self::Aes128),
            _ => Err(Error::unsupported(s)),
        }
    }
}

impl PrivProtocol {
    /// Bytes of localized key material the cipher consumes.
    ///
    /// DES takes 16: an 8-byte key followed by the 8-byte pre-IV.
    pub fn key_len(self) -> usize {
        16
    }

    /// Cipher block size; ciphertext length must be a multiple of it.
    pub fn block_size(self) -> usize {
        match self {
            Self::Des => 8,
            Self::Aes128 => 1,
        }
    }
}

/// USM credentials for one user, before localization to an engine.
///
/// Passwords are held in zeroizing buffers and only turned into key
/// material once an authoritative engine id is known.
#[derive(Clone)]
pub struct UsmConfig {
    pub username: Bytes,
    auth: Option<(AuthProtocol, Zeroizing<Vec<u8>>)>,
    privacy: Option<(PrivProtocol, Zeroizing<Vec<u8>>)>,
}

impl UsmConfig {
    /// A noAuthNoPriv user.
    pub fn new(username: impl Into<Bytes>) -> Self {
        Self {
            username: username.into(),
            auth: None,
            privacy: None,
        }
    }

    /// Add authentication. An empty password is rejected.
    pub fn auth(mut self, protocol: AuthProtocol, password: impl AsRef<[u8]>) -> Result<Self> {
        let password = password.as_ref();
        if password.is_empty() {
            return Err(Error::Config("auth_password must not be empty".into()));
        }
        self.auth = Some((protocol, Zeroizing::new(password.to_vec())));
        Ok(self)
    }

    /// Add privacy. An empty password is rejected.
    pub fn privacy(mut self, protocol: PrivProtocol, password: impl AsRef<[u8]>) -> Result<Self> {
        let password = password.as_ref();
        if password.is_empty() {
            return Err(Error::Config("priv_password must not be empty".into()));
        }
        self.privacy = Some((protocol, Zeroizing::new(password.to_vec())));
        Ok(self)
    }

    pub fn auth_protocol(&self) -> Option<AuthProtocol> {
        self.auth.as_ref().map(|(p, _)| *p)
    }

    pub fn priv_protocol(&self) -> Option<PrivProtocol> {
        self.privacy.as_ref().map(|(p, _)| *p)
    }

    /// Security level implied by the configured protocols.
    pub fn level(&self) -> SecurityLevel {
        match (&self.auth, &self.privacy) {
            (None, _) => SecurityLevel::NoAuthNoPriv,
            (Some(_), None) => SecurityLevel::AuthNoPriv,
            (Some(_), Some(_)) => SecurityLevel::AuthPriv,
        }
    }

    /// Check that the protocol combination is usable.
    pub fn validate(&self) -> Result<()> {
        if self.privacy.is_some() && self.auth.is_none() {
            return Err(Error::Config(
                "privacy requires an authentication protocol".into(),
            ));
        }
        Ok(())
    }

    /// Derive the localized keys for `engine_id`.
    ///
    /// This runs the 1 MiB password expansion once per configured protocol.
    pub fn localize(&self, engine_id: &[u8]) -> Result<UsmKeys> {
        self.validate()?;
        let auth = match &self.auth {
            Some((protocol, password)) => {
                Some(LocalizedKey::from_password(*protocol, password, engine_id)?)
            }
            None => None,
        };
        let privacy = match (&self.privacy, &self.auth) {
            (Some((priv_protocol, password)), Some((auth_protocol, _))) => Some(
                PrivKey::from_password(*auth_protocol, *priv_protocol, password, engine_id)?,
            ),
            _ => None,
        };
        tracing::debug!(target: "snmp_wire::v3", {
            snmp.engine_id = %crate::format::hex::Bytes(engine_id),
            level = ?self.level(),
        }, "localized USM keys");
        Ok(UsmKeys {
            username: self.username.clone(),
            auth,
            privacy,
        })
    }
}

impl std::fmt::Debug for UsmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsmConfig")
            .field("username", &String::from_utf8_lossy(&self.username))
            .field("auth", &self.auth_protocol())
            .field("privacy", &self.priv_protocol())
            .finish()
    }
}

/// Keys localized to one authoritative engine.
#[derive(Debug)]
pub struct UsmKeys {
    pub username: Bytes,
    pub auth: Option<LocalizedKey>,
    pub privacy: Option<PrivKey>,
}

impl UsmKeys {
    /// Keys for a noAuthNoPriv user.
    pub fn none(username: impl Into<Bytes>) -> Self {
        Self {
            username: username.into(),
            auth: None,
            privacy: None,
        }
    }

    /// Whether these keys can secure a message at `level`.
    pub fn supports(&self, level: SecurityLevel) -> bool {
        (!level.requires_auth() || self.auth.is_some())
            && (!level.requires_priv() || self.privacy.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_names() {
        assert_eq!("md5".parse::<AuthProtocol>().unwrap(), AuthProtocol::Md5);
        assert_eq!("SHA-1".parse::<AuthProtocol>().unwrap(), AuthProtocol::Sha1);
        assert_eq!("sha".parse::<AuthProtocol>().unwrap(), AuthProtocol::Sha1);
        assert_eq!("des".parse::<PrivProtocol>().unwrap(), PrivProtocol::Des);
        assert_eq!("aes128".parse::<PrivProtocol>().unwrap(), PrivProtocol::Aes128);
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        assert!(matches!(
            "sha512".parse::<AuthProtocol>(),
            Err(Error::UnsupportedProtocol { name }) if &*name == "sha512"
        ));
        assert!(matches!(
            "3des".parse::<PrivProtocol>(),
            Err(Error::UnsupportedProtocol { .. })
        ));
    }

    #[test]
    fn test_config_level() {
        let user = UsmConfig::new("u");
        assert_eq!(user.level(), SecurityLevel::NoAuthNoPriv);
        let user = user.auth(AuthProtocol::Md5, "maplesyrup").unwrap();
        assert_eq!(user.level(), SecurityLevel::AuthNoPriv);
        let user = user.privacy(PrivProtocol::Des, "maplesyrup").unwrap();
        assert_eq!(user.level(), SecurityLevel::AuthPriv);
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(matches!(
            UsmConfig::new("u").auth(AuthProtocol::Sha1, ""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_privacy_without_auth_rejected() {
        let user = UsmConfig::new("u")
            .privacy(PrivProtocol::Aes128, "secret12")
            .unwrap();
        assert!(matches!(user.localize(b"engine"), Err(Error::Config(_))));
    }

    #[test]
    fn test_localized_keys_support_level() {
        let keys = UsmConfig::new("u")
            .auth(AuthProtocol::Sha1, "maplesyrup")
            .unwrap()
            .localize(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2])
            .unwrap();
        assert!(keys.supports(SecurityLevel::AuthNoPriv));
        assert!(!keys.supports(SecurityLevel::AuthPriv));
    }
}
