//! String-keyed session options and their typed resolution.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::format::hex;
use crate::message::{DEFAULT_MSG_MAX_SIZE, MSG_MAX_SIZE_MINIMUM, SecurityLevel};
use crate::transport::TransportSettings;
use crate::v3::{AuthProtocol, PrivProtocol, UsmConfig};
use crate::version::Version;

/// Slack on top of the transport deadline before the session gives up on
/// a completion that never arrives.
pub const COMPLETION_GRACE: Duration = Duration::from_millis(500);

/// Upper bound on a per-attempt `timeout` option.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

const KEYS: &[&str] = &[
    "version",
    "community",
    "username",
    "auth_protocol",
    "auth_password",
    "priv_protocol",
    "priv_password",
    "security_level",
    "context",
    "engine_id",
    "timeout",
    "retries",
    "max_message_size",
];

/// Session options as string key/value pairs.
///
/// ```
/// use snmp_wire::session::Options;
///
/// let mut options = Options::new();
/// options.set("version", "3")?;
/// options.set("username", "admin")?;
/// options.set("auth_protocol", "sha1")?;
/// options.set("auth_password", "maplesyrup")?;
/// options.set("timeout", "1500ms")?;
///
/// let config = options.resolve()?;
/// assert_eq!(config.timeout.as_millis(), 1500);
/// assert!(options.set("colour", "blue").is_err());
/// # Ok::<(), snmp_wire::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Options {
    values: BTreeMap<&'static str, String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one option. Unknown keys are rejected with [`Error::Config`].
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<&mut Self> {
        let normalized = key.trim().to_ascii_lowercase();
        let Some(known) = KEYS.iter().find(|k| **k == normalized) else {
            return Err(Error::Config(format!("unknown option {:?}", key)));
        };
        self.values.insert(known, value.into());
        Ok(self)
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Result<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parse and cross-check every option.
    pub fn resolve(&self) -> Result<SessionConfig> {
        let defaults = SessionConfig::default();

        let version = match self.get("version") {
            Some(raw) => raw.parse()?,
            None => defaults.version,
        };
        let timeout = match self.get("timeout") {
            Some(raw) => parse_timeout(raw)?,
            None => defaults.timeout,
        };
        let retries = match self.get("retries") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid retries {:?}", raw)))?,
            None => defaults.retries,
        };
        let max_message_size = match self.get("max_message_size") {
            Some(raw) => parse_max_message_size(raw)?,
            None => defaults.max_message_size,
        };
        let engine_id = match self.get("engine_id") {
            Some(raw) => Some(parse_engine_id(raw)?),
            None => None,
        };

        let usm = if version == Version::V3 {
            Some(self.resolve_usm()?)
        } else {
            None
        };

        Ok(SessionConfig {
            version,
            community: self
                .get("community")
                .map_or(defaults.community, |c| Bytes::copy_from_slice(c.as_bytes())),
            usm,
            context_name: self
                .get("context")
                .map_or_else(Bytes::new, |c| Bytes::copy_from_slice(c.as_bytes())),
            engine_id,
            timeout,
            retries,
            max_message_size,
        })
    }

    fn resolve_usm(&self) -> Result<UsmConfig> {
        let username = self
            .get("username")
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Config("SNMPv3 requires a username".into()))?;

        let auth = match self.get("auth_protocol") {
            Some(raw) if !is_none(raw) => Some(raw.parse::<AuthProtocol>()?),
            _ => None,
        };
        let privacy = match self.get("priv_protocol") {
            Some(raw) if !is_none(raw) => Some(raw.parse::<PrivProtocol>()?),
            _ => None,
        };
        if privacy.is_some() && auth.is_none() {
            return Err(Error::Config(
                "priv_protocol requires an auth_protocol".into(),
            ));
        }

        let implied = match (auth, privacy) {
            (None, _) => SecurityLevel::NoAuthNoPriv,
            (Some(_), None) => SecurityLevel::AuthNoPriv,
            (Some(_), Some(_)) => SecurityLevel::AuthPriv,
        };
        // every configured protocol needs its password, whatever the level
        let auth_password = auth
            .map(|_| {
                self.get("auth_password")
                    .ok_or_else(|| Error::Config("auth_protocol set without auth_password".into()))
            })
            .transpose()?;
        let priv_password = privacy
            .map(|_| {
                self.get("priv_password")
                    .ok_or_else(|| Error::Config("priv_protocol set without priv_password".into()))
            })
            .transpose()?;

        let level = match self.get("security_level") {
            Some(raw) => raw.parse::<SecurityLevel>()?,
            None => implied,
        };
        if level < implied {
            tracing::warn!(target: "snmp_wire::session", {
                snmp.security_level = %level,
                configured = %implied,
            }, "security_level below configured protocols, leaving the extra protocols unused");
        }

        let mut usm = UsmConfig::new(Bytes::copy_from_slice(username.as_bytes()));
        if level.requires_auth() {
            match (auth, auth_password) {
                (Some(protocol), Some(password)) => usm = usm.auth(protocol, password)?,
                _ => return Err(Error::Config(format!("{} requires an auth_protocol", level))),
            }
        }
        if level.requires_priv() {
            match (privacy, priv_password) {
                (Some(protocol), Some(password)) => usm = usm.privacy(protocol, password)?,
                _ => return Err(Error::Config(format!("{} requires a priv_protocol", level))),
            }
        }
        Ok(usm)
    }
}

fn is_none(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("none")
}

/// `5`, `1.5`, `2s` or `500ms`. Zero and anything above [`MAX_TIMEOUT`]
/// are rejected.
fn parse_timeout(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    let parsed = match trimmed.strip_suffix("ms") {
        Some(millis) => millis.trim().parse::<u64>().ok().map(Duration::from_millis),
        None => trimmed
            .strip_suffix('s')
            .unwrap_or(trimmed)
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
    };
    match parsed {
        Some(timeout) if timeout > MAX_TIMEOUT => Err(Error::Config(format!(
            "timeout {:?} exceeds {}s",
            raw,
            MAX_TIMEOUT.as_secs()
        ))),
        Some(timeout) if !timeout.is_zero() => Ok(timeout),
        _ => Err(Error::Config(format!("invalid timeout {:?}", raw))),
    }
}

fn parse_max_message_size(raw: &str) -> Result<usize> {
    let size: usize = raw
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid max_message_size {:?}", raw)))?;
    if size < MSG_MAX_SIZE_MINIMUM as usize || size > DEFAULT_MSG_MAX_SIZE as usize {
        return Err(Error::Config(format!(
            "max_message_size {} outside {}..={}",
            size, MSG_MAX_SIZE_MINIMUM, DEFAULT_MSG_MAX_SIZE
        )));
    }
    Ok(size)
}

fn parse_engine_id(raw: &str) -> Result<Bytes> {
    let digits = raw.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    match hex::decode(digits) {
        Ok(engine_id) if !engine_id.is_empty() => Ok(Bytes::from(engine_id)),
        Ok(_) => Err(Error::Config("engine_id must not be empty".into())),
        Err(e) => Err(Error::Config(format!("invalid engine_id {:?}: {}", raw, e))),
    }
}

/// Typed session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// SNMP version (default: V2c)
    pub version: Version,
    /// Community string for v1/v2c (default: "public")
    pub community: Bytes,
    /// USM user for v3; its protocols fix the security level.
    pub usm: Option<UsmConfig>,
    /// contextName for v3 scoped PDUs (default: empty)
    pub context_name: Bytes,
    /// Known authoritative engine id; skips discovery when set.
    pub engine_id: Option<Bytes>,
    /// Wait per attempt (default: 5 seconds)
    pub timeout: Duration,
    /// Retransmissions after the first attempt (default: 1)
    pub retries: u32,
    /// Receive buffer and advertised msgMaxSize (default: 65507)
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: Version::V2c,
            community: Bytes::from_static(b"public"),
            usm: None,
            context_name: Bytes::new(),
            engine_id: None,
            timeout: Duration::from_secs(5),
            retries: 1,
            max_message_size: DEFAULT_MSG_MAX_SIZE as usize,
        }
    }
}

impl SessionConfig {
    /// v2c with the given community and default timing.
    pub fn v2c(community: impl Into<Bytes>) -> Self {
        Self {
            community: community.into(),
            ..Self::default()
        }
    }

    /// v3 for the given user and default timing.
    pub fn v3(usm: UsmConfig) -> Self {
        Self {
            version: Version::V3,
            community: Bytes::new(),
            usm: Some(usm),
            ..Self::default()
        }
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            timeout: self.timeout,
            retries: self.retries,
            max_message_size: self.max_message_size,
        }
    }

    /// Longest a session waits for one completion.
    pub fn wait_budget(&self) -> Duration {
        self.transport_settings()
            .deadline()
            .saturating_add(COMPLETION_GRACE)
    }

    /// Security level of v3 requests; `NoAuthNoPriv` for v1/v2c.
    pub fn security_level(&self) -> SecurityLevel {
        self.usm.as_ref().map_or(SecurityLevel::NoAuthNoPriv, UsmConfig::level)
    }
}
