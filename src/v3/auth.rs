//! Key derivation and HMAC authentication (RFC 3414 Section 6, Appendix A.2).
//!
//! Outgoing messages are encoded with twelve zero bytes in
//! msgAuthenticationParameters; the MAC is computed over the whole message
//! and patched into that slot. Verification reverses the process on a copy.

use digest::{Digest, KeyInit, Mac};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{AuthProtocol, MAC_LEN};
use crate::error::{AuthErrorKind, Error, Result};

/// Bytes of repeated password hashed by [`password_to_key`].
const EXPANSION_SIZE: usize = 1_048_576;

/// Authentication key bound to one authoritative engine.
///
/// Key material is zeroed when the key is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LocalizedKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: AuthProtocol,
}

impl LocalizedKey {
    /// Derive `H(Ku || engine_id || Ku)` where `Ku = password_to_key(password)`.
    pub fn from_password(protocol: AuthProtocol, password: &[u8], engine_id: &[u8]) -> Result<Self> {
        let mut master = password_to_key(protocol, password)?;
        let key = localize_key(protocol, &master, engine_id);
        master.zeroize();
        Ok(Self { key, protocol })
    }

    /// Wrap an already localized key.
    pub fn from_bytes(protocol: AuthProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            protocol,
        }
    }

    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// HMAC over `data`, truncated to 96 bits.
    pub fn compute_hmac(&self, data: &[u8]) -> Result<[u8; MAC_LEN]> {
        match self.protocol {
            AuthProtocol::Md5 => hmac_96::<hmac::Hmac<md5::Md5>>(&self.key, data),
            AuthProtocol::Sha1 => hmac_96::<hmac::Hmac<sha1::Sha1>>(&self.key, data),
        }
    }

    /// Compare a received MAC against the one computed over `data`.
    ///
    /// The comparison runs in constant time.
    pub fn verify_hmac(&self, data: &[u8], received: &[u8]) -> Result<()> {
        if received.len() != MAC_LEN {
            return Err(Error::auth(AuthErrorKind::WrongMacLength {
                expected: MAC_LEN,
                actual: received.len(),
            }));
        }
        let computed = self.compute_hmac(data)?;
        if bool::from(computed[..].ct_eq(received)) {
            Ok(())
        } else {
            Err(Error::auth(AuthErrorKind::HmacMismatch))
        }
    }
}

impl std::fmt::Debug for LocalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizedKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn hmac_96<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<[u8; MAC_LEN]> {
    let mut mac = <M as KeyInit>::new_from_slice(key)
        .map_err(|_| Error::auth(AuthErrorKind::NoAuthKey))?;
    Mac::update(&mut mac, data);
    let full = mac.finalize().into_bytes();
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&full[..MAC_LEN]);
    Ok(out)
}

/// Password to key transformation (RFC 3414 A.2.1).
///
/// The password is repeated to fill 1 MiB, fed to the digest in 64-byte
/// chunks. The result is the master key `Ku`.
pub fn password_to_key(protocol: AuthProtocol, password: &[u8]) -> Result<Vec<u8>> {
    if password.is_empty() {
        return Err(Error::Config("USM password must not be empty".into()));
    }
    Ok(match protocol {
        AuthProtocol::Md5 => expand::<md5::Md5>(password),
        AuthProtocol::Sha1 => expand::<sha1::Sha1>(password),
    })
}

fn expand<D: Digest>(password: &[u8]) -> Vec<u8> {
    let mut hasher = D::new();
    let mut chunk = [0u8; 64];
    let mut index = 0;
    for _ in 0..EXPANSION_SIZE / chunk.len() {
        for byte in &mut chunk {
            *byte = password[index];
            index = (index + 1) % password.len();
        }
        hasher.update(chunk);
    }
    chunk.zeroize();
    hasher.finalize().to_vec()
}

/// Key localization (RFC 3414 A.2.2): `H(Ku || engine_id || Ku)`.
pub fn localize_key(protocol: AuthProtocol, master_key: &[u8], engine_id: &[u8]) -> Vec<u8> {
    fn localize<D: Digest>(master_key: &[u8], engine_id: &[u8]) -> Vec<u8> {
        let mut hasher = D::new();
        hasher.update(master_key);
        hasher.update(engine_id);
        hasher.update(master_key);
        hasher.finalize().to_vec()
    }
    match protocol {
        AuthProtocol::Md5 => localize::<md5::Md5>(master_key, engine_id),
        AuthProtocol::Sha1 => localize::<sha1::Sha1>(master_key, engine_id),
    }
}

/// Compute the MAC over `message` and write it into `message[offset..offset + 12]`.
///
/// The slot must hold the zero placeholder when this is called.
pub fn authenticate_message(key: &LocalizedKey, message: &mut [u8], offset: usize) -> Result<()> {
    let end = offset
        .checked_add(MAC_LEN)
        .filter(|&end| end <= message.len())
        .ok_or_else(|| Error::auth(AuthErrorKind::AuthParamsNotFound))?;
    let mac = key.compute_hmac(message)?;
    message[offset..end].copy_from_slice(&mac);
    Ok(())
}

/// Verify the MAC of an incoming message whose auth params span
/// `offset..offset + len`.
pub fn verify_message(key: &LocalizedKey, message: &[u8], offset: usize, len: usize) -> Result<()> {
    if len != MAC_LEN {
        tracing::debug!(target: "snmp_wire::v3", { expected = MAC_LEN, actual = len }, "wrong auth params length");
        return Err(Error::auth(AuthErrorKind::WrongMacLength {
            expected: MAC_LEN,
            actual: len,
        }));
    }
    let Some(received) = message.get(offset..offset + len) else {
        return Err(Error::auth(AuthErrorKind::AuthParamsNotFound));
    };
    let mut zeroed = message.to_vec();
    zeroed[offset..offset + len].fill(0);
    key.verify_hmac(&zeroed, received).inspect_err(|e| {
        tracing::debug!(target: "snmp_wire::v3", { protocol = %key.protocol() }, "{}", e);
    })
}
