//! Privacy protocols (RFC 3414 Section 8, RFC 3826).
//!
//! ## DES-CBC
//! - privParameters (salt): engineBoots (4 bytes) || counter (4 bytes)
//! - IV: pre-IV XOR salt, where the pre-IV is bytes 8..16 of the privacy key
//! - plaintext is zero-padded to the 8-byte block size
//!
//! ## AES-128-CFB
//! - privParameters (salt): 64-bit counter
//! - IV: engineBoots (4) || engineTime (4) || salt (8), concatenated
//! - no padding

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{AuthProtocol, PRIV_PARAMS_LEN, PrivProtocol};
use crate::error::{CryptoErrorKind, Error, Result};

/// Monotonic salt source shared by every encryption under one key.
///
/// Seeded from the OS RNG so restarts do not replay IVs; zero is skipped.
pub struct SaltCounter(AtomicU64);

impl SaltCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(seed()))
    }

    /// Start from a fixed value.
    pub fn from_value(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Next salt; never zero.
    pub fn next(&self) -> u64 {
        let val = self.0.fetch_add(1, Ordering::Relaxed);
        if val == 0 {
            self.0.fetch_add(1, Ordering::Relaxed)
        } else {
            val
        }
    }
}

impl Default for SaltCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SaltCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SaltCounter")
    }
}

fn seed() -> u64 {
    let mut buf = [0u8; 8];
    match getrandom::fill(&mut buf) {
        Ok(()) => u64::from_ne_bytes(buf).max(1),
        Err(e) => {
            tracing::warn!(target: "snmp_wire::v3", error = %e, "OS RNG unavailable, seeding salt from clock");
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(1)
                .max(1)
        }
    }
}

/// Privacy key localized to one engine, with its salt counter.
///
/// Key material is zeroed on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: PrivProtocol,
    #[zeroize(skip)]
    salt: SaltCounter,
}

impl PrivKey {
    /// Derive with the same algorithm as the authentication key, using the
    /// authentication protocol's digest.
    pub fn from_password(
        auth_protocol: AuthProtocol,
        priv_protocol: PrivProtocol,
        password: &[u8],
        engine_id: &[u8],
    ) -> Result<Self> {
        let mut master = super::auth::password_to_key(auth_protocol, password)?;
        let key = super::auth::localize_key(auth_protocol, &master, engine_id);
        master.zeroize();
        Self::from_bytes(priv_protocol, key)
    }

    /// Wrap localized key bytes. At least 16 bytes are required.
    pub fn from_bytes(protocol: PrivProtocol, key: impl Into<Vec<u8>>) -> Result<Self> {
        let key = key.into();
        if key.len() < protocol.key_len() {
            return Err(Error::Config(format!(
                "{} privacy needs {} bytes of key material, got {}",
                protocol,
                protocol.key_len(),
                key.len()
            )));
        }
        Ok(Self {
            key,
            protocol,
            salt: SaltCounter::new(),
        })
    }

    /// Replace the salt counter, e.g. to make ciphertext reproducible.
    pub fn with_salt(mut self, salt: SaltCounter) -> Self {
        self.salt = salt;
        self
    }

    pub fn protocol(&self) -> PrivProtocol {
        self.protocol
    }

    /// Encrypt a serialized scoped PDU, returning `(ciphertext, privParameters)`.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
    ) -> Result<(Bytes, Bytes)> {
        let salt = self.salt.next();
        match self.protocol {
            PrivProtocol::Des => self.encrypt_des(plaintext, engine_boots, salt),
            PrivProtocol::Aes128 => self.encrypt_aes(plaintext, engine_boots, engine_time, salt),
        }
    }

    /// Decrypt an encryptedPDU using the privParameters of its message.
    ///
    /// DES output keeps its zero padding; the scoped PDU is self-delimiting.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        priv_params: &[u8],
    ) -> Result<Bytes> {
        let Ok(salt) = <[u8; PRIV_PARAMS_LEN]>::try_from(priv_params) else {
            tracing::debug!(target: "snmp_wire::v3", { actual = priv_params.len() }, "bad privParameters length");
            return Err(Error::decrypt(CryptoErrorKind::InvalidPrivParamsLength {
                expected: PRIV_PARAMS_LEN,
                actual: priv_params.len(),
            }));
        };
        match self.protocol {
            PrivProtocol::Des => self.decrypt_des(ciphertext, &salt),
            PrivProtocol::Aes128 => self.decrypt_aes(ciphertext, engine_boots, engine_time, &salt),
        }
    }

    fn des_iv(&self, salt: &[u8; 8]) -> [u8; 8] {
        let mut iv = [0u8; 8];
        for (i, b) in iv.iter_mut().enumerate() {
            *b = self.key[8 + i] ^ salt[i];
        }
        iv
    }

    fn encrypt_des(&self, plaintext: &[u8], engine_boots: u32, salt: u64) -> Result<(Bytes, Bytes)> {
        use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
        type DesCbc = cbc::Encryptor<des::Des>;

        let mut salt_bytes = [0u8; 8];
        salt_bytes[..4].copy_from_slice(&engine_boots.to_be_bytes());
        salt_bytes[4..].copy_from_slice(&(salt as u32).to_be_bytes());
        let iv = self.des_iv(&salt_bytes);

        let padded_len = plaintext.len().div_ceil(8) * 8;
        let mut buffer = vec![0u8; padded_len];
        buffer[..plaintext.len()].copy_from_slice(plaintext);

        let cipher = DesCbc::new_from_slices(&self.key[..8], &iv)
            .map_err(|_| Error::encrypt(CryptoErrorKind::InvalidKeyLength))?;
        cipher
            .encrypt_padded_mut::<NoPadding>(&mut buffer, padded_len)
            .map_err(|_| Error::encrypt(CryptoErrorKind::CipherError))?;

        Ok((Bytes::from(buffer), Bytes::copy_from_slice(&salt_bytes)))
    }

    fn decrypt_des(&self, ciphertext: &[u8], salt: &[u8; 8]) -> Result<Bytes> {
        use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
        type DesCbc = cbc::Decryptor<des::Des>;

        if ciphertext.is_empty() || !ciphertext.len().is_multiple_of(8) {
            tracing::debug!(target: "snmp_wire::v3", { length = ciphertext.len() }, "DES ciphertext not block aligned");
            return Err(Error::decrypt(CryptoErrorKind::InvalidCiphertextLength {
                length: ciphertext.len(),
                block_size: 8,
            }));
        }
        let iv = self.des_iv(salt);
        let cipher = DesCbc::new_from_slices(&self.key[..8], &iv)
            .map_err(|_| Error::decrypt(CryptoErrorKind::InvalidKeyLength))?;

        let mut buffer = ciphertext.to_vec();
        let len = cipher
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(|_| Error::decrypt(CryptoErrorKind::CipherError))?
            .len();
        buffer.truncate(len);
        Ok(Bytes::from(buffer))
    }

    fn aes_iv(engine_boots: u32, engine_time: u32, salt: &[u8; 8]) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
        iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
        iv[8..].copy_from_slice(salt);
        iv
    }

    fn encrypt_aes(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salt: u64,
    ) -> Result<(Bytes, Bytes)> {
        use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
        type Aes128Cfb = cfb_mode::Encryptor<aes::Aes128>;

        let salt_bytes = salt.to_be_bytes();
        let iv = Self::aes_iv(engine_boots, engine_time, &salt_bytes);
        let cipher = Aes128Cfb::new_from_slices(&self.key[..16], &iv)
            .map_err(|_| Error::encrypt(CryptoErrorKind::InvalidKeyLength))?;

        let mut buffer = plaintext.to_vec();
        cipher.encrypt(&mut buffer);
        Ok((Bytes::from(buffer), Bytes::copy_from_slice(&salt_bytes)))
    }

    fn decrypt_aes(
        &self,
        ciphertext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salt: &[u8; 8],
    ) -> Result<Bytes> {
        use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
        type Aes128Cfb = cfb_mode::Decryptor<aes::Aes128>;

        let iv = Self::aes_iv(engine_boots, engine_time, salt);
        let cipher = Aes128Cfb::new_from_slices(&self.key[..16], &iv)
            .map_err(|_| Error::decrypt(CryptoErrorKind::InvalidKeyLength))?;

        let mut buffer = ciphertext.to_vec();
        cipher.decrypt(&mut buffer);
        Ok(Bytes::from(buffer))
    }
}

impl std::fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn des_key() -> PrivKey {
        let key: Vec<u8> = (1..=16).collect();
        PrivKey::from_bytes(PrivProtocol::Des, key).unwrap()
    }

    #[test]
    fn test_des_roundtrip_pads_to_block() {
        let key = des_key();
        let plaintext = b"Hello, SNMPv3 World!";
        let (ciphertext, salt) = key.encrypt(plaintext, 100, 12345).unwrap();

        assert_eq!(ciphertext.len(), 24);
        assert_eq!(salt.len(), 8);
        assert_eq!(&salt[..4], &100u32.to_be_bytes());

        let decrypted = key.decrypt(&ciphertext, 100, 12345, &salt).unwrap();
        assert_eq!(&decrypted[..plaintext.len()], plaintext);
        assert!(decrypted[plaintext.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_des_aligned_input_not_extended() {
        let key = des_key();
        let (ciphertext, _) = key.encrypt(&[7u8; 16], 1, 1).unwrap();
        assert_eq!(ciphertext.len(), 16);
    }

    #[test]
    fn test_des_rejects_unaligned_ciphertext() {
        let key = des_key();
        assert!(matches!(
            key.decrypt(&[0u8; 13], 0, 0, &[0u8; 8]),
            Err(Error::DecryptionFailed {
                kind: CryptoErrorKind::InvalidCiphertextLength { length: 13, block_size: 8 }
            })
        ));
    }

    #[test]
    fn test_rejects_short_priv_params() {
        let key = des_key();
        assert!(matches!(
            key.decrypt(&[0u8; 16], 0, 0, &[0u8; 4]),
            Err(Error::DecryptionFailed {
                kind: CryptoErrorKind::InvalidPrivParamsLength { expected: 8, actual: 4 }
            })
        ));
    }

    #[test]
    fn test_aes_roundtrip_no_padding() {
        let key = PrivKey::from_bytes(PrivProtocol::Aes128, vec![0x5A; 16]).unwrap();
        let plaintext = b"Hello, SNMPv3 AES World!";
        let (ciphertext, salt) = key.encrypt(plaintext, 200, 54321).unwrap();

        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(&ciphertext[..], plaintext);
        let decrypted = key.decrypt(&ciphertext, 200, 54321, &salt).unwrap();
        assert_eq!(&decrypted[..], plaintext);

        // wrong engine time gives a different IV
        let garbled = key.decrypt(&ciphertext, 200, 54322, &salt).unwrap();
        assert_ne!(&garbled[..], plaintext);
    }

    #[test]
    fn test_salt_advances() {
        let key = des_key().with_salt(SaltCounter::from_value(u64::MAX));
        let (_, first) = key.encrypt(b"x", 0, 0).unwrap();
        let (_, second) = key.encrypt(b"x", 0, 0).unwrap();
        assert_ne!(first, second);
        // zero is skipped on wraparound
        assert_eq!(&second[4..], &1u32.to_be_bytes());
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(matches!(
            PrivKey::from_bytes(PrivProtocol::Aes128, vec![0; 8]),
            Err(Error::Config(_))
        ));
    }
}
