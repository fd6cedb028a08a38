//! Message encryption for Web Push (RFC 8291, `aes128gcm` content coding)
//!
//! Every call generates its own ephemeral key pair and salt, derives a
//! content-encryption key and nonce from the ECDH secret and the subscriber's
//! auth secret, and emits a single `aes128gcm` record:
//!
//! ```text
//! salt(16) || record_size(4, BE) || idlen(1) || keyid(65) || ciphertext+tag
//! ```

use super::error::{PushError, Result};
use super::keys::{
    decode_base64url, decode_public_key, decode_public_key_bytes, encode_public_key,
    UncompressedPoint, UNCOMPRESSED_POINT_LEN,
};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use hkdf::Hkdf;
use p256::ecdh::diffie_hellman;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

pub const SALT_LEN: usize = 16;
pub const AUTH_SECRET_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
/// salt + record size + key id length + key id
pub const HEADER_LEN: usize = SALT_LEN + 4 + 1 + UNCOMPRESSED_POINT_LEN;

const KEY_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const IKM_LEN: usize = 32;

const WEBPUSH_INFO: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

/// Marks the end of the plaintext in the last (and only) record
const PADDING_DELIMITER: u8 = 0x02;

/// An encrypted `aes128gcm` body ready to POST to a push service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub salt: [u8; SALT_LEN],
    /// Length of `ciphertext` (AES-GCM output including the tag)
    pub record_size: u32,
    /// The ephemeral public key used for this message
    pub key_id: UncompressedPoint,
    /// AES-GCM ciphertext followed by the 16-byte tag
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Serialize to wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        body.extend_from_slice(&self.salt);
        body.extend_from_slice(&self.record_size.to_be_bytes());
        body.push(UNCOMPRESSED_POINT_LEN as u8);
        body.extend_from_slice(self.key_id.as_bytes());
        body.extend_from_slice(&self.ciphertext);
        body
    }

    /// Parse wire bytes, checking the header against the body length
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN + TAG_LEN {
            return Err(PushError::Encryption(format!(
                "payload too short: {} bytes",
                bytes.len()
            )));
        }

        let (salt, rest) = bytes.split_at(SALT_LEN);
        let (record_size, rest) = rest.split_at(4);
        let (id_len, rest) = rest.split_at(1);
        if id_len[0] as usize != UNCOMPRESSED_POINT_LEN {
            return Err(PushError::Encryption(format!(
                "unexpected key id length {}",
                id_len[0]
            )));
        }
        let (key_id, ciphertext) = rest.split_at(UNCOMPRESSED_POINT_LEN);

        let mut salt_bytes = [0u8; SALT_LEN];
        salt_bytes.copy_from_slice(salt);
        let record_size = u32::from_be_bytes([
            record_size[0],
            record_size[1],
            record_size[2],
            record_size[3],
        ]);
        if record_size as usize != ciphertext.len() {
            return Err(PushError::Encryption(format!(
                "record size {} does not match ciphertext length {}",
                record_size,
                ciphertext.len()
            )));
        }

        Ok(Self {
            salt: salt_bytes,
            record_size,
            key_id: UncompressedPoint::try_from(key_id)?,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Total wire length
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.ciphertext.len()
    }
}

/// Encrypt `plaintext` for one subscriber.
///
/// `subscriber_public_key` and `auth_secret` are the base64url `p256dh` and
/// `auth` values of the subscription. The plaintext is followed by the `0x02`
/// delimiter and zero-padded up to `padding_target` bytes.
pub fn encrypt(
    plaintext: &[u8],
    subscriber_public_key: &str,
    auth_secret: &str,
    padding_target: usize,
) -> Result<EncryptedPayload> {
    let ua_public = decode_public_key(subscriber_public_key)?;
    let auth = decode_auth_secret(auth_secret)?;

    let ephemeral = SecretKey::random(&mut OsRng);
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| PushError::Encryption(format!("salt generation failed: {}", e)))?;

    encrypt_with(plaintext, &ua_public, &auth, padding_target, &ephemeral, salt)
}

/// Deterministic core of [`encrypt`] with caller-supplied ephemeral key and salt
pub fn encrypt_with(
    plaintext: &[u8],
    ua_public: &PublicKey,
    auth_secret: &[u8; AUTH_SECRET_LEN],
    padding_target: usize,
    ephemeral: &SecretKey,
    salt: [u8; SALT_LEN],
) -> Result<EncryptedPayload> {
    let as_public = encode_public_key(&ephemeral.public_key());
    let ua_point = encode_public_key(ua_public);

    let shared = diffie_hellman(ephemeral.to_nonzero_scalar(), ua_public.as_affine());
    let (cek, nonce) = derive_key_and_nonce(
        shared.raw_secret_bytes().as_slice(),
        auth_secret,
        &ua_point,
        &as_public,
        &salt,
    )?;

    let record = pad_record(plaintext, padding_target);
    let cipher = Aes128Gcm::new_from_slice(cek.as_slice())
        .map_err(|_| PushError::Encryption("invalid content-encryption key".to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce.as_slice()), record.as_slice())
        .map_err(|_| PushError::Encryption("AES-GCM encryption failed".to_string()))?;

    let record_size = u32::try_from(ciphertext.len()).map_err(|_| {
        PushError::Encryption(format!("record of {} bytes is too large", ciphertext.len()))
    })?;

    Ok(EncryptedPayload {
        salt,
        record_size,
        key_id: as_public,
        ciphertext,
    })
}

/// Receiver side: decrypt a payload with the subscriber's private key.
///
/// Returns the plaintext with the delimiter and padding removed.
pub fn decrypt(
    payload: &EncryptedPayload,
    ua_secret: &SecretKey,
    auth_secret: &[u8; AUTH_SECRET_LEN],
) -> Result<Vec<u8>> {
    let as_public = decode_public_key_bytes(payload.key_id.as_bytes())?;
    let ua_point = encode_public_key(&ua_secret.public_key());

    let shared = diffie_hellman(ua_secret.to_nonzero_scalar(), as_public.as_affine());
    let (cek, nonce) = derive_key_and_nonce(
        shared.raw_secret_bytes().as_slice(),
        auth_secret,
        &ua_point,
        &payload.key_id,
        &payload.salt,
    )?;

    let cipher = Aes128Gcm::new_from_slice(cek.as_slice())
        .map_err(|_| PushError::Encryption("invalid content-encryption key".to_string()))?;
    let record = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(nonce.as_slice()), payload.ciphertext.as_slice())
            .map_err(|_| PushError::Encryption("AES-GCM authentication failed".to_string()))?,
    );

    unpad_record(&record)
}

/// Decode the subscription's `auth` value into its 16 raw bytes
pub fn decode_auth_secret(encoded: &str) -> Result<[u8; AUTH_SECRET_LEN]> {
    let bytes = Zeroizing::new(decode_base64url(encoded)?);
    bytes.as_slice().try_into().map_err(|_| {
        PushError::MalformedKey(format!(
            "auth secret must be {} bytes, got {}",
            AUTH_SECRET_LEN,
            bytes.len()
        ))
    })
}

/// HKDF chain of RFC 8291 §3.4 and RFC 8188 §2.2.
///
/// `Hkdf::new` is HKDF-Extract and a single-block `expand` is
/// `HMAC-SHA-256(PRK, info || 0x01)` truncated to the output length.
fn derive_key_and_nonce(
    ecdh_secret: &[u8],
    auth_secret: &[u8; AUTH_SECRET_LEN],
    ua_public: &UncompressedPoint,
    as_public: &UncompressedPoint,
    salt: &[u8; SALT_LEN],
) -> Result<(Zeroizing<[u8; KEY_LEN]>, Zeroizing<[u8; NONCE_LEN]>)> {
    let mut key_info = Vec::with_capacity(WEBPUSH_INFO.len() + 2 * UNCOMPRESSED_POINT_LEN);
    key_info.extend_from_slice(WEBPUSH_INFO);
    key_info.extend_from_slice(ua_public.as_bytes());
    key_info.extend_from_slice(as_public.as_bytes());

    // PRK_key = HMAC(auth_secret, ecdh_secret); IKM = HMAC(PRK_key, key_info || 0x01)
    let mut ikm = Zeroizing::new([0u8; IKM_LEN]);
    Hkdf::<Sha256>::new(Some(&auth_secret[..]), ecdh_secret)
        .expand(&key_info, &mut ikm[..])
        .map_err(|_| PushError::Encryption("HKDF expand failed for IKM".to_string()))?;

    // PRK = HMAC(salt, IKM)
    let prk = Hkdf::<Sha256>::new(Some(&salt[..]), &ikm[..]);

    let mut cek = Zeroizing::new([0u8; KEY_LEN]);
    prk.expand(CEK_INFO, &mut cek[..])
        .map_err(|_| PushError::Encryption("HKDF expand failed for CEK".to_string()))?;

    let mut nonce = Zeroizing::new([0u8; NONCE_LEN]);
    prk.expand(NONCE_INFO, &mut nonce[..])
        .map_err(|_| PushError::Encryption("HKDF expand failed for nonce".to_string()))?;

    Ok((cek, nonce))
}

/// `plaintext || 0x02 || 0x00 * max(0, padding_target - plaintext.len())`
fn pad_record(plaintext: &[u8], padding_target: usize) -> Zeroizing<Vec<u8>> {
    let pad_len = padding_target.saturating_sub(plaintext.len());
    let mut record = Vec::with_capacity(plaintext.len() + 1 + pad_len);
    record.extend_from_slice(plaintext);
    record.push(PADDING_DELIMITER);
    record.resize(plaintext.len() + 1 + pad_len, 0);
    Zeroizing::new(record)
}

fn unpad_record(record: &[u8]) -> Result<Vec<u8>> {
    let delimiter = record
        .iter()
        .rposition(|&b| b != 0)
        .ok_or_else(|| PushError::Encryption("record has no padding delimiter".to_string()))?;
    if record[delimiter] != PADDING_DELIMITER {
        return Err(PushError::Encryption(format!(
            "unexpected padding delimiter 0x{:02x}",
            record[delimiter]
        )));
    }
    Ok(record[..delimiter].to_vec())
}
