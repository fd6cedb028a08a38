//! Conversions between the wire form of P-256 public keys and key objects
//!
//! Browsers and push services exchange public keys as a 65-byte uncompressed
//! point (`0x04 || X || Y`), base64url encoded without padding. Key storage
//! uses the standard DER structures (X.509 SubjectPublicKeyInfo and PKCS#8).

use super::error::{PushError, Result};
use base64::{
    alphabet,
    engine::{
        general_purpose::URL_SAFE_NO_PAD, DecodePaddingMode, GeneralPurpose,
        GeneralPurposeConfig,
    },
    Engine,
};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey};
use p256::{PublicKey, SecretKey};
use std::fmt;

/// Length of an uncompressed P-256 point
pub const UNCOMPRESSED_POINT_LEN: usize = 65;

const UNCOMPRESSED_TAG: u8 = 0x04;

/// DER header of a P-256 SubjectPublicKeyInfo, up to the raw point bytes
/// (SEQUENCE { id-ecPublicKey, prime256v1 }, BIT STRING with 0 unused bits)
pub(crate) const P256_SPKI_PREFIX: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08,
    0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00,
];

/// Browsers send unpadded base64url but some clients keep the `=` padding
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode base64url text, with or without padding
pub fn decode_base64url(input: &str) -> Result<Vec<u8>> {
    URL_SAFE_LENIENT
        .decode(input.trim())
        .map_err(|e| PushError::MalformedKey(format!("invalid base64url: {}", e)))
}

/// Encode bytes as base64url without padding
pub fn encode_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A P-256 public key in its 65-byte uncompressed wire form.
///
/// Always exactly 65 bytes with a leading `0x04`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UncompressedPoint([u8; UNCOMPRESSED_POINT_LEN]);

impl UncompressedPoint {
    /// Raw point bytes
    pub fn as_bytes(&self) -> &[u8; UNCOMPRESSED_POINT_LEN] {
        &self.0
    }

    /// Base64url (no padding) text form, as published to browsers
    pub fn to_base64url(&self) -> String {
        encode_base64url(&self.0)
    }

    /// Parse into a curve-validated public key
    pub fn to_public_key(&self) -> Result<PublicKey> {
        decode_public_key_bytes(&self.0)
    }
}

impl TryFrom<&[u8]> for UncompressedPoint {
    type Error = PushError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let point: [u8; UNCOMPRESSED_POINT_LEN] = bytes.try_into().map_err(|_| {
            PushError::MalformedKey(format!(
                "expected {} byte uncompressed point, got {} bytes",
                UNCOMPRESSED_POINT_LEN,
                bytes.len()
            ))
        })?;
        if point[0] != UNCOMPRESSED_TAG {
            return Err(PushError::MalformedKey(format!(
                "uncompressed point must start with 0x04, got 0x{:02x}",
                point[0]
            )));
        }
        Ok(Self(point))
    }
}

impl AsRef<[u8]> for UncompressedPoint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for UncompressedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UncompressedPoint")
            .field(&self.to_base64url())
            .finish()
    }
}

/// Encode a public key as its 65-byte uncompressed point.
///
/// These are the bytes of the SubjectPublicKeyInfo bit string, i.e. the DER
/// encoding with the algorithm-identifier header removed.
pub fn encode_public_key(key: &PublicKey) -> UncompressedPoint {
    let encoded = key.to_encoded_point(false);
    let mut point = [0u8; UNCOMPRESSED_POINT_LEN];
    point.copy_from_slice(encoded.as_bytes());
    UncompressedPoint(point)
}

/// Decode a subscriber's base64url `p256dh` key into a validated public key
pub fn decode_public_key(encoded: &str) -> Result<PublicKey> {
    let bytes = decode_base64url(encoded)?;
    decode_public_key_bytes(&bytes)
}

/// Decode raw uncompressed point bytes into a validated public key.
///
/// The point is wrapped in the fixed P-256 SPKI header and parsed as a full
/// X.509 key, which rejects coordinates that are not on the curve.
pub fn decode_public_key_bytes(bytes: &[u8]) -> Result<PublicKey> {
    let point = UncompressedPoint::try_from(bytes)?;

    let mut der = Vec::with_capacity(P256_SPKI_PREFIX.len() + UNCOMPRESSED_POINT_LEN);
    der.extend_from_slice(&P256_SPKI_PREFIX);
    der.extend_from_slice(point.as_bytes());

    decode_public_key_from_x509(&der)
}

/// Parse an X.509 SubjectPublicKeyInfo DER document
pub fn decode_public_key_from_x509(der: &[u8]) -> Result<PublicKey> {
    PublicKey::from_public_key_der(der)
        .map_err(|e| PushError::MalformedKey(format!("invalid P-256 public key: {}", e)))
}

/// Parse a PKCS#8 DER private key document
pub fn decode_private_key_from_pkcs8(der: &[u8]) -> Result<SecretKey> {
    SecretKey::from_pkcs8_der(der)
        .map_err(|e| PushError::MalformedKey(format!("invalid P-256 private key: {}", e)))
}
