//! Server identity (VAPID application server key pair)
//!
//! The key pair is loaded once at startup from two DER files, or generated and
//! persisted when either file is missing. The public half is published to
//! browsers as the `applicationServerKey`.

use super::error::{PushError, Result};
use super::keys::{
    decode_private_key_from_pkcs8, decode_public_key_from_x509, encode_public_key,
    UncompressedPoint,
};
use p256::ecdsa::SigningKey;
use p256::pkcs8::{EncodePrivateKey, EncodePublicKey};
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use std::fs;
use std::path::{Path, PathBuf};

/// Locations of the server key files
#[derive(Debug, Clone)]
pub struct IdentityPaths {
    /// X.509 SubjectPublicKeyInfo DER file
    pub public_key_path: PathBuf,
    /// PKCS#8 DER file
    pub private_key_path: PathBuf,
}

impl IdentityPaths {
    pub fn new(public_key_path: impl Into<PathBuf>, private_key_path: impl Into<PathBuf>) -> Self {
        Self {
            public_key_path: public_key_path.into(),
            private_key_path: private_key_path.into(),
        }
    }
}

/// The server's long-lived P-256 key pair
pub struct ServerIdentity {
    signing_key: SigningKey,
    public_key: PublicKey,
    public_key_uncompressed: UncompressedPoint,
    public_key_base64: String,
}

impl ServerIdentity {
    /// Load the key pair from `paths`, or generate and persist a new one
    pub fn load_or_generate(paths: &IdentityPaths) -> Result<Self> {
        if paths.public_key_path.exists() && paths.private_key_path.exists() {
            let identity = Self::load(paths)?;
            log::info!(
                "Loaded server keys from {}",
                paths.private_key_path.display()
            );
            return Ok(identity);
        }

        log::info!("Generating new server keys");
        let secret_key = SecretKey::random(&mut OsRng);
        Self::persist(paths, &secret_key)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Build an identity from an in-memory key without touching disk
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = secret_key.public_key();
        let public_key_uncompressed = encode_public_key(&public_key);
        let public_key_base64 = public_key_uncompressed.to_base64url();

        Self {
            signing_key: SigningKey::from(&secret_key),
            public_key,
            public_key_uncompressed,
            public_key_base64,
        }
    }

    fn load(paths: &IdentityPaths) -> Result<Self> {
        let public_der = read_key_file(&paths.public_key_path)?;
        let private_der = read_key_file(&paths.private_key_path)?;

        let public_key = decode_public_key_from_x509(&public_der).map_err(|e| {
            PushError::IdentityInitialization(format!(
                "{}: {}",
                paths.public_key_path.display(),
                e
            ))
        })?;
        let secret_key = decode_private_key_from_pkcs8(&private_der).map_err(|e| {
            PushError::IdentityInitialization(format!(
                "{}: {}",
                paths.private_key_path.display(),
                e
            ))
        })?;

        if secret_key.public_key() != public_key {
            return Err(PushError::IdentityInitialization(format!(
                "public key {} does not belong to private key {}",
                paths.public_key_path.display(),
                paths.private_key_path.display()
            )));
        }

        Ok(Self::from_secret_key(secret_key))
    }

    fn persist(paths: &IdentityPaths, secret_key: &SecretKey) -> Result<()> {
        let public_der = secret_key
            .public_key()
            .to_public_key_der()
            .map_err(|e| PushError::IdentityInitialization(format!("encode public key: {}", e)))?;
        let private_der = secret_key
            .to_pkcs8_der()
            .map_err(|e| PushError::IdentityInitialization(format!("encode private key: {}", e)))?;

        write_key_file(&paths.public_key_path, public_der.as_bytes(), false)?;
        write_key_file(&paths.private_key_path, private_der.as_bytes(), true)?;
        Ok(())
    }

    /// ECDSA key used to sign VAPID tokens
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// 65-byte uncompressed public key (the browser's `applicationServerKey`)
    pub fn public_key_uncompressed(&self) -> &UncompressedPoint {
        &self.public_key_uncompressed
    }

    /// Base64url (no padding) public key, used in the VAPID `k=` parameter
    pub fn public_key_base64(&self) -> &str {
        &self.public_key_base64
    }
}

impl std::fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerIdentity")
            .field("public_key", &self.public_key_base64)
            .finish_non_exhaustive()
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        PushError::IdentityInitialization(format!("Failed to read '{}': {}", path.display(), e))
    })
}

fn write_key_file(path: &Path, contents: &[u8], private: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                PushError::IdentityInitialization(format!(
                    "Failed to create key directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    fs::write(path, contents).map_err(|e| {
        PushError::IdentityInitialization(format!("Failed to write '{}': {}", path.display(), e))
    })?;

    // Owner read/write only for the private key on Unix
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
            PushError::IdentityInitialization(format!(
                "Failed to set permissions on '{}': {}",
                path.display(),
                e
            ))
        })?;
    }
    #[cfg(not(unix))]
    let _ = private;

    Ok(())
}
