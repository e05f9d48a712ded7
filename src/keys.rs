//! Signing Key Pair
//!
//! RSA key pair used to sign embed tokens. Generated once at install time and
//! stored as PEM files in the keys directory:
//!
//! - `private_key.pem` - PKCS#8, never leaves the host
//! - `public_key.pem`  - SPKI, published through the JWKS endpoint
//!
//! The pair is never rotated automatically.

use jsonwebtoken::EncodingKey;
use once_cell::sync::OnceCell;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// RSA modulus size for generated keys
pub const KEY_BITS: usize = 2048;

/// File name of the private key inside the keys directory
pub const PRIVATE_KEY_FILE: &str = "private_key.pem";

/// File name of the public key inside the keys directory
pub const PUBLIC_KEY_FILE: &str = "public_key.pem";

/// Key material errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Key material unavailable at {}: {source}", .path.display())]
    KeyUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key material: {0}")]
    Invalid(String),

    #[error("Public key does not match private key")]
    Mismatch,

    #[error("Key generation failed: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Asymmetric signing key and its verification key
pub struct KeyPair {
    private_pem: Zeroizing<String>,
    public_pem: String,
    public_key: RsaPublicKey,
    encoding_key: EncodingKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_pem", &"<redacted>")
            .field("public_pem", &self.public_pem)
            .finish()
    }
}

impl KeyPair {
    /// Generate a fresh RSA-2048 key pair
    pub fn generate() -> Result<Self, KeyError> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), KEY_BITS)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        let public = RsaPublicKey::from(&private);

        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::Generation(e.to_string()))?;

        Self::from_pem(&private_pem, &public_pem)
    }

    /// Build a key pair from PEM text, checking that both halves belong together
    pub fn from_pem(private_pem: &str, public_pem: &str) -> Result<Self, KeyError> {
        let private = RsaPrivateKey::from_pkcs8_pem(private_pem)
            .map_err(|e| KeyError::Invalid(format!("private key: {}", e)))?;
        let public_key = RsaPublicKey::from_public_key_pem(public_pem)
            .map_err(|e| KeyError::Invalid(format!("public key: {}", e)))?;

        if RsaPublicKey::from(&private) != public_key {
            return Err(KeyError::Mismatch);
        }

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| KeyError::Invalid(format!("signing key: {}", e)))?;

        Ok(Self {
            private_pem: Zeroizing::new(private_pem.to_string()),
            public_pem: public_pem.to_string(),
            public_key,
            encoding_key,
        })
    }

    /// Load the key pair from a keys directory
    pub fn load(dir: &Path) -> Result<Self, KeyError> {
        let private_pem = Zeroizing::new(read_key_file(&dir.join(PRIVATE_KEY_FILE))?);
        let public_pem = read_key_file(&dir.join(PUBLIC_KEY_FILE))?;

        let pair = Self::from_pem(&private_pem, &public_pem)?;
        debug!("Loaded signing key pair from {}", dir.display());
        Ok(pair)
    }

    /// Write both PEM files into `dir`, creating it if needed
    pub fn write_to(&self, dir: &Path) -> Result<(), KeyError> {
        std::fs::create_dir_all(dir)?;

        let private_path = dir.join(PRIVATE_KEY_FILE);
        std::fs::write(&private_path, self.private_pem.as_bytes())?;
        restrict_permissions(&private_path)?;

        std::fs::write(dir.join(PUBLIC_KEY_FILE), self.public_pem.as_bytes())?;
        Ok(())
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }
}

/// Generate and persist a key pair unless one is already present.
///
/// Returns `true` when new keys were written. An existing private *or*
/// public key file counts as present, so a half-installed directory is left
/// untouched.
pub fn ensure_key_pair(dir: &Path) -> Result<bool, KeyError> {
    if dir.join(PRIVATE_KEY_FILE).exists() || dir.join(PUBLIC_KEY_FILE).exists() {
        debug!("Key pair already present in {}", dir.display());
        return Ok(false);
    }

    let pair = KeyPair::generate()?;
    pair.write_to(dir)?;

    info!("Generated new signing key pair in {}", dir.display());
    Ok(true)
}

/// Process-lifetime cache of the key pair.
///
/// Keys only change through install, so the first successful load is kept.
/// Failed loads are not cached; a later install is picked up on the next call.
#[derive(Debug)]
pub struct KeyCache {
    dir: PathBuf,
    cell: OnceCell<Arc<KeyPair>>,
}

impl KeyCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cell: OnceCell::new(),
        }
    }

    /// Cache pre-loaded keys (tests, `--jwks` with explicit files)
    pub fn preloaded(pair: KeyPair) -> Self {
        Self {
            dir: PathBuf::new(),
            cell: OnceCell::with_value(Arc::new(pair)),
        }
    }

    pub fn get(&self) -> Result<Arc<KeyPair>, KeyError> {
        self.cell
            .get_or_try_init(|| KeyPair::load(&self.dir).map(Arc::new))
            .cloned()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn read_key_file(path: &Path) -> Result<String, KeyError> {
    std::fs::read_to_string(path).map_err(|source| KeyError::KeyUnavailable {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
