// src/signature/keys.rs
//! Signing keys and certificates
//!
//! Keys are Ed25519 and live in small TOML files. A certificate binds a
//! subject name to a public key; unless it is a trust anchor it also carries
//! an endorsement from its issuer's key, which is what links certificates
//! into a chain.

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::SignatureError;

const KEY_ALGORITHM: &str = "ed25519";

/// An Ed25519 signing key pair
pub struct SigningKeyPair {
    signing_key: SigningKey,
    key_id: Option<String>,
}

impl SigningKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            key_id: None,
        }
    }

    pub fn from_signing_key(key: SigningKey) -> Self {
        Self {
            signing_key: key,
            key_id: None,
        }
    }

    /// Set a human-readable key identifier
    pub fn with_key_id(mut self, id: &str) -> Self {
        self.key_id = Some(id.to_string());
        self
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.verifying_key().as_bytes())
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Raw signature over `content`
    pub fn sign(&self, content: &[u8]) -> Signature {
        self.signing_key.sign(content)
    }

    /// Certificate for this key, endorsed by `issuer`
    ///
    /// With no issuer the certificate is self-contained and is only useful
    /// as a trust anchor.
    pub fn certificate(&self, subject: &str, issuer: Option<(&str, &SigningKeyPair)>) -> Certificate {
        let mut cert = Certificate {
            subject: subject.to_string(),
            public_key: self.public_key_base64(),
            issuer: None,
            endorsement: None,
        };
        if let Some((issuer_name, issuer_key)) = issuer {
            cert.issuer = Some(issuer_name.to_string());
            let sig = issuer_key.sign(&cert.endorsed_bytes());
            cert.endorsement = Some(BASE64.encode(sig.to_bytes()));
        }
        cert
    }

    /// Save the key pair as a private and a public key file
    pub fn save_to_files(&self, private_path: &Path, public_path: &Path) -> Result<()> {
        let private_data = KeyFile {
            algorithm: KEY_ALGORITHM.to_string(),
            key: BASE64.encode(self.signing_key.to_bytes()),
            key_id: self.key_id.clone(),
        };
        let private_toml = toml::to_string_pretty(&private_data)?;
        fs::write(private_path, private_toml)
            .with_context(|| format!("Failed to write private key: {}", private_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(private_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(private_path, perms)?;
        }

        let public_data = KeyFile {
            algorithm: KEY_ALGORITHM.to_string(),
            key: self.public_key_base64(),
            key_id: self.key_id.clone(),
        };
        let public_toml = toml::to_string_pretty(&public_data)?;
        fs::write(public_path, public_toml)
            .with_context(|| format!("Failed to write public key: {}", public_path.display()))?;

        Ok(())
    }

    /// Load a key pair from a private key file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file: {}", path.display()))?;

        let key_file: KeyFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse key file: {}", path.display()))?;

        if key_file.algorithm != KEY_ALGORITHM {
            anyhow::bail!(
                "{} was expected to be an {} key but uses {}",
                path.display(),
                KEY_ALGORITHM,
                key_file.algorithm
            );
        }

        let key_bytes = BASE64
            .decode(&key_file.key)
            .context("Invalid base64 in key file")?;
        let key_array: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid key length"))?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&key_array),
            key_id: key_file.key_id,
        })
    }
}

/// Key file format
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    algorithm: String,
    key: String,
    #[serde(default)]
    key_id: Option<String>,
}

/// A subject name bound to a public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Common name of the key holder
    pub subject: String,
    /// Base64 Ed25519 public key
    pub public_key: String,
    /// Common name of the endorsing certificate
    #[serde(default)]
    pub issuer: Option<String>,
    /// Base64 signature by the issuer's key over subject and public key
    #[serde(default)]
    pub endorsement: Option<String>,
}

impl Certificate {
    /// Parse a certificate from its stored TOML form
    pub fn from_bytes(data: &[u8]) -> Result<Self, SignatureError> {
        let text = std::str::from_utf8(data).map_err(|e| SignatureError::BadCertificate(e.to_string()))?;
        toml::from_str(text).map_err(|e| SignatureError::BadCertificate(e.to_string()))
    }

    /// Stored TOML form; this is what the certificate hash covers
    pub fn to_bytes(&self) -> Result<Vec<u8>, SignatureError> {
        toml::to_string_pretty(self)
            .map(String::into_bytes)
            .map_err(|e| SignatureError::BadCertificate(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data =
            fs::read(path).with_context(|| format!("Failed to read certificate: {}", path.display()))?;
        Self::from_bytes(&data).with_context(|| format!("Failed to parse certificate: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_bytes()?)
            .with_context(|| format!("Failed to write certificate: {}", path.display()))
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, SignatureError> {
        let bytes = BASE64
            .decode(&self.public_key)
            .map_err(|e| SignatureError::BadCertificate(format!("{}: {}", self.subject, e)))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SignatureError::BadCertificate(format!("{}: invalid key length", self.subject)))?;
        VerifyingKey::from_bytes(&array)
            .map_err(|e| SignatureError::BadCertificate(format!("{}: {}", self.subject, e)))
    }

    fn endorsed_bytes(&self) -> Vec<u8> {
        format!(
            "{}\n{}\n{}",
            self.subject,
            self.public_key,
            self.issuer.as_deref().unwrap_or("")
        )
        .into_bytes()
    }

    /// Check the endorsement against the issuer's certificate
    pub fn verify_endorsement(&self, issuer: &Certificate) -> Result<(), SignatureError> {
        let untrusted = |reason: &str| SignatureError::UntrustedChain {
            subject: self.subject.clone(),
            reason: reason.to_string(),
        };

        if self.issuer.as_deref() != Some(issuer.subject.as_str()) {
            return Err(untrusted("issuer name does not match"));
        }
        let encoded = self
            .endorsement
            .as_deref()
            .ok_or_else(|| untrusted("certificate carries no endorsement"))?;
        let bytes = BASE64
            .decode(encoded)
            .map_err(|_| untrusted("endorsement is not valid base64"))?;
        let sig = Signature::from_slice(&bytes).map_err(|_| untrusted("malformed endorsement"))?;

        issuer
            .verifying_key()?
            .verify_strict(&self.endorsed_bytes(), &sig)
            .map_err(|_| untrusted("endorsement does not verify"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let private_path = temp_dir.path().join("key.private");
        let public_path = temp_dir.path().join("key.public");

        let keypair = SigningKeyPair::generate().with_key_id("release");
        let original_public = keypair.public_key_base64();
        keypair.save_to_files(&private_path, &public_path).unwrap();

        let loaded = SigningKeyPair::load_from_file(&private_path).unwrap();
        assert_eq!(loaded.public_key_base64(), original_public);
        assert_eq!(loaded.key_id(), Some("release"));
    }

    #[test]
    fn test_load_rejects_other_algorithms() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rsa.key");
        fs::write(&path, "algorithm = \"rsa\"\nkey = \"AAAA\"\n").unwrap();
        assert!(SigningKeyPair::load_from_file(&path).is_err());
    }

    #[test]
    fn test_certificate_endorsement() {
        let ca = SigningKeyPair::generate();
        let leaf = SigningKeyPair::generate();
        let ca_cert = ca.certificate("Test CA", None);
        let leaf_cert = leaf.certificate("publisher.example", Some(("Test CA", &ca)));

        leaf_cert.verify_endorsement(&ca_cert).unwrap();

        let other = SigningKeyPair::generate().certificate("Test CA", None);
        assert!(matches!(
            leaf_cert.verify_endorsement(&other),
            Err(SignatureError::UntrustedChain { .. })
        ));
        assert!(ca_cert.verify_endorsement(&ca_cert).is_err());
    }

    #[test]
    fn test_certificate_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cert.toml");
        let cert = SigningKeyPair::generate().certificate("signer", None);
        cert.save(&path).unwrap();
        assert_eq!(Certificate::load(&path).unwrap(), cert);
        assert!(Certificate::from_bytes(b"not = [valid").is_err());
    }
}
