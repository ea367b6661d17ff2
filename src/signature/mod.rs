// src/signature/mod.rs

//! Manifest signatures
//!
//! A `signature` action signs every other action of its manifest. The signed
//! text is built by [`SignatureAction::actions_to_str`]: each action's
//! deterministic [`Action::sig_str`], sorted and joined by newlines. Other
//! signature actions contribute nothing.
//!
//! Two forms exist:
//!
//! - hash only (`algorithm=sha256`): `value` is the hex digest of the text
//! - keyed (`algorithm=ed25519-sha256`): the text is digested with the named
//!   hash and the digest signed. The positional hash names the signer's
//!   certificate and `chain` lists the intermediate certificates.
//!
//! `rsa-*` algorithms are recognised so existing manifests parse, but they
//! cannot be checked here and verify as `None`.

mod keys;

pub use keys::{Certificate, SigningKeyPair};

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use ed25519_dalek::Signature;
use thiserror::Error;
use tracing::{debug, warn};

use crate::actions::{Action, ActionError, ActionKind, AttrValue, FilePayload, PayloadSource, SIG_VERSION};
use crate::compression::CompressionError;
use crate::digest::{HashKind, HashPolicy};
use crate::filesystem::FileStore;
use crate::hash::{self, HashAlgorithm};

/// Signature algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigAlgorithm {
    Rsa,
    Ed25519,
}

impl SigAlgorithm {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::Ed25519 => "ed25519",
        }
    }
}

const VALID_SIG_ALGS: &[SigAlgorithm] = &[SigAlgorithm::Rsa, SigAlgorithm::Ed25519];
const VALID_HASH_ALGS: &[HashAlgorithm] = &[HashAlgorithm::Sha256, HashAlgorithm::Sha384, HashAlgorithm::Sha512];

/// Signature errors
#[derive(Error, Debug)]
pub enum SignatureError {
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("{0} is not a signature action")]
    NotSignature(String),

    #[error("Signature did not verify: {reason} (action: {action})")]
    Unverified { action: String, reason: String },

    #[error("Certificate for '{subject}' is not trusted: {reason}")]
    UntrustedChain { subject: String, reason: String },

    #[error("Required names not found in certificate chain: {}", .0.join(", "))]
    MissingRequiredNames(Vec<String>),

    #[error("Certificate {0} not found")]
    CertificateNotFound(String),

    #[error("Bad certificate: {0}")]
    BadCertificate(String),

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signing with a key requires the signer's certificate as payload")]
    MissingCertificate,

    #[error("{path}: {reason}")]
    ChainData { path: PathBuf, reason: String },

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Split an `algorithm` attribute into signature and hash algorithms
///
/// `rsa-sha256` yields both; a bare hash name yields only the hash; anything
/// else yields neither.
pub fn decompose_sig_alg(value: &str) -> (Option<SigAlgorithm>, Option<HashAlgorithm>) {
    for sig in VALID_SIG_ALGS {
        for h in VALID_HASH_ALGS {
            if value == format!("{}-{}", sig.name(), h.name()) {
                return (Some(*sig), Some(*h));
            }
        }
    }
    for h in VALID_HASH_ALGS {
        if value == h.name() {
            return (None, Some(*h));
        }
    }
    (None, None)
}

/// Where verification fetches certificates from, by hash
pub trait CertificateSource {
    /// Raw certificate bytes, checked against `hash`
    fn get_cert_by_hash(&self, hash: &str, algorithm: HashAlgorithm) -> Result<Vec<u8>, SignatureError>;
}

impl CertificateSource for FileStore {
    fn get_cert_by_hash(&self, hash: &str, algorithm: HashAlgorithm) -> Result<Vec<u8>, SignatureError> {
        self.retrieve(hash, algorithm).map_err(|e| match e {
            crate::Error::NotFound(_) => SignatureError::CertificateNotFound(hash.to_string()),
            other => SignatureError::BadCertificate(format!("{}: {}", hash, other)),
        })
    }
}

impl CertificateSource for BTreeMap<String, Vec<u8>> {
    fn get_cert_by_hash(&self, hash: &str, algorithm: HashAlgorithm) -> Result<Vec<u8>, SignatureError> {
        let data = self
            .get(hash)
            .ok_or_else(|| SignatureError::CertificateNotFound(hash.to_string()))?;
        hash::verify_bytes(data, hash, algorithm)
            .map_err(|e| SignatureError::BadCertificate(e.to_string()))?;
        Ok(data.clone())
    }
}

fn read_payload(source: &dyn PayloadSource) -> Result<Vec<u8>, SignatureError> {
    let mut data = Vec::new();
    source.open()?.read_to_end(&mut data)?;
    Ok(data)
}

/// A `signature` action with its decoded algorithm
#[derive(Debug, Clone)]
pub struct SignatureAction {
    action: Action,
    sig_alg: Option<SigAlgorithm>,
    hash_alg: Option<HashAlgorithm>,
    chain_certs: Vec<Arc<dyn PayloadSource>>,
}

impl SignatureAction {
    /// Wrap a parsed signature action
    pub fn new(action: Action) -> Result<Self, SignatureError> {
        if action.kind != ActionKind::Signature {
            return Err(SignatureError::NotSignature(action.to_string()));
        }
        let (sig_alg, hash_alg) = decompose_sig_alg(action.attr_str("algorithm").unwrap_or(""));
        Ok(Self {
            action,
            sig_alg,
            hash_alg,
            chain_certs: Vec::new(),
        })
    }

    /// A fresh, unsigned signature action for `algorithm`
    ///
    /// `certificate` is the signer's certificate payload, required for keyed
    /// algorithms.
    pub fn create(algorithm: &str, certificate: Option<Arc<dyn PayloadSource>>) -> Result<Self, SignatureError> {
        let mut action = Action::from_pairs(ActionKind::Signature, None, [("algorithm", algorithm)])?;
        action.set_payload(certificate);
        Self::new(action)
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn into_action(self) -> Action {
        self.action
    }

    pub fn sig_alg(&self) -> Option<SigAlgorithm> {
        self.sig_alg
    }

    pub fn hash_alg(&self) -> Option<HashAlgorithm> {
        self.hash_alg
    }

    /// Signed with a key rather than a bare hash
    pub fn is_signed(&self) -> bool {
        self.action.hash.is_some() && self.action.varcet_keys().0.is_empty()
    }

    /// Chain certificate hashes, preferred or least preferred attribute
    pub fn get_chain_certs(&self, policy: &HashPolicy, least_preferred: bool) -> Vec<String> {
        let found = if least_preferred {
            policy.get_least_preferred_hash(Some(&self.action), HashKind::Chain)
        } else {
            policy.get_preferred_hash(&self.action, HashKind::Chain)
        };
        found
            .value
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Compressed chain certificate hashes
    pub fn get_chain_certs_chashes(&self, policy: &HashPolicy, least_preferred: bool) -> Vec<String> {
        let found = if least_preferred {
            policy.get_least_preferred_hash(Some(&self.action), HashKind::ChainChash)
        } else {
            policy.get_preferred_hash(&self.action, HashKind::ChainChash)
        };
        found
            .value
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Uncompressed size of one chain certificate
    pub fn get_chain_size(&self, chain: &str) -> Option<u64> {
        self.zip_chain("chain.sizes", chain)
    }

    /// Compressed size of one chain certificate
    pub fn get_chain_csize(&self, chain: &str) -> Option<u64> {
        self.zip_chain("chain.csizes", chain)
    }

    /// Sum of the compressed chain certificate sizes
    pub fn get_action_chain_csize(&self) -> u64 {
        crate::actions::sum_sizes(self.action.get("chain.csizes"))
    }

    fn zip_chain(&self, attr: &str, chain: &str) -> Option<u64> {
        let chains = self.action.get("chain")?.joined().into_owned();
        let sizes = self.action.get(attr)?.joined().into_owned();
        chains
            .split_whitespace()
            .zip(sizes.split_whitespace())
            .find(|(c, _)| *c == chain)
            .and_then(|(_, s)| s.parse().ok())
    }

    /// Signing text for this action when `signer` is doing the signing
    ///
    /// Signature actions sign only themselves, as they will look once
    /// published: `value` blanked, payload and chain hashes filled in.
    /// Any other signer gets `None`.
    pub fn sig_str(&self, signer: &Action, version: u32, policy: &HashPolicy) -> Result<Option<String>, SignatureError> {
        if version != SIG_VERSION {
            return Err(ActionError::UnsupportedSignatureVersion { version }.into());
        }
        if signer.to_string() != self.action.to_string() {
            return Ok(None);
        }

        let mut tmp = self.action.clone();
        tmp.set_payload(None);
        tmp.set_attr("value", "");

        if let Some(payload) = self.action.payload() {
            let data = read_payload(payload.as_ref())?;
            tmp.set_attr("pkg.size", data.len().to_string());
            let mut hashes = policy.compute_hashes(&mut data.as_slice(), HashKind::Hash)?;
            if let Some(h) = hashes.remove("hash") {
                tmp.hash = Some(h);
            }
            for (attr, value) in hashes {
                tmp.set_attr(attr, value);
            }
            let (packed, chashes) = policy.compressed_attrs(&data, HashKind::Chash)?;
            tmp.set_attr("pkg.csize", packed.len().to_string());
            for (attr, value) in chashes {
                tmp.set_attr(attr, value);
            }
        }

        if !self.chain_certs.is_empty() {
            let mut chain_hashes: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for cert in &self.chain_certs {
                let data = read_payload(cert.as_ref())?;
                for (attr, value) in policy.compute_hashes(&mut data.as_slice(), HashKind::Chain)? {
                    chain_hashes.entry(attr).or_default().push(value);
                }
            }
            for (attr, values) in chain_hashes {
                tmp.set_attr(attr, values.join(" "));
            }
        }

        Ok(Some(tmp.sig_str(version)?))
    }

    /// The text this signature covers
    pub fn actions_to_str(&self, actions: &[Action], version: u32, policy: &HashPolicy) -> Result<String, SignatureError> {
        let mut lines = Vec::with_capacity(actions.len());
        for a in actions {
            let line = match a.kind {
                ActionKind::Signature => {
                    if a.to_string() == self.action.to_string() {
                        self.sig_str(a, version, policy)?
                    } else {
                        None
                    }
                }
                _ => Some(a.sig_str(version)?),
            };
            lines.extend(line);
        }
        lines.sort();
        Ok(lines.join("\n"))
    }

    /// Signed text, always covering this action itself
    ///
    /// A manifest being signed does not contain its signature yet while the
    /// published one does; both must produce the same text.
    fn signed_text(&self, actions: &[Action], version: u32, policy: &HashPolicy) -> Result<String, SignatureError> {
        let own = self.action.to_string();
        if actions.iter().any(|a| a.to_string() == own) {
            return self.actions_to_str(actions, version, policy);
        }
        let mut with_self = actions.to_vec();
        with_self.push(self.action.clone());
        self.actions_to_str(&with_self, version, policy)
    }

    /// Hex digest of the signed text under the signature's hash algorithm
    fn digest(&self, actions: &[Action], version: u32, policy: &HashPolicy) -> Result<String, SignatureError> {
        let alg = self
            .hash_alg
            .ok_or_else(|| SignatureError::UnsupportedAlgorithm(self.algorithm().to_string()))?;
        let text = self.signed_text(actions, version, policy)?;
        Ok(hash::hash_bytes(alg, text.as_bytes()).value)
    }

    fn algorithm(&self) -> &str {
        self.action.attr_str("algorithm").unwrap_or("")
    }

    /// Record the chain certificates needed to validate this signature
    fn set_chain_certs_data(&mut self, chain_paths: &[PathBuf], policy: &HashPolicy) -> Result<(), SignatureError> {
        self.chain_certs.clear();
        let mut sizes = Vec::new();
        let mut csizes = Vec::new();
        let mut hashes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut chashes: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for path in chain_paths {
            let chain_err = |reason: String| SignatureError::ChainData {
                path: path.clone(),
                reason,
            };
            if !path.exists() {
                return Err(chain_err(format!("No such file: '{}'.", path.display())));
            }
            if path.is_dir() {
                return Err(chain_err(format!("'{}' is not a file.", path.display())));
            }

            let data = std::fs::read(path).map_err(|e| chain_err(e.to_string()))?;
            sizes.push(data.len().to_string());
            for (attr, value) in policy.compute_hashes(&mut data.as_slice(), HashKind::Chain)? {
                hashes.entry(attr).or_default().push(value);
            }
            let (packed, ch) = policy.compressed_attrs(&data, HashKind::ChainChash)?;
            csizes.push(packed.len().to_string());
            for (attr, value) in ch {
                chashes.entry(attr).or_default().push(value);
            }
            self.chain_certs.push(Arc::new(FilePayload::new(path)));
        }

        if hashes.is_empty() {
            return Ok(());
        }

        // Space-joined scalars keep the order, which lists would not.
        self.action.set_attr("chain.sizes", sizes.join(" "));
        self.action.set_attr("chain.csizes", csizes.join(" "));
        for (attr, values) in hashes.into_iter().chain(chashes) {
            self.action.set_attr(attr, AttrValue::Scalar(values.join(" ")));
        }
        Ok(())
    }

    /// Compute and store the signature value over `actions`
    ///
    /// Without a key the value is the hex digest of the signed text. With a
    /// key, the signer's certificate must be this action's payload and
    /// `chain_paths` lists the intermediate certificates.
    pub fn set_signature(
        &mut self,
        actions: &[Action],
        key: Option<&SigningKeyPair>,
        chain_paths: &[PathBuf],
        policy: &HashPolicy,
    ) -> Result<(), SignatureError> {
        let Some(key) = key else {
            let value = self.digest(actions, SIG_VERSION, policy)?;
            self.action.set_attr("value", value);
            return Ok(());
        };

        if self.sig_alg != Some(SigAlgorithm::Ed25519) {
            return Err(SignatureError::UnsupportedAlgorithm(self.algorithm().to_string()));
        }
        if !self.action.has_payload() {
            return Err(SignatureError::MissingCertificate);
        }

        // The chain attributes are part of the signed text.
        self.set_chain_certs_data(chain_paths, policy)?;
        let digest = self.digest(actions, SIG_VERSION, policy)?;
        let sig = key.sign(digest.as_bytes());
        self.action.set_attr("value", hex::encode(sig.to_bytes()));
        debug!("Signed {} actions with {}", actions.len(), self.algorithm());
        Ok(())
    }

    /// Check this signature against `actions`
    ///
    /// Returns `Ok(Some(true))` when the signature holds and `Ok(None)` when
    /// it cannot be checked: a newer version, variant-tagged, unknown hash or
    /// an RSA key. A signature that can be checked and fails is an error.
    /// CRLs are not consulted; `use_crls` is accepted for callers that pass
    /// it through.
    pub fn verify_sig(
        &self,
        actions: &[Action],
        certs: &dyn CertificateSource,
        trust_anchors: &[Certificate],
        use_crls: bool,
        required_names: &[&str],
        policy: &HashPolicy,
    ) -> Result<Option<bool>, SignatureError> {
        let version: u32 = self
            .action
            .attr_str("version")
            .and_then(|v| v.parse().ok())
            .unwrap_or(SIG_VERSION);
        if !self.action.varcet_keys().0.is_empty() || version > SIG_VERSION || self.hash_alg.is_none() {
            return Ok(None);
        }

        let value = self.action.attr_str("value").unwrap_or("");
        let unverified = |reason: &str| SignatureError::Unverified {
            action: self.action.to_string(),
            reason: reason.to_string(),
        };

        if self.action.hash.is_none() {
            if self.digest(actions, version, policy)? != value.to_lowercase() {
                return Err(unverified("The signature value did not match the expected value."));
            }
            return Ok(Some(true));
        }

        match self.sig_alg {
            Some(SigAlgorithm::Ed25519) => {}
            Some(SigAlgorithm::Rsa) | None => return Ok(None),
        }
        if use_crls {
            debug!("Certificate revocation lists are not checked");
        }

        let found = policy.get_least_preferred_hash(Some(&self.action), HashKind::Hash);
        let cert_hash = found.value.ok_or_else(|| unverified("no signing certificate"))?;
        let cert = Certificate::from_bytes(
            &certs.get_cert_by_hash(&cert_hash, found.algorithm.unwrap_or_default())?,
        )?;

        let chain_alg = policy
            .get_least_preferred_hash(Some(&self.action), HashKind::Chain)
            .algorithm
            .unwrap_or_default();
        let mut chain = Vec::new();
        for h in self.get_chain_certs(policy, true) {
            chain.push(Certificate::from_bytes(&certs.get_cert_by_hash(&h, chain_alg)?)?);
        }
        verify_chain(&cert, &chain, trust_anchors, required_names)?;

        let sig_bytes = hex::decode(value).map_err(|_| unverified("value is not hex"))?;
        let sig = Signature::from_slice(&sig_bytes).map_err(|_| unverified("malformed signature"))?;
        let digest = self.digest(actions, version, policy)?;
        cert.verifying_key()?
            .verify_strict(digest.as_bytes(), &sig)
            .map_err(|_| unverified("The signature value did not match the expected value."))?;

        Ok(Some(true))
    }
}

/// Walk issuers from `cert` up to a trust anchor
fn verify_chain(
    cert: &Certificate,
    chain: &[Certificate],
    trust_anchors: &[Certificate],
    required_names: &[&str],
) -> Result<(), SignatureError> {
    let mut seen = vec![cert.subject.clone()];
    let mut current = cert.clone();

    // Each step consumes one certificate, so a cycle cannot loop forever.
    for _ in 0..=chain.len() {
        if trust_anchors.contains(&current) {
            return check_names(&seen, required_names);
        }
        let Some(issuer_name) = current.issuer.as_deref() else {
            return Err(SignatureError::UntrustedChain {
                subject: current.subject.clone(),
                reason: "self-issued certificate is not a trust anchor".to_string(),
            });
        };

        if let Some(anchor) = trust_anchors.iter().find(|a| a.subject == issuer_name) {
            current.verify_endorsement(anchor)?;
            seen.push(anchor.subject.clone());
            return check_names(&seen, required_names);
        }

        let issuer = chain
            .iter()
            .find(|c| c.subject == issuer_name)
            .ok_or_else(|| SignatureError::UntrustedChain {
                subject: current.subject.clone(),
                reason: format!("issuer '{}' not found", issuer_name),
            })?;
        current.verify_endorsement(issuer)?;
        seen.push(issuer.subject.clone());
        current = issuer.clone();
    }

    warn!("Certificate chain for '{}' does not terminate", cert.subject);
    Err(SignatureError::UntrustedChain {
        subject: cert.subject.clone(),
        reason: "chain does not reach a trust anchor".to_string(),
    })
}

fn check_names(seen: &[String], required: &[&str]) -> Result<(), SignatureError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|n| !seen.iter().any(|s| s == *n))
        .map(|n| n.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SignatureError::MissingRequiredNames(missing))
    }
}
