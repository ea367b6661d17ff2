// src/digest.rs

//! Hash attribute policy
//!
//! An action can carry several digests of the same payload under different
//! attribute names. A [`HashPolicy`] ranks those names per [`HashKind`] and
//! answers three questions:
//!
//! - which hash should a client verify against (`get_preferred_hash`)
//! - which hash identifies the payload in the store (`get_least_preferred_hash`)
//! - which hash can two versions of an action be compared on
//!   (`get_common_preferred_hash`)
//!
//! Ranked lists only ever grow or reorder. Configuration prepends entries to
//! the built-in rankings, so an older attribute is never dropped.
//!
//! Compressed-hash, chain and chain-compressed rankings are derived from the
//! file hash ranking by renaming `hash` to `chash`, `chain` and
//! `chain.chashes` respectively.

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::actions::Action;
use crate::compression::{self, CompressionError};
use crate::hash::{BLOCK_SIZE, HashAlgorithm, HashError, Hasher};

/// Hash attributes emitted on published file actions
pub const DEFAULT_HASH_ATTRS: &[&str] = &["hash"];
pub const DEFAULT_CHASH_ATTRS: &[&str] = &["chash"];
pub const DEFAULT_CONTENT_HASH_ATTRS: &[&str] = &["elfhash", "pkg.content-hash"];
pub const DEFAULT_CHAIN_ATTRS: &[&str] = &["chain"];
pub const DEFAULT_CHAIN_CHASH_ATTRS: &[&str] = &["chain.chashes"];

/// Payload hash attributes, most preferred first
pub const RANKED_HASH_ATTRS: &[&str] = &["pkg.hash.sha512_256", "pkg.hash.sha256", "hash"];
pub const RANKED_CONTENT_HASH_ATTRS: &[&str] = &["pkg.content-hash", "elfhash"];
/// `pkg.content-hash` value prefixes, most preferred first
pub const RANKED_CONTENT_HASH_TYPES: &[&str] = &["gelf:sha512t_256", "gelf:sha256"];

const CONTENT_HASH_ATTR: &str = "pkg.content-hash";

static DEFAULT_POLICY: LazyLock<HashPolicy> = LazyLock::new(HashPolicy::default);

/// The five hash concerns an action may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    /// Uncompressed payload
    Hash,
    /// Compressed payload as stored
    Chash,
    /// Extracted content, e.g. the loadable sections of an ELF object
    ContentHash,
    /// Signature certificate chain
    Chain,
    /// Compressed signature certificate chain
    ChainChash,
}

impl HashKind {
    /// Replacement applied to file hash attribute names to derive this kind's
    fn rename(&self) -> Option<&'static str> {
        match self {
            Self::Hash | Self::ContentHash => None,
            Self::Chash => Some("chash"),
            Self::Chain => Some("chain"),
            Self::ChainChash => Some("chain.chashes"),
        }
    }
}

impl FromStr for HashKind {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hash" => Ok(Self::Hash),
            "chash" => Ok(Self::Chash),
            "content-hash" | "content_hash" => Ok(Self::ContentHash),
            "chain" => Ok(Self::Chain),
            "chain-chash" | "chain_chash" => Ok(Self::ChainChash),
            _ => Err(HashError::UnknownHashKind(s.to_string())),
        }
    }
}

/// Result of a single-action hash lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferredHash {
    /// Attribute name, `None` when the positional hash was used or nothing matched
    pub attr: Option<String>,
    pub value: Option<String>,
    pub algorithm: Option<HashAlgorithm>,
}

/// Result of comparing two versions of an action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonHash {
    pub attr: Option<String>,
    pub new: Option<String>,
    pub old: Option<String>,
    pub algorithm: Option<HashAlgorithm>,
}

/// `[digest]` section of the repository configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestSection {
    /// Extra payload hash attributes to emit on publication
    #[serde(default)]
    pub hash_attrs: Vec<String>,

    /// Extra ranked payload hash attributes, placed ahead of the built-ins
    #[serde(default)]
    pub ranked_hash_attrs: Vec<String>,

    /// Extra ranked `pkg.content-hash` types, placed ahead of the built-ins
    #[serde(default)]
    pub ranked_content_hash_types: Vec<String>,
}

/// Ranked and emitted hash attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashPolicy {
    pub ranked_hash: Vec<String>,
    pub ranked_content: Vec<String>,
    pub ranked_content_types: Vec<String>,
    pub default_hash: Vec<String>,
    pub default_chash: Vec<String>,
    pub default_content: Vec<String>,
    pub default_chain: Vec<String>,
    pub default_chain_chash: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Prepend entries not already present, keeping their relative order
fn prepend(base: &mut Vec<String>, extra: &[String]) {
    let mut merged: Vec<String> = extra
        .iter()
        .filter(|e| !base.contains(e))
        .cloned()
        .collect();
    merged.dedup();
    merged.append(base);
    *base = merged;
}

impl Default for HashPolicy {
    fn default() -> Self {
        Self {
            ranked_hash: owned(RANKED_HASH_ATTRS),
            ranked_content: owned(RANKED_CONTENT_HASH_ATTRS),
            ranked_content_types: owned(RANKED_CONTENT_HASH_TYPES),
            default_hash: owned(DEFAULT_HASH_ATTRS),
            default_chash: owned(DEFAULT_CHASH_ATTRS),
            default_content: owned(DEFAULT_CONTENT_HASH_ATTRS),
            default_chain: owned(DEFAULT_CHAIN_ATTRS),
            default_chain_chash: owned(DEFAULT_CHAIN_CHASH_ATTRS),
        }
    }
}

impl HashPolicy {
    /// Built-in policy shared by callers that have no configuration
    pub fn global() -> &'static HashPolicy {
        &DEFAULT_POLICY
    }

    /// Build a policy from configuration
    ///
    /// Configured emitted attributes also imply their derived compressed and
    /// chain counterparts.
    pub fn from_config(section: &DigestSection) -> Self {
        let mut policy = Self::default();
        prepend(&mut policy.ranked_hash, &section.ranked_hash_attrs);
        prepend(&mut policy.ranked_hash, &section.hash_attrs);
        prepend(&mut policy.ranked_content_types, &section.ranked_content_hash_types);

        for attr in &section.hash_attrs {
            if policy.default_hash.contains(attr) {
                continue;
            }
            policy.default_hash.push(attr.clone());
            policy.default_chash.push(attr.replace("hash", "chash"));
            policy.default_chain.push(attr.replace("hash", "chain"));
            policy
                .default_chain_chash
                .push(attr.replace("hash", "chain.chashes"));
        }
        policy
    }

    /// Ranked attribute names for a kind, most preferred first
    pub fn ranked(&self, kind: HashKind) -> Vec<String> {
        match kind {
            HashKind::Hash => self.ranked_hash.clone(),
            HashKind::ContentHash => self.ranked_content.clone(),
            _ => {
                let to = kind.rename().unwrap_or("hash");
                self.ranked_hash.iter().map(|a| a.replace("hash", to)).collect()
            }
        }
    }

    /// Attributes emitted on publication for a kind
    pub fn defaults(&self, kind: HashKind) -> &[String] {
        match kind {
            HashKind::Hash => &self.default_hash,
            HashKind::Chash => &self.default_chash,
            HashKind::ContentHash => &self.default_content,
            HashKind::Chain => &self.default_chain,
            HashKind::ChainChash => &self.default_chain_chash,
        }
    }

    /// True when `attr` names a payload, compressed or content hash
    pub fn is_hash_attr(&self, attr: &str) -> bool {
        self.ranked(HashKind::Hash).iter().any(|a| a == attr)
            || self.ranked(HashKind::Chash).iter().any(|a| a == attr)
            || self.ranked_content.iter().any(|a| a == attr)
    }

    /// Algorithm computing a ranked attribute (or content hash type) of `kind`
    pub fn algorithm_for(&self, kind: HashKind, attr: &str) -> Option<HashAlgorithm> {
        match kind {
            HashKind::ContentHash => content_algorithm(attr),
            HashKind::Hash => hash_attr_algorithm(attr),
            _ => {
                let from = kind.rename()?;
                hash_attr_algorithm(&attr.replace(from, "hash"))
            }
        }
    }

    /// Most preferred hash present on `action`
    ///
    /// Falls back to the positional hash (SHA-1) for [`HashKind::Hash`] and to
    /// a value-less SHA-1 answer for [`HashKind::Chash`]; other kinds return
    /// all `None` when nothing matches.
    pub fn get_preferred_hash(&self, action: &Action, kind: HashKind) -> PreferredHash {
        if let Some(found) = self.scan(action, kind, &self.ranked(kind), &self.ranked_content_types) {
            return found;
        }
        fallback(action, kind)
    }

    /// Least preferred hash present on `action`
    ///
    /// This is the identifier payloads are stored under. With the legacy
    /// `hash` attribute emitted, the file hash is always the positional hash.
    /// Without an action, the least preferred attribute name is returned.
    pub fn get_least_preferred_hash(&self, action: Option<&Action>, kind: HashKind) -> PreferredHash {
        if kind == HashKind::Hash {
            match action {
                None => {
                    return PreferredHash {
                        attr: Some("hash".to_string()),
                        value: None,
                        algorithm: Some(HashAlgorithm::Sha1),
                    };
                }
                Some(action) if self.default_hash.iter().any(|a| a == "hash") => {
                    return PreferredHash {
                        attr: None,
                        value: action.hash.clone(),
                        algorithm: Some(HashAlgorithm::Sha1),
                    };
                }
                Some(_) => {}
            }
        }

        let mut ranked = self.ranked(kind);
        ranked.reverse();
        let mut types = self.ranked_content_types.clone();
        types.reverse();

        let Some(action) = action else {
            let Some(first) = ranked.first() else {
                return PreferredHash::default();
            };
            let algorithm = if first == CONTENT_HASH_ATTR {
                types.first().and_then(|t| content_algorithm(t))
            } else {
                self.algorithm_for(kind, first)
            };
            return PreferredHash {
                attr: Some(first.clone()),
                value: None,
                algorithm,
            };
        };

        if let Some(found) = self.scan(action, kind, &ranked, &types) {
            return found;
        }
        match kind {
            HashKind::Chash => PreferredHash {
                algorithm: Some(HashAlgorithm::Sha1),
                ..Default::default()
            },
            HashKind::Hash => fallback(action, kind),
            _ => PreferredHash::default(),
        }
    }

    /// Best ranked hash present on both `new` and `old`
    ///
    /// Only attributes (and content hash types) carried by both actions are
    /// candidates. When none is shared, both positional hashes are compared
    /// as SHA-1 if both exist; otherwise every field is `None`.
    pub fn get_common_preferred_hash(
        &self,
        new: &Action,
        old: Option<&Action>,
        kind: HashKind,
    ) -> CommonHash {
        let Some(old) = old else {
            return CommonHash::default();
        };

        for attr in self.ranked(kind) {
            let (Some(nv), Some(ov)) = (new.get(&attr), old.get(&attr)) else {
                continue;
            };

            if attr != CONTENT_HASH_ATTR {
                return CommonHash {
                    new: nv.first().map(str::to_string),
                    old: ov.first().map(str::to_string),
                    algorithm: self.algorithm_for(kind, &attr),
                    attr: Some(attr),
                };
            }

            let nh = content_hashes(nv.as_slice());
            let oh = content_hashes(ov.as_slice());
            for ch_type in &self.ranked_content_types {
                if let (Some(n), Some(o)) = (nh.get(ch_type.as_str()), oh.get(ch_type.as_str())) {
                    return CommonHash {
                        attr: Some(attr),
                        new: Some(n.to_string()),
                        old: Some(o.to_string()),
                        algorithm: content_algorithm(ch_type),
                    };
                }
            }
        }

        match (&new.hash, &old.hash) {
            (Some(n), Some(o)) => CommonHash {
                attr: None,
                new: Some(n.clone()),
                old: Some(o.clone()),
                algorithm: Some(HashAlgorithm::Sha1),
            },
            _ => CommonHash::default(),
        }
    }

    fn scan(
        &self,
        action: &Action,
        kind: HashKind,
        ranked: &[String],
        types: &[String],
    ) -> Option<PreferredHash> {
        for attr in ranked {
            let Some(value) = action.get(attr) else {
                continue;
            };
            if attr != CONTENT_HASH_ATTR {
                return Some(PreferredHash {
                    attr: Some(attr.clone()),
                    value: value.first().map(str::to_string),
                    algorithm: self.algorithm_for(kind, attr),
                });
            }
            let by_type = content_hashes(value.as_slice());
            for ch_type in types {
                if let Some(v) = by_type.get(ch_type.as_str()) {
                    return Some(PreferredHash {
                        attr: Some(attr.clone()),
                        value: Some(v.to_string()),
                        algorithm: content_algorithm(ch_type),
                    });
                }
            }
        }
        None
    }

    /// Digest a payload once for every emitted attribute of `kind`
    ///
    /// The `hash` attribute is keyed as `"hash"` and is the positional hash.
    pub fn compute_hashes<R: Read>(
        &self,
        reader: &mut R,
        kind: HashKind,
    ) -> io::Result<BTreeMap<String, String>> {
        let mut hashers: Vec<(String, Hasher)> = self
            .defaults(kind)
            .iter()
            .filter_map(|attr| {
                self.algorithm_for(kind, attr)
                    .map(|alg| (attr.clone(), Hasher::new(alg)))
            })
            .collect();

        let mut buffer = [0u8; BLOCK_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            for (_, hasher) in hashers.iter_mut() {
                hasher.update(&buffer[..n]);
            }
        }

        Ok(hashers
            .into_iter()
            .map(|(attr, hasher)| (attr, hasher.finalize().value))
            .collect())
    }

    /// Compress a payload and digest the compressed bytes
    ///
    /// `kind` is [`HashKind::Chash`] for payloads and
    /// [`HashKind::ChainChash`] for chain certificates. Returns the stored
    /// form alongside its hashes.
    pub fn compressed_attrs(
        &self,
        data: &[u8],
        kind: HashKind,
    ) -> Result<(Vec<u8>, BTreeMap<String, String>), CompressionError> {
        let packed = compression::compress(data)?;
        let hashes = self
            .compute_hashes(&mut &packed[..], kind)
            .map_err(|source| CompressionError::Compression {
                format: "gzip",
                source,
            })?;
        Ok((packed, hashes))
    }
}

fn fallback(action: &Action, kind: HashKind) -> PreferredHash {
    match kind {
        HashKind::Hash => PreferredHash {
            attr: None,
            value: action.hash.clone(),
            algorithm: Some(HashAlgorithm::Sha1),
        },
        HashKind::Chash => PreferredHash {
            algorithm: Some(HashAlgorithm::Sha1),
            ..Default::default()
        },
        _ => PreferredHash::default(),
    }
}

/// `extract_method:alg:value` strings keyed by their `extract_method:alg` prefix
fn content_hashes(values: &[String]) -> BTreeMap<&str, &str> {
    values
        .iter()
        .map(|v| match v.rsplit_once(':') {
            Some((prefix, _)) => (prefix, v.as_str()),
            None => (v.as_str(), v.as_str()),
        })
        .collect()
}

fn hash_attr_algorithm(attr: &str) -> Option<HashAlgorithm> {
    match attr {
        "hash" => Some(HashAlgorithm::Sha1),
        _ => attr.strip_prefix("pkg.hash.")?.parse().ok(),
    }
}

fn content_algorithm(name: &str) -> Option<HashAlgorithm> {
    match name {
        "elfhash" => Some(HashAlgorithm::Sha1),
        _ => name.strip_prefix("gelf:")?.parse().ok(),
    }
}

/// [`HashPolicy::get_preferred_hash`] under the built-in policy
pub fn get_preferred_hash(action: &Action, kind: HashKind) -> PreferredHash {
    HashPolicy::global().get_preferred_hash(action, kind)
}

/// [`HashPolicy::get_least_preferred_hash`] under the built-in policy
pub fn get_least_preferred_hash(action: Option<&Action>, kind: HashKind) -> PreferredHash {
    HashPolicy::global().get_least_preferred_hash(action, kind)
}

/// [`HashPolicy::get_common_preferred_hash`] under the built-in policy
pub fn get_common_preferred_hash(new: &Action, old: Option<&Action>, kind: HashKind) -> CommonHash {
    HashPolicy::global().get_common_preferred_hash(new, old, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn act(s: &str) -> Action {
        s.parse().unwrap()
    }

    #[test]
    fn test_derived_rankings() {
        let p = HashPolicy::default();
        assert_eq!(
            p.ranked(HashKind::Chash),
            vec!["pkg.chash.sha512_256", "pkg.chash.sha256", "chash"]
        );
        assert_eq!(
            p.ranked(HashKind::ChainChash),
            vec!["pkg.chain.chashes.sha512_256", "pkg.chain.chashes.sha256", "chain.chashes"]
        );
        assert_eq!(p.algorithm_for(HashKind::Chash, "chash"), Some(HashAlgorithm::Sha1));
        assert_eq!(
            p.algorithm_for(HashKind::Chain, "pkg.chain.sha256"),
            Some(HashAlgorithm::Sha256)
        );
        assert_eq!(
            p.algorithm_for(HashKind::ChainChash, "pkg.chain.chashes.sha512_256"),
            Some(HashAlgorithm::Sha512_256)
        );
    }

    #[test]
    fn test_unknown_kind_is_the_only_error() {
        assert!("chash".parse::<HashKind>().is_ok());
        assert!(matches!(
            "md5".parse::<HashKind>(),
            Err(HashError::UnknownHashKind(_))
        ));
    }

    #[test]
    fn test_preferred_hash_ranking() {
        let a = act("file abc path=x pkg.hash.sha256=s256");
        let p = get_preferred_hash(&a, HashKind::Hash);
        assert_eq!(p.attr.as_deref(), Some("pkg.hash.sha256"));
        assert_eq!(p.value.as_deref(), Some("s256"));
        assert_eq!(p.algorithm, Some(HashAlgorithm::Sha256));

        let b = act("file abc path=x pkg.hash.sha256=s256 pkg.hash.sha512_256=s512");
        assert_eq!(
            get_preferred_hash(&b, HashKind::Hash).attr.as_deref(),
            Some("pkg.hash.sha512_256")
        );
    }

    #[test]
    fn test_preferred_hash_fallbacks() {
        let a = act("file abc path=x");
        assert_eq!(
            get_preferred_hash(&a, HashKind::Hash),
            PreferredHash {
                attr: None,
                value: Some("abc".to_string()),
                algorithm: Some(HashAlgorithm::Sha1),
            }
        );
        assert_eq!(
            get_preferred_hash(&a, HashKind::Chash),
            PreferredHash {
                attr: None,
                value: None,
                algorithm: Some(HashAlgorithm::Sha1),
            }
        );
        assert_eq!(get_preferred_hash(&a, HashKind::ContentHash), PreferredHash::default());
        assert_eq!(get_preferred_hash(&a, HashKind::Chain), PreferredHash::default());
    }

    #[test]
    fn test_content_hash_types() {
        let a = act(
            "file abc path=x pkg.content-hash=gelf:sha256:aaa pkg.content-hash=file:sha256:bbb",
        );
        let p = get_preferred_hash(&a, HashKind::ContentHash);
        assert_eq!(p.attr.as_deref(), Some("pkg.content-hash"));
        assert_eq!(p.value.as_deref(), Some("gelf:sha256:aaa"));
        assert_eq!(p.algorithm, Some(HashAlgorithm::Sha256));

        let e = act("file abc path=x elfhash=e1");
        let p = get_preferred_hash(&e, HashKind::ContentHash);
        assert_eq!(p.attr.as_deref(), Some("elfhash"));
        assert_eq!(p.algorithm, Some(HashAlgorithm::Sha1));
    }

    #[test]
    fn test_least_preferred_hash() {
        let a = act("file abc path=x pkg.hash.sha256=s256");
        let p = get_least_preferred_hash(Some(&a), HashKind::Hash);
        assert_eq!(p.attr, None);
        assert_eq!(p.value.as_deref(), Some("abc"));

        let none = get_least_preferred_hash(None, HashKind::Hash);
        assert_eq!(none.attr.as_deref(), Some("hash"));
        assert_eq!(none.value, None);

        let c = act("file abc path=x chash=c1 pkg.chash.sha256=c2");
        let p = get_least_preferred_hash(Some(&c), HashKind::Chash);
        assert_eq!(p.attr.as_deref(), Some("chash"));
        assert_eq!(p.value.as_deref(), Some("c1"));

        let p = get_least_preferred_hash(None, HashKind::ContentHash);
        assert_eq!(p.attr.as_deref(), Some("elfhash"));
        assert_eq!(p.algorithm, Some(HashAlgorithm::Sha1));
    }

    #[test]
    fn test_common_preferred_hash_uses_shared_attrs() {
        let new = act("file n path=x pkg.hash.sha512_256=n512 pkg.hash.sha256=n256");
        let old = act("file o path=x pkg.hash.sha256=o256");
        let c = get_common_preferred_hash(&new, Some(&old), HashKind::Hash);
        assert_eq!(c.attr.as_deref(), Some("pkg.hash.sha256"));
        assert_eq!(c.new.as_deref(), Some("n256"));
        assert_eq!(c.old.as_deref(), Some("o256"));
        assert_eq!(c.algorithm, Some(HashAlgorithm::Sha256));
    }

    #[test]
    fn test_common_preferred_hash_falls_back_to_positional() {
        let new = act("file n path=x pkg.hash.sha512_256=n512");
        let old = act("file o path=x");
        let c = get_common_preferred_hash(&new, Some(&old), HashKind::Hash);
        assert_eq!(
            c,
            CommonHash {
                attr: None,
                new: Some("n".to_string()),
                old: Some("o".to_string()),
                algorithm: Some(HashAlgorithm::Sha1),
            }
        );

        let dir = act("dir path=x");
        assert_eq!(
            get_common_preferred_hash(&dir, Some(&dir.clone()), HashKind::Hash),
            CommonHash::default()
        );
        assert_eq!(get_common_preferred_hash(&new, None, HashKind::Hash), CommonHash::default());
    }

    #[test]
    fn test_from_config_only_grows() {
        let section = DigestSection {
            hash_attrs: vec!["pkg.hash.sha384".to_string()],
            ranked_hash_attrs: vec!["hash".to_string()],
            ranked_content_hash_types: vec!["gelf:sha384".to_string()],
        };
        let p = HashPolicy::from_config(&section);
        assert_eq!(
            p.ranked_hash,
            vec!["pkg.hash.sha384", "pkg.hash.sha512_256", "pkg.hash.sha256", "hash"]
        );
        assert_eq!(p.ranked_content_types[0], "gelf:sha384");
        assert_eq!(p.default_hash, vec!["hash", "pkg.hash.sha384"]);
        assert_eq!(p.default_chash, vec!["chash", "pkg.chash.sha384"]);
        for builtin in RANKED_HASH_ATTRS {
            assert!(p.ranked_hash.iter().any(|a| a == builtin));
        }
    }

    #[test]
    fn test_compute_hashes() {
        let section = DigestSection {
            hash_attrs: vec!["pkg.hash.sha256".to_string()],
            ..Default::default()
        };
        let p = HashPolicy::from_config(&section);
        let hashes = p.compute_hashes(&mut &b"abc"[..], HashKind::Hash).unwrap();
        assert_eq!(hashes["hash"], "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            hashes["pkg.hash.sha256"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_compressed_attrs() {
        let p = HashPolicy::default();
        let (packed, hashes) = p.compressed_attrs(b"abc", HashKind::Chash).unwrap();
        assert_eq!(hashes["chash"], crate::hash::sha1(&packed));
        assert_eq!(compression::decompress_auto(&packed).unwrap(), b"abc");

        let (_, chain) = p.compressed_attrs(b"abc", HashKind::ChainChash).unwrap();
        assert!(chain.contains_key("chain.chashes"));
    }
}
