// src/actions/mod.rs

//! Package actions
//!
//! An action is one declarative unit of package content: a file to deliver, a
//! directory, a dependency, a package attribute, a signature. Every action has
//! a kind, an optional positional hash, and a map of attributes whose values
//! are either a single string or a list of strings (repeated keys).
//!
//! The textual form is `kind [hash] key=value ...`:
//!
//! ```text
//! file 3f786850e387550fdab836ed7e6dc881de23001b path=usr/bin/ls mode=0555 owner=root group=bin
//! depend fmri=pkg:/library/libc@0.5.11 type=require
//! set name=pkg.summary value="core system utilities"
//! ```
//!
//! Kind-specific behaviour (key attribute, sort position, comparison and
//! search index overrides) is driven by [`ActionKind`] rather than by one type
//! per kind.

mod indices;
mod parser;

pub use indices::IndexEntry;
pub use parser::parse_action;

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

/// Version of the deterministic string form used for manifest signing
pub const SIG_VERSION: u32 = 0;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

fn next_instance() -> u64 {
    NEXT_INSTANCE.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Errors raised while building or parsing actions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("unknown action type '{kind}' in action '{action}'")]
    UnknownAction { action: String, kind: String },

    #[error("malformed action at position {position}: {reason}: {action}")]
    Malformed {
        action: String,
        position: usize,
        reason: String,
    },

    #[error("invalid action, {reason}: {action}")]
    Invalid { action: String, reason: String },

    #[error("action payload error for '{path}': {reason}")]
    Data { path: String, reason: String },

    #[error("unsupported signature version {version}")]
    UnsupportedSignatureVersion { version: u32 },
}

impl ActionError {
    pub(crate) fn invalid(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            action: action.into(),
            reason: reason.into(),
        }
    }
}

/// The closed set of action kinds this crate understands
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, Display, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum ActionKind {
    Set,
    Depend,
    Group,
    User,
    Dir,
    File,
    Hardlink,
    Link,
    Driver,
    License,
    Legacy,
    Signature,
}

impl ActionKind {
    /// Attribute that identifies an action of this kind within a manifest
    pub const fn key_attr(&self) -> &'static str {
        match self {
            Self::Set | Self::Driver => "name",
            Self::Depend => "fmri",
            Self::Group => "groupname",
            Self::User => "username",
            Self::Dir | Self::File | Self::Hardlink | Self::Link => "path",
            Self::License => "license",
            Self::Legacy => "pkg",
            Self::Signature => "value",
        }
    }

    /// Position of this kind in the canonical action ordering
    ///
    /// `license` has no slot of its own and sorts with unknown kinds.
    pub const fn ordinality(&self) -> u8 {
        match self {
            Self::Set => 0,
            Self::Depend => 1,
            Self::Group => 2,
            Self::User => 3,
            Self::Dir => 4,
            Self::File => 5,
            Self::Hardlink => 6,
            Self::Link => 7,
            Self::Driver => 8,
            Self::License => 9,
            Self::Legacy => 10,
            Self::Signature => 11,
        }
    }

    /// Whether actions of this kind always carry a payload
    pub const fn delivers_payload(&self) -> bool {
        matches!(self, Self::File | Self::License)
    }

    /// Whether the key attribute may be absent at construction time
    const fn key_attr_optional(&self) -> bool {
        matches!(self, Self::Set | Self::Signature)
    }

    const fn strips_path(&self) -> bool {
        matches!(self, Self::Dir | Self::File | Self::Hardlink | Self::Link)
    }
}

/// An attribute value: one string, or several for a repeated key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttrValue {
    Scalar(String),
    List(Vec<String>),
}

impl AttrValue {
    /// All values, one element for a scalar
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::Scalar(s) => std::slice::from_ref(s),
            Self::List(v) => v,
        }
    }

    /// The scalar value, `None` for lists
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::List(_) => None,
        }
    }

    pub fn first(&self) -> Option<&str> {
        self.as_slice().first().map(String::as_str)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Append a value, turning a scalar into a list
    pub fn push(&mut self, value: String) {
        match self {
            Self::Scalar(s) => {
                let first = std::mem::take(s);
                *self = Self::List(vec![first, value]);
            }
            Self::List(v) => v.push(value),
        }
    }

    /// Equality where two lists compare as multisets
    pub fn eq_unordered(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => {
                let mut a: Vec<&String> = a.iter().collect();
                let mut b: Vec<&String> = b.iter().collect();
                a.sort();
                b.sort();
                a == b
            }
            _ => self == other,
        }
    }

    /// Space-joined form, used for attributes whose lists are encoded as one value
    pub fn joined(&self) -> Cow<'_, str> {
        match self {
            Self::Scalar(s) => Cow::Borrowed(s),
            Self::List(v) => Cow::Owned(v.join(" ")),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Scalar(s)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

/// Identity of an action within its kind
///
/// Actions lacking their key attribute get a per-instance key, so two of
/// them never match each other even when otherwise identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKey {
    Attr(String),
    Instance(u64),
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attr(s) => write!(f, "{}", s),
            Self::Instance(n) => write!(f, "<instance {}>", n),
        }
    }
}

/// Lazily opened payload for actions that deliver content
pub trait PayloadSource: fmt::Debug + Send + Sync {
    /// Open a fresh reader over the payload bytes
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>>;

    /// Payload length if known without reading it
    fn size_hint(&self) -> Option<u64> {
        None
    }
}

/// Payload backed by a file on disk
#[derive(Debug, Clone)]
pub struct FilePayload {
    path: PathBuf,
}

impl FilePayload {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PayloadSource for FilePayload {
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn size_hint(&self) -> Option<u64> {
        std::fs::metadata(&self.path).ok().map(|m| m.len())
    }
}

/// Payload held in memory
#[derive(Debug, Clone)]
pub struct BytesPayload {
    data: Arc<Vec<u8>>,
}

impl BytesPayload {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::new(data.into()),
        }
    }
}

impl PayloadSource for BytesPayload {
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(Cursor::new(self.data.as_slice())))
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

/// Quote an attribute value for the textual action form
pub fn quote_attr_value(s: &str) -> Cow<'_, str> {
    if s.contains(' ') || s.contains('\'') || s.contains('"') || s.is_empty() {
        if !s.contains('"') {
            Cow::Owned(format!("\"{}\"", s))
        } else if !s.contains('\'') {
            Cow::Owned(format!("'{}'", s))
        } else {
            Cow::Owned(format!("\"{}\"", s.replace('"', "\\\"")))
        }
    } else {
        Cow::Borrowed(s)
    }
}

/// One package action
#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    /// Positional content hash
    pub hash: Option<String>,
    pub attrs: BTreeMap<String, AttrValue>,
    payload: Option<Arc<dyn PayloadSource>>,
    instance: u64,
}

impl Action {
    /// Build an action, applying the per-kind construction rules
    ///
    /// The key attribute must be present (except for `set` and `signature`)
    /// and single-valued (except for `depend type=require-any`). Leading
    /// slashes are removed from `path`.
    pub fn new(
        kind: ActionKind,
        hash: Option<String>,
        attrs: BTreeMap<String, AttrValue>,
    ) -> Result<Self, ActionError> {
        let mut action = Self {
            kind,
            hash,
            attrs,
            payload: None,
            instance: next_instance(),
        };

        let key_attr = kind.key_attr();
        match action.attrs.get(key_attr) {
            None if !kind.key_attr_optional() => {
                return Err(ActionError::invalid(
                    action.to_string(),
                    format!("no value specified for key attribute '{}'", key_attr),
                ));
            }
            Some(AttrValue::List(_))
                if !(kind == ActionKind::Depend
                    && action.attr_str("type") == Some("require-any")) =>
            {
                return Err(ActionError::invalid(
                    action.to_string(),
                    format!("{} attribute may only be specified once", key_attr),
                ));
            }
            _ => {}
        }

        if kind.strips_path()
            && let Some(AttrValue::Scalar(path)) = action.attrs.get_mut("path")
        {
            let stripped = path.trim_start_matches('/').to_string();
            if stripped.is_empty() {
                return Err(ActionError::invalid(action.to_string(), "Empty path attribute"));
            }
            *path = stripped;
        }

        if kind == ActionKind::Signature {
            if !action.attrs.contains_key("algorithm") {
                return Err(ActionError::invalid(
                    action.to_string(),
                    "Missing algorithm attribute",
                ));
            }
            action
                .attrs
                .entry("value".to_string())
                .or_insert_with(|| AttrValue::from(""));
            action
                .attrs
                .entry("version".to_string())
                .or_insert_with(|| AttrValue::Scalar(SIG_VERSION.to_string()));
        }

        Ok(action)
    }

    /// Convenience constructor from `(key, value)` pairs; repeated keys form lists
    pub fn from_pairs<'a, I>(kind: ActionKind, hash: Option<&str>, pairs: I) -> Result<Self, ActionError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut attrs: BTreeMap<String, AttrValue> = BTreeMap::new();
        for (k, v) in pairs {
            add_attr(&mut attrs, k, v.to_string());
        }
        Self::new(kind, hash.map(str::to_string), attrs)
    }

    /// Kind name as written in manifests
    pub fn name(&self) -> &str {
        self.kind.as_ref()
    }

    pub fn key_attr(&self) -> &'static str {
        self.kind.key_attr()
    }

    /// Identity key within the action's kind
    pub fn key(&self) -> ActionKey {
        match self.attrs.get(self.key_attr()) {
            Some(v) => ActionKey::Attr(v.joined().into_owned()),
            None => ActionKey::Instance(self.instance),
        }
    }

    /// `"kind: key"` for messages
    pub fn distinguished_name(&self) -> String {
        format!("{}: {}", self.name(), self.key())
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    pub fn has_attr(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    /// First value of an attribute
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(AttrValue::first)
    }

    /// All values of an attribute, empty when absent
    pub fn attr_list(&self, key: &str) -> Vec<&str> {
        self.attrs
            .get(key)
            .map(|v| v.as_slice().iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<AttrValue> {
        self.attrs.remove(key)
    }

    pub fn with_payload(mut self, payload: Arc<dyn PayloadSource>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn set_payload(&mut self, payload: Option<Arc<dyn PayloadSource>>) {
        self.payload = payload;
    }

    pub fn payload(&self) -> Option<&Arc<dyn PayloadSource>> {
        self.payload.as_ref()
    }

    /// Whether this action delivers content
    ///
    /// Signature actions deliver a certificate only when they carry a hash.
    pub fn has_payload(&self) -> bool {
        match self.kind {
            ActionKind::Signature => self.hash.is_some(),
            kind => kind.delivers_payload(),
        }
    }

    /// Payload size from `pkg.size`; signatures add their chain certificates
    pub fn get_size(&self) -> u64 {
        let base = self
            .attr_str("pkg.size")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        if self.kind != ActionKind::Signature {
            return base;
        }
        base + sum_sizes(self.attrs.get("chain.sizes"))
    }

    /// `variant.*` and `facet.*` attribute names on this action
    pub fn varcet_keys(&self) -> (Vec<&str>, Vec<&str>) {
        let mut variants = Vec::new();
        let mut facets = Vec::new();
        for key in self.attrs.keys() {
            if key.starts_with("variant.") {
                variants.push(key.as_str());
            } else if key.starts_with("facet.") {
                facets.push(key.as_str());
            }
        }
        (variants, facets)
    }

    /// Canonical ordering: kind ordinality, then per-kind comparison
    ///
    /// Directories order by path; everything else by creation order.
    pub fn cmp_order(&self, other: &Self) -> Ordering {
        self.kind
            .ordinality()
            .cmp(&other.kind.ordinality())
            .then_with(|| match (self.kind, other.kind) {
                (ActionKind::Dir, ActionKind::Dir) => {
                    self.attr_str("path").cmp(&other.attr_str("path"))
                }
                _ => Ordering::Equal,
            })
            .then_with(|| self.instance.cmp(&other.instance))
    }

    fn attrs_differ(&self, other: &Self) -> bool {
        if self.attrs.len() != other.attrs.len()
            || self.attrs.keys().any(|k| !other.attrs.contains_key(k))
        {
            return true;
        }
        self.attrs
            .iter()
            .any(|(k, v)| other.attrs.get(k).is_none_or(|o| !v.eq_unordered(o)))
    }

    /// True when `other` is a non-ignorable change from `self`
    ///
    /// Attribute sets and values are compared (lists as multisets), then the
    /// positional hash. File actions that both carry an ELF content hash
    /// compare attributes only: the content hash already covers what matters
    /// and the raw payload hash may legitimately differ.
    pub fn different(&self, other: &Self) -> bool {
        if self.kind == ActionKind::File
            && other.kind == ActionKind::File
            && ((self.has_attr("elfhash") && other.has_attr("elfhash"))
                || (self.has_attr("pkg.content-hash") && other.has_attr("pkg.content-hash")))
        {
            return self.attrs_differ(other);
        }
        self.attrs_differ(other) || self.hash != other.hash
    }

    /// Attribute names whose values differ between the two actions
    pub fn differences(&self, other: &Self) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = self
            .attrs
            .keys()
            .filter(|k| !other.attrs.contains_key(*k))
            .chain(other.attrs.keys().filter(|k| !self.attrs.contains_key(*k)))
            .cloned()
            .collect();
        for (k, v) in &self.attrs {
            if let Some(o) = other.attrs.get(k)
                && !v.eq_unordered(o)
            {
                keys.insert(k.clone());
            }
        }
        keys
    }

    /// Deterministic string form used as signing input
    ///
    /// Same shape as the manifest form but list values are sorted. Signature
    /// actions override this in [`crate::signature`].
    pub fn sig_str(&self, version: u32) -> Result<String, ActionError> {
        if version != SIG_VERSION {
            return Err(ActionError::UnsupportedSignatureVersion { version });
        }
        let mut out = self.name().to_string();
        if let Some(hash) = &self.hash {
            out.push(' ');
            out.push_str(hash);
        }
        for (k, v) in &self.attrs {
            match v {
                AttrValue::Scalar(s) => push_attr(&mut out, k, s),
                AttrValue::List(list) => {
                    let mut sorted: Vec<&String> = list.iter().collect();
                    sorted.sort();
                    for s in sorted {
                        push_attr(&mut out, k, s);
                    }
                }
            }
        }
        Ok(out)
    }

    /// True when both values are the same constructed action (or clones of it)
    pub fn is_same_instance(&self, other: &Self) -> bool {
        self.instance == other.instance
    }

    /// Search index tuples for this action
    pub fn generate_indices(&self) -> Vec<IndexEntry> {
        indices::generate(self)
    }
}

/// Equality over kind, hash and attributes; payload and identity are ignored
impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.hash == other.hash && self.attrs == other.attrs
    }
}

impl Eq for Action {}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = self.name().to_string();
        // A hash that cannot stand as a bare token is written as an attribute.
        let hash_attr = match &self.hash {
            Some(h) if h.contains('=') || h.contains(' ') => Some(AttrValue::Scalar(h.clone())),
            Some(h) => {
                out.push(' ');
                out.push_str(h);
                None
            }
            None => None,
        };

        let mut entries: Vec<(&str, &AttrValue)> =
            self.attrs.iter().map(|(k, v)| (k.as_str(), v)).collect();
        if let Some(h) = &hash_attr {
            entries.push(("hash", h));
            entries.sort_by(|a, b| a.0.cmp(b.0));
        }

        for (k, v) in entries {
            for s in v.as_slice() {
                push_attr(&mut out, k, s);
            }
        }
        f.write_str(&out)
    }
}

impl FromStr for Action {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_action(s)
    }
}

fn push_attr(out: &mut String, key: &str, value: &str) {
    out.push(' ');
    out.push_str(key);
    out.push('=');
    out.push_str(&quote_attr_value(value));
}

/// Insert a value, converting repeated keys into lists
pub(crate) fn add_attr(attrs: &mut BTreeMap<String, AttrValue>, key: &str, value: String) {
    match attrs.get_mut(key) {
        Some(existing) => existing.push(value),
        None => {
            attrs.insert(key.to_string(), AttrValue::Scalar(value));
        }
    }
}

/// Sum a space-separated size list such as `chain.sizes`
pub(crate) fn sum_sizes(value: Option<&AttrValue>) -> u64 {
    value
        .map(|v| {
            v.joined()
                .split_whitespace()
                .filter_map(|s| s.parse::<u64>().ok())
                .sum()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn act(s: &str) -> Action {
        s.parse().unwrap()
    }

    #[test]
    fn test_kind_table() {
        assert_eq!(ActionKind::File.key_attr(), "path");
        assert_eq!(ActionKind::Signature.key_attr(), "value");
        assert_eq!("hardlink".parse::<ActionKind>().unwrap(), ActionKind::Hardlink);
        assert_eq!(ActionKind::Depend.to_string(), "depend");
        assert!(ActionKind::Set.ordinality() < ActionKind::Dir.ordinality());
        assert!(ActionKind::Dir.ordinality() < ActionKind::File.ordinality());
        assert!(ActionKind::License.ordinality() < ActionKind::Signature.ordinality());
    }

    #[test]
    fn test_quote_attr_value() {
        assert_eq!(quote_attr_value("plain"), "plain");
        assert_eq!(quote_attr_value(""), "\"\"");
        assert_eq!(quote_attr_value("two words"), "\"two words\"");
        assert_eq!(quote_attr_value("say \"hi\""), "'say \"hi\"'");
        assert_eq!(quote_attr_value("it's \"x\""), "\"it's \\\"x\\\"\"");
    }

    #[test]
    fn test_display_sorts_attributes_and_repeats_lists() {
        let a = act("depend type=require-any fmri=pkg:/b fmri=pkg:/a");
        assert_eq!(a.to_string(), "depend fmri=pkg:/b fmri=pkg:/a type=require-any");
        assert_eq!(
            a.sig_str(SIG_VERSION).unwrap(),
            "depend fmri=pkg:/a fmri=pkg:/b type=require-any"
        );
    }

    #[test]
    fn test_sig_str_rejects_unknown_version() {
        let a = act("dir path=usr mode=0755");
        assert_eq!(
            a.sig_str(1),
            Err(ActionError::UnsupportedSignatureVersion { version: 1 })
        );
    }

    #[test]
    fn test_path_is_stripped() {
        let a = act("dir path=/usr/bin mode=0755");
        assert_eq!(a.attr_str("path"), Some("usr/bin"));
        assert!(matches!(
            "dir path=/ mode=0755".parse::<Action>(),
            Err(ActionError::Invalid { .. })
        ));
    }

    #[test]
    fn test_key_attr_single_valued() {
        assert!(matches!(
            "file abc path=a path=b".parse::<Action>(),
            Err(ActionError::Invalid { .. })
        ));
        assert!("depend type=require-any fmri=a fmri=b".parse::<Action>().is_ok());
    }

    #[test]
    fn test_signature_defaults() {
        let a = act("signature algorithm=sha256");
        assert_eq!(a.attr_str("value"), Some(""));
        assert_eq!(a.attr_str("version"), Some("0"));
        assert!(!a.has_payload());
        assert!(matches!(
            Action::from_pairs(ActionKind::Signature, None, [("value", "x")]),
            Err(ActionError::Invalid { .. })
        ));
    }

    #[test]
    fn test_instance_keys_never_match() {
        let a = Action::from_pairs(ActionKind::Set, None, [("value", "x")]).unwrap();
        let b = Action::from_pairs(ActionKind::Set, None, [("value", "x")]).unwrap();
        assert!(matches!(a.key(), ActionKey::Instance(_)));
        assert_ne!(a.key(), b.key());
        assert_eq!(a, b);
        assert_eq!(a.clone().key(), a.key());
    }

    #[test]
    fn test_different_generic() {
        let a = act("dir path=usr mode=0755 owner=root group=bin");
        let b = act("dir path=usr mode=0755 group=bin owner=root");
        assert!(!a.different(&b));
        let c = act("dir path=usr mode=0700 owner=root group=bin");
        assert!(a.different(&c));
        assert_eq!(a.differences(&c).into_iter().collect::<Vec<_>>(), vec!["mode"]);
        let d = act("dir path=usr mode=0755 owner=root");
        assert!(a.different(&d));
        assert!(a.differences(&d).contains("group"));
    }

    #[test]
    fn test_different_lists_compare_unordered() {
        let a = act("depend type=require-any fmri=a fmri=b");
        let b = act("depend type=require-any fmri=b fmri=a");
        assert!(!a.different(&b));
    }

    #[test]
    fn test_different_compares_hash() {
        let a = act("file aaa path=bin/x mode=0555");
        let b = act("file bbb path=bin/x mode=0555");
        assert!(a.different(&b));
    }

    #[test]
    fn test_file_with_elfhash_ignores_payload_hash() {
        let a = act("file aaa path=bin/x mode=0555 elfhash=123");
        let b = act("file bbb path=bin/x mode=0555 elfhash=123");
        assert!(!a.different(&b));
        let c = act("file bbb path=bin/x mode=0555 elfhash=456");
        assert!(a.different(&c));
        // Only one side has an ELF hash: fall back to the generic rules.
        let d = act("file aaa path=bin/x mode=0555");
        let e = act("file bbb path=bin/x mode=0555");
        assert!(d.different(&e));
    }

    #[test]
    fn test_cmp_order() {
        let set = act("set name=pkg.summary value=x");
        let dir_b = act("dir path=b mode=0755");
        let dir_a = act("dir path=a mode=0755");
        let file = act("file abc path=a/f");
        let sig = act("signature algorithm=sha256");
        let mut all = vec![sig.clone(), file.clone(), dir_b.clone(), set.clone(), dir_a.clone()];
        all.sort_by(|a, b| a.cmp_order(b));
        let names: Vec<String> = all.iter().map(|a| a.distinguished_name()).collect();
        assert_eq!(
            names,
            vec![
                "set: pkg.summary",
                "dir: a",
                "dir: b",
                "file: a/f",
                "signature: "
            ]
        );
    }

    #[test]
    fn test_get_size() {
        assert_eq!(act("file abc path=x pkg.size=42").get_size(), 42);
        assert_eq!(act("dir path=x").get_size(), 0);
        let sig = act("signature abc algorithm=rsa-sha256 pkg.size=10 chain.sizes=\"5 7\"");
        assert_eq!(sig.get_size(), 22);
    }

    #[test]
    fn test_varcet_keys() {
        let a = act("file abc path=x variant.arch=i386 facet.doc=true mode=0444");
        let (v, f) = a.varcet_keys();
        assert_eq!(v, vec!["variant.arch"]);
        assert_eq!(f, vec!["facet.doc"]);
    }

    #[test]
    fn test_payload_sources() {
        let a = act("file abc path=x").with_payload(Arc::new(BytesPayload::new(b"hi".to_vec())));
        let mut buf = Vec::new();
        a.payload().unwrap().open().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hi");
        assert!(a.has_payload());
    }
}
