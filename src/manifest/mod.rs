// src/manifest/mod.rs

//! Package manifests
//!
//! A manifest is the complete set of actions making up one package version,
//! plus the package-wide attributes declared by its `set` actions. This
//! module parses and renders the manifest text format; [`diff`] compares
//! manifests and [`search`] builds the search index from one.
//!
//! ```text
//! # comments and blank lines are ignored
//! set name=pkg.fmri value=pkg://test/web/server@2.4,5.11-1
//! dir path=usr/apache2 mode=0755 owner=root group=bin
//! file 3f786850e387550fdab836ed7e6dc881de23001b path=usr/apache2/bin/httpd \
//!     mode=0555 owner=root group=bin pkg.size=1024
//! ```

pub mod diff;
pub mod search;

pub use diff::{ActionPair, Comm, DuplicateGroup, ManifestDifference};
pub use search::{SearchIndex, SearchRef};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::actions::{Action, ActionError, ActionKind, AttrValue};
use crate::error::{Error, Result};
use crate::fmri::Fmri;
use crate::hash;

/// Predicate deciding whether an action takes part in an operation
///
/// Operations accept a chain of these; an action is kept only if every
/// predicate returns `true`.
pub type ActionFilter<'a> = &'a dyn Fn(&Action) -> bool;

/// Manifest errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ManifestError {
    #[error("{} line {line}: {source}", fmri.as_deref().unwrap_or("manifest"))]
    Parse {
        fmri: Option<String>,
        line: usize,
        #[source]
        source: ActionError,
    },

    #[error("Attribute value '{value}' for '{key}' is not 'true' or 'false'")]
    InvalidBool { key: String, value: String },
}

/// Keep an action only if every filter accepts it
pub fn include_action(action: &Action, excludes: &[ActionFilter<'_>]) -> bool {
    excludes.iter().all(|f| f(action))
}

/// Filter accepting actions compatible with the given variant values
///
/// An action tagged `variant.arch=sparc` is dropped when `variants` maps
/// `variant.arch` to anything else; untagged actions always pass.
pub fn variant_filter(variants: &BTreeMap<String, String>) -> impl Fn(&Action) -> bool + '_ {
    move |action: &Action| {
        action
            .attrs
            .iter()
            .filter(|(k, _)| k.starts_with("variant."))
            .all(|(k, v)| match variants.get(k) {
                Some(wanted) => v.as_slice().iter().any(|x| x == wanted),
                None => true,
            })
    }
}

/// One package version's actions and attributes
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Package this manifest describes, if known
    pub fmri: Option<Fmri>,
    actions: Vec<Action>,
    by_type: BTreeMap<ActionKind, Vec<usize>>,
    variants: BTreeMap<String, BTreeSet<String>>,
    facets: BTreeMap<String, BTreeSet<String>>,
    attributes: BTreeMap<String, AttrValue>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// The empty manifest; every action of another manifest is new against it
    pub fn null() -> Self {
        Self::default()
    }

    /// Build a manifest from already-parsed actions
    pub fn from_actions<I: IntoIterator<Item = Action>>(actions: I) -> Self {
        let mut m = Self::new();
        for action in actions {
            m.add_action(action);
        }
        m
    }

    /// Replace the manifest contents with the parsed text
    ///
    /// Lines are left-trimmed; a trailing backslash joins a line with the
    /// next. Blank lines and `#` comments are skipped. Errors name the
    /// manifest's FMRI and the (last physical) line number.
    pub fn set_content(&mut self, content: &str) -> std::result::Result<(), ManifestError> {
        self.actions.clear();
        self.by_type.clear();
        self.variants.clear();
        self.facets.clear();
        self.attributes.clear();

        let mut accumulate = String::new();
        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim_start();
            if let Some(head) = line.strip_suffix('\\') {
                accumulate.push_str(head);
                continue;
            }
            let joined;
            let line = if accumulate.is_empty() {
                line
            } else {
                accumulate.push_str(line);
                joined = std::mem::take(&mut accumulate);
                joined.as_str()
            };

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let action = line.parse::<Action>().map_err(|source| ManifestError::Parse {
                fmri: self.fmri.as_ref().map(Fmri::to_string),
                line: idx + 1,
                source,
            })?;
            self.add_action(action);
        }

        debug!(
            "Loaded manifest {} with {} actions",
            self.fmri.as_ref().map(Fmri::to_string).unwrap_or_default(),
            self.actions.len()
        );
        Ok(())
    }

    fn add_action(&mut self, mut action: Action) {
        if let Some(zone) = action.get("opensolaris.zone").cloned()
            && !action.has_attr("variant.opensolaris.zone")
        {
            action.set_attr("variant.opensolaris.zone", zone);
        }

        if action.kind == ActionKind::Set && action.attr_str("name") == Some("authority") {
            action.set_attr("name", "publisher");
        }

        if let Some(AttrValue::Scalar(path)) = action.attrs.get_mut("path")
            && path.starts_with('/')
        {
            *path = path.trim_start_matches('/').to_string();
        }

        if action.kind == ActionKind::Set {
            self.fill_attributes(&action);
        }

        let (variants, facets) = action.varcet_keys();
        for (keys, dest) in [(variants, &mut self.variants), (facets, &mut self.facets)] {
            for key in keys {
                if let Some(value) = action.get(key) {
                    dest.entry(key.to_string())
                        .or_default()
                        .extend(value.as_slice().iter().cloned());
                }
            }
        }

        self.by_type
            .entry(action.kind)
            .or_default()
            .push(self.actions.len());
        self.actions.push(action);
    }

    fn fill_attributes(&mut self, action: &Action) {
        let (Some(name), Some(value)) = (action.attr_str("name"), action.get("value")) else {
            return;
        };
        let key = if name == "fmri" { "pkg.fmri" } else { name };
        self.attributes
            .entry(key.to_string())
            .or_insert_with(|| value.clone());
    }

    /// All actions, in manifest order
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions surviving the filter chain, in manifest order
    pub fn gen_actions<'a, 'f>(
        &'a self,
        excludes: &'f [ActionFilter<'f>],
    ) -> impl Iterator<Item = &'a Action> {
        self.actions.iter().filter(move |a| include_action(a, excludes))
    }

    /// Actions of one kind surviving the filter chain
    pub fn gen_actions_by_type<'a, 'f>(
        &'a self,
        kind: ActionKind,
        excludes: &'f [ActionFilter<'f>],
    ) -> impl Iterator<Item = &'a Action> {
        self.by_type
            .get(&kind)
            .into_iter()
            .flatten()
            .map(move |&i| &self.actions[i])
            .filter(move |a| include_action(a, excludes))
    }

    /// Key attribute values of one kind
    pub fn gen_key_attribute_value_by_type<'a, 'f>(
        &'a self,
        kind: ActionKind,
        excludes: &'f [ActionFilter<'f>],
    ) -> impl Iterator<Item = &'a AttrValue> {
        self.gen_actions_by_type(kind, excludes)
            .filter_map(|a| a.get(a.key_attr()))
    }

    /// Package attributes declared by `set` actions
    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Boolean package attribute
    pub fn get_bool(&self, key: &str, default: bool) -> std::result::Result<bool, ManifestError> {
        let Some(value) = self.attributes.get(key).and_then(AttrValue::first) else {
            return Ok(default);
        };
        match value.to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ManifestError::InvalidBool {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Set a package attribute
    ///
    /// The `set` action declaring it is updated in place, or a new one is
    /// appended, so the attribute map and the action list never disagree.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<AttrValue>) -> Result<()> {
        let value = value.into();
        self.attributes.insert(key.to_string(), value.clone());

        if let Some(idxs) = self.by_type.get(&ActionKind::Set) {
            for &i in idxs {
                if self.actions[i].attr_str("name") == Some(key) {
                    self.actions[i].set_attr("value", value);
                    return Ok(());
                }
            }
        }

        let mut attrs = BTreeMap::new();
        attrs.insert("name".to_string(), AttrValue::from(key));
        attrs.insert("value".to_string(), value);
        let action = Action::new(ActionKind::Set, None, attrs)?;
        self.by_type
            .entry(ActionKind::Set)
            .or_default()
            .push(self.actions.len());
        self.actions.push(action);
        Ok(())
    }

    /// Values seen for a variant attribute on any action
    pub fn get_variants(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.variants.get(name)
    }

    /// Variants declared package-wide through `set name=variant.*`
    pub fn get_all_variants(&self) -> BTreeMap<&str, &AttrValue> {
        self.attributes
            .iter()
            .filter(|(k, _)| k.starts_with("variant."))
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    }

    /// Variant values harvested from action tags
    pub fn variants(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.variants
    }

    /// Facet values harvested from action tags
    pub fn facets(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.facets
    }

    /// Total payload size in bytes from `pkg.size`
    pub fn get_size(&self, excludes: &[ActionFilter<'_>]) -> u64 {
        self.gen_actions(excludes)
            .map(|a| {
                a.attr_str("pkg.size")
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(0)
            })
            .sum()
    }

    /// SHA-1 of manifest text, as recorded for manifest signatures
    pub fn hash_create(content: &str) -> String {
        hash::sha1(content.as_bytes())
    }

    fn fmri_line(&self) -> Option<String> {
        match &self.fmri {
            Some(fmri) if !self.attributes.contains_key("pkg.fmri") => {
                Some(format!("set name=pkg.fmri value={}\n", fmri))
            }
            _ => None,
        }
    }

    /// Manifest text in the order actions were added
    pub fn to_string_unsorted(&self) -> String {
        let mut out = self.fmri_line().unwrap_or_default();
        for action in &self.actions {
            out.push_str(&action.to_string());
            out.push('\n');
        }
        out
    }

    /// Write the manifest to `path`, replacing any existing file atomically
    pub fn store(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| Error::from_io(e, dir))?;

        let prefix = format!(
            "{}.",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .tempfile_in(dir)
            .map_err(|e| Error::from_io(e, dir))?;
        tmp.write_all(self.to_string_unsorted().as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))
                .map_err(|e| Error::from_io(e, tmp.path()))?;
        }

        tmp.persist(path).map_err(|e| Error::from_io(e.error, path))?;
        debug!("Stored manifest at {}", path.display());
        Ok(())
    }
}

/// Sorted manifest text
impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(line) = self.fmri_line() {
            f.write_str(&line)?;
        }
        let mut sorted: Vec<&Action> = self.actions.iter().collect();
        sorted.sort_by(|a, b| a.cmp_order(b));
        for action in sorted {
            writeln!(f, "{}", action)?;
        }
        Ok(())
    }
}

impl FromStr for Manifest {
    type Err = ManifestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut m = Self::new();
        m.set_content(s)?;
        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# sample package
set name=pkg.fmri value=pkg://test/web/server@2.4,5.11-1
set name=pkg.summary value=\"web server\"
set name=pkg.summary value=ignored
set name=fmri value=pkg:/other@1.0
dir path=/usr/apache2 mode=0755 owner=root group=bin

file 3f78 path=usr/apache2/bin/httpd \\
    mode=0555 owner=root group=bin pkg.size=1024 variant.arch=i386
file 4a5b path=usr/apache2/bin/ab mode=0555 pkg.size=16 variant.arch=sparc facet.doc=true
";

    #[test]
    fn test_set_content() {
        let m: Manifest = SAMPLE.parse().unwrap();
        assert_eq!(m.len(), 7);
        assert_eq!(m.gen_actions_by_type(ActionKind::File, &[]).count(), 2);
        assert_eq!(m.gen_actions_by_type(ActionKind::Link, &[]).count(), 0);
        assert_eq!(
            m.get("pkg.summary").and_then(AttrValue::first),
            Some("web server")
        );
        assert_eq!(
            m.get("pkg.fmri").and_then(AttrValue::first),
            Some("pkg://test/web/server@2.4,5.11-1")
        );
        assert_eq!(m.get_size(&[]), 1040);

        let dir = m.gen_actions_by_type(ActionKind::Dir, &[]).next().unwrap();
        assert_eq!(dir.attr_str("path"), Some("usr/apache2"));

        let arch = m.get_variants("variant.arch").unwrap();
        assert!(arch.contains("i386") && arch.contains("sparc"));
        assert!(m.facets().contains_key("facet.doc"));
    }

    #[test]
    fn test_parse_error_carries_line() {
        let mut m = Manifest::new();
        m.fmri = Some(Fmri::parse("pkg:/broken@1.0").unwrap());
        let err = m.set_content("dir path=a\n\nfile path=\"x\n").unwrap_err();
        match err {
            ManifestError::Parse { fmri, line, .. } => {
                assert_eq!(line, 3);
                assert_eq!(fmri.as_deref(), Some("pkg:/broken@1.0,5.11"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_legacy_translations() {
        let m: Manifest = "set name=authority value=opensolaris.org\n\
                           dir path=var opensolaris.zone=global"
            .parse()
            .unwrap();
        assert!(m.contains("publisher"));
        assert!(!m.contains("authority"));
        let dir = &m.actions()[1];
        assert_eq!(dir.attr_str("variant.opensolaris.zone"), Some("global"));
    }

    #[test]
    fn test_variant_filter() {
        let m: Manifest = SAMPLE.parse().unwrap();
        let mut wanted = BTreeMap::new();
        wanted.insert("variant.arch".to_string(), "sparc".to_string());
        let filter = variant_filter(&wanted);
        let excludes: [ActionFilter<'_>; 1] = [&filter];
        let files: Vec<_> = m
            .gen_actions_by_type(ActionKind::File, &excludes)
            .map(|a| a.attr_str("path").unwrap())
            .collect();
        assert_eq!(files, vec!["usr/apache2/bin/ab"]);
        assert_eq!(m.get_size(&excludes), 16);
    }

    #[test]
    fn test_set_attribute_keeps_actions_consistent() {
        let mut m: Manifest = "set name=pkg.summary value=old\n".parse().unwrap();
        m.set_attribute("pkg.summary", "new").unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m.actions()[0].attr_str("value"), Some("new"));

        m.set_attribute("pkg.description", "longer text").unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.gen_actions_by_type(ActionKind::Set, &[]).count(), 2);
        assert_eq!(
            m.get("pkg.description").and_then(AttrValue::first),
            Some("longer text")
        );
    }

    #[test]
    fn test_get_bool() {
        let m: Manifest = "set name=pkg.obsolete value=True\nset name=pkg.renamed value=maybe\n"
            .parse()
            .unwrap();
        assert!(m.get_bool("pkg.obsolete", false).unwrap());
        assert!(!m.get_bool("pkg.missing", false).unwrap());
        assert!(matches!(
            m.get_bool("pkg.renamed", false),
            Err(ManifestError::InvalidBool { .. })
        ));
    }

    #[test]
    fn test_display_sorted_with_fmri() {
        let mut m: Manifest = "file abc path=b\ndir path=a\n".parse().unwrap();
        m.fmri = Some(Fmri::parse("pkg:/x@1.0").unwrap());
        assert_eq!(
            m.to_string(),
            "set name=pkg.fmri value=pkg:/x@1.0,5.11\ndir path=a\nfile abc path=b\n"
        );
        assert_eq!(
            m.to_string_unsorted(),
            "set name=pkg.fmri value=pkg:/x@1.0,5.11\nfile abc path=b\ndir path=a\n"
        );
    }

    #[test]
    fn test_hash_create() {
        assert_eq!(
            Manifest::hash_create("abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let m: Manifest = SAMPLE.parse().unwrap();
        let path = temp.path().join("pkg").join("manifest");
        m.store(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let again: Manifest = text.parse().unwrap();
        assert!(again.difference(&m, &[], &[]).is_empty());
    }
}
