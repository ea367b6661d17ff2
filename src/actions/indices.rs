// src/actions/indices.rs

//! Search index generation
//!
//! Each action contributes `(action, token type, token, full value)` tuples
//! to the repository search index. The full value is what a match displays
//! when the token is only a fragment of it (a word out of a description, a
//! level out of a classification).

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Action, ActionKind};
use crate::digest::DEFAULT_HASH_ATTRS;
use crate::fmri::Fmri;

/// Dependency types that are indexed
const INDEXED_DEPEND_TYPES: &[&str] = &[
    "conditional",
    "exclude",
    "group",
    "incorporate",
    "optional",
    "origin",
    "parent",
    "require",
    "require-any",
];

/// One search index tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexEntry {
    pub action_name: String,
    pub token_type: String,
    pub token: String,
    pub full_value: Option<String>,
}

impl IndexEntry {
    fn new(action: &Action, token_type: &str, token: &str, full_value: Option<&str>) -> Self {
        Self {
            action_name: action.name().to_string(),
            token_type: token_type.to_string(),
            token: token.to_string(),
            full_value: full_value.map(str::to_string),
        }
    }
}

fn basename(path: &str) -> &str {
    Path::new(path.trim_end_matches('/'))
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("")
}

pub(super) fn generate(action: &Action) -> Vec<IndexEntry> {
    let mut out = Vec::new();
    let mut push = |token_type: &str, token: &str, full: Option<&str>| {
        out.push(IndexEntry::new(action, token_type, token, full));
    };

    match action.kind {
        ActionKind::File => {
            if let Some(hash) = &action.hash {
                push("content", hash, Some(hash));
            }
            if let Some(path) = action.attr_str("path") {
                push("basename", basename(path), None);
                push("path", &format!("/{}", path), None);
            }
        }
        ActionKind::Dir => {
            if let Some(path) = action.attr_str("path") {
                push("basename", basename(path), None);
                push("path", &format!("/{}", path), None);
            }
        }
        ActionKind::Link | ActionKind::Hardlink => {
            if let Some(path) = action.attr_str("path") {
                push("basename", basename(path), None);
                push("path", &format!("/{}", path), None);
            }
            for (k, v) in action.attrs.iter().filter(|(k, _)| k.starts_with("mediator")) {
                for value in v.as_slice() {
                    push(k, value, None);
                }
            }
        }
        ActionKind::Set => set_indices(action, &mut push),
        ActionKind::Depend => {
            let ctype = action.attr_str("type").unwrap_or("");
            if INDEXED_DEPEND_TYPES.contains(&ctype) {
                for fmri in action.attr_list("fmri") {
                    let p = fmri.strip_prefix("pkg:/").unwrap_or(fmri);
                    push(ctype, p, None);
                    if let Some((stem, _)) = p.split_once('@') {
                        push(ctype, stem, None);
                    }
                }
            }
        }
        ActionKind::License => {
            if let Some(license) = action.attr_str("license") {
                push("license", license, None);
            }
            if let Some(hash) = &action.hash {
                push("content", hash, None);
            }
        }
        ActionKind::Legacy => {
            if let Some(pkg) = action.attr_str("pkg") {
                push("legacy_pkg", pkg, None);
                push("pkg", pkg, None);
            }
        }
        ActionKind::Driver => {
            if let Some(name) = action.attr_str("name") {
                push("driver_name", name, None);
            }
            for alias in action.attr_list("alias") {
                push("alias", alias, None);
            }
        }
        ActionKind::User => {
            if let Some(name) = action.attr_str("username") {
                push("name", name, None);
            }
        }
        ActionKind::Group => {
            if let Some(name) = action.attr_str("groupname") {
                push("name", name, None);
            }
        }
        ActionKind::Signature => {
            if let Some(hash) = &action.hash {
                push("certificate", hash, Some(hash));
            }
            if let Some(alg) = action.attr_str("algorithm") {
                push("algorithm", alg, Some(alg));
            }
            if let Some(value) = action.attr_str("value") {
                push("signature", value, Some(value));
            }
            for attr in DEFAULT_HASH_ATTRS.iter().filter(|a| **a != "hash") {
                if let Some(v) = action.attr_str(attr) {
                    push(attr, v, None);
                }
            }
        }
    }

    out.retain(|e| !e.token.is_empty());
    out
}

fn set_indices(action: &Action, push: &mut impl FnMut(&str, &str, Option<&str>)) {
    let Some(name) = action.attr_str("name") else {
        return;
    };
    let values = action.attr_list("value");

    if name == "info.classification" {
        for value in &values {
            let levels = value.split_once(':').map_or(*value, |(_, cats)| cats);
            push(name, levels, Some(levels));
            for level in levels.split('/') {
                for word in level.split_whitespace() {
                    push(name, word, Some(levels));
                }
            }
        }
        return;
    }

    if values.len() > 1 {
        for value in values {
            if value.contains(' ') {
                for word in value.split_whitespace() {
                    push(name, word, Some(value));
                }
            } else {
                push(name, value, None);
            }
        }
        return;
    }

    let Some(value) = values.first().copied() else {
        return;
    };

    if name == "fmri" || name == "pkg.fmri" {
        if let Ok(fmri) = Fmri::parse(value) {
            let stem = fmri.get_pkg_stem(None, false);
            push(name, &stem, Some(&stem));
            if let Some(version) = &fmri.version {
                push(name, &version.build_release.to_string(), Some(&stem));
                push(name, &version.release.to_string(), Some(&stem));
                if let Some(ts) = version.timestr() {
                    push(name, &ts, Some(&stem));
                }
            }
            for hname in fmri.hierarchical_names() {
                push(name, &hname, Some(&stem));
            }
            return;
        }
        push(name, value, None);
        return;
    }

    if value.contains(' ') {
        for word in value.split_whitespace() {
            push(name, word, Some(value));
        }
    } else {
        push(name, value, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(line: &str) -> Vec<(String, String, Option<String>)> {
        line.parse::<Action>()
            .unwrap()
            .generate_indices()
            .into_iter()
            .map(|e| (e.token_type, e.token, e.full_value))
            .collect()
    }

    fn t(ty: &str, tok: &str, full: Option<&str>) -> (String, String, Option<String>) {
        (ty.to_string(), tok.to_string(), full.map(str::to_string))
    }

    #[test]
    fn test_file_indices() {
        assert_eq!(
            tokens("file abc path=usr/bin/ls"),
            vec![
                t("content", "abc", Some("abc")),
                t("basename", "ls", None),
                t("path", "/usr/bin/ls", None),
            ]
        );
    }

    #[test]
    fn test_dir_basename_ignores_trailing_slash() {
        assert_eq!(tokens("dir path=usr/share/")[0], t("basename", "share", None));
    }

    #[test]
    fn test_depend_indices() {
        assert_eq!(
            tokens("depend fmri=pkg:/library/libc@0.5.11 type=require"),
            vec![
                t("require", "library/libc@0.5.11", None),
                t("require", "library/libc", None),
            ]
        );
        assert!(tokens("depend fmri=pkg:/x type=bogus").is_empty());
    }

    #[test]
    fn test_set_description_words() {
        let got = tokens("set name=pkg.description value=\"fast copy\"");
        assert_eq!(
            got,
            vec![
                t("pkg.description", "fast", Some("fast copy")),
                t("pkg.description", "copy", Some("fast copy")),
            ]
        );
    }

    #[test]
    fn test_set_classification() {
        let got = tokens(
            "set name=info.classification value=\"org.opensolaris.category.2008:System/Core Libraries\"",
        );
        let full = Some("System/Core Libraries");
        assert_eq!(
            got,
            vec![
                t("info.classification", "System/Core Libraries", full),
                t("info.classification", "System", full),
                t("info.classification", "Core", full),
                t("info.classification", "Libraries", full),
            ]
        );
    }

    #[test]
    fn test_set_fmri() {
        let got = tokens("set name=pkg.fmri value=pkg://test/system/libc@0.5.11,5.11-0.1:20100101T000000Z");
        let tokens: Vec<&str> = got.iter().map(|e| e.1.as_str()).collect();
        assert_eq!(
            tokens,
            vec![
                "system/libc",
                "5.11",
                "0.5.11",
                "20100101T000000Z",
                "libc",
                "system/libc"
            ]
        );
        assert!(got.iter().all(|e| e.2.as_deref() == Some("system/libc")));
    }

    #[test]
    fn test_signature_indices() {
        let got = tokens("signature abc algorithm=rsa-sha256 value=deadbeef");
        assert_eq!(
            got,
            vec![
                t("certificate", "abc", Some("abc")),
                t("algorithm", "rsa-sha256", Some("rsa-sha256")),
                t("signature", "deadbeef", Some("deadbeef")),
            ]
        );
    }

    #[test]
    fn test_empty_tokens_are_dropped() {
        let got = tokens("signature algorithm=sha256");
        assert_eq!(got, vec![t("algorithm", "sha256", Some("sha256"))]);
    }
}
