// src/manifest/search.rs

//! Inverted search index over a manifest
//!
//! Every action's index tuples are folded into a map from token type to
//! token to the places that produced it. A place is an action position for
//! in-memory manifests or a byte offset when the index is built straight from
//! a manifest file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ActionFilter, Manifest, include_action};
use crate::actions::{Action, ActionKind, IndexEntry};
use crate::error::{Error, Result};

/// Where a token was found
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SearchRef {
    pub action_name: String,
    /// Value shown for a match
    pub full_value: String,
    /// Action position or byte offset of the producing line
    pub offset: u64,
}

/// token type -> token -> references
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndex {
    entries: BTreeMap<String, BTreeMap<String, Vec<SearchRef>>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_entry(&mut self, entry: IndexEntry, offset: u64) {
        let full_value = match entry.full_value {
            Some(v) => v,
            None if entry.action_name == ActionKind::Set.as_ref() => entry.token.clone(),
            None => entry.token_type.clone(),
        };
        self.entries
            .entry(entry.token_type)
            .or_default()
            .entry(entry.token)
            .or_default()
            .push(SearchRef {
                action_name: entry.action_name,
                full_value,
                offset,
            });
    }

    fn add_action(&mut self, action: &Action, offset: u64) {
        for entry in action.generate_indices() {
            self.add_entry(entry, offset);
        }
    }

    /// References for one token of one type
    pub fn lookup(&self, token_type: &str, token: &str) -> &[SearchRef] {
        self.entries
            .get(token_type)
            .and_then(|m| m.get(token))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// References for a token under any type
    pub fn lookup_any<'a>(&'a self, token: &'a str) -> impl Iterator<Item = (&'a str, &'a SearchRef)> {
        self.entries.iter().flat_map(move |(ty, tokens)| {
            tokens
                .get(token)
                .into_iter()
                .flatten()
                .map(move |r| (ty.as_str(), r))
        })
    }

    /// Token types present, sorted
    pub fn token_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Tokens of one type, sorted
    pub fn tokens(&self, token_type: &str) -> impl Iterator<Item = &str> {
        self.entries
            .get(token_type)
            .into_iter()
            .flat_map(|m| m.keys().map(String::as_str))
    }

    /// Number of distinct `(type, token)` pairs
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Manifest {
    /// Search index of this manifest's actions, keyed by action position
    pub fn search_dict(&self, excludes: &[ActionFilter<'_>]) -> SearchIndex {
        let mut index = SearchIndex::new();
        for (pos, action) in self.actions().iter().enumerate() {
            if include_action(action, excludes) {
                index.add_action(action, pos as u64);
            }
        }
        index
    }

    /// Search index of a manifest file, keyed by line byte offset
    ///
    /// Lines that fail to parse are logged and skipped so one bad action does
    /// not hide the rest of the package from search.
    pub fn search_dict_file(path: &Path, excludes: &[ActionFilter<'_>]) -> Result<SearchIndex> {
        let file = File::open(path).map_err(|e| Error::from_io(e, path))?;
        let mut reader = BufReader::new(file);
        let mut index = SearchIndex::new();
        let mut offset = 0u64;
        let mut line = String::new();

        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            let text = line.trim();
            if !text.is_empty() && !text.starts_with('#') {
                match text.parse::<Action>() {
                    Ok(action) if include_action(&action, excludes) => {
                        index.add_action(&action, offset);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("{}: {}", path.display(), e),
                }
            }
            offset += n as u64;
        }

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEXT: &str = "\
set name=pkg.fmri value=pkg://test/system/libc@1.0,5.11-2:20240101T000000Z
set name=pkg.description value=\"the C library\"
dir path=usr/lib mode=0755
file abc123 path=usr/lib/libc.so.1 mode=0755
";

    #[test]
    fn test_search_dict() {
        let m: Manifest = TEXT.parse().unwrap();
        let index = m.search_dict(&[]);

        let refs = index.lookup("basename", "libc.so.1");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].action_name, "file");
        assert_eq!(refs[0].full_value, "basename");
        assert_eq!(refs[0].offset, 3);

        let content = index.lookup("content", "abc123");
        assert_eq!(content[0].full_value, "abc123");

        let words = index.lookup("pkg.description", "library");
        assert_eq!(words[0].full_value, "the C library");

        let stems: Vec<_> = index.tokens("pkg.fmri").collect();
        assert!(stems.contains(&"system/libc"));
        assert!(stems.contains(&"libc"));
        assert!(index.lookup("path", "/usr/lib").len() == 1);
        assert!(index.lookup("path", "").is_empty());
    }

    #[test]
    fn test_set_full_value_defaults_to_token() {
        let m: Manifest = "set name=pkg.summary value=compiler\n".parse().unwrap();
        let index = m.search_dict(&[]);
        assert_eq!(index.lookup("pkg.summary", "compiler")[0].full_value, "compiler");
    }

    #[test]
    fn test_search_dict_respects_excludes() {
        let m: Manifest = "file 1 path=a variant.arch=sparc\nfile 2 path=b variant.arch=i386\n"
            .parse()
            .unwrap();
        let only_i386 = |a: &Action| a.attr_str("variant.arch") == Some("i386");
        let excludes: [ActionFilter<'_>; 1] = [&only_i386];
        let index = m.search_dict(&excludes);
        assert!(index.lookup("basename", "a").is_empty());
        assert_eq!(index.lookup("basename", "b").len(), 1);
    }

    #[test]
    fn test_search_dict_file_offsets() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("manifest");
        std::fs::write(&path, "# comment\ndir path=opt\nbogus line here\nfile 1 path=opt/f\n").unwrap();

        let index = Manifest::search_dict_file(&path, &[]).unwrap();
        assert_eq!(index.lookup("basename", "opt")[0].offset, 10);
        assert_eq!(index.lookup("basename", "f")[0].offset, 39);
        assert_eq!(index.lookup_any("opt").count(), 1);
    }
}
