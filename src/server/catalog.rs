// src/server/catalog.rs

//! Repository catalog
//!
//! The catalog is two flat files in one directory. `attrs` holds `S key:
//! value` lines (package count, modification time, origin). `catalog` holds
//! one line per package version or rename:
//!
//! ```text
//! V pkg:/library/zlib@1.2.13,5.11-0.1:20240102T101500Z
//! C pkg:/system/kernel@0.5.11,5.11-0.2:20240102T101501Z
//! R library/zlib 1.3,5.11 compress/zlib 1.3,5.11
//! ```
//!
//! `V` is an ordinary version and `C` a critical one. `R` records that a
//! package was renamed at a version; nothing at or after that version may be
//! published under the old name. Clients store the same records with the
//! name and version split apart (`V pkg library/zlib 1.2.13,5.11-0.1:...`);
//! both forms are accepted when reading.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, SubsecRound, Timelike, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fmri::{self, Fmri, Version};

/// Mode of every catalog file
const FILE_MODE: u32 = 0o644;

const ATTRS_FILE: &str = "attrs";
const CATALOG_FILE: &str = "catalog";

/// Record types this catalog understands
pub const KNOWN_PREFIXES: [char; 4] = ['C', 'S', 'V', 'R'];

/// Catalog errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unversioned FMRI not supported: {0}")]
    Unversioned(String),

    #[error("FMRI {0} already exists in the catalog")]
    AlreadyPresent(String),

    #[error("Cannot rename {src} to {dest}: {reason}")]
    InvalidRename {
        src: String,
        dest: String,
        reason: String,
    },

    #[error("corrupt catalog entry for publisher '{publisher}': {line}")]
    CorruptEntry { publisher: String, line: String },

    #[error("invalid timestamp '{0}'")]
    BadTimestamp(String),

    #[error("catalog at {0} was opened read-only")]
    ReadOnly(String),
}

/// Current time at the microsecond precision catalogs record
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(6)
}

/// `YYYY-MM-DDTHH:MM:SS[.ffffff]`, with the fraction omitted when zero
pub fn isoformat(ts: &NaiveDateTime) -> String {
    if ts.nanosecond() / 1000 == 0 {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

/// Parse a timestamp written by [`isoformat`]
pub fn ts_to_datetime(ts: &str) -> std::result::Result<NaiveDateTime, CatalogError> {
    let ts = ts.trim();
    NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|_| CatalogError::BadTimestamp(ts.to_string()))
}

/// Whether a version is flagged critical
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Version,
    Critical,
}

impl EntryKind {
    pub fn prefix(self) -> char {
        match self {
            Self::Version => 'V',
            Self::Critical => 'C',
        }
    }
}

/// A package rename recorded in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRecord {
    pub src_name: String,
    pub src_version: Version,
    pub dest_name: String,
    pub dest_version: Version,
}

impl RenameRecord {
    /// True when `fmri` falls under this rename
    pub fn covers(&self, fmri: &Fmri) -> bool {
        fmri.name == self.src_name
            && fmri
                .version
                .as_ref()
                .is_some_and(|v| v.release >= self.src_version.release)
    }
}

impl fmt::Display for RenameRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "R {} {} {} {}",
            self.src_name, self.src_version, self.dest_name, self.dest_version
        )
    }
}

/// One parsed catalog line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEntry {
    Package { kind: EntryKind, fmri: Fmri },
    Rename(RenameRecord),
}

impl CatalogEntry {
    /// Parse a catalog line in server or client form
    ///
    /// Returns `Ok(None)` for record types without package meaning.
    pub fn parse(line: &str, publisher: Option<&str>) -> std::result::Result<Option<Self>, CatalogError> {
        let line = line.trim_end();
        let corrupt = || CatalogError::CorruptEntry {
            publisher: publisher.unwrap_or("").to_string(),
            line: line.to_string(),
        };

        let mut chars = line.chars();
        let (Some(prefix), Some(' ')) = (chars.next(), chars.next()) else {
            return Ok(None);
        };
        let body = &line[2..];

        match prefix {
            'V' | 'C' => {
                let kind = if prefix == 'C' {
                    EntryKind::Critical
                } else {
                    EntryKind::Version
                };
                let text = match body.strip_prefix("pkg ") {
                    Some(client) => client.replacen(' ', "@", 1),
                    None => body.to_string(),
                };
                let mut fmri = Fmri::parse(&text).map_err(|_| corrupt())?;
                if fmri.version.is_none() {
                    return Err(corrupt());
                }
                if fmri.publisher.is_none() {
                    fmri.publisher = publisher.map(str::to_string);
                }
                Ok(Some(Self::Package { kind, fmri }))
            }
            'R' => {
                let fields: Vec<&str> = body.split_whitespace().collect();
                let [src_name, src_version, dest_name, dest_version] = fields[..] else {
                    return Err(corrupt());
                };
                let version = |v: &str| Version::parse(v, None).map_err(|_| corrupt());
                Ok(Some(Self::Rename(RenameRecord {
                    src_name: src_name.to_string(),
                    src_version: version(src_version)?,
                    dest_name: dest_name.to_string(),
                    dest_version: version(dest_version)?,
                })))
            }
            _ => Ok(None),
        }
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package { kind, fmri } => {
                write!(f, "{} {}", kind.prefix(), fmri.get_fmri(None, true, true))
            }
            Self::Rename(r) => r.fmt(f),
        }
    }
}

/// Publication-time view of a catalog
///
/// This is all a publishing transaction needs from the catalog it feeds.
pub trait Catalog {
    /// Whether publishing `fmri` is permitted
    fn valid_new_fmri(&self, fmri: &Fmri) -> bool;

    /// Whether this exact version is present
    fn contains(&self, fmri: &Fmri) -> bool;

    /// Record a newly published version, returning its catalog timestamp
    fn add_fmri(&mut self, fmri: &Fmri, critical: bool) -> Result<NaiveDateTime>;
}

/// The on-disk catalog of a repository
#[derive(Debug)]
pub struct ServerCatalog {
    root: PathBuf,
    publisher: Option<String>,
    read_only: bool,
    attrs: BTreeMap<String, String>,
    packages: Vec<(EntryKind, Fmri)>,
    renames: Vec<RenameRecord>,
}

impl ServerCatalog {
    /// Open the catalog in `root`, creating the directory when missing
    pub fn open<P: AsRef<Path>>(root: P, publisher: Option<&str>, read_only: bool) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() && !read_only {
            fs::create_dir_all(&root).map_err(|e| Error::from_io(e, &root))?;
            debug!("Created catalog directory: {:?}", root);
        }

        let mut catalog = Self {
            root,
            publisher: publisher.map(str::to_string),
            read_only,
            attrs: BTreeMap::new(),
            packages: Vec::new(),
            renames: Vec::new(),
        };
        catalog.attrs = read_attrs(&catalog.root.join(ATTRS_FILE))?;
        catalog.attrs.entry("npkgs".to_string()).or_insert_with(|| "0".to_string());
        catalog.load_entries()?;
        Ok(catalog)
    }

    /// Remove the on-disk catalog files
    pub fn destroy(root: &Path) -> Result<()> {
        for name in [ATTRS_FILE, CATALOG_FILE] {
            let path = root.join(name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::from_io(e, &path)),
            }
        }
        Ok(())
    }

    fn load_entries(&mut self) -> Result<()> {
        let path = self.catalog_path();
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::from_io(e, &path)),
        };

        for line in BufReader::new(file).lines() {
            match CatalogEntry::parse(&line?, self.publisher.as_deref())? {
                Some(CatalogEntry::Package { kind, fmri }) => self.packages.push((kind, fmri)),
                Some(CatalogEntry::Rename(r)) => self.renames.push(r),
                None => {}
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn publisher(&self) -> Option<&str> {
        self.publisher.as_deref()
    }

    fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_FILE)
    }

    /// True when the catalog file exists on disk
    pub fn exists(&self) -> bool {
        self.catalog_path().exists()
    }

    /// Package versions in catalog order
    pub fn fmris(&self) -> impl Iterator<Item = &Fmri> {
        self.packages.iter().map(|(_, f)| f)
    }

    /// Recorded renames in catalog order
    pub fn renames(&self) -> &[RenameRecord] {
        &self.renames
    }

    /// Number of package versions
    pub fn npkgs(&self) -> usize {
        self.attrs
            .get("npkgs")
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.attrs.get("Last-Modified").map(String::as_str)
    }

    pub fn origin(&self) -> Option<&str> {
        self.attrs.get("origin").map(String::as_str)
    }

    pub fn attrs(&self) -> &BTreeMap<String, String> {
        &self.attrs
    }

    /// `S key: value` lines
    pub fn attrs_as_lines(&self) -> Vec<String> {
        self.attrs
            .iter()
            .map(|(k, v)| format!("S {}: {}\n", k, v))
            .collect()
    }

    /// Attribute lines followed by the raw catalog
    pub fn as_lines(&self) -> Result<Vec<String>> {
        let mut lines = self.attrs_as_lines();
        let path = self.catalog_path();
        match fs::read_to_string(&path) {
            Ok(text) => lines.extend(text.lines().map(|l| format!("{}\n", l))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::from_io(e, &path)),
        }
        Ok(lines)
    }

    /// Combined size in bytes of the attrs and catalog files
    pub fn size(&self) -> Result<u64> {
        let mut total = 0;
        for name in [ATTRS_FILE, CATALOG_FILE] {
            let path = self.root.join(name);
            match fs::metadata(&path) {
                Ok(m) => total += m.len(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::from_io(e, &path)),
            }
        }
        Ok(total)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(CatalogError::ReadOnly(self.root.display().to_string()).into());
        }
        Ok(())
    }

    /// Record that `src` continues as `dest` from `src`'s version onwards
    ///
    /// The destination must already be published and the source must still
    /// be publishable.
    pub fn rename_package(&mut self, src: &Fmri, dest: &Fmri) -> Result<NaiveDateTime> {
        self.ensure_writable()?;

        let invalid = |reason: &str| CatalogError::InvalidRename {
            src: src.to_string(),
            dest: dest.to_string(),
            reason: reason.to_string(),
        };

        let (Some(src_version), Some(dest_version)) = (&src.version, &dest.version) else {
            return Err(invalid("both packages must be versioned").into());
        };
        if src.name == dest.name {
            return Err(invalid("a package cannot be renamed to itself").into());
        }
        if !self.fmris().any(|f| f.name == dest.name) {
            return Err(invalid("destination package is not in the catalog").into());
        }
        if !self.valid_new_fmri(src) {
            return Err(invalid("source version is already published or renamed").into());
        }

        let record = RenameRecord {
            src_name: src.name.clone(),
            src_version: src_version.clone(),
            dest_name: dest.name.clone(),
            dest_version: dest_version.clone(),
        };
        self.append_to_catalog(&format!("{}\n", record))?;
        self.renames.push(record);

        let ts = now();
        self.set_time(&ts)?;
        info!("Renamed {} to {}", src, dest);
        Ok(ts)
    }

    /// Set `Last-Modified` and persist the attributes
    pub fn set_time(&mut self, ts: &NaiveDateTime) -> Result<()> {
        self.ensure_writable()?;
        self.attrs.insert("Last-Modified".to_string(), isoformat(ts));
        self.save_attrs()
    }

    /// Write the attributes file
    pub fn save_attrs(&self) -> Result<()> {
        self.ensure_writable()?;
        write_attrs(&self.root, &self.attrs)
    }

    /// Rewrite the catalog with `line` appended
    ///
    /// The rewrite goes through a temporary file so readers never see a
    /// partial catalog.
    fn append_to_catalog(&self, line: &str) -> Result<()> {
        let path = self.catalog_path();
        let existing = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(Error::from_io(e, &path)),
        };

        if existing.lines().any(|l| l == line.trim_end()) {
            return Err(CatalogError::AlreadyPresent(line.trim_end().to_string()).into());
        }

        let mut contents = existing;
        contents.push_str(line);
        replace_file(&self.root, &path, contents.as_bytes())
    }
}

impl Catalog for ServerCatalog {
    /// Valid unless the name is illegal, the release and branch are already
    /// published, or a rename covers the version
    fn valid_new_fmri(&self, fmri: &Fmri) -> bool {
        if !fmri::is_valid_pkg_name(&fmri.name) {
            return false;
        }
        if let Some(version) = &fmri.version {
            let short = version.get_short_version();
            let published = self.fmris().any(|f| {
                f.name == fmri.name && f.version.as_ref().is_some_and(|v| v.get_short_version() == short)
            });
            if published {
                return false;
            }
        }
        !self.renames.iter().any(|r| r.covers(fmri))
    }

    fn contains(&self, fmri: &Fmri) -> bool {
        self.fmris().any(|f| f.name == fmri.name && f.version == fmri.version)
    }

    fn add_fmri(&mut self, fmri: &Fmri, critical: bool) -> Result<NaiveDateTime> {
        if fmri.version.is_none() {
            return Err(CatalogError::Unversioned(fmri.to_string()).into());
        }
        self.ensure_writable()?;

        if !self.valid_new_fmri(fmri) {
            return Err(CatalogError::AlreadyPresent(fmri.to_string()).into());
        }

        let kind = if critical {
            EntryKind::Critical
        } else {
            EntryKind::Version
        };
        let entry = CatalogEntry::Package {
            kind,
            fmri: fmri.clone(),
        };
        self.append_to_catalog(&format!("{}\n", entry))?;
        self.packages.push((kind, fmri.clone()));

        self.attrs.insert("npkgs".to_string(), self.packages.len().to_string());
        let ts = now();
        self.set_time(&ts)?;

        debug!("Added {} to catalog", fmri);
        Ok(ts)
    }
}

/// Lay down a full catalog received from a server
///
/// Package records are rewritten into the client form; attribute lines go
/// to `attrs`, with `origin` recorded when given. Lines of unknown type are
/// kept verbatim.
pub fn recv<I, S>(lines: I, path: &Path, origin: Option<&str>) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fs::create_dir_all(path).map_err(|e| Error::from_io(e, path))?;

    let mut attrs = String::new();
    let mut catalog = String::new();

    for line in lines {
        let line = line.as_ref().trim_end_matches('\n');
        let mut chars = line.chars();
        let (Some(prefix), Some(sep)) = (chars.next(), chars.next()) else {
            continue;
        };
        if !sep.is_whitespace() {
            continue;
        }

        match prefix {
            'S' => {
                attrs.push_str(line);
                attrs.push('\n');
            }
            'C' | 'V' => {
                let fmri = Fmri::parse(chars.as_str())?;
                catalog.push_str(&client_line(prefix, &fmri));
            }
            _ => {
                catalog.push_str(line);
                catalog.push('\n');
            }
        }
    }

    if let Some(origin) = origin {
        attrs.push_str(&format!("S origin: {}\n", origin));
    }

    replace_file(path, &path.join(ATTRS_FILE), attrs.as_bytes())?;
    replace_file(path, &path.join(CATALOG_FILE), catalog.as_bytes())
}

/// `V pkg name version` client catalog line
pub(crate) fn client_line(prefix: char, fmri: &Fmri) -> String {
    let version = fmri
        .version
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default();
    format!("{} pkg {} {}\n", prefix, fmri.name, version)
}

pub(crate) fn read_attrs(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(Error::from_io(e, path)),
    };

    Ok(text
        .lines()
        .filter_map(|l| l.strip_prefix("S "))
        .filter_map(|l| l.split_once(": "))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect())
}

pub(crate) fn write_attrs(dir: &Path, attrs: &BTreeMap<String, String>) -> Result<()> {
    let text: String = attrs
        .iter()
        .map(|(k, v)| format!("S {}: {}\n", k, v))
        .collect();
    replace_file(dir, &dir.join(ATTRS_FILE), text.as_bytes())
}

/// Replace `dest` with `data` through a temporary file in `dir`
pub(crate) fn replace_file(dir: &Path, dest: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::from_io(e, dir))?;
    tmp.write_all(data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(FILE_MODE))
            .map_err(|e| Error::from_io(e, dest))?;
    }

    tmp.persist(dest).map_err(|e| Error::from_io(e.error, dest))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fmri(s: &str) -> Fmri {
        Fmri::parse(s).unwrap()
    }

    #[test]
    fn test_add_fmri() {
        let temp = TempDir::new().unwrap();
        let mut cat = ServerCatalog::open(temp.path(), Some("test"), false).unwrap();
        assert_eq!(cat.npkgs(), 0);
        assert!(cat.last_modified().is_none());

        cat.add_fmri(&fmri("pkg:/foo@1.0,5.11-0:20240101T000000Z"), false).unwrap();
        cat.add_fmri(&fmri("pkg:/bar@2.0,5.11-0:20240101T000000Z"), true).unwrap();
        assert_eq!(cat.npkgs(), 2);
        assert!(cat.last_modified().is_some());

        let text = fs::read_to_string(temp.path().join("catalog")).unwrap();
        assert_eq!(
            text,
            "V pkg:/foo@1.0,5.11-0:20240101T000000Z\nC pkg:/bar@2.0,5.11-0:20240101T000000Z\n"
        );

        let reopened = ServerCatalog::open(temp.path(), Some("test"), false).unwrap();
        assert_eq!(reopened.npkgs(), 2);
        let names: Vec<_> = reopened.fmris().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["foo", "bar"]);
        assert_eq!(reopened.fmris().next().unwrap().publisher.as_deref(), Some("test"));
    }

    #[test]
    fn test_add_fmri_rejects_duplicates_and_unversioned() {
        let temp = TempDir::new().unwrap();
        let mut cat = ServerCatalog::open(temp.path(), None, false).unwrap();
        cat.add_fmri(&fmri("pkg:/foo@2.0,5.11-0:20240101T000000Z"), false).unwrap();

        let again = cat.add_fmri(&fmri("pkg:/foo@2.0,5.11-0:20240301T000000Z"), false);
        assert!(matches!(again, Err(Error::Catalog(CatalogError::AlreadyPresent(_)))));

        let bare = cat.add_fmri(&fmri("pkg:/foo"), false);
        assert!(matches!(bare, Err(Error::Catalog(CatalogError::Unversioned(_)))));
        assert_eq!(cat.npkgs(), 1);
    }

    #[test]
    fn test_valid_new_fmri() {
        let temp = TempDir::new().unwrap();
        let mut cat = ServerCatalog::open(temp.path(), None, false).unwrap();
        cat.add_fmri(&fmri("pkg:/foo@2.0,5.11-0:20240101T000000Z"), false).unwrap();

        assert!(!cat.valid_new_fmri(&fmri("pkg:/foo@2.0,5.11-0")));
        assert!(cat.valid_new_fmri(&fmri("pkg:/foo@2.0,5.11-1")));
        assert!(cat.valid_new_fmri(&fmri("pkg:/foo@2.1")));
        assert!(cat.valid_new_fmri(&fmri("pkg:/other@2.0")));
    }

    #[test]
    fn test_rename_package() {
        let temp = TempDir::new().unwrap();
        let mut cat = ServerCatalog::open(temp.path(), None, false).unwrap();
        cat.add_fmri(&fmri("pkg:/new/zlib@1.3"), false).unwrap();

        cat.rename_package(&fmri("pkg:/zlib@1.3"), &fmri("pkg:/new/zlib@1.3")).unwrap();
        assert!(cat.valid_new_fmri(&fmri("pkg:/zlib@1.2")));
        assert!(!cat.valid_new_fmri(&fmri("pkg:/zlib@1.3")));
        assert!(!cat.valid_new_fmri(&fmri("pkg:/zlib@2.0")));
        assert_eq!(cat.npkgs(), 1);

        let reopened = ServerCatalog::open(temp.path(), None, false).unwrap();
        assert_eq!(reopened.renames().len(), 1);
        assert_eq!(reopened.renames()[0].to_string(), "R zlib 1.3,5.11 new/zlib 1.3,5.11");

        let missing = cat.rename_package(&fmri("pkg:/a@1"), &fmri("pkg:/b@1"));
        assert!(matches!(missing, Err(Error::Catalog(CatalogError::InvalidRename { .. }))));
    }

    #[test]
    fn test_parse_entry_forms() {
        let server = CatalogEntry::parse("V pkg:/foo@1.0,5.11-0:20240101T000000Z", Some("p"))
            .unwrap()
            .unwrap();
        let client = CatalogEntry::parse("V pkg foo 1.0,5.11-0:20240101T000000Z", Some("p"))
            .unwrap()
            .unwrap();
        assert_eq!(server, client);
        assert!(CatalogEntry::parse("S npkgs: 3", None).unwrap().is_none());
        assert!(CatalogEntry::parse("V pkg:/foo", None).is_err());
        assert!(CatalogEntry::parse("R only three fields", None).is_err());
    }

    #[test]
    fn test_read_only() {
        let temp = TempDir::new().unwrap();
        let mut cat = ServerCatalog::open(temp.path(), None, true).unwrap();
        let result = cat.add_fmri(&fmri("pkg:/foo@1.0"), false);
        assert!(matches!(result, Err(Error::Catalog(CatalogError::ReadOnly(_)))));
    }

    #[test]
    fn test_ts_to_datetime() {
        let ts = ts_to_datetime("2024-03-05T07:08:09.000123").unwrap();
        assert_eq!(isoformat(&ts), "2024-03-05T07:08:09.000123");

        let whole = ts_to_datetime("2024-03-05T07:08:09").unwrap();
        assert_eq!(whole.nanosecond(), 0);
        assert_eq!(isoformat(&whole), "2024-03-05T07:08:09");

        assert!(ts_to_datetime("yesterday").is_err());
    }

    #[test]
    fn test_recv_full_catalog() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("client");
        let lines = [
            "S Last-Modified: 2024-01-01T00:00:00\n",
            "S npkgs: 1\n",
            "V pkg:/foo@1.0,5.11-0:20240101T000000Z\n",
            "X\n",
        ];
        recv(lines, &dir, Some("http://example.com")).unwrap();

        let catalog = fs::read_to_string(dir.join("catalog")).unwrap();
        assert_eq!(catalog, "V pkg foo 1.0,5.11-0:20240101T000000Z\n");
        let attrs = read_attrs(&dir.join("attrs")).unwrap();
        assert_eq!(attrs["npkgs"], "1");
        assert_eq!(attrs["origin"], "http://example.com");

        let cat = ServerCatalog::open(&dir, None, true).unwrap();
        assert_eq!(cat.fmris().count(), 1);
        assert_eq!(cat.size().unwrap(), fs::metadata(dir.join("attrs")).unwrap().len() + catalog.len() as u64);
    }
}
