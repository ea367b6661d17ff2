// src/fmri.rs

//! Package FMRIs
//!
//! An FMRI names one version of a package:
//!
//! ```text
//! pkg://publisher/system/library@0.5.11,5.11-0.175.1:20121012T200113Z
//!       ^^^^^^^^^ ^^^^^^^^^^^^^^ ^^^^^^ ^^^^ ^^^^^^^ ^^^^^^^^^^^^^^^^
//!       publisher name           release build branch timestamp
//! ```
//!
//! The scheme and publisher are optional (`pkg:/name`, `//pub/name`, `/name`
//! and bare `name` are all accepted). Version equality and ordering consider
//! release, branch and timestamp; the build release only records where the
//! package was built.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use thiserror::Error;

/// Build release assumed when a version omits one
pub const DEFAULT_BUILD_RELEASE: &str = "5.11";

/// Timestamp format used in versions
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

static VALID_PKG_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-\.\+]*(/[A-Za-z0-9][A-Za-z0-9_\-\.\+]*)*$")
        .expect("package name pattern is a valid regex")
});

/// FMRI and version parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FmriError {
    #[error("invalid FMRI '{fmri}': {detail}")]
    Syntax { fmri: String, detail: String },

    #[error("invalid FMRI '{fmri}': invalid package name '{name}'")]
    BadPackageName { fmri: String, name: String },

    #[error("invalid FMRI '{fmri}': {detail}")]
    BadVersion { fmri: String, detail: String },

    #[error("FMRI '{0}' has no version")]
    MissingVersion(String),
}

/// True when `name` is a legal package name
pub fn is_valid_pkg_name(name: &str) -> bool {
    VALID_PKG_NAME.is_match(name)
}

/// A dotted numeric sequence such as `0.5.11`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DotSequence(pub Vec<u64>);

impl FromStr for DotSequence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = Vec::new();
        for elem in s.split('.') {
            if elem.is_empty() || !elem.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("illegal dot sequence '{}'", s));
            }
            if elem.len() > 1 && elem.starts_with('0') {
                return Err(format!("zero padded number in '{}'", s));
            }
            let n = elem
                .parse::<u64>()
                .map_err(|e| format!("illegal dot sequence '{}': {}", s, e))?;
            parts.push(n);
        }
        Ok(Self(parts))
    }
}

impl fmt::Display for DotSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

/// `release[,build_release][-branch][:timestamp]`
#[derive(Debug, Clone)]
pub struct Version {
    pub release: DotSequence,
    pub build_release: DotSequence,
    pub branch: Option<DotSequence>,
    timestr: Option<String>,
}

impl Version {
    /// Parse a version string, using `build` when none is embedded
    pub fn parse(s: &str, build: Option<&str>) -> Result<Self, String> {
        if s.is_empty() {
            return Err("Version cannot be empty".to_string());
        }

        let (rest, timestr) = match s.split_once(':') {
            Some((r, t)) => (r, Some(t)),
            None => (s, None),
        };
        let (rest, branch) = match rest.split_once('-') {
            Some((r, b)) => (r, Some(b)),
            None => (rest, None),
        };
        let (release, build_str) = match rest.split_once(',') {
            Some((r, b)) => (r, Some(b)),
            None => (rest, None),
        };
        if release.is_empty() {
            return Err("Versions must have a release value".to_string());
        }

        let release = release.parse::<DotSequence>()?;
        let branch = branch.map(str::parse::<DotSequence>).transpose()?;
        let build_release = build_str
            .or(build)
            .unwrap_or(DEFAULT_BUILD_RELEASE)
            .parse::<DotSequence>()?;

        if let Some(ts) = timestr {
            let b = ts.as_bytes();
            if ts.len() != 16 || b[8] != b'T' || b[15] != b'Z' {
                return Err("Time must be ISO8601 format.".to_string());
            }
            NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
                .map_err(|_| "Time must be ISO8601 format.".to_string())?;
        }

        Ok(Self {
            release,
            build_release,
            branch,
            timestr: timestr.map(str::to_string),
        })
    }

    /// Timestamp in its `YYYYMMDDTHHMMSSZ` form
    pub fn timestr(&self) -> Option<String> {
        self.timestr.clone()
    }

    pub fn get_timestamp(&self) -> Option<DateTime<Utc>> {
        let ts = self.timestr.as_deref()?;
        NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
            .ok()
            .map(|n| n.and_utc())
    }

    pub fn set_timestamp(&mut self, ts: DateTime<Utc>) {
        self.timestr = Some(ts.format(TIMESTAMP_FORMAT).to_string());
    }

    pub fn get_version(&self, include_build: bool) -> String {
        let mut out = self.release.to_string();
        if include_build {
            out.push(',');
            out.push_str(&self.build_release.to_string());
        }
        if let Some(branch) = &self.branch {
            out.push('-');
            out.push_str(&branch.to_string());
        }
        if let Some(ts) = &self.timestr {
            out.push(':');
            out.push_str(ts);
        }
        out
    }

    /// `release[-branch]`
    pub fn get_short_version(&self) -> String {
        match &self.branch {
            Some(branch) => format!("{}-{}", self.release, branch),
            None => self.release.to_string(),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_version(true))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.release == other.release
            && self.branch == other.branch
            && self.timestr == other.timestr
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // A missing branch or timestamp sorts before any present one.
        self.release
            .cmp(&other.release)
            .then_with(|| self.branch.cmp(&other.branch))
            .then_with(|| self.timestr.cmp(&other.timestr))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed package FMRI
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fmri {
    pub publisher: Option<String>,
    pub name: String,
    pub version: Option<Version>,
}

impl Fmri {
    /// Parse an FMRI string
    pub fn parse(s: &str) -> Result<Self, FmriError> {
        Self::parse_with_build(s, None)
    }

    /// Parse an FMRI, supplying a build release for versions lacking one
    pub fn parse_with_build(s: &str, build: Option<&str>) -> Result<Self, FmriError> {
        let fmri = s.trim_end();
        let syntax = |detail: &str| FmriError::Syntax {
            fmri: fmri.to_string(),
            detail: detail.to_string(),
        };

        let veridx = fmri.rfind('@');
        let head = &fmri[..veridx.unwrap_or(fmri.len())];

        let (publisher, name) = if let Some(rest) = head.strip_prefix("pkg://") {
            let (publisher, name) = rest
                .split_once('/')
                .ok_or_else(|| syntax("Missing '/' after publisher name"))?;
            (Some(publisher), name)
        } else if let Some(name) = head.strip_prefix("pkg:/") {
            (None, name)
        } else if let Some(rest) = head.strip_prefix("//") {
            let (publisher, name) = rest
                .split_once('/')
                .ok_or_else(|| syntax("Missing '/' after publisher name"))?;
            (Some(publisher), name)
        } else if let Some(name) = head.strip_prefix('/') {
            (None, name)
        } else {
            (None, head)
        };

        let version = match veridx {
            Some(idx) => Some(Version::parse(&fmri[idx + 1..], build).map_err(|detail| {
                FmriError::BadVersion {
                    fmri: fmri.to_string(),
                    detail,
                }
            })?),
            None => None,
        };

        if name.is_empty() {
            return Err(syntax("Missing package name"));
        }
        if !is_valid_pkg_name(name) {
            return Err(FmriError::BadPackageName {
                fmri: fmri.to_string(),
                name: name.to_string(),
            });
        }

        Ok(Self {
            publisher: publisher.filter(|p| !p.is_empty()).map(str::to_string),
            name: name.to_string(),
            version,
        })
    }

    pub fn has_version(&self) -> bool {
        self.version.is_some()
    }

    fn version_or_err(&self) -> Result<&Version, FmriError> {
        self.version
            .as_ref()
            .ok_or_else(|| FmriError::MissingVersion(self.to_string()))
    }

    fn publisher_prefix(&self, publisher: Option<&str>, anarchy: bool, include_scheme: bool) -> String {
        match publisher.filter(|p| !p.is_empty() && !anarchy) {
            Some(p) if include_scheme => format!("pkg://{}/", p),
            Some(p) => format!("{}/", p),
            None if include_scheme => "pkg:/".to_string(),
            None => String::new(),
        }
    }

    /// Full string form
    ///
    /// `default_publisher` is used when the FMRI has none; `anarchy` drops the
    /// publisher entirely.
    pub fn get_fmri(&self, default_publisher: Option<&str>, anarchy: bool, include_scheme: bool) -> String {
        let publisher = self.publisher.as_deref().or(default_publisher);
        let mut out = self.publisher_prefix(publisher, anarchy, include_scheme);
        out.push_str(&self.name);
        if let Some(v) = &self.version {
            out.push('@');
            out.push_str(&v.get_version(true));
        }
        out
    }

    /// Name without version
    pub fn get_pkg_stem(&self, anarchy: Option<bool>, include_scheme: bool) -> String {
        let mut out =
            self.publisher_prefix(self.publisher.as_deref(), anarchy.unwrap_or(false), include_scheme);
        out.push_str(&self.name);
        out
    }

    /// `name@release-branch`, without build release or timestamp
    pub fn get_short_fmri(&self, default_publisher: Option<&str>, anarchy: bool, include_scheme: bool) -> String {
        let publisher = self.publisher.as_deref().or(default_publisher);
        let mut out = self.publisher_prefix(publisher, anarchy, include_scheme);
        out.push_str(&self.name);
        if let Some(v) = &self.version {
            out.push('@');
            out.push_str(&v.get_short_version());
        }
        out
    }

    /// Every suffix of the name's path components, shortest first
    ///
    /// `system/library/libc` yields `libc`, `library/libc`,
    /// `system/library/libc`.
    pub fn hierarchical_names(&self) -> Vec<String> {
        let parts: Vec<&str> = self.name.split('/').collect();
        let mut out = Vec::with_capacity(parts.len());
        for i in (0..parts.len()).rev() {
            out.push(parts[i..].join("/"));
        }
        out
    }

    /// Escaped `name/version` directory fragment for on-disk manifests
    pub fn get_dir_path(&self) -> Result<String, FmriError> {
        let version = self.version_or_err()?;
        Ok(format!(
            "{}/{}",
            urlencoding::encode(&self.name),
            urlencoding::encode(&version.to_string())
        ))
    }

    /// Escaped `name@version` fragment for URLs and transaction ids
    pub fn get_url_path(&self) -> Result<String, FmriError> {
        let version = self.version_or_err()?;
        Ok(format!(
            "{}@{}",
            urlencoding::encode(&self.name),
            urlencoding::encode(&version.to_string())
        ))
    }

    pub fn get_timestamp(&self) -> Option<DateTime<Utc>> {
        self.version.as_ref()?.get_timestamp()
    }

    pub fn set_timestamp(&mut self, ts: DateTime<Utc>) -> Result<(), FmriError> {
        let fmri = self.to_string();
        self.version
            .as_mut()
            .ok_or(FmriError::MissingVersion(fmri))?
            .set_timestamp(ts);
        Ok(())
    }

    /// True when `self` is the same package at the same or a later version
    pub fn is_successor(&self, other: &Fmri) -> bool {
        if self.name != other.name {
            return false;
        }
        match (&self.version, &other.version) {
            (None, None) => true,
            (a, b) => a >= b,
        }
    }

    pub fn is_same_pkg(&self, other: &Fmri) -> bool {
        self.name == other.name
    }
}

impl fmt::Display for Fmri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_fmri(None, false, true))
    }
}

impl FromStr for Fmri {
    type Err = FmriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
