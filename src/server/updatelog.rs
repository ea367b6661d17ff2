// src/server/updatelog.rs

//! Catalog update log
//!
//! Every catalog change is also appended to an hourly log file named after
//! the hour it happened in (`%Y%m%d%H`). A line is an operation, the change's
//! catalog timestamp and the catalog record:
//!
//! ```text
//! + 2024-01-02T10:15:00.123456 V pkg:/library/zlib@1.2.13,5.11-0.1:20240102T101500Z
//! ```
//!
//! Only the newest `maxfiles` hours are kept. A client whose catalog is newer
//! than the oldest kept hour can catch up from the log instead of fetching the
//! whole catalog again.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::catalog::{
    self, Catalog, CatalogEntry, KNOWN_PREFIXES, ServerCatalog, isoformat, ts_to_datetime,
};
use crate::error::{Error, Result};
use crate::fmri::{Fmri, FmriError};

/// Log file name format
pub const LOGFILE_FORMAT: &str = "%Y%m%d%H";

/// Update log errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateLogError {
    #[error("Package {0} is already in the catalog")]
    AlreadyPresent(String),

    #[error("invalid FMRI in catalog update: {0}")]
    BadFmri(#[from] FmriError),
}

/// `+` or `-`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operation {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Remove,
}

impl Operation {
    pub fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Remove => '-',
        }
    }
}

/// One update log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateRecord {
    pub operation: Operation,
    pub timestamp: NaiveDateTime,
    /// Catalog record type (`V`, `C`, `R`, ...)
    pub entry_type: char,
    /// Remainder of the catalog record
    pub entry: String,
}

impl UpdateRecord {
    /// Parse `op ts type entry`; `None` for short or malformed lines
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim_end().splitn(4, char::is_whitespace);
        let operation = match fields.next()? {
            "+" => Operation::Add,
            "-" => Operation::Remove,
            _ => return None,
        };
        let timestamp = ts_to_datetime(fields.next()?).ok()?;
        let entry_type = single_char(fields.next()?)?;
        let entry = fields.next()?.to_string();
        Some(Self {
            operation,
            timestamp,
            entry_type,
            entry,
        })
    }
}

impl fmt::Display for UpdateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.operation.symbol(),
            isoformat(&self.timestamp),
            self.entry_type,
            self.entry
        )
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// What a client needs to bring its catalog up to date
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogUpdate {
    UpToDate,
    /// Update log lines from the hour of the client's catalog onward
    Incremental(Vec<String>),
    /// The whole catalog, attributes first
    Full(Vec<String>),
}

/// Hourly-rotated log of catalog additions
#[derive(Debug)]
pub struct UpdateLog {
    root: PathBuf,
    catalog: ServerCatalog,
    maxfiles: usize,
    logfiles: Vec<String>,
    first_update: Option<NaiveDateTime>,
    last_update: Option<NaiveDateTime>,
}

impl UpdateLog {
    /// Open the log in `root`, feeding `catalog`
    pub fn open<P: AsRef<Path>>(root: P, catalog: ServerCatalog, maxfiles: usize) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| Error::from_io(e, &root))?;

        let mut logfiles = Vec::new();
        for entry in fs::read_dir(&root).map_err(|e| Error::from_io(e, &root))? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if parse_logfile_name(&name).is_some() {
                logfiles.push(name);
            }
        }
        logfiles.sort();

        let last_update = catalog.last_modified().and_then(|ts| ts_to_datetime(ts).ok());
        let mut log = Self {
            root,
            catalog,
            maxfiles: maxfiles.max(1),
            logfiles,
            first_update: None,
            last_update,
        };
        log.rotate()?;
        debug!(
            "Opened update log with {} files, first update {:?}",
            log.logfiles.len(),
            log.first_update
        );
        Ok(log)
    }

    pub fn catalog(&self) -> &ServerCatalog {
        &self.catalog
    }

    /// Start of the retained history
    pub fn first_update(&self) -> Option<NaiveDateTime> {
        self.first_update
    }

    pub fn last_update(&self) -> Option<NaiveDateTime> {
        self.last_update
    }

    /// Retained log file names, oldest first
    pub fn logfiles(&self) -> &[String] {
        &self.logfiles
    }

    /// Add a package to the catalog and log the addition
    pub fn add_package(&mut self, fmri: &Fmri, critical: bool) -> Result<NaiveDateTime> {
        let ts = self.catalog.add_fmri(fmri, critical)?;
        let entry_type = if critical { 'C' } else { 'V' };
        let record = UpdateRecord {
            operation: Operation::Add,
            timestamp: ts,
            entry_type,
            entry: fmri.get_fmri(None, true, true),
        };
        self.append(&record)?;
        info!("Logged catalog addition of {}", fmri);
        Ok(ts)
    }

    /// Record a rename in the catalog and the log
    pub fn rename_package(&mut self, src: &Fmri, dest: &Fmri) -> Result<NaiveDateTime> {
        let ts = self.catalog.rename_package(src, dest)?;
        let record = self
            .catalog
            .renames()
            .last()
            .map(|r| r.to_string())
            .unwrap_or_default();
        self.append(&UpdateRecord {
            operation: Operation::Add,
            timestamp: ts,
            entry_type: 'R',
            entry: record.trim_start_matches("R ").to_string(),
        })?;
        Ok(ts)
    }

    /// Touch the catalog after an existing package's manifest changed
    ///
    /// Catalog membership is unchanged so nothing is logged.
    pub fn replace_package(&mut self, fmri: &Fmri) -> Result<NaiveDateTime> {
        if !self.catalog.contains(fmri) {
            return Err(Error::NotFound(format!("{} is not in the catalog", fmri)));
        }
        let ts = catalog::now();
        self.catalog.set_time(&ts)?;
        self.last_update = Some(ts);
        Ok(ts)
    }

    fn append(&mut self, record: &UpdateRecord) -> Result<()> {
        let name = record.timestamp.format(LOGFILE_FORMAT).to_string();
        let path = self.root.join(&name);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::from_io(e, &path))?;
        writeln!(file, "{}", record)?;

        if !self.logfiles.contains(&name) {
            self.logfiles.push(name);
            self.logfiles.sort();
            self.rotate()?;
        }
        self.last_update = Some(record.timestamp);
        Ok(())
    }

    /// Drop the oldest files beyond `maxfiles` and recompute `first_update`
    fn rotate(&mut self) -> Result<()> {
        while self.logfiles.len() > self.maxfiles {
            let oldest = self.logfiles.remove(0);
            let path = self.root.join(&oldest);
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed expired update log {}", oldest),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::from_io(e, &path)),
            }
        }
        self.first_update = self.logfiles.first().and_then(|n| parse_logfile_name(n));
        Ok(())
    }

    /// True when the log reaches back to `ts`
    pub fn enough_history(&self, ts: &NaiveDateTime) -> bool {
        self.first_update.is_some_and(|first| *ts >= first)
    }

    /// True when `ts` is the time of the latest change
    pub fn up_to_date(&self, ts: &NaiveDateTime) -> bool {
        self.last_update.is_some_and(|last| *ts == last)
    }

    /// Every line of each hour file from the one containing `since` onward
    ///
    /// Lines are returned verbatim, newline-terminated, including the ones
    /// logged earlier in the hour `since` falls in. The receiver drops what it
    /// already has by comparing timestamps.
    pub fn gen_updates(&self, since: &NaiveDateTime) -> Result<Vec<String>> {
        let bucket = hour_bucket(since);
        let mut lines = Vec::new();

        for name in &self.logfiles {
            if parse_logfile_name(name).is_none_or(|file_ts| file_ts < bucket) {
                continue;
            }

            let path = self.root.join(name);
            let text = fs::read_to_string(&path).map_err(|e| Error::from_io(e, &path))?;
            lines.extend(
                text.lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(|l| format!("{}\n", l)),
            );
        }

        Ok(lines)
    }

    /// [`gen_updates`](Self::gen_updates) as structured records
    ///
    /// Lines that are not `op ts type entry` records are skipped.
    pub fn gen_updates_as_dictionaries(&self, since: &NaiveDateTime) -> Result<Vec<UpdateRecord>> {
        Ok(self
            .gen_updates(since)?
            .iter()
            .filter_map(|line| {
                let record = UpdateRecord::parse(line);
                if record.is_none() {
                    debug!("Skipping unrecognised update log line: {}", line.trim_end());
                }
                record
            })
            .collect())
    }

    /// What a client with a catalog last modified at `since` should receive
    pub fn updates_since(&self, since: Option<&NaiveDateTime>) -> Result<CatalogUpdate> {
        match since {
            Some(ts) if self.up_to_date(ts) => Ok(CatalogUpdate::UpToDate),
            Some(ts) if self.enough_history(ts) => {
                Ok(CatalogUpdate::Incremental(self.gen_updates(ts)?))
            }
            _ => Ok(CatalogUpdate::Full(self.catalog.as_lines()?)),
        }
    }
}

fn parse_logfile_name(name: &str) -> Option<NaiveDateTime> {
    if name.len() != 10 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(&format!("{}0000", name), "%Y%m%d%H%M%S").ok()
}

fn hour_bucket(ts: &NaiveDateTime) -> NaiveDateTime {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(*ts)
}

/// Apply a catalog update received from a server to a client catalog in `path`
///
/// `since` is the client catalog's `Last-Modified`. Returns whether anything
/// was written.
pub fn recv(update: &CatalogUpdate, path: &Path, since: &str, origin: Option<&str>) -> Result<bool> {
    match update {
        CatalogUpdate::UpToDate => Ok(false),
        CatalogUpdate::Incremental(lines) => recv_updates(lines, path, since),
        CatalogUpdate::Full(lines) => {
            catalog::recv(lines, path, origin)?;
            Ok(true)
        }
    }
}

/// Apply incremental update log lines to the client catalog in `path`
///
/// Additions newer than `since` are appended in client form; records of
/// unknown type are appended verbatim so a newer client can process them
/// later. Fails without touching the catalog if any addition is already
/// present. `npkgs` and `Last-Modified` are rewritten afterwards.
pub fn recv_updates<I, S>(lines: I, path: &Path, since: &str) -> Result<bool>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fs::create_dir_all(path).map_err(|e| Error::from_io(e, path))?;

    let cts = ts_to_datetime(since)?;
    let mut mts = cts;
    let mut add_lines: Vec<String> = Vec::new();
    let mut unknown_lines: Vec<String> = Vec::new();
    let mut bad_fmri = None;

    for line in lines {
        let line = line.as_ref();
        let fields: Vec<&str> = line.trim_end().splitn(4, char::is_whitespace).collect();
        let [op, ts, kind, entry] = fields[..] else {
            continue;
        };
        let Ok(ts) = ts_to_datetime(ts) else {
            continue;
        };
        if ts <= cts {
            continue;
        }

        let known = single_char(kind).is_some_and(|c| KNOWN_PREFIXES.contains(&c));
        if !known {
            unknown_lines.push(format!("{} {}\n", kind, entry));
            mts = mts.max(ts);
        } else if op == "+" && (kind == "C" || kind == "V") {
            match Fmri::parse(entry) {
                Ok(fmri) => {
                    let prefix = if kind == "C" { 'C' } else { 'V' };
                    add_lines.push(catalog::client_line(prefix, &fmri));
                    mts = mts.max(ts);
                }
                Err(e) => bad_fmri = Some(e),
            }
        }
    }

    if let Some(e) = bad_fmri {
        return Err(UpdateLogError::BadFmri(e).into());
    }

    let catpath = path.join("catalog");
    let existing = match fs::read_to_string(&catpath) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(Error::from_io(e, &catpath)),
    };

    let mut npkgs = 0;
    for line in existing.lines() {
        if matches!(CatalogEntry::parse(line, None), Ok(Some(CatalogEntry::Package { .. }))) {
            npkgs += 1;
        }
        if add_lines.iter().any(|a| a.trim_end() == line) {
            return Err(UpdateLogError::AlreadyPresent(line.to_string()).into());
        }
    }

    let mut contents = existing;
    for line in add_lines.iter().chain(&unknown_lines) {
        contents.push_str(line);
    }
    catalog::replace_file(path, &catpath, contents.as_bytes())?;

    let mut attrs = catalog::read_attrs(&path.join("attrs"))?;
    attrs.insert("npkgs".to_string(), (npkgs + add_lines.len()).to_string());
    attrs.insert("Last-Modified".to_string(), isoformat(&mts));
    catalog::write_attrs(path, &attrs)?;

    debug!("Applied {} catalog additions to {}", add_lines.len(), path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn open_log(dir: &Path, maxfiles: usize) -> UpdateLog {
        let catalog = ServerCatalog::open(dir.join("catalog"), Some("test"), false).unwrap();
        UpdateLog::open(dir.join("updatelog"), catalog, maxfiles).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_add_package_logs() {
        let temp = TempDir::new().unwrap();
        let mut log = open_log(temp.path(), 336);
        assert!(log.first_update().is_none());

        let ts = log
            .add_package(&Fmri::parse("pkg:/foo@1.0,5.11-0:20240101T000000Z").unwrap(), false)
            .unwrap();
        assert_eq!(log.logfiles().len(), 1);
        assert_eq!(log.last_update(), Some(ts));
        assert!(log.up_to_date(&ts));
        assert_eq!(log.catalog().npkgs(), 1);

        let name = ts.format(LOGFILE_FORMAT).to_string();
        let text = fs::read_to_string(temp.path().join("updatelog").join(name)).unwrap();
        assert_eq!(
            text,
            format!("+ {} V pkg:/foo@1.0,5.11-0:20240101T000000Z\n", isoformat(&ts))
        );

        let updates = log.gen_updates_as_dictionaries(&(ts - chrono::Duration::seconds(1))).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].entry_type, 'V');
        // The whole hour goes out even when `since` is the change itself.
        assert_eq!(log.gen_updates_as_dictionaries(&ts).unwrap().len(), 1);
    }

    #[test]
    fn test_rotation_recomputes_first_update() {
        let temp = TempDir::new().unwrap();
        let logdir = temp.path().join("updatelog");
        fs::create_dir_all(&logdir).unwrap();
        for hour in ["2024010200", "2024010201", "2024010202"] {
            fs::write(logdir.join(hour), "").unwrap();
        }

        let log = open_log(temp.path(), 2);
        assert_eq!(log.logfiles(), ["2024010201", "2024010202"]);
        assert_eq!(log.first_update(), Some(at(1, 0)));
        assert!(!logdir.join("2024010200").exists());

        assert!(log.enough_history(&at(1, 30)));
        assert!(!log.enough_history(&at(0, 59)));
    }

    #[test]
    fn test_gen_updates_scans_whole_hours() {
        let temp = TempDir::new().unwrap();
        let logdir = temp.path().join("updatelog");
        fs::create_dir_all(&logdir).unwrap();
        fs::write(
            logdir.join("2024010201"),
            "+ 2024-01-02T01:10:00 V pkg:/a@1.0\n+ 2024-01-02T01:40:00 V pkg:/b@1.0\n",
        )
        .unwrap();
        fs::write(
            logdir.join("2024010202"),
            "+ 2024-01-02T02:05:00 C pkg:/c@1.0\ngarbage\n",
        )
        .unwrap();
        fs::write(logdir.join("2024010200"), "+ 2024-01-02T00:30:00 V pkg:/z@1.0\n").unwrap();

        let log = open_log(temp.path(), 10);
        let updates = log.gen_updates_as_dictionaries(&at(1, 20)).unwrap();
        let entries: Vec<_> = updates.iter().map(|u| u.entry.as_str()).collect();
        assert_eq!(entries, vec!["pkg:/a@1.0", "pkg:/b@1.0", "pkg:/c@1.0"]);
        assert_eq!(updates[2].entry_type, 'C');

        let lines = log.gen_updates(&at(1, 20)).unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "+ 2024-01-02T01:10:00 V pkg:/a@1.0\n");
        assert_eq!(lines[3], "garbage\n");
    }

    #[test]
    fn test_updates_since() {
        let temp = TempDir::new().unwrap();
        let mut log = open_log(temp.path(), 336);
        assert!(matches!(log.updates_since(None).unwrap(), CatalogUpdate::Full(_)));

        let ts = log.add_package(&Fmri::parse("pkg:/foo@1.0").unwrap(), false).unwrap();
        assert_eq!(log.updates_since(Some(&ts)).unwrap(), CatalogUpdate::UpToDate);

        let earlier = hour_bucket(&ts);
        match log.updates_since(Some(&earlier)).unwrap() {
            CatalogUpdate::Incremental(lines) => assert_eq!(lines.len(), 1),
            other => panic!("expected incremental update, got {:?}", other),
        }
    }

    #[test]
    fn test_hour_bucket_lines_filtered_by_receiver() {
        let temp = TempDir::new().unwrap();
        let logdir = temp.path().join("updatelog");
        fs::create_dir_all(&logdir).unwrap();
        fs::write(
            logdir.join("2024010201"),
            "+ 2024-01-02T01:10:00 V pkg:/a@1.0,5.11:20240102T011000Z\n\
             + 2024-01-02T01:40:00 V pkg:/b@1.0,5.11:20240102T014000Z\n",
        )
        .unwrap();
        let log = open_log(temp.path(), 10);

        let client = temp.path().join("client");
        fs::create_dir_all(&client).unwrap();
        fs::write(client.join("catalog"), "V pkg a 1.0,5.11:20240102T011000Z\n").unwrap();

        let lines = log.gen_updates(&at(1, 20)).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(recv_updates(&lines, &client, "2024-01-02T01:20:00").unwrap());

        let catalog = fs::read_to_string(client.join("catalog")).unwrap();
        assert_eq!(
            catalog,
            "V pkg a 1.0,5.11:20240102T011000Z\nV pkg b 1.0,5.11:20240102T014000Z\n"
        );
    }

    #[test]
    fn test_recv_updates() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        fs::write(dir.join("catalog"), "V pkg foo 1.0,5.11:20240101T000000Z\n").unwrap();
        fs::write(dir.join("attrs"), "S npkgs: 1\nS Last-Modified: 2024-01-02T00:00:00\n").unwrap();

        let lines = [
            "+ 2024-01-01T12:00:00 V pkg:/old@1.0\n",
            "+ 2024-01-02T01:00:00 V pkg:/bar@2.0,5.11:20240102T010000Z\n",
            "+ 2024-01-02T02:00:00 Z something new\n",
            "short line\n",
        ];
        assert!(recv_updates(lines, dir, "2024-01-02T00:00:00").unwrap());

        let catalog = fs::read_to_string(dir.join("catalog")).unwrap();
        assert_eq!(
            catalog,
            "V pkg foo 1.0,5.11:20240101T000000Z\nV pkg bar 2.0,5.11:20240102T010000Z\nZ something new\n"
        );
        let attrs = catalog::read_attrs(&dir.join("attrs")).unwrap();
        assert_eq!(attrs["npkgs"], "2");
        assert_eq!(attrs["Last-Modified"], "2024-01-02T02:00:00");
    }

    #[test]
    fn test_recv_updates_rejects_present_packages() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        fs::write(dir.join("catalog"), "V pkg foo 1.0,5.11:20240101T000000Z\n").unwrap();

        let lines = ["+ 2024-01-02T01:00:00 V pkg:/foo@1.0,5.11:20240101T000000Z"];
        let result = recv_updates(lines, dir, "2024-01-02T00:00:00");
        assert!(matches!(
            result,
            Err(Error::UpdateLog(UpdateLogError::AlreadyPresent(_)))
        ));
        let catalog = fs::read_to_string(dir.join("catalog")).unwrap();
        assert_eq!(catalog.lines().count(), 1);
    }

    #[test]
    fn test_record_round_trip() {
        let line = "- 2024-01-02T01:00:00.500000 R a 1.0,5.11 b 1.0,5.11";
        let record = UpdateRecord::parse(line).unwrap();
        assert_eq!(record.operation, Operation::Remove);
        assert_eq!(record.entry, "a 1.0,5.11 b 1.0,5.11");
        assert_eq!(record.to_string(), line);
        assert!(UpdateRecord::parse("* 2024-01-02T01:00:00 V x").is_none());
    }
}
