//! Backup naming and ordering.
//!
//! Grammar: `<base>.<YYYY-MM-DD>[.<ordinal>]`, where the date must be a real
//! calendar date and the ordinal is a non-negative integer. Conflict
//! resolution appends the current epoch seconds as the ordinal, so it sorts
//! after any small same-day ordinal.
//!
//! Order: date (as a string, which matches calendar order for this fixed
//! width), then ordinal, with a missing ordinal counting as 0.

use crate::remote::{Listing, RemoteFileService};
use crate::utils::errors::NamingError;
use chrono::NaiveDate;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// A backup directory holding more entries than this is treated as corrupt.
pub const MAX_TOTAL_BACKUPS: usize = 10000;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn suffix_pattern() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| {
        Regex::new(r"^(.+)\.(\d{4}-\d{2}-\d{2})(?:\.(\d+))?$").expect("static suffix pattern")
    })
}

/// Why a name is not a usable backup name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Malformed {
    NoDateSuffix,
    InvalidDate,
    OrdinalOverflow,
}

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Malformed::NoDateSuffix => write!(f, "no .YYYY-MM-DD suffix"),
            Malformed::InvalidDate => write!(f, "date is not a real calendar date"),
            Malformed::OrdinalOverflow => write!(f, "ordinal does not fit in 64 bits"),
        }
    }
}

/// A remote file name parsed into its ordering key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub name: String,
    pub base_name: String,
    pub date: String,
    pub ordinal: Option<u64>,
}

impl BackupEntry {
    /// Parse any name following the suffix grammar.
    pub fn parse(name: &str) -> Result<Self, NamingError> {
        Self::classify(name).map_err(|_| NamingError::MalformedName(name.to_string()))
    }

    fn classify(name: &str) -> Result<Self, Malformed> {
        let caps = suffix_pattern()
            .captures(name)
            .ok_or(Malformed::NoDateSuffix)?;

        let date = &caps[2];
        NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| Malformed::InvalidDate)?;
        let ordinal = match caps.get(3) {
            Some(m) => Some(
                m.as_str()
                    .parse::<u64>()
                    .map_err(|_| Malformed::OrdinalOverflow)?,
            ),
            None => None,
        };

        Ok(Self {
            name: name.to_string(),
            base_name: caps[1].to_string(),
            date: date.to_string(),
            ordinal,
        })
    }

    /// Parse `name` as a backup of `base_name`, or `None` when it is not one.
    pub fn parse_for_base(name: &str, base_name: &str) -> Option<Self> {
        Self::parse(name).ok().filter(|e| e.base_name == base_name)
    }

    /// Ordinal used for ordering.
    pub fn effective_ordinal(&self) -> u64 {
        self.ordinal.unwrap_or(0)
    }

    /// Compare by (date, ordinal).
    pub fn order(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| self.effective_ordinal().cmp(&other.effective_ordinal()))
    }
}

/// `<base>.<YYYY-MM-DD>` for `date`.
pub fn derive_name(base_name: &str, date: NaiveDate) -> String {
    format!("{}.{}", base_name, date.format(DATE_FORMAT))
}

/// Compare two backup names. Malformed names are a caller bug and fail.
pub fn compare(a: &str, b: &str) -> Result<Ordering, NamingError> {
    let a = BackupEntry::parse(a)?;
    let b = BackupEntry::parse(b)?;
    Ok(a.order(&b))
}

/// Backups of one base name, sorted oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSet {
    base_name: String,
    entries: Vec<BackupEntry>,
}

impl BackupSet {
    pub fn new(base_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            entries: Vec::new(),
        }
    }

    /// Build the set from a directory listing: files only, names matching
    /// the grammar for `base_name`. Anything else is skipped.
    pub fn from_listing(listing: &Listing, base_name: &str) -> Result<Self, NamingError> {
        let count = listing.entry_count();
        if count > MAX_TOTAL_BACKUPS {
            return Err(NamingError::TooManyEntries {
                count,
                cap: MAX_TOTAL_BACKUPS,
            });
        }

        let prefix = format!("{}.", base_name);
        let mut set = Self::new(base_name);
        for entry in listing.entries.iter().filter(|e| !e.is_dir()) {
            match BackupEntry::classify(&entry.filename) {
                Ok(parsed) if parsed.base_name == base_name => set.entries.push(parsed),
                Ok(_) => {}
                Err(reason) if entry.filename.starts_with(&prefix) => {
                    warn!(
                        name = %entry.filename,
                        reason = %reason,
                        "Ignoring entry with malformed backup suffix"
                    );
                }
                Err(_) => {}
            }
        }
        set.sort();
        Ok(set)
    }

    fn sort(&mut self) {
        // Name breaks ties so the order is deterministic.
        self.entries
            .sort_by(|a, b| a.order(b).then_with(|| a.name.cmp(&b.name)));
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn entries(&self) -> &[BackupEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn newest(&self) -> Option<&BackupEntry> {
        self.entries.last()
    }

    /// Add a freshly uploaded name, keeping the set sorted.
    pub fn insert(&mut self, name: &str) -> Result<(), NamingError> {
        let entry = BackupEntry::parse(name)?;
        if entry.base_name != self.base_name {
            return Err(NamingError::MalformedName(name.to_string()));
        }
        if !self.contains(name) {
            self.entries.push(entry);
            self.sort();
        }
        Ok(())
    }

    /// Whether `candidate` or `candidate.<ordinal>` already exists.
    pub fn has_conflict(&self, candidate: &str) -> bool {
        self.entries.iter().any(|e| {
            e.name == candidate
                || e
                    .name
                    .strip_prefix(candidate)
                    .and_then(|rest| rest.strip_prefix('.'))
                    .map_or(false, |digits| {
                        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
                    })
        })
    }

    /// Return `candidate`, or `candidate.<epoch_seconds>` when it conflicts.
    /// The suffix is bumped past any name already taken.
    pub fn resolve_conflict(&self, candidate: &str, epoch_seconds: u64) -> String {
        if !self.has_conflict(candidate) {
            return candidate.to_string();
        }
        let mut suffix = epoch_seconds.max(1);
        loop {
            let name = format!("{}.{}", candidate, suffix);
            if !self.contains(&name) {
                debug!(candidate = %candidate, resolved = %name, "Resolved same-day name conflict");
                return name;
            }
            suffix += 1;
        }
    }

    /// Entries beyond the newest `keep_count`, oldest first.
    pub fn excess(&self, keep_count: usize) -> &[BackupEntry] {
        let cut = self.entries.len().saturating_sub(keep_count);
        &self.entries[..cut]
    }
}

/// Load and sort the backups of `base_name` found in `dir`.
pub async fn list_existing<R: RemoteFileService + ?Sized>(
    remote: &R,
    dir: &str,
    base_name: &str,
) -> Result<BackupSet, NamingError> {
    // One past the cap, so an oversized directory is detected rather than truncated.
    let listing = remote
        .list(dir, MAX_TOTAL_BACKUPS + 1)
        .await
        .map_err(|source| NamingError::InvalidListing {
            dir: dir.to_string(),
            source,
        })?;
    BackupSet::from_listing(&listing, base_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteEntry;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn listing(names: &[&str]) -> Listing {
        Listing {
            total: Some(names.len() as u64),
            entries: names.iter().map(|n| RemoteEntry::file(*n)).collect(),
        }
    }

    #[test]
    fn test_derive_name_round_trip() {
        let name = derive_name("docs", date("2024-03-01"));
        assert_eq!(name, "docs.2024-03-01");

        let entry = BackupEntry::parse(&name).unwrap();
        assert_eq!(entry.base_name, "docs");
        assert_eq!(entry.date, "2024-03-01");
        assert_eq!(entry.ordinal, None);
    }

    #[test]
    fn test_parse_with_ordinal_and_dotted_base() {
        let entry = BackupEntry::parse("report.tgz.2024-01-02.1458239586").unwrap();
        assert_eq!(entry.base_name, "report.tgz");
        assert_eq!(entry.date, "2024-01-02");
        assert_eq!(entry.ordinal, Some(1458239586));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for name in [
            "report.tgz.bad-date",
            "report.tgz",
            "report.tgz.2024-13-01",
            "report.tgz.2024-01-01.",
            "report.tgz.2024-01-01.x1",
            ".2024-01-01",
            "report.tgz.2024-01-01.99999999999999999999999",
        ] {
            assert!(
                matches!(BackupEntry::parse(name), Err(NamingError::MalformedName(_))),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_classify_names_the_reason() {
        assert_eq!(
            BackupEntry::classify("report.tgz.bad-date"),
            Err(Malformed::NoDateSuffix)
        );
        assert_eq!(
            BackupEntry::classify("report.tgz.2024-02-30"),
            Err(Malformed::InvalidDate)
        );
        assert_eq!(
            BackupEntry::classify("report.tgz.2024-01-01.99999999999999999999999"),
            Err(Malformed::OrdinalOverflow)
        );
        assert!(Malformed::InvalidDate.to_string().contains("calendar date"));
        assert!(Malformed::OrdinalOverflow.to_string().contains("64 bits"));
    }

    #[test]
    fn test_from_listing_skips_invalid_dates_and_overflowing_ordinals() {
        let set = BackupSet::from_listing(
            &listing(&[
                "report.tgz.2024-02-30",
                "report.tgz.2024-01-01.18446744073709551616",
                "report.tgz.2024-01-01.18446744073709551615",
            ]),
            "report.tgz",
        )
        .unwrap();
        assert_eq!(set.names(), vec!["report.tgz.2024-01-01.18446744073709551615"]);
    }

    #[test]
    fn test_compare_ordering() {
        let names = [
            "abc.2016-01-01",
            "abc.2016-01-02",
            "abc.2016-01-02.1",
            "abc.2016-01-02.1458239586",
            "abc.2016-01-02.99999999999999",
            "abc.2016-02-01",
        ];
        for (i, a) in names.iter().enumerate() {
            assert_eq!(compare(a, a).unwrap(), Ordering::Equal);
            for b in &names[i + 1..] {
                assert_eq!(compare(a, b).unwrap(), Ordering::Less, "{} < {}", a, b);
                assert_eq!(compare(b, a).unwrap(), Ordering::Greater, "{} > {}", b, a);
            }
        }
    }

    #[test]
    fn test_compare_missing_ordinal_is_zero() {
        assert_eq!(
            compare("abc.2016-01-01", "abc.2016-01-01.0").unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_compare_malformed_fails() {
        assert!(matches!(
            compare("abc.2016-01-01", "abc.nope"),
            Err(NamingError::MalformedName(n)) if n == "abc.nope"
        ));
    }

    #[test]
    fn test_from_listing_filters_and_sorts() {
        let mut l = listing(&[
            "report.tgz.2024-01-03",
            "report.tgz.bad-date",
            "report.tgz.2024-01-01",
            "other.tgz.2024-01-02",
            "report.tgz.2024-01-02.5",
            "report.tgz.2024-01-02",
        ]);
        l.entries.push(RemoteEntry::folder("report.tgz.2024-01-04"));

        let set = BackupSet::from_listing(&l, "report.tgz").unwrap();
        assert_eq!(
            set.names(),
            vec![
                "report.tgz.2024-01-01",
                "report.tgz.2024-01-02",
                "report.tgz.2024-01-02.5",
                "report.tgz.2024-01-03",
            ]
        );
        assert_eq!(set.newest().unwrap().name, "report.tgz.2024-01-03");
    }

    #[test]
    fn test_from_listing_escapes_base_name() {
        // "." in the base name is literal, not a wildcard.
        let set = BackupSet::from_listing(&listing(&["reportxtgz.2024-01-01"]), "report.tgz").unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_from_listing_too_many_entries() {
        let l = Listing {
            total: Some(MAX_TOTAL_BACKUPS as u64 + 1),
            entries: vec![],
        };
        assert!(matches!(
            BackupSet::from_listing(&l, "x"),
            Err(NamingError::TooManyEntries { count, cap }) if count == MAX_TOTAL_BACKUPS + 1 && cap == MAX_TOTAL_BACKUPS
        ));

        let exact = Listing {
            total: Some(MAX_TOTAL_BACKUPS as u64),
            entries: vec![],
        };
        assert!(BackupSet::from_listing(&exact, "x").is_ok());
    }

    #[test]
    fn test_resolve_conflict() {
        let set = BackupSet::from_listing(&listing(&["docs.2024-03-01"]), "docs").unwrap();
        let resolved = set.resolve_conflict("docs.2024-03-01", 1709290000);
        assert_eq!(resolved, "docs.2024-03-01.1709290000");

        let entry = BackupEntry::parse(&resolved).unwrap();
        assert_eq!(entry.date, "2024-03-01");
        assert!(entry.ordinal.unwrap() > 0);
    }

    #[test]
    fn test_resolve_conflict_against_ordinal_only() {
        let set = BackupSet::from_listing(&listing(&["docs.2024-03-01.3"]), "docs").unwrap();
        assert!(set.has_conflict("docs.2024-03-01"));
        assert_eq!(set.resolve_conflict("docs.2024-03-01", 100), "docs.2024-03-01.100");
    }

    #[test]
    fn test_resolve_conflict_skips_taken_suffix() {
        let set = BackupSet::from_listing(
            &listing(&["docs.2024-03-01", "docs.2024-03-01.100"]),
            "docs",
        )
        .unwrap();
        assert_eq!(set.resolve_conflict("docs.2024-03-01", 100), "docs.2024-03-01.101");
    }

    #[test]
    fn test_no_conflict_keeps_candidate() {
        let set = BackupSet::from_listing(&listing(&["docs.2024-02-29"]), "docs").unwrap();
        assert!(!set.has_conflict("docs.2024-03-01"));
        assert_eq!(set.resolve_conflict("docs.2024-03-01", 100), "docs.2024-03-01");
    }

    #[test]
    fn test_resolved_name_sorts_after_same_day() {
        let mut set = BackupSet::from_listing(
            &listing(&["docs.2024-03-01", "docs.2024-03-01.2"]),
            "docs",
        )
        .unwrap();
        let resolved = set.resolve_conflict("docs.2024-03-01", 1709290000);
        set.insert(&resolved).unwrap();
        assert_eq!(set.newest().unwrap().name, resolved);
    }

    #[test]
    fn test_excess() {
        let set = BackupSet::from_listing(
            &listing(&["a.2024-01-01", "a.2024-01-02", "a.2024-01-03"]),
            "a",
        )
        .unwrap();
        let names = |entries: &[BackupEntry]| entries.iter().map(|e| e.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(set.excess(1)), vec!["a.2024-01-01", "a.2024-01-02"]);
        assert_eq!(names(set.excess(2)), vec!["a.2024-01-01"]);
        assert!(set.excess(3).is_empty());
        assert!(set.excess(10).is_empty());
    }

    #[test]
    fn test_insert_rejects_foreign_base() {
        let mut set = BackupSet::new("a");
        assert!(set.insert("b.2024-01-01").is_err());
        set.insert("a.2024-01-01").unwrap();
        set.insert("a.2024-01-01").unwrap();
        assert_eq!(set.len(), 1);
    }
}
