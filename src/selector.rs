//! Selection of the entries that actually need to travel over the wire.
//!
//! The controller already holds many files from earlier pushes. Given the
//! set of `(name, checksum)` fingerprints it reported back, the selector keeps
//! only the entries whose exact fingerprint is absent. A renamed file is a
//! new entry even when its content is identical: the name is part of the key.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::archive::{ArchiveEntry, SourceArchive};
use crate::errors::{Result, UploadError};

/// A `(name, checksum)` pair identifying one exact entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    name: String,
    checksum: String,
}

impl Fingerprint {
    /// Create a fingerprint; the checksum is normalized to lowercase hex.
    pub fn new(name: impl Into<String>, checksum: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            checksum: checksum.as_ref().to_ascii_lowercase(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

/// Fingerprints the remote side already has.
#[derive(Debug, Clone, Default)]
pub struct KnownFingerprints {
    fingerprints: HashSet<Fingerprint>,
}

impl KnownFingerprints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fingerprint: Fingerprint) -> bool {
        self.fingerprints.insert(fingerprint)
    }

    pub fn contains(&self, name: &str, checksum: &str) -> bool {
        self.fingerprints.contains(&Fingerprint::new(name, checksum))
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

impl FromIterator<Fingerprint> for KnownFingerprints {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        Self {
            fingerprints: iter.into_iter().collect(),
        }
    }
}

impl<N: Into<String>, C: AsRef<str>> FromIterator<(N, C)> for KnownFingerprints {
    fn from_iter<I: IntoIterator<Item = (N, C)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(name, checksum)| Fingerprint::new(name, checksum))
            .collect()
    }
}

/// The ordered subset of an archive that must be transmitted.
///
/// Borrows its entries from the [`SourceArchive`]; content is never copied.
/// Counts are fixed at construction from the selected sequence itself.
#[derive(Debug, Clone)]
pub struct UploadPlan<'a> {
    entries: Vec<&'a ArchiveEntry>,
    total_uncompressed_size: u64,
    excluded_count: usize,
}

impl<'a> UploadPlan<'a> {
    fn new(entries: Vec<&'a ArchiveEntry>, excluded_count: usize) -> Self {
        let total_uncompressed_size = entries.iter().map(|e| e.size()).sum();
        Self {
            entries,
            total_uncompressed_size,
            excluded_count,
        }
    }

    /// Plan every entry of `archive`, with no exclusions.
    pub fn all(archive: &'a SourceArchive) -> Self {
        Self::new(archive.entries().iter().collect(), 0)
    }

    pub fn entries(&self) -> &[&'a ArchiveEntry] {
        &self.entries
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Sum of `size` over the selected entries
    pub fn total_uncompressed_size(&self) -> u64 {
        self.total_uncompressed_size
    }

    /// Number of archive entries the controller already had
    pub fn excluded_count(&self) -> usize {
        self.excluded_count
    }

    /// True when nothing needs to be sent and the upload can be skipped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Filters a [`SourceArchive`] against the controller's known fingerprints.
pub struct UploadSelector;

impl UploadSelector {
    /// Select the entries of `archive` whose fingerprint is not in `known`.
    ///
    /// `fingerprint_of` supplies each entry's checksum, so content that was
    /// already hashed is not read a second time. Its first error aborts the
    /// selection.
    pub fn select<'a, F>(
        archive: &'a SourceArchive,
        known: &KnownFingerprints,
        mut fingerprint_of: F,
    ) -> Result<UploadPlan<'a>>
    where
        F: FnMut(&ArchiveEntry) -> Result<String>,
    {
        let mut selected = Vec::new();
        let mut excluded = 0;

        for entry in archive.entries() {
            let checksum = fingerprint_of(entry)?;
            if known.contains(entry.name(), &checksum) {
                excluded += 1;
            } else {
                selected.push(entry);
            }
        }

        let plan = UploadPlan::new(selected, excluded);
        debug!(
            "Selected {} of {} entries ({} bytes) for upload",
            plan.entry_count(),
            archive.len(),
            plan.total_uncompressed_size()
        );

        Ok(plan)
    }

    /// Select using checksums precomputed per entry name.
    pub fn select_with<'a>(
        archive: &'a SourceArchive,
        known: &KnownFingerprints,
        checksums: &HashMap<String, String>,
    ) -> Result<UploadPlan<'a>> {
        Self::select(archive, known, |entry| {
            checksums
                .get(entry.name())
                .cloned()
                .ok_or_else(|| UploadError::MissingFingerprint {
                    name: entry.name().to_string(),
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_archive() -> SourceArchive {
        SourceArchive::from_entries(
            "/mem",
            vec![
                ArchiveEntry::from_bytes("a.txt", vec![b'a'; 10]),
                ArchiveEntry::from_bytes("b.txt", vec![b'b'; 20]),
            ],
        )
    }

    fn checksums() -> HashMap<String, String> {
        HashMap::from([
            ("a.txt".to_string(), "aaaa".to_string()),
            ("b.txt".to_string(), "bbbb".to_string()),
        ])
    }

    #[test]
    fn test_known_entry_is_excluded() {
        let archive = sample_archive();
        let known: KnownFingerprints = [("a.txt", "aaaa")].into_iter().collect();

        let plan = UploadSelector::select_with(&archive, &known, &checksums()).unwrap();
        let names: Vec<&str> = plan.entries().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["b.txt"]);
        assert_eq!(plan.entry_count(), 1);
        assert_eq!(plan.total_uncompressed_size(), 20);
        assert_eq!(plan.excluded_count(), 1);
    }

    #[test]
    fn test_empty_known_set_selects_everything() {
        let archive = sample_archive();
        let plan = UploadSelector::select_with(&archive, &KnownFingerprints::new(), &checksums()).unwrap();
        assert_eq!(plan.entry_count(), 2);
        assert_eq!(plan.total_uncompressed_size(), 30);
    }

    #[test]
    fn test_all_known_yields_empty_plan() {
        let archive = sample_archive();
        let known: KnownFingerprints = [("a.txt", "AAAA"), ("b.txt", "bbbb")].into_iter().collect();

        let plan = UploadSelector::select_with(&archive, &known, &checksums()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.total_uncompressed_size(), 0);
    }

    #[test]
    fn test_changed_content_and_rename_are_uploaded() {
        let archive = sample_archive();
        // a.txt changed on disk, b.txt known only under another name
        let known: KnownFingerprints = [("a.txt", "0000"), ("c.txt", "bbbb")].into_iter().collect();

        let plan = UploadSelector::select_with(&archive, &known, &checksums()).unwrap();
        assert_eq!(plan.entry_count(), 2);
    }

    #[test]
    fn test_missing_checksum_fails_selection() {
        let archive = sample_archive();
        let partial = HashMap::from([("a.txt".to_string(), "aaaa".to_string())]);

        let err = UploadSelector::select_with(&archive, &KnownFingerprints::new(), &partial).unwrap_err();
        assert!(matches!(err, UploadError::MissingFingerprint { ref name } if name == "b.txt"));
    }

    #[test]
    fn test_empty_archive_yields_empty_plan() {
        let archive = SourceArchive::from_entries("/mem", Vec::new());
        let plan = UploadSelector::select(&archive, &KnownFingerprints::new(), |_| Ok(String::new())).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.entry_count(), 0);
    }
}
