//! Integration tests for fingerprint-based selection.
//!
//! These tests check that the upload plan contains exactly the entries
//! whose `(name, checksum)` pair the controller does not already know.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use proptest::prelude::*;

use cf_bits::archive::{ArchiveEntry, SourceArchive};
use cf_bits::resource_match::ResourceMatch;
use cf_bits::selector::{Fingerprint, KnownFingerprints, UploadSelector};
use cf_bits::utils::hash::{compute_fingerprints, ChecksumAlgorithm};

/// Entry names mapped to (content length, checksum, known-state)
/// known-state: 0 = unknown, 1 = known with the same checksum, 2 = known under a stale checksum
fn entry_specs() -> impl Strategy<Value = BTreeMap<String, (usize, u8, u8)>> {
    prop::collection::btree_map("[a-z]{1,6}(/[a-z]{1,6}){0,2}\\.txt", (0usize..64, any::<u8>(), 0u8..3), 0..24)
}

proptest! {
    #[test]
    fn plan_contains_exactly_unknown_fingerprints(specs in entry_specs()) {
        let mut entries = Vec::new();
        let mut checksums = HashMap::new();
        let mut known = KnownFingerprints::new();

        for (name, (len, seed, state)) in &specs {
            entries.push(ArchiveEntry::from_bytes(name.clone(), vec![*seed; *len]));
            let checksum = format!("{:02x}{:04x}", seed, len);
            match state {
                1 => { known.insert(Fingerprint::new(name.clone(), &checksum)); }
                2 => { known.insert(Fingerprint::new(name.clone(), "ffffffff")); }
                _ => {}
            }
            checksums.insert(name.clone(), checksum);
        }
        let archive = SourceArchive::from_entries("/mem", entries);

        let plan = UploadSelector::select_with(&archive, &known, &checksums).unwrap();

        let expected: Vec<&str> = archive
            .entries()
            .iter()
            .filter(|e| !known.contains(e.name(), &checksums[e.name()]))
            .map(|e| e.name())
            .collect();
        let selected: Vec<&str> = plan.entries().iter().map(|e| e.name()).collect();

        prop_assert_eq!(&selected, &expected);
        prop_assert_eq!(plan.excluded_count(), archive.len() - selected.len());
        prop_assert_eq!(
            plan.total_uncompressed_size(),
            plan.entries().iter().map(|e| e.size()).sum::<u64>()
        );
        prop_assert_eq!(plan.is_empty(), selected.is_empty());
    }
}

fn two_file_archive() -> SourceArchive {
    SourceArchive::from_entries(
        "/mem",
        vec![
            ArchiveEntry::from_bytes("a.txt", vec![b'a'; 10]),
            ArchiveEntry::from_bytes("b.txt", vec![b'b'; 20]),
        ],
    )
}

/// Test the full fingerprint then select flow with real digests
#[tokio::test]
async fn test_one_known_file_is_excluded() -> Result<()> {
    let archive = two_file_archive();
    let checksums = compute_fingerprints(&archive, ChecksumAlgorithm::Sha1).await?;

    let known: KnownFingerprints = vec![("a.txt", checksums["a.txt"].as_str())].into_iter().collect();
    let plan = UploadSelector::select_with(&archive, &known, &checksums)?;

    assert_eq!(plan.entry_count(), 1);
    assert_eq!(plan.entries()[0].name(), "b.txt");
    assert_eq!(plan.total_uncompressed_size(), 20);
    assert_eq!(plan.excluded_count(), 1);
    Ok(())
}

/// Test that a controller response covering everything yields an empty plan
#[tokio::test]
async fn test_all_known_through_resource_match() -> Result<()> {
    let archive = two_file_archive();
    let checksums = compute_fingerprints(&archive, ChecksumAlgorithm::Sha256).await?;

    // The controller echoes back every resource it already has
    let request = ResourceMatch::from_archive(&archive, &checksums)?;
    let response = ResourceMatch::from_json(&request.to_json()?)?;
    let known = response.into_known_fingerprints();

    let plan = UploadSelector::select_with(&archive, &known, &checksums)?;
    assert!(plan.is_empty());
    assert_eq!(plan.total_uncompressed_size(), 0);
    assert_eq!(plan.excluded_count(), 2);
    Ok(())
}

/// Test that the same content under a new name is still uploaded
#[tokio::test]
async fn test_renamed_content_is_new() -> Result<()> {
    let archive = SourceArchive::from_entries(
        "/mem",
        vec![ArchiveEntry::from_bytes("renamed.txt", vec![b'a'; 10])],
    );
    let checksums = compute_fingerprints(&archive, ChecksumAlgorithm::Sha1).await?;

    let known: KnownFingerprints =
        vec![("a.txt", checksums["renamed.txt"].as_str())].into_iter().collect();
    let plan = UploadSelector::select_with(&archive, &known, &checksums)?;

    assert_eq!(plan.entry_count(), 1);
    Ok(())
}
