//! Resource-match payloads exchanged with the controller.
//!
//! Before uploading, the client posts a description of every file it intends
//! to push; the controller answers with the subset it already stores. That
//! answer becomes the [`KnownFingerprints`] fed to the selector.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::archive::SourceArchive;
use crate::constants::RESOURCE_FILE_MODE;
use crate::errors::{Result, UploadError};
use crate::selector::{Fingerprint, KnownFingerprints};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChecksum {
    pub value: String,
}

/// One file as described to the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub path: String,
    pub size_in_bytes: u64,
    pub checksum: ResourceChecksum,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// Body of a resource-match request or response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMatch {
    pub resources: Vec<Resource>,
}

impl ResourceMatch {
    /// Describe every file of `archive` using precomputed checksums.
    ///
    /// Directories are skipped; the controller only matches file content.
    pub fn from_archive(archive: &SourceArchive, checksums: &HashMap<String, String>) -> Result<Self> {
        let resources = archive
            .entries()
            .iter()
            .filter(|entry| !entry.is_directory())
            .map(|entry| {
                let value = checksums
                    .get(entry.name())
                    .cloned()
                    .ok_or_else(|| UploadError::MissingFingerprint {
                        name: entry.name().to_string(),
                    })?;

                Ok(Resource {
                    path: entry.name().to_string(),
                    size_in_bytes: entry.size(),
                    checksum: ResourceChecksum { value },
                    mode: Some(RESOURCE_FILE_MODE.to_string()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { resources })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Convert a controller response into the selector's exclusion set.
    pub fn into_known_fingerprints(self) -> KnownFingerprints {
        self.resources
            .into_iter()
            .map(|resource| Fingerprint::new(resource.path, resource.checksum.value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveEntry;

    #[test]
    fn test_request_skips_directories() {
        let archive = SourceArchive::from_entries(
            "/mem",
            vec![
                ArchiveEntry::directory("lib"),
                ArchiveEntry::from_bytes("lib/a.txt", vec![0u8; 10]),
            ],
        );
        let checksums = HashMap::from([
            ("lib/".to_string(), "da39a3ee".to_string()),
            ("lib/a.txt".to_string(), "abc123".to_string()),
        ]);

        let request = ResourceMatch::from_archive(&archive, &checksums).unwrap();
        assert_eq!(request.resources.len(), 1);
        assert_eq!(request.resources[0].path, "lib/a.txt");
        assert_eq!(request.resources[0].size_in_bytes, 10);
        assert_eq!(request.resources[0].mode.as_deref(), Some("644"));
    }

    #[test]
    fn test_response_becomes_known_fingerprints() {
        let json = r#"{
            "resources": [
                {"path": "a.txt", "size_in_bytes": 10, "checksum": {"value": "ABCDEF"}},
                {"path": "b.txt", "size_in_bytes": 20, "checksum": {"value": "123456"}, "mode": "644"}
            ]
        }"#;

        let known = ResourceMatch::from_json(json).unwrap().into_known_fingerprints();
        assert_eq!(known.len(), 2);
        assert!(known.contains("a.txt", "abcdef"));
        assert!(!known.contains("a.txt", "123456"));
    }

    #[test]
    fn test_malformed_response_is_serialization_error() {
        let err = ResourceMatch::from_json("{\"resources\": 5}").unwrap_err();
        assert!(matches!(err, UploadError::Serialization(_)));
    }

    #[test]
    fn test_json_round_trip_omits_missing_mode() {
        let request = ResourceMatch {
            resources: vec![Resource {
                path: "x".into(),
                size_in_bytes: 1,
                checksum: ResourceChecksum { value: "00".into() },
                mode: None,
            }],
        };
        let json = request.to_json().unwrap();
        assert!(!json.contains("mode"));
        assert_eq!(ResourceMatch::from_json(&json).unwrap(), request);
    }
}
