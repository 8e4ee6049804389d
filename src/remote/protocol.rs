//! Wire DTOs of the polling protocol.
//!
//! The same collection shape travels both ways: the request lists what
//! the client holds (no download URLs), the response lists what the
//! authority has newer, each with a `downloadUrl`.

use serde::{Deserialize, Serialize};

use crate::config::document::DocumentVersion;
use crate::config::registry::section_key;

/// One (section, major, minor, url) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSectionParam {
    pub section_name: String,
    pub major_version: i32,
    pub minor_version: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl RemoteSectionParam {
    /// Request tuple for a section held at `version`.
    pub fn request(section_name: impl Into<String>, version: DocumentVersion) -> Self {
        Self {
            section_name: section_name.into(),
            major_version: version.major,
            minor_version: version.minor,
            download_url: None,
        }
    }

    pub fn version(&self) -> DocumentVersion {
        DocumentVersion::new(self.major_version, self.minor_version)
    }

    /// Same schema, strictly newer content.
    pub fn is_newer_than(&self, held: DocumentVersion) -> bool {
        self.major_version == held.major && self.minor_version > held.minor
    }

    pub fn names(&self, section: &str) -> bool {
        section_key(&self.section_name) == section_key(section)
    }
}

/// Poll request and response payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSectionCollection {
    pub machine_name: String,
    pub application_name: String,
    #[serde(default)]
    pub sections: Vec<RemoteSectionParam>,
}

impl RemoteSectionCollection {
    pub fn new(machine_name: impl Into<String>, application_name: impl Into<String>) -> Self {
        Self {
            machine_name: machine_name.into(),
            application_name: application_name.into(),
            sections: Vec::new(),
        }
    }

    pub fn with_sections(mut self, sections: Vec<RemoteSectionParam>) -> Self {
        self.sections = sections;
        self
    }

    pub fn find(&self, section: &str) -> Option<&RemoteSectionParam> {
        self.sections.iter().find(|param| param.names(section))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = RemoteSectionCollection::new("web-01", "storefront").with_sections(vec![
            RemoteSectionParam::request("appSettings", DocumentVersion::new(1, 4)),
        ]);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "machineName": "web-01",
                "applicationName": "storefront",
                "sections": [
                    { "sectionName": "appSettings", "majorVersion": 1, "minorVersion": 4 }
                ]
            })
        );
    }

    #[test]
    fn test_response_with_download_url() {
        let body = r#"{
            "machineName": "authority",
            "applicationName": "storefront",
            "sections": [
                { "sectionName": "AppSettings", "majorVersion": 1, "minorVersion": 6,
                  "downloadUrl": "http://authority/sections/AppSettings" }
            ]
        }"#;
        let response: RemoteSectionCollection = serde_json::from_str(body).unwrap();
        let param = response.find("appsettings").unwrap();
        assert_eq!(param.download_url.as_deref(), Some("http://authority/sections/AppSettings"));
        assert!(param.is_newer_than(DocumentVersion::new(1, 4)));
        assert!(!param.is_newer_than(DocumentVersion::new(1, 6)));
        assert!(!param.is_newer_than(DocumentVersion::new(2, 0)));
    }

    #[test]
    fn test_names_match_like_registry_keys() {
        let param = RemoteSectionParam::request("Überblick", DocumentVersion::new(1, 0));
        assert!(param.names("überblick"));
        assert!(param.names("ÜBERBLICK"));
        assert!(!param.names("uberblick"));
    }

    #[test]
    fn test_missing_sections_defaults_to_empty() {
        let response: RemoteSectionCollection =
            serde_json::from_str(r#"{ "machineName": "a", "applicationName": "b" }"#).unwrap();
        assert!(response.sections.is_empty());
    }
}
