//! Data models for the ORCA site.
//!
//! Site settings, projects, team members, asset classes and the notices shown
//! to visitors and team members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Site Settings
// ============================================================================

/// Settings fields that can be edited inline or from the admin panel.
pub const SETTINGS_FIELDS: &[&str] = &["siteTitle", "tagline", "about", "heroDesc", "logo"];

pub const DEFAULT_SITE_TITLE: &str = "ORCA";

/// Field name to string value, mirroring the remote `settings/site` document.
///
/// The default value contains every field in [`SETTINGS_FIELDS`] and merges
/// only overlay values, so a settings object derived from the default is
/// always complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteSettings(BTreeMap<String, String>);

impl Default for SiteSettings {
    fn default() -> Self {
        let mut fields: BTreeMap<String, String> = SETTINGS_FIELDS
            .iter()
            .map(|f| (f.to_string(), String::new()))
            .collect();
        fields.insert("siteTitle".to_string(), DEFAULT_SITE_TITLE.to_string());
        Self(fields)
    }
}

impl SiteSettings {
    pub fn is_known_field(field: &str) -> bool {
        SETTINGS_FIELDS.contains(&field)
    }

    pub fn get(&self, field: &str) -> &str {
        self.0.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, field: &str, value: &str) {
        self.0.insert(field.to_string(), value.to_string());
    }

    /// Shallow merge: every field in `patch` replaces the current value.
    pub fn merge_from(&mut self, patch: &BTreeMap<String, String>) {
        for (field, value) in patch {
            self.0.insert(field.clone(), value.clone());
        }
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Site title with the built-in fallback when the stored title is blank.
    pub fn site_title(&self) -> &str {
        let title = self.get("siteTitle");
        if title.trim().is_empty() {
            DEFAULT_SITE_TITLE
        } else {
            title
        }
    }
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub youtube: String,
    #[serde(default)]
    pub model_details: String,
    #[serde(default)]
    pub project_details: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<String>,
    /// Size in bytes of the uploaded model, used to pick viewer quality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_size: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Project {
    /// Store the URL of an uploaded asset in the field its class maps to.
    pub fn set_asset_url(&mut self, class: AssetClass, url: String) {
        match class {
            AssetClass::Model => self.model_url = Some(url),
            AssetClass::Dataset => self.data_url = Some(url),
            AssetClass::Paper => self.pdf_url = Some(url),
            AssetClass::Document => self.doc_url = Some(url),
            AssetClass::Image => {}
        }
    }

    pub fn asset_url(&self, class: AssetClass) -> Option<&str> {
        match class {
            AssetClass::Model => self.model_url.as_deref(),
            AssetClass::Dataset => self.data_url.as_deref(),
            AssetClass::Paper => self.pdf_url.as_deref(),
            AssetClass::Document => self.doc_url.as_deref(),
            AssetClass::Image => None,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Trim tags, drop blanks and duplicates, keeping first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Catalog shown when the remote project list is empty or unreachable.
pub fn sample_projects() -> Vec<Project> {
    let mut metrics = BTreeMap::new();
    metrics.insert("polygons".to_string(), "1.2M".to_string());
    metrics.insert("format".to_string(), ".glb".to_string());

    vec![Project {
        id: "sample-1".to_string(),
        title: "3D Object Model".to_string(),
        description: "High-resolution 3D model of a space-related object, visualized interactively."
            .to_string(),
        tags: vec!["3D".to_string()],
        model_url: Some("/assets/models/object.glb".to_string()),
        metrics,
        ..Project::default()
    }]
}

/// Tags offered by the admin form.
pub const PROJECT_TAGS: &[&str] = &["3D", "Dataset", "Research", "Recycling", "Orbital"];

// ============================================================================
// Team
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub role: String,
    pub bio: String,
    pub email: Option<String>,
    pub image: Option<String>,
}

fn member(name: &str, role: &str, bio: &str, image: &str) -> TeamMember {
    TeamMember {
        name: name.to_string(),
        role: role.to_string(),
        bio: bio.to_string(),
        email: None,
        image: Some(image.to_string()),
    }
}

pub fn team_members() -> Vec<TeamMember> {
    vec![
        member("Member One", "Systems Lead", "Leading ORCA systems architecture", "/assets/team/member1.jpg"),
        member("Member Two", "Orbital Analytics", "Specializing in debris tracking and analysis", "/assets/team/member2.jpg"),
        member("Member Three", "Materials Specialist", "Research in space material recycling", "/assets/team/member3.jpg"),
        member("Member Four", "Platform Engineer", "Building ORCA's technical infrastructure", "/assets/team/member4.jpg"),
        member("Member Five", "Visualization Lead", "Creating interactive 3D experiences", "/assets/team/member5.jpg"),
    ]
}

// ============================================================================
// Asset Classes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetClass {
    Model,
    Dataset,
    Paper,
    Document,
    Image,
}

impl AssetClass {
    /// The classes a project submission can carry, in upload order.
    pub const PROJECT: [AssetClass; 4] = [
        AssetClass::Model,
        AssetClass::Dataset,
        AssetClass::Paper,
        AssetClass::Document,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AssetClass::Model => "Model",
            AssetClass::Dataset => "Dataset",
            AssetClass::Paper => "Paper",
            AssetClass::Document => "Document",
            AssetClass::Image => "Image",
        }
    }

    /// Object storage path prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            AssetClass::Model => "models",
            AssetClass::Dataset => "datasets",
            AssetClass::Paper => "papers",
            AssetClass::Document => "documents",
            AssetClass::Image => "assets",
        }
    }

    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            AssetClass::Model => &[".glb", ".gltf"],
            AssetClass::Dataset => &[".csv", ".json", ".xlsx"],
            AssetClass::Paper => &[".pdf"],
            AssetClass::Document => &[".doc", ".docx", ".txt"],
            AssetClass::Image => &[".jpg", ".jpeg", ".png", ".webp"],
        }
    }

    /// Name of the project document field holding this asset's URL.
    pub fn project_field(&self) -> &'static str {
        match self {
            AssetClass::Model => "modelUrl",
            AssetClass::Dataset => "dataUrl",
            AssetClass::Paper => "pdfUrl",
            AssetClass::Document => "docUrl",
            AssetClass::Image => "logo",
        }
    }

    /// Multipart form field the admin panel posts the file under.
    pub fn form_field(&self) -> &'static str {
        match self {
            AssetClass::Model => "modelFile",
            AssetClass::Dataset => "dataFile",
            AssetClass::Paper => "pdfFile",
            AssetClass::Document => "docFile",
            AssetClass::Image => "logoFile",
        }
    }

    pub fn from_form_field(name: &str) -> Option<AssetClass> {
        [
            AssetClass::Model,
            AssetClass::Dataset,
            AssetClass::Paper,
            AssetClass::Document,
            AssetClass::Image,
        ]
        .into_iter()
        .find(|c| c.form_field() == name)
    }
}

// ============================================================================
// Viewer Quality
// ============================================================================

/// Render settings handed to the client-side model viewer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerQuality {
    pub shadows: bool,
    pub antialias: bool,
    pub min_dpr: f32,
    pub debounce_ms: u32,
}

impl ViewerQuality {
    pub const FULL: ViewerQuality = ViewerQuality {
        shadows: true,
        antialias: true,
        min_dpr: 0.5,
        debounce_ms: 50,
    };

    pub const REDUCED: ViewerQuality = ViewerQuality {
        shadows: false,
        antialias: false,
        min_dpr: 0.2,
        debounce_ms: 200,
    };

    /// Models at or above `large_threshold` bytes render at reduced quality.
    /// Unknown sizes render at full quality.
    pub fn for_model_size(size: Option<u64>, large_threshold: u64) -> Self {
        match size {
            Some(bytes) if bytes >= large_threshold => Self::REDUCED,
            _ => Self::FULL,
        }
    }
}

// ============================================================================
// Notices
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

/// Banner shown at the top of a page. Sticky notices are not auto-dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    pub sticky: bool,
}

impl Notice {
    pub fn sticky(kind: NoticeKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            sticky: true,
        }
    }

    pub fn flash(kind: NoticeKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            sticky: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_complete() {
        let settings = SiteSettings::default();
        for field in SETTINGS_FIELDS {
            assert!(settings.fields().contains_key(*field), "missing {}", field);
        }
        assert_eq!(settings.get("siteTitle"), "ORCA");
    }

    #[test]
    fn test_merge_keeps_untouched_fields() {
        let mut settings = SiteSettings::default();
        let mut patch = BTreeMap::new();
        patch.insert("tagline".to_string(), "Cleaning orbit".to_string());
        settings.merge_from(&patch);

        assert_eq!(settings.get("tagline"), "Cleaning orbit");
        assert_eq!(settings.get("siteTitle"), "ORCA");
        assert_eq!(settings.fields().len(), SETTINGS_FIELDS.len());
    }

    #[test]
    fn test_blank_title_falls_back() {
        let mut settings = SiteSettings::default();
        settings.set("siteTitle", "  ");
        assert_eq!(settings.site_title(), "ORCA");
    }

    #[test]
    fn test_normalize_tags_dedupes_in_order() {
        let tags = normalize_tags(["3D", " Dataset ", "3D", "", "Research"]);
        assert_eq!(tags, vec!["3D", "Dataset", "Research"]);
    }

    #[test]
    fn test_project_omits_absent_urls() {
        let mut project = Project {
            title: "Debris map".to_string(),
            ..Project::default()
        };
        project.set_asset_url(AssetClass::Paper, "https://cdn/p.pdf".to_string());

        let value = serde_json::to_value(&project).unwrap();
        assert_eq!(value["pdfUrl"], "https://cdn/p.pdf");
        assert!(value.get("dataUrl").is_none());
        assert!(value.get("modelUrl").is_none());
    }

    #[test]
    fn test_viewer_quality_from_measured_size() {
        let threshold = 20 * 1024 * 1024;
        assert_eq!(ViewerQuality::for_model_size(None, threshold), ViewerQuality::FULL);
        assert_eq!(
            ViewerQuality::for_model_size(Some(threshold - 1), threshold),
            ViewerQuality::FULL
        );
        assert_eq!(
            ViewerQuality::for_model_size(Some(threshold), threshold),
            ViewerQuality::REDUCED
        );
    }

    #[test]
    fn test_form_field_lookup() {
        assert_eq!(AssetClass::from_form_field("dataFile"), Some(AssetClass::Dataset));
        assert_eq!(AssetClass::from_form_field("logoFile"), Some(AssetClass::Image));
        assert_eq!(AssetClass::from_form_field("title"), None);
    }
}
