//! Project asset uploads.
//!
//! A submission carries up to one file per [`AssetClass`]. Every file is
//! validated before any network call. Required assets are uploaded one at a
//! time and abort the submission on failure; optional assets are uploaded
//! concurrently and a failure only drops that field. The project document is
//! written once all uploads have settled.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{SiteConfig, MAX_UPLOAD_BYTES};
use crate::error::{SiteError, SiteResult};
use crate::models::{normalize_tags, AssetClass, Project};
use crate::remote::{
    Credentials, DocumentStore, ObjectStorage, ProgressSender, StoredObject, PROJECTS_COLLECTION,
};

pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// ============================================================================
// Files and validation
// ============================================================================

/// A file picked in the admin form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl SelectedFile {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Lowercased extension including the dot, e.g. `".glb"`.
    pub fn extension(&self) -> String {
        let last = self.file_name.rsplit('.').next().unwrap_or("");
        format!(".{}", last.to_lowercase())
    }
}

/// Check presence, size and extension. Content is never inspected.
pub fn validate_file(class: AssetClass, file: Option<&SelectedFile>, max_bytes: u64) -> SiteResult<()> {
    let file = file.ok_or_else(|| SiteError::Validation("No file selected".to_string()))?;

    if file.size() > max_bytes {
        return Err(SiteError::Validation(format!(
            "File too large. Maximum size is {}MB",
            max_bytes / (1024 * 1024)
        )));
    }

    let allowed = class.allowed_extensions();
    if !allowed.contains(&file.extension().as_str()) {
        return Err(SiteError::UnsupportedFormat(format!(
            "Invalid file type. Allowed: {}",
            allowed.join(", ")
        )));
    }
    Ok(())
}

/// Replace every character outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Storage path `{prefix}/{unix_millis}_{sanitized}`.
pub fn object_name(class: AssetClass, file_name: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}/{}_{}",
        class.prefix(),
        now.timestamp_millis(),
        sanitize_file_name(file_name)
    )
}

pub fn content_type_for(file: &SelectedFile) -> String {
    if let Some(ct) = file.content_type.as_deref().filter(|ct| !ct.is_empty()) {
        return ct.to_string();
    }
    match file.extension().as_str() {
        ".glb" => "model/gltf-binary",
        ".gltf" => "model/gltf+json",
        ".csv" => "text/csv",
        ".json" => "application/json",
        ".xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".pdf" => "application/pdf",
        ".doc" => "application/msword",
        ".docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".txt" => "text/plain",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".webp" => "image/webp",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn describe_timeout(timeout: Duration) -> String {
    let secs = timeout.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("Upload timeout after {} minutes", secs / 60)
    } else {
        format!("Upload timeout after {} seconds", secs)
    }
}

// ============================================================================
// Policy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetPolicy {
    /// Any failure aborts the submission before the document is written.
    Required,
    /// Failure drops the field and is reported as a warning.
    Optional,
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub policies: BTreeMap<AssetClass, AssetPolicy>,
    pub max_bytes: u64,
    pub timeout: Duration,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        let policies = AssetClass::PROJECT
            .into_iter()
            .map(|class| {
                let policy = if class == AssetClass::Model {
                    AssetPolicy::Required
                } else {
                    AssetPolicy::Optional
                };
                (class, policy)
            })
            .collect();
        Self {
            policies,
            max_bytes: MAX_UPLOAD_BYTES,
            timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }
}

impl UploadPolicy {
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            max_bytes: config.max_upload_bytes,
            timeout: config.upload_timeout,
            ..Self::default()
        }
    }

    pub fn policy_for(&self, class: AssetClass) -> AssetPolicy {
        self.policies
            .get(&class)
            .copied()
            .unwrap_or(AssetPolicy::Optional)
    }
}

// ============================================================================
// Submission
// ============================================================================

/// The admin project form.
#[derive(Debug, Clone, Default)]
pub struct ProjectSubmission {
    pub title: String,
    pub description: String,
    pub summary: String,
    pub youtube: String,
    pub model_details: String,
    pub project_details: String,
    pub impact: String,
    pub tags: Vec<String>,
    pub files: BTreeMap<AssetClass, SelectedFile>,
}

#[derive(Debug, Clone)]
pub struct SubmissionReport {
    pub project_id: String,
    pub project: Project,
    /// `"{field}: {reason}"` per optional asset that was dropped.
    pub warnings: Vec<String>,
}

impl SubmissionReport {
    pub fn warning_message(&self) -> Option<String> {
        if self.warnings.is_empty() {
            None
        } else {
            Some(format!("Some files failed to upload: {}", self.warnings.join(", ")))
        }
    }
}

pub struct UploadPipeline {
    docs: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStorage>,
    policy: UploadPolicy,
}

impl UploadPipeline {
    pub fn new(docs: Arc<dyn DocumentStore>, objects: Arc<dyn ObjectStorage>, policy: UploadPolicy) -> Self {
        Self {
            docs,
            objects,
            policy,
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    async fn store(
        &self,
        path: String,
        file: SelectedFile,
        progress: Option<ProgressSender>,
        auth: Option<&Credentials>,
    ) -> SiteResult<StoredObject> {
        let content_type = content_type_for(&file);
        let upload = self
            .objects
            .put_object(&path, file.data, &content_type, progress, auth);
        // Dropping the future on expiry cancels the request.
        tokio::time::timeout(self.policy.timeout, upload)
            .await
            .map_err(|_| SiteError::Timeout(describe_timeout(self.policy.timeout)))?
    }

    /// Validate and upload one asset under its class prefix.
    pub async fn upload_asset(
        &self,
        class: AssetClass,
        file: SelectedFile,
        progress: Option<ProgressSender>,
        auth: Option<&Credentials>,
    ) -> SiteResult<StoredObject> {
        validate_file(class, Some(&file), self.policy.max_bytes)?;
        let path = object_name(class, &file.file_name, Utc::now());
        let size = file.size();
        let stored = self.store(path, file, progress, auth).await?;
        info!(class = class.label(), path = %stored.path, size, "asset uploaded");
        Ok(stored)
    }

    /// Upload a site logo to `assets/{millis}_logo_{name}` and return its URL.
    pub async fn upload_logo(&self, file: SelectedFile, auth: Option<&Credentials>) -> SiteResult<String> {
        validate_file(AssetClass::Image, Some(&file), self.policy.max_bytes)?;
        let path = object_name(AssetClass::Image, &format!("logo_{}", file.file_name), Utc::now());
        let stored = self.store(path, file, None, auth).await?;
        info!(path = %stored.path, "logo uploaded");
        Ok(stored.download_url)
    }

    pub async fn submit(
        &self,
        submission: ProjectSubmission,
        progress: Option<ProgressSender>,
        auth: Option<&Credentials>,
    ) -> SiteResult<SubmissionReport> {
        let title = submission.title.trim().to_string();
        let description = submission.description.trim().to_string();
        if title.is_empty() {
            return Err(SiteError::Validation("Project title is required".to_string()));
        }
        if description.is_empty() {
            return Err(SiteError::Validation("Project description is required".to_string()));
        }

        let mut warnings = Vec::new();
        let mut required = Vec::new();
        let mut optional = Vec::new();
        for (class, file) in submission.files {
            let policy = self.policy.policy_for(class);
            if let Err(e) = validate_file(class, Some(&file), self.policy.max_bytes) {
                match policy {
                    AssetPolicy::Required => {
                        return Err(SiteError::RequiredAsset {
                            class,
                            reason: e.to_string(),
                        })
                    }
                    AssetPolicy::Optional => {
                        warn!(class = class.label(), error = %e, "dropping invalid optional asset");
                        warnings.push(format!("{}: {}", class.project_field(), e));
                        continue;
                    }
                }
            }
            match policy {
                AssetPolicy::Required => required.push((class, file)),
                AssetPolicy::Optional => optional.push((class, file)),
            }
        }

        let now = Utc::now();
        let mut project = Project {
            title,
            description,
            summary: submission.summary.trim().to_string(),
            youtube: submission.youtube.trim().to_string(),
            model_details: submission.model_details.trim().to_string(),
            project_details: submission.project_details.trim().to_string(),
            impact: submission.impact.trim().to_string(),
            tags: normalize_tags(&submission.tags),
            created_at: Some(now),
            updated_at: Some(now),
            ..Project::default()
        };

        let mut progress = progress;
        for (class, file) in required {
            let tx = if class == AssetClass::Model {
                progress.take()
            } else {
                None
            };
            if let Some(tx) = &tx {
                tx.send_replace(0);
            }
            let stored = self.upload_asset(class, file, tx, auth).await.map_err(|e| {
                warn!(class = class.label(), error = %e, "required asset failed, aborting submission");
                SiteError::RequiredAsset {
                    class,
                    reason: e.to_string(),
                }
            })?;
            if class == AssetClass::Model {
                project.model_size = Some(stored.size);
            }
            project.set_asset_url(class, stored.download_url);
        }

        let uploads = optional.into_iter().map(|(class, file)| {
            let tx = if class == AssetClass::Model {
                progress.take()
            } else {
                None
            };
            async move { (class, self.upload_asset(class, file, tx, auth).await) }
        });
        for (class, result) in join_all(uploads.collect::<Vec<_>>()).await {
            match result {
                Ok(stored) => {
                    if class == AssetClass::Model {
                        project.model_size = Some(stored.size);
                    }
                    project.set_asset_url(class, stored.download_url);
                }
                Err(e) => {
                    warn!(class = class.label(), error = %e, "optional asset failed");
                    warnings.push(format!("{}: {}", class.project_field(), e));
                }
            }
        }

        let mut doc = match serde_json::to_value(&project)? {
            Value::Object(map) => map,
            _ => return Err(SiteError::Malformed("project did not serialize to an object".to_string())),
        };
        doc.remove("id");

        let project_id = self.docs.add_document(PROJECTS_COLLECTION, &doc, auth).await?;
        project.id = project_id.clone();
        info!(
            %project_id,
            title = %project.title,
            warnings = warnings.len(),
            "project created"
        );

        Ok(SubmissionReport {
            project_id,
            project,
            warnings,
        })
    }
}

#[cfg(test)]
#[path = "upload_test.rs"]
mod upload_test;
