use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use serde::Serialize;

use crate::metrics::record_upload;
use crate::models::{QuestionKind, SubmissionStatus};
use crate::storage::{FormStore, StoreError};

lazy_static! {
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._-]").unwrap();
}

/// Wire shape of the upload endpoint: always an HTTP 200 JSON body, with
/// `success` telling the client whether anything was stored.
#[derive(Debug, Serialize)]
pub struct UploadOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(rename = "originalName", skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UploadOutcome {
    fn rejected(message: impl Into<String>) -> Self {
        record_upload("rejected");
        Self {
            success: false,
            filename: None,
            original_name: None,
            message: Some(message.into()),
        }
    }

    fn accepted(filename: String, original_name: String) -> Self {
        record_upload("accepted");
        Self {
            success: true,
            filename: Some(filename),
            original_name: Some(original_name),
            message: None,
        }
    }
}

/// The file upload gate: validates an uploaded file against the owning
/// question's constraints and stores it under a collision-resistant name.
/// Stored files are linked to an answer only later, when the step POST
/// references the returned filename; nothing here cleans up orphans.
pub struct UploadService {
    store: Arc<dyn FormStore>,
    upload_dir: PathBuf,
}

impl UploadService {
    pub fn new(store: Arc<dyn FormStore>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            upload_dir: upload_dir.into(),
        }
    }

    /// Validation order: file present, token resolves to a live submission,
    /// question belongs to the same questionnaire and takes files, extension
    /// allow-list, size cap. Any failure is a structured rejection; no file
    /// is written and no error propagates to the client.
    pub async fn accept_upload(
        &self,
        token: &str,
        question_id: &str,
        original_name: Option<&str>,
        data: &[u8],
    ) -> UploadOutcome {
        let original_name = match original_name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return UploadOutcome::rejected("No file provided"),
        };
        if data.is_empty() {
            return UploadOutcome::rejected("No file provided");
        }

        let submission = match self.store.submission_by_token(token).await {
            Ok(submission) => submission,
            Err(StoreError::NotFound(_)) => return UploadOutcome::rejected("Invalid link"),
            Err(err) => {
                tracing::error!("Upload token lookup failed: {}", err);
                return UploadOutcome::rejected("Upload failed, please retry");
            }
        };

        if submission.status == SubmissionStatus::Completed
            || submission.status == SubmissionStatus::Abandoned
            || submission.is_expired_at(Utc::now())
        {
            return UploadOutcome::rejected("Invalid link");
        }

        let questionnaire = match self.store.questionnaire(&submission.questionnaire_id).await {
            Ok(questionnaire) => questionnaire,
            Err(err) => {
                tracing::error!("Upload questionnaire lookup failed: {}", err);
                return UploadOutcome::rejected("Upload failed, please retry");
            }
        };
        if !questionnaire.active {
            return UploadOutcome::rejected("Invalid link");
        }

        let question = match questionnaire.find_question(question_id) {
            Some(question) if question.kind == QuestionKind::FileUpload => question,
            _ => return UploadOutcome::rejected("Unknown question"),
        };

        if let Some(rules) = &question.file_rules {
            if !rules.allowed_extensions.is_empty() {
                // Case-sensitive exact match against the client-reported
                // extension.
                let extension = extension_of(original_name);
                let allowed = extension
                    .map(|ext| rules.allowed_extensions.iter().any(|e| e == ext))
                    .unwrap_or(false);
                if !allowed {
                    return UploadOutcome::rejected(format!(
                        "File type not allowed (accepted: {})",
                        rules.allowed_extensions.join(", ")
                    ));
                }
            }

            if let Some(max_bytes) = rules.max_size_bytes {
                if data.len() as i64 > max_bytes {
                    return UploadOutcome::rejected(format!(
                        "File too large (limit {} bytes)",
                        max_bytes
                    ));
                }
            }
        }

        let stored_name = stored_filename(original_name);
        if let Err(err) = self.write_file(&stored_name, data).await {
            tracing::error!("Failed to store upload {}: {:#}", stored_name, err);
            return UploadOutcome::rejected("Upload failed, please retry");
        }

        tracing::info!(
            submission_id = %submission.id,
            question_id,
            filename = %stored_name,
            size = data.len(),
            "Upload stored"
        );
        UploadOutcome::accepted(stored_name, original_name.to_string())
    }

    async fn write_file(&self, stored_name: &str, data: &[u8]) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::write(self.upload_dir.join(stored_name), data).await?;
        Ok(())
    }
}

/// Client-reported extension: everything after the last dot of the bare
/// file name, if any.
fn extension_of(original_name: &str) -> Option<&str> {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
}

/// Collision-resistant stored name: 16 hex chars of randomness plus the
/// sanitized original name, so staff can still recognize the file.
fn stored_filename(original_name: &str) -> String {
    let bare = Path::new(original_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload");
    let safe = UNSAFE_FILENAME_CHARS.replace_all(bare, "_");
    format!("{:016x}_{}", rand::rng().random::<u64>(), safe)
}
