use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::SystemSettings;

pub const GRIEVANCE_TITLE_MIN: usize = 5;
pub const GRIEVANCE_DESCRIPTION_MIN: usize = 20;
pub const GRIEVANCE_MAX_ATTACHMENTS: usize = 5;
pub const GRIEVANCE_ATTACHMENT_MAX_BYTES: u64 = 5 * 1024 * 1024;
pub const GRIEVANCE_ATTACHMENT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "pdf", "doc", "docx"];
pub const UPLOAD_MAX_BYTES: u64 = 10 * 1024 * 1024;
pub const UPLOAD_EXTENSIONS: &[&str] = &["csv", "xls", "xlsx"];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// A file picked for upload, with its size as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChoice {
    pub path: PathBuf,
    pub size: u64,
}

impl FileChoice {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let size = std::fs::metadata(path)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            size,
        })
    }

    fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_lowercase()
    }

    fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrievanceDraft {
    pub subject_id: String,
    pub title: String,
    pub description: String,
    pub attachments: Vec<FileChoice>,
}

pub fn validate_grievance(draft: &GrievanceDraft) -> Result<(), ValidationError> {
    if draft.subject_id.trim().is_empty() {
        return Err(ValidationError::new("subjectId", "Please select a subject"));
    }
    if draft.title.chars().count() < GRIEVANCE_TITLE_MIN {
        return Err(ValidationError::new(
            "title",
            format!("Title must be at least {GRIEVANCE_TITLE_MIN} characters"),
        ));
    }
    if draft.description.chars().count() < GRIEVANCE_DESCRIPTION_MIN {
        return Err(ValidationError::new(
            "description",
            format!("Description must be at least {GRIEVANCE_DESCRIPTION_MIN} characters"),
        ));
    }
    if draft.attachments.len() > GRIEVANCE_MAX_ATTACHMENTS {
        return Err(ValidationError::new(
            "attachments",
            format!("At most {GRIEVANCE_MAX_ATTACHMENTS} files may be attached"),
        ));
    }
    for file in &draft.attachments {
        if !GRIEVANCE_ATTACHMENT_EXTENSIONS.contains(&file.extension().as_str()) {
            return Err(ValidationError::new(
                "attachments",
                format!("{} is not an image, PDF or Word document", file.display_name()),
            ));
        }
        if file.size > GRIEVANCE_ATTACHMENT_MAX_BYTES {
            return Err(ValidationError::new(
                "attachments",
                format!("{} is larger than 5MB", file.display_name()),
            ));
        }
    }
    Ok(())
}

pub fn validate_upload(subject_id: &str, file: &FileChoice) -> Result<(), ValidationError> {
    if subject_id.trim().is_empty() {
        return Err(ValidationError::new(
            "subjectId",
            "Please select a subject before uploading",
        ));
    }
    if !UPLOAD_EXTENSIONS.contains(&file.extension().as_str()) || file.size > UPLOAD_MAX_BYTES {
        return Err(ValidationError::new(
            "csvFile",
            "Please upload a valid CSV/Excel file (max 10MB)",
        ));
    }
    Ok(())
}

pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Err(ValidationError::new("email", "Email is required"));
    }
    if password.is_empty() {
        return Err(ValidationError::new("password", "Password is required"));
    }
    Ok(())
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    field: &'static str,
    value: T,
    min: T,
    max: T,
) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::new(
            field,
            format!("must be between {min} and {max}, got {value}"),
        ));
    }
    Ok(())
}

pub fn validate_settings(settings: &SystemSettings) -> Result<(), ValidationError> {
    check_range(
        "attendanceThreshold",
        settings.attendance_threshold,
        50.0,
        100.0,
    )?;
    check_range(
        "defaulterAlertThreshold",
        settings.defaulter_alert_threshold,
        40.0,
        90.0,
    )?;
    check_range(
        "maxGrievanceAttachments",
        settings.max_grievance_attachments,
        1,
        10,
    )?;
    check_range("csvUploadMaxSize", settings.csv_upload_max_size, 1, 50)?;
    check_range("sessionTimeout", settings.session_timeout, 1, 168)?;
    Ok(())
}
