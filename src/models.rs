use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Always Postgres backed ids
pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Full name when set, otherwise the username.
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => &self.username,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpsertProfile {
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Category {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCategory {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Tag {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Thread {
    pub id: Id,
    pub title: String,
    pub content: String, // markdown source
    pub author_id: Option<Id>,   // nulled when the author is deleted
    pub category_id: Option<Id>, // nulled when the category is deleted
    pub locked: bool,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewThread {
    pub title: String,
    pub content: String,
    pub category_id: Option<Id>,
    /// Comma separated free-text tag names.
    #[serde(default)]
    pub tags: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ThreadFilter {
    pub category_id: Option<Id>,
    pub tag: Option<String>,
    pub author_id: Option<Id>,
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Reply {
    pub id: Id,
    pub thread_id: Id,
    pub content: String,
    pub author_id: Option<Id>,
    pub is_deleted: bool, // soft delete marker, row is kept for audit
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReply {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Like {
    pub id: Id,
    pub thread_id: Id,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "report_reason", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportReason {
    Spam,
    Inappropriate,
    Harassment,
    Misinformation,
    Copyright,
    Other,
}

impl ReportReason {
    /// Human readable label used in notifications.
    pub fn label(self) -> &'static str {
        match self {
            ReportReason::Spam => "Spam",
            ReportReason::Inappropriate => "Inappropriate Content",
            ReportReason::Harassment => "Harassment",
            ReportReason::Misinformation => "Misinformation",
            ReportReason::Copyright => "Copyright Violation",
            ReportReason::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "report_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Reviewed => "reviewed",
            ReportStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Report {
    pub id: Id,
    pub thread_id: Id,
    pub reporter_id: Option<Id>,
    pub reason: ReportReason,
    pub description: String,
    pub status: ReportStatus,
    pub handled_by: Option<Id>, // last moderator to move the report
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReport {
    pub reason: ReportReason,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub reason: Option<ReportReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "resource_file_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Document,
    Image,
    Video,
    Audio,
    Other,
}

impl FileType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "document" => Some(FileType::Document),
            "image" => Some(FileType::Image),
            "video" => Some(FileType::Video),
            "audio" => Some(FileType::Audio),
            "other" => Some(FileType::Other),
            _ => None,
        }
    }

    /// Best guess from a sniffed MIME type.
    pub fn from_mime(mime: &str) -> Self {
        match mime {
            "application/pdf" => FileType::Pdf,
            m if m.starts_with("image/") => FileType::Image,
            m if m.starts_with("video/") => FileType::Video,
            m if m.starts_with("audio/") => FileType::Audio,
            "application/msword"
            | "application/rtf"
            | "application/vnd.oasis.opendocument.text"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                FileType::Document
            }
            _ => FileType::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ThreadResource {
    pub id: Id,
    pub thread_id: Id,
    pub title: String,
    pub file_key: String, // blob storage upload path
    pub file_type: FileType,
    pub mime: String,
    pub uploaded_by: Option<Id>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewThreadResource {
    pub thread_id: Id,
    pub title: String,
    pub file_key: String,
    pub file_type: FileType,
    pub mime: String,
    pub uploaded_by: Id,
    pub description: Option<String>,
}

/// Everything a reader sees for one thread.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ThreadDetail {
    pub thread: Thread,
    pub content_html: String,
    pub tags: Vec<Tag>,
    pub replies: Vec<Reply>,
    pub resources: Vec<ThreadResource>,
    pub liked: bool,
    pub is_author: bool,
    pub is_moderator: bool,
}
