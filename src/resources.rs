//! File attachments on threads. The blob and its record live and die
//! together: blobs are written before records and removed before them.

use chrono::Utc;
use tracing::{error, info};

use crate::error::{ServiceError, ServiceResult};
use crate::models::{FileType, Id, NewThreadResource, ThreadResource};
use crate::policy::Actor;
use crate::repo::Repo;
use crate::storage::{upload_key, BlobStore, BlobStoreError};

const FALLBACK_MIME: &str = "application/octet-stream";

/// A received upload, already read off the wire.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub title: String,
    pub description: Option<String>,
    /// Explicit choice from the form; inferred from the content otherwise.
    pub file_type: Option<FileType>,
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub async fn upload_resource(
    repo: &dyn Repo,
    blobs: &dyn BlobStore,
    actor: &Actor,
    thread_id: Id,
    upload: Upload,
) -> ServiceResult<ThreadResource> {
    let title = upload.title.trim().to_string();
    if title.is_empty() {
        return Err(ServiceError::Invalid("title is required".into()));
    }
    if upload.bytes.is_empty() {
        return Err(ServiceError::Invalid("file is required".into()));
    }
    let thread = repo.get_thread(thread_id).await?;
    if !actor.is_author(&thread) {
        return Err(ServiceError::Denied);
    }

    let mime = infer::get(&upload.bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| FALLBACK_MIME.into());
    let file_type = upload.file_type.unwrap_or_else(|| FileType::from_mime(&mime));
    let key = upload_key(&upload.filename, Utc::now());
    blobs.save(&key, &mime, &upload.bytes).await?;

    let new = NewThreadResource {
        thread_id,
        title,
        file_key: key.clone(),
        file_type,
        mime,
        uploaded_by: actor.user_id,
        description: upload.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
    };
    match repo.create_resource(new).await {
        Ok(resource) => {
            info!(resource_id = resource.id, thread_id, key = %resource.file_key, size = upload.bytes.len(), "resource uploaded");
            Ok(resource)
        }
        Err(e) => {
            if let Err(be) = blobs.delete(&key).await {
                error!(%key, error = %be, "orphaned blob after failed resource insert");
            }
            Err(e.into())
        }
    }
}

/// Record, bytes and stored MIME type of a resource.
pub async fn download_resource(
    repo: &dyn Repo,
    blobs: &dyn BlobStore,
    resource_id: Id,
) -> ServiceResult<(ThreadResource, Vec<u8>, String)> {
    let resource = repo.get_resource(resource_id).await?;
    let (bytes, mime) = blobs.load(&resource.file_key).await.map_err(|e| match e {
        BlobStoreError::NotFound => ServiceError::NotFound,
        other => other.into(),
    })?;
    Ok((resource, bytes, mime))
}

/// Uploader or thread author only. If the blob cannot be removed the record
/// stays, so nothing is left pointing nowhere and nothing is left unreferenced.
pub async fn delete_resource(
    repo: &dyn Repo,
    blobs: &dyn BlobStore,
    actor: &Actor,
    resource_id: Id,
) -> ServiceResult<()> {
    let resource = repo.get_resource(resource_id).await?;
    let thread = repo.get_thread(resource.thread_id).await?;
    if !(actor.is_author(&resource) || actor.is_author(&thread)) {
        return Err(ServiceError::Denied);
    }
    remove_resource_files(repo, blobs, &resource).await?;
    info!(resource_id, by = actor.user_id, "resource deleted");
    Ok(())
}

/// Blob first, then the record pointing at it.
pub(crate) async fn remove_resource_files(
    repo: &dyn Repo,
    blobs: &dyn BlobStore,
    resource: &ThreadResource,
) -> ServiceResult<()> {
    blobs.delete(&resource.file_key).await.map_err(|e| {
        error!(resource_id = resource.id, key = %resource.file_key, error = %e, "blob removal failed; record kept");
        e
    })?;
    repo.delete_resource(resource.id).await?;
    Ok(())
}
