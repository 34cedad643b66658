use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{http::StatusCode, web, HttpResponse};
use futures_util::TryStreamExt as _;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{Auth, Role};
use crate::error::ApiError;
use crate::models::*;
use crate::notify::Notifier;
use crate::policy::Actor;
use crate::repo::Repo;
use crate::resources::Upload;
use crate::storage::BlobStore;
use crate::{likes, replies, reports, resources, threads, users};

const RESOURCE_SIZE_LIMIT: usize = 20 * 1024 * 1024; // 20 MiB

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/categories")
                    .route(web::get().to(list_categories))
                    .route(web::post().to(create_category)),
            )
            .service(
                web::resource("/threads")
                    .route(web::get().to(list_threads))
                    .route(web::post().to(create_thread)),
            )
            .service(
                web::resource("/threads/{id}")
                    .route(web::get().to(get_thread))
                    .route(web::delete().to(delete_thread)),
            )
            .service(web::resource("/threads/{id}/like").route(web::post().to(toggle_like)))
            .service(web::resource("/threads/{id}/replies").route(web::post().to(create_reply)))
            .service(web::resource("/threads/{id}/reports").route(web::post().to(file_report)))
            .service(web::resource("/threads/{id}/resources").route(web::post().to(upload_resource)))
            .service(web::resource("/threads/{id}/lock").route(web::post().to(lock_thread)))
            .service(web::resource("/threads/{id}/unlock").route(web::post().to(unlock_thread)))
            .service(web::resource("/replies/{id}").route(web::delete().to(delete_reply)))
            .service(web::resource("/reports").route(web::get().to(list_reports)))
            .service(web::resource("/reports/{id}/review").route(web::post().to(review_report)))
            .service(web::resource("/reports/{id}/resolve").route(web::post().to(resolve_report)))
            .service(web::resource("/resources/{id}").route(web::delete().to(delete_resource)))
            .service(web::resource("/resources/{id}/file").route(web::get().to(download_resource)))
            .service(
                web::resource("/me")
                    .route(web::get().to(get_me))
                    .route(web::put().to(put_me)),
            )
            .service(
                web::resource("/admin/roles")
                    .route(web::post().to(grant_role))
                    .route(web::delete().to(revoke_role)),
            )
            .service(web::resource("/admin/users/{id}").route(web::delete().to(delete_user))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub blob_store: Arc<dyn BlobStore>,
    pub notifier: Arc<Notifier>,
}

/// The caller with their roles as currently stored.
async fn actor(data: &AppState, auth: &Auth) -> Result<Actor, ApiError> {
    Ok(Actor::load(&*data.repo, auth.user_id()).await?)
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ThreadQuery {
    pub category: Option<Id>,
    pub tag: Option<String>,
    /// Only the caller's own threads (requires a token).
    pub mine: Option<bool>,
    pub page: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Profile {
    pub user: User,
    pub roles: Vec<Role>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleChange {
    pub user_id: Id,
    pub role: Role,
}

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    responses((status = 200, description = "All categories", body = [Category]))
)]
pub async fn list_categories(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let categories = threads::list_categories(&*data.repo).await?;
    Ok(HttpResponse::Ok().json(categories))
}

#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = NewCategory,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Name taken")
    )
)]
pub async fn create_category(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewCategory>,
) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    let category = threads::create_category(&*data.repo, &actor, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(category))
}

#[utoipa::path(
    get,
    path = "/api/v1/threads",
    params(ThreadQuery),
    responses(
        (status = 200, description = "Newest threads first, ten per page", body = [Thread]),
        (status = 401, description = "`mine` without a token")
    )
)]
pub async fn list_threads(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    query: web::Query<ThreadQuery>,
) -> Result<HttpResponse, ApiError> {
    let q = query.into_inner();
    let author_id = match (q.mine.unwrap_or(false), auth.as_ref()) {
        (true, Some(a)) => Some(a.user_id()),
        (true, None) => return Err(ApiError::Unauthorized),
        (false, _) => None,
    };
    let filter = ThreadFilter { category_id: q.category, tag: q.tag, author_id, page: q.page };
    let list = threads::list_threads(&*data.repo, &filter).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[utoipa::path(
    post,
    path = "/api/v1/threads",
    request_body = NewThread,
    responses(
        (status = 201, description = "Thread created", body = Thread),
        (status = 400, description = "Empty title or content"),
        (status = 404, description = "Unknown category")
    )
)]
pub async fn create_thread(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewThread>,
) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    let thread = threads::create_thread(&*data.repo, &actor, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(thread))
}

#[utoipa::path(
    get,
    path = "/api/v1/threads/{id}",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread with rendered content, replies and resources", body = ThreadDetail),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_thread(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let viewer = match auth {
        Some(a) => Some(actor(&data, &a).await?),
        None => None,
    };
    let detail = threads::thread_detail(&*data.repo, viewer.as_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    delete,
    path = "/api/v1/threads/{id}",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 204, description = "Thread and its attachments removed"),
        (status = 403, description = "Neither author nor moderator"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_thread(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    threads::delete_thread(&*data.repo, &*data.blob_store, &actor, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/threads/{id}/like",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "New like state", body = LikeState),
        (status = 404, description = "Not found")
    )
)]
pub async fn toggle_like(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    let (state, events) = likes::toggle_like(&*data.repo, &actor, path.into_inner()).await?;
    data.notifier.publish(events).await;
    Ok(HttpResponse::Ok().json(state))
}

#[utoipa::path(
    post,
    path = "/api/v1/threads/{id}/replies",
    params(("id" = Id, Path, description = "Thread id")),
    request_body = NewReply,
    responses(
        (status = 201, description = "Reply created", body = Reply),
        (status = 400, description = "Empty content"),
        (status = 423, description = "Thread is locked")
    )
)]
pub async fn create_reply(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewReply>,
) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    let (reply, events) = replies::create_reply(&*data.repo, &actor, path.into_inner(), &payload.content).await?;
    data.notifier.publish(events).await;
    Ok(HttpResponse::Created().json(reply))
}

#[utoipa::path(
    post,
    path = "/api/v1/threads/{id}/reports",
    params(("id" = Id, Path, description = "Thread id")),
    request_body = NewReport,
    responses(
        (status = 201, description = "Report filed", body = Report),
        (status = 409, description = "Already reported by this user")
    )
)]
pub async fn file_report(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewReport>,
) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    let (report, events) =
        reports::file_report(&*data.repo, &actor, path.into_inner(), payload.into_inner()).await?;
    data.notifier.publish(events).await;
    Ok(HttpResponse::Created().json(report))
}

#[utoipa::path(
    post,
    path = "/api/v1/threads/{id}/resources",
    params(("id" = Id, Path, description = "Thread id")),
    request_body(content = String, description = "multipart/form-data with `title`, optional `description`, optional `file_type` and `file`", content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Resource stored", body = ThreadResource),
        (status = 400, description = "Missing title or file"),
        (status = 403, description = "Only the thread author may upload"),
        (status = 413, description = "File too large")
    )
)]
pub async fn upload_resource(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    let mut upload = Upload::default();
    let mut file_type_raw = String::new();
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::BadRequest("malformed multipart body".into())
    })? {
        let name = field.content_disposition().get_name().unwrap_or_default().to_string();
        if name == "file" {
            upload.filename = field.content_disposition().get_filename().unwrap_or_default().to_string();
        }
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::BadRequest("malformed multipart body".into())
        })? {
            if bytes.len() + chunk.len() > RESOURCE_SIZE_LIMIT {
                return Ok(HttpResponse::build(StatusCode::PAYLOAD_TOO_LARGE).finish());
            }
            bytes.extend_from_slice(&chunk);
        }
        match name.as_str() {
            "file" => upload.bytes = bytes,
            "title" => upload.title = form_text(&name, bytes)?,
            "description" => upload.description = Some(form_text(&name, bytes)?),
            "file_type" => file_type_raw = form_text(&name, bytes)?,
            _ => {}
        }
    }
    if !file_type_raw.trim().is_empty() {
        upload.file_type = Some(
            FileType::parse(&file_type_raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown file type '{file_type_raw}'")))?,
        );
    }
    let resource =
        resources::upload_resource(&*data.repo, &*data.blob_store, &actor, path.into_inner(), upload).await?;
    Ok(HttpResponse::Created().json(resource))
}

fn form_text(name: &str, bytes: Vec<u8>) -> Result<String, ApiError> {
    String::from_utf8(bytes).map_err(|_| ApiError::BadRequest(format!("{name} must be UTF-8")))
}

#[utoipa::path(
    post,
    path = "/api/v1/threads/{id}/lock",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread locked", body = Thread),
        (status = 403, description = "Moderators only")
    )
)]
pub async fn lock_thread(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    let thread = threads::set_locked(&*data.repo, &actor, path.into_inner(), true).await?;
    Ok(HttpResponse::Ok().json(thread))
}

#[utoipa::path(
    post,
    path = "/api/v1/threads/{id}/unlock",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread unlocked", body = Thread),
        (status = 403, description = "Moderators only")
    )
)]
pub async fn unlock_thread(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    let thread = threads::set_locked(&*data.repo, &actor, path.into_inner(), false).await?;
    Ok(HttpResponse::Ok().json(thread))
}

#[utoipa::path(
    delete,
    path = "/api/v1/replies/{id}",
    params(("id" = Id, Path, description = "Reply id")),
    responses(
        (status = 200, description = "Reply hidden", body = Reply),
        (status = 404, description = "No such reply among those the caller may delete")
    )
)]
pub async fn delete_reply(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    let reply = replies::delete_reply(&*data.repo, &actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(reply))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports",
    params(
        ("status" = Option<ReportStatus>, Query, description = "Filter by status"),
        ("reason" = Option<ReportReason>, Query, description = "Filter by reason")
    ),
    responses(
        (status = 200, description = "Newest reports first", body = [Report]),
        (status = 403, description = "Moderators only")
    )
)]
pub async fn list_reports(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<ReportFilter>,
) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    let list = reports::list_reports(&*data.repo, &actor, query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[utoipa::path(
    post,
    path = "/api/v1/reports/{id}/review",
    params(("id" = Id, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report marked reviewed", body = Report),
        (status = 400, description = "Report is already resolved"),
        (status = 403, description = "Moderators only")
    )
)]
pub async fn review_report(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    let report = reports::mark_reviewed(&*data.repo, &actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    post,
    path = "/api/v1/reports/{id}/resolve",
    params(("id" = Id, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report resolved", body = Report),
        (status = 403, description = "Moderators only")
    )
)]
pub async fn resolve_report(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    let report = reports::mark_resolved(&*data.repo, &actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/v1/resources/{id}/file",
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Stored file bytes"),
        (status = 404, description = "Not found")
    )
)]
pub async fn download_resource(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let (resource, bytes, mime) =
        resources::download_resource(&*data.repo, &*data.blob_store, path.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .content_type(mime)
        .insert_header(("Cache-Control", "private, max-age=3600"))
        .insert_header(("X-Resource-Id", resource.id.to_string()))
        .body(bytes))
}

#[utoipa::path(
    delete,
    path = "/api/v1/resources/{id}",
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 204, description = "File and record removed"),
        (status = 403, description = "Neither uploader nor thread author"),
        (status = 500, description = "Blob removal failed; record kept")
    )
)]
pub async fn delete_resource(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    resources::delete_resource(&*data.repo, &*data.blob_store, &actor, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Caller profile and roles", body = Profile),
        (status = 404, description = "Profile not registered yet")
    )
)]
pub async fn get_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id()).await?;
    let roles = data.repo.user_roles(user.id).await?;
    Ok(HttpResponse::Ok().json(Profile { user, roles }))
}

#[utoipa::path(
    put,
    path = "/api/v1/me",
    request_body = UpsertProfile,
    responses(
        (status = 200, description = "Profile stored", body = User),
        (status = 409, description = "Username taken")
    )
)]
pub async fn put_me(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<UpsertProfile>,
) -> Result<HttpResponse, ApiError> {
    let (user, events) = users::register_profile(&*data.repo, auth.user_id(), payload.into_inner()).await?;
    data.notifier.publish(events).await;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/roles",
    request_body = RoleChange,
    responses(
        (status = 204, description = "Role granted"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn grant_role(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<RoleChange>,
) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    users::grant_role(&*data.repo, &actor, payload.user_id, payload.role).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/roles",
    request_body = RoleChange,
    responses(
        (status = 204, description = "Role revoked"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn revoke_role(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<RoleChange>,
) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    users::revoke_role(&*data.repo, &actor, payload.user_id, payload.role).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/users/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 204, description = "User removed; content kept without author"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn delete_user(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let actor = actor(&data, &auth).await?;
    users::delete_user(&*data.repo, &actor, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
