use crate::auth::Role;
use crate::models::{
    Category, FileType, LikeState, NewCategory, NewReply, NewReport, NewThread, Reply, Report, ReportReason,
    ReportStatus, Tag, Thread, ThreadDetail, ThreadResource, UpsertProfile, User,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_categories,
        crate::routes::create_category,
        crate::routes::list_threads,
        crate::routes::create_thread,
        crate::routes::get_thread,
        crate::routes::delete_thread,
        crate::routes::toggle_like,
        crate::routes::create_reply,
        crate::routes::file_report,
        crate::routes::upload_resource,
        crate::routes::lock_thread,
        crate::routes::unlock_thread,
        crate::routes::delete_reply,
        crate::routes::list_reports,
        crate::routes::review_report,
        crate::routes::resolve_report,
        crate::routes::download_resource,
        crate::routes::delete_resource,
        crate::routes::get_me,
        crate::routes::put_me,
        crate::routes::grant_role,
        crate::routes::revoke_role,
        crate::routes::delete_user,
    ),
    components(schemas(
        Category, NewCategory, Tag, Thread, NewThread, ThreadDetail, Reply, NewReply,
        LikeState, Report, NewReport, ReportReason, ReportStatus, ThreadResource, FileType,
        User, UpsertProfile, Role, crate::routes::Profile, crate::routes::RoleChange
    )),
    tags(
        (name = "threads", description = "Threads, likes and replies"),
        (name = "moderation", description = "Reports, locking and reply removal"),
        (name = "resources", description = "Thread attachments"),
    )
)]
pub struct ApiDoc;
