//! Abuse reports: one per reporter and thread, triaged by moderators
//! through `pending -> reviewed -> resolved`.

use tracing::{info, warn};

use crate::auth::Role;
use crate::error::{ServiceError, ServiceResult};
use crate::events::DomainEvent;
use crate::models::{Id, NewReport, Report, ReportFilter, ReportStatus};
use crate::policy::Actor;
use crate::repo::{Repo, RepoError};
use crate::users;

pub async fn file_report(
    repo: &dyn Repo,
    actor: &Actor,
    thread_id: Id,
    new: NewReport,
) -> ServiceResult<(Report, Vec<DomainEvent>)> {
    let thread = repo.get_thread(thread_id).await?;
    if repo.has_reported(thread_id, actor.user_id).await? {
        return Err(ServiceError::DuplicateReport);
    }
    // the storage constraint settles races the check above cannot see
    let report = match repo.create_report(thread_id, actor.user_id, new).await {
        Err(RepoError::Conflict) => return Err(ServiceError::DuplicateReport),
        other => other?,
    };
    info!(report_id = report.id, thread_id, reporter = actor.user_id, reason = ?report.reason, "report filed");

    let author = match thread.author_id {
        Some(author_id) => users::recipient(repo, author_id).await,
        None => None,
    };
    let author_is_moderator = match &author {
        Some(a) => match repo.user_roles(a.user_id).await {
            Ok(roles) => roles.contains(&Role::Moderator),
            Err(e) => {
                warn!(user_id = a.user_id, error = %e, "role lookup failed; moderator copy skipped");
                false
            }
        },
        None => false,
    };
    let event = DomainEvent::ReportFiled {
        report_id: report.id,
        thread_id,
        thread_title: thread.title,
        reason: report.reason,
        description: report.description.clone(),
        reporter_name: users::display_name(repo, actor.user_id).await,
        author,
        author_is_moderator,
    };
    Ok((report, vec![event]))
}

pub async fn list_reports(repo: &dyn Repo, actor: &Actor, filter: ReportFilter) -> ServiceResult<Vec<Report>> {
    if !actor.can_moderate() {
        return Err(ServiceError::Denied);
    }
    Ok(repo.list_reports(filter).await?)
}

pub async fn mark_reviewed(repo: &dyn Repo, actor: &Actor, report_id: Id) -> ServiceResult<Report> {
    transition_report(repo, actor, report_id, ReportStatus::Reviewed).await
}

pub async fn mark_resolved(repo: &dyn Repo, actor: &Actor, report_id: Id) -> ServiceResult<Report> {
    transition_report(repo, actor, report_id, ReportStatus::Resolved).await
}

/// Move a report forward. Re-applying the current status is a no-op and
/// moving backwards is rejected.
pub async fn transition_report(
    repo: &dyn Repo,
    actor: &Actor,
    report_id: Id,
    target: ReportStatus,
) -> ServiceResult<Report> {
    if !actor.can_moderate() {
        warn!(report_id, user_id = actor.user_id, "report transition denied");
        return Err(ServiceError::Denied);
    }
    if target == ReportStatus::Pending {
        return Err(ServiceError::Invalid("reports cannot be moved back to pending".into()));
    }
    // one retry covers a concurrent moderator moving the same report
    for _ in 0..2 {
        let current = repo.get_report(report_id).await?;
        if current.status == target {
            return Ok(current);
        }
        if current.status > target {
            return Err(ServiceError::Invalid(format!(
                "a {} report cannot become {}",
                current.status.as_str(),
                target.as_str()
            )));
        }
        match repo.transition_report(report_id, current.status, target, actor.user_id).await {
            Err(RepoError::Conflict) => continue,
            other => {
                let updated = other?;
                info!(report_id, by = actor.user_id, from = current.status.as_str(), to = target.as_str(), "report status changed");
                return Ok(updated);
            }
        }
    }
    Err(ServiceError::Repo(RepoError::Conflict))
}
