#![cfg(feature = "inmem-store")]

mod common;

use quorum::auth::Role;
use quorum::error::ServiceError;
use quorum::events::DomainEvent;
use quorum::models::{NewReport, ReportFilter, ReportReason, ReportStatus};
use quorum::notify::{notifications_for, Notification};
use quorum::reports::{file_report, list_reports, mark_resolved, mark_reviewed, transition_report};
use quorum::repo::inmem::InMemRepo;
use quorum::repo::{ReportRepo, UserRepo};

fn spam() -> NewReport {
    NewReport { reason: ReportReason::Spam, description: "buy cheap watches".into() }
}

async fn seeded() -> (InMemRepo, i64) {
    let repo = InMemRepo::ephemeral();
    common::user(&repo, 1, "author").await;
    common::user(&repo, 2, "reporter").await;
    common::user(&repo, 3, "mod").await;
    common::user(&repo, 4, "admin").await;
    repo.grant_role(3, Role::Moderator).await.unwrap();
    repo.grant_role(4, Role::Admin).await.unwrap();
    let t = common::thread(&repo, 1, "Watches").await;
    (repo, t.id)
}

#[tokio::test]
async fn second_report_from_same_user_is_a_duplicate() {
    let (repo, tid) = seeded().await;
    let reporter = common::actor(&repo, 2).await;

    let (report, events) = file_report(&repo, &reporter, tid, spam()).await.unwrap();
    assert_eq!(report.status, ReportStatus::Pending);
    assert_eq!(report.reporter_id, Some(2));
    assert_eq!(events.len(), 1);

    let err = file_report(&repo, &reporter, tid, spam()).await.unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateReport));

    let moderator = common::actor(&repo, 3).await;
    let all = list_reports(&repo, &moderator, ReportFilter::default()).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn storage_rejects_a_racing_duplicate() {
    let (repo, tid) = seeded().await;
    repo.create_report(tid, 2, spam()).await.unwrap();
    assert!(matches!(repo.create_report(tid, 2, spam()).await, Err(quorum::repo::RepoError::Conflict)));
}

#[tokio::test]
async fn author_is_told_the_readable_reason() {
    let (repo, tid) = seeded().await;
    let reporter = common::actor(&repo, 2).await;
    let (_, events) = file_report(&repo, &reporter, tid, spam()).await.unwrap();

    let notes = notifications_for(&events[0]);
    assert_eq!(notes.len(), 1);
    assert_eq!(
        notes[0],
        Notification::ReportFiled {
            to: "author@example.com".into(),
            reporter_name: "reporter".into(),
            thread_title: "Watches".into(),
            reason: "Spam".into(),
        }
    );
}

#[tokio::test]
async fn moderator_authors_also_get_the_details() {
    let (repo, _) = seeded().await;
    let own = common::thread(&repo, 3, "Mod post").await;
    let reporter = common::actor(&repo, 2).await;
    let (_, events) = file_report(&repo, &reporter, own.id, spam()).await.unwrap();

    assert!(matches!(&events[0], DomainEvent::ReportFiled { author_is_moderator: true, .. }));
    let notes = notifications_for(&events[0]);
    assert_eq!(notes.len(), 2);
    assert!(matches!(&notes[1], Notification::AdminGeneric { to, .. } if to == "mod@example.com"));
}

#[tokio::test]
async fn only_moderators_and_staff_move_reports() {
    let (repo, tid) = seeded().await;
    let reporter = common::actor(&repo, 2).await;
    let (report, _) = file_report(&repo, &reporter, tid, spam()).await.unwrap();

    let err = mark_reviewed(&repo, &reporter, report.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Denied));
    assert!(matches!(list_reports(&repo, &reporter, ReportFilter::default()).await, Err(ServiceError::Denied)));
    assert_eq!(repo.get_report(report.id).await.unwrap().status, ReportStatus::Pending);

    let admin = common::actor(&repo, 4).await;
    let reviewed = mark_reviewed(&repo, &admin, report.id).await.unwrap();
    assert_eq!(reviewed.status, ReportStatus::Reviewed);
    assert_eq!(reviewed.handled_by, Some(4));
}

#[tokio::test]
async fn status_only_moves_forward() {
    let (repo, tid) = seeded().await;
    let reporter = common::actor(&repo, 2).await;
    let moderator = common::actor(&repo, 3).await;
    let (report, _) = file_report(&repo, &reporter, tid, spam()).await.unwrap();

    let reviewed = mark_reviewed(&repo, &moderator, report.id).await.unwrap();
    assert_eq!(reviewed.status, ReportStatus::Reviewed);
    assert_eq!(reviewed.handled_by, Some(3));
    assert!(reviewed.updated_at >= report.updated_at);

    // same status again is a no-op
    let again = mark_reviewed(&repo, &moderator, report.id).await.unwrap();
    assert_eq!(again.status, ReportStatus::Reviewed);

    let resolved = mark_resolved(&repo, &moderator, report.id).await.unwrap();
    assert_eq!(resolved.status, ReportStatus::Resolved);

    let err = mark_reviewed(&repo, &moderator, report.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Invalid(_)));
    let err = transition_report(&repo, &moderator, report.id, ReportStatus::Pending).await.unwrap_err();
    assert!(matches!(err, ServiceError::Invalid(_)));
    assert_eq!(repo.get_report(report.id).await.unwrap().status, ReportStatus::Resolved);
}

#[tokio::test]
async fn pending_reports_can_be_resolved_directly() {
    let (repo, tid) = seeded().await;
    let reporter = common::actor(&repo, 2).await;
    let moderator = common::actor(&repo, 3).await;
    let (report, _) = file_report(&repo, &reporter, tid, spam()).await.unwrap();

    let resolved = mark_resolved(&repo, &moderator, report.id).await.unwrap();
    assert_eq!(resolved.status, ReportStatus::Resolved);

    let pending = list_reports(&repo, &moderator, ReportFilter { status: Some(ReportStatus::Pending), reason: None })
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn reporting_a_missing_thread_or_report_is_not_found() {
    let (repo, _) = seeded().await;
    let reporter = common::actor(&repo, 2).await;
    let moderator = common::actor(&repo, 3).await;
    assert!(matches!(file_report(&repo, &reporter, 999, spam()).await, Err(ServiceError::NotFound)));
    assert!(matches!(mark_resolved(&repo, &moderator, 999).await, Err(ServiceError::NotFound)));
}

#[tokio::test]
async fn roles_are_read_fresh_for_every_actor() {
    let (repo, tid) = seeded().await;
    let reporter = common::actor(&repo, 2).await;
    let (report, _) = file_report(&repo, &reporter, tid, spam()).await.unwrap();

    repo.grant_role(2, Role::Moderator).await.unwrap();
    let promoted = common::actor(&repo, 2).await;
    assert!(mark_reviewed(&repo, &promoted, report.id).await.is_ok());

    repo.revoke_role(2, Role::Moderator).await.unwrap();
    let demoted = common::actor(&repo, 2).await;
    assert!(matches!(mark_resolved(&repo, &demoted, report.id).await, Err(ServiceError::Denied)));
}
