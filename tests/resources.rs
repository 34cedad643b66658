#![cfg(feature = "inmem-store")]

mod common;

use std::sync::atomic::Ordering;

use common::MockBlobStore;
use quorum::auth::Role;
use quorum::error::ServiceError;
use quorum::models::FileType;
use quorum::repo::inmem::InMemRepo;
use quorum::repo::{ResourceRepo, ThreadRepo, UserRepo};
use quorum::resources::{delete_resource, download_resource, upload_resource, Upload};
use quorum::threads::delete_thread;

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R'];

fn upload(title: &str) -> Upload {
    Upload {
        title: title.to_string(),
        description: Some("  slides  ".into()),
        file_type: None,
        filename: "my slides.png".into(),
        bytes: PNG.to_vec(),
    }
}

async fn seeded() -> (InMemRepo, MockBlobStore, i64) {
    let repo = InMemRepo::ephemeral();
    common::user(&repo, 1, "author").await;
    common::user(&repo, 2, "other").await;
    common::user(&repo, 3, "mod").await;
    repo.grant_role(3, Role::Moderator).await.unwrap();
    let t = common::thread(&repo, 1, "Talk").await;
    (repo, MockBlobStore::default(), t.id)
}

#[tokio::test]
async fn only_the_thread_author_uploads() {
    let (repo, blobs, tid) = seeded().await;
    let other = common::actor(&repo, 2).await;
    let err = upload_resource(&repo, &blobs, &other, tid, upload("Slides")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Denied));
    assert!(blobs.keys().is_empty());

    let author = common::actor(&repo, 1).await;
    let res = upload_resource(&repo, &blobs, &author, tid, upload("Slides")).await.unwrap();
    assert_eq!(res.file_type, FileType::Image);
    assert_eq!(res.mime, "image/png");
    assert_eq!(res.description.as_deref(), Some("slides"));
    assert!(res.file_key.starts_with("thread_resources/"));
    assert!(res.file_key.ends_with("-my_slides.png"));
    assert_eq!(blobs.keys(), vec![res.file_key.clone()]);

    let (_, bytes, mime) = download_resource(&repo, &blobs, res.id).await.unwrap();
    assert_eq!(bytes, PNG);
    assert_eq!(mime, "image/png");
}

#[tokio::test]
async fn explicit_file_type_wins_and_fields_are_required() {
    let (repo, blobs, tid) = seeded().await;
    let author = common::actor(&repo, 1).await;

    let mut doc = upload("Notes");
    doc.file_type = Some(FileType::Document);
    let res = upload_resource(&repo, &blobs, &author, tid, doc).await.unwrap();
    assert_eq!(res.file_type, FileType::Document);

    assert!(matches!(upload_resource(&repo, &blobs, &author, tid, upload(" ")).await, Err(ServiceError::Invalid(_))));
    let mut empty = upload("Empty");
    empty.bytes.clear();
    assert!(matches!(upload_resource(&repo, &blobs, &author, tid, empty).await, Err(ServiceError::Invalid(_))));
}

#[tokio::test]
async fn deleting_removes_blob_then_record() {
    let (repo, blobs, tid) = seeded().await;
    let author = common::actor(&repo, 1).await;
    let res = upload_resource(&repo, &blobs, &author, tid, upload("Slides")).await.unwrap();

    let other = common::actor(&repo, 2).await;
    assert!(matches!(delete_resource(&repo, &blobs, &other, res.id).await, Err(ServiceError::Denied)));

    delete_resource(&repo, &blobs, &author, res.id).await.unwrap();
    assert!(blobs.keys().is_empty());
    assert!(repo.get_resource(res.id).await.is_err());
    assert!(matches!(download_resource(&repo, &blobs, res.id).await, Err(ServiceError::NotFound)));
}

#[tokio::test]
async fn failed_blob_removal_keeps_the_record() {
    let (repo, blobs, tid) = seeded().await;
    let author = common::actor(&repo, 1).await;
    let res = upload_resource(&repo, &blobs, &author, tid, upload("Slides")).await.unwrap();

    blobs.fail_deletes.store(true, Ordering::SeqCst);
    let err = delete_resource(&repo, &blobs, &author, res.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Blob(_)));
    assert!(repo.get_resource(res.id).await.is_ok());
    assert_eq!(blobs.keys().len(), 1);
}

#[tokio::test]
async fn thread_deletion_clears_blobs_first() {
    let (repo, blobs, tid) = seeded().await;
    let author = common::actor(&repo, 1).await;
    upload_resource(&repo, &blobs, &author, tid, upload("One")).await.unwrap();
    upload_resource(&repo, &blobs, &author, tid, upload("Two")).await.unwrap();

    let other = common::actor(&repo, 2).await;
    assert!(matches!(delete_thread(&repo, &blobs, &other, tid).await, Err(ServiceError::Denied)));

    blobs.fail_deletes.store(true, Ordering::SeqCst);
    assert!(delete_thread(&repo, &blobs, &author, tid).await.is_err());
    assert!(repo.get_thread(tid).await.is_ok());

    blobs.fail_deletes.store(false, Ordering::SeqCst);
    let moderator = common::actor(&repo, 3).await;
    delete_thread(&repo, &blobs, &moderator, tid).await.unwrap();
    assert!(blobs.keys().is_empty());
    assert!(repo.get_thread(tid).await.is_err());
    assert!(repo.list_resources(tid).await.unwrap().is_empty());
}

#[tokio::test]
async fn thread_deletion_failing_midway_leaves_no_dangling_record() {
    let (repo, blobs, tid) = seeded().await;
    let author = common::actor(&repo, 1).await;
    upload_resource(&repo, &blobs, &author, tid, upload("One")).await.unwrap();
    upload_resource(&repo, &blobs, &author, tid, upload("Two")).await.unwrap();

    *blobs.fail_nth_delete.lock().unwrap() = Some(2);
    let err = delete_thread(&repo, &blobs, &author, tid).await.unwrap_err();
    assert!(matches!(err, ServiceError::Blob(_)));
    assert!(repo.get_thread(tid).await.is_ok());

    let left = repo.list_resources(tid).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(blobs.keys(), vec![left[0].file_key.clone()]);
    let (_, bytes, _) = download_resource(&repo, &blobs, left[0].id).await.unwrap();
    assert_eq!(bytes, PNG);

    delete_thread(&repo, &blobs, &author, tid).await.unwrap();
    assert!(blobs.keys().is_empty());
    assert!(repo.get_thread(tid).await.is_err());
}
