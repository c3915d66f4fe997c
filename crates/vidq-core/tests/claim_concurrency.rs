//! Integration test: many claimers on one database file, across two handles.

use std::collections::HashSet;

use tempfile::tempdir;
use vidq_core::queue_db::{JobPayload, JobStatus, NewVideo, QueueDb};

async fn seed(db: &QueueDb, jobs: usize) {
    for i in 0..jobs {
        let id = db
            .insert_video(&NewVideo {
                external_id: format!("v{i}"),
                video_url: format!("https://www.example.com/video/v{i}"),
                ..NewVideo::default()
            })
            .await
            .unwrap();
        db.enqueue(id, &JobPayload::default()).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_pending_job_is_claimed_exactly_once() {
    const JOBS: usize = 6;
    const CLAIMERS: usize = 16;

    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.db");
    // Two handles stand in for two worker processes sharing the file.
    let a = QueueDb::open_at(&path).await.unwrap();
    let b = QueueDb::open_at(&path).await.unwrap();
    seed(&a, JOBS).await;

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..CLAIMERS {
        let db = if i % 2 == 0 { a.clone() } else { b.clone() };
        tasks.spawn(async move { db.claim_next(&format!("worker-{i}")).await.unwrap() });
    }

    let mut claimed = Vec::new();
    while let Some(res) = tasks.join_next().await {
        if let Some(job) = res.unwrap() {
            claimed.push(job);
        }
    }

    assert_eq!(claimed.len(), JOBS);
    let ids: HashSet<i64> = claimed.iter().map(|j| j.id).collect();
    assert_eq!(ids.len(), JOBS, "a job was handed out twice");
    for job in &claimed {
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.worker_id.is_some());
        assert!(job.started_at.is_some());
    }
    assert!(a.list_jobs(Some(JobStatus::Pending)).await.unwrap().is_empty());
    assert!(b.claim_next("worker-late").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recovery_only_resets_own_jobs_across_handles() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let a = QueueDb::open_at(&path).await.unwrap();
    let b = QueueDb::open_at(&path).await.unwrap();
    seed(&a, 2).await;

    let mine = a.claim_next("worker-a").await.unwrap().unwrap();
    let theirs = b.claim_next("worker-b").await.unwrap().unwrap();

    assert_eq!(a.recover_worker_jobs("worker-a").await.unwrap(), 1);
    assert_eq!(a.recover_worker_jobs("worker-a").await.unwrap(), 0);

    let mine = b.get_job(mine.id).await.unwrap().unwrap();
    assert_eq!(mine.status, JobStatus::Pending);
    assert!(mine.worker_id.is_none());
    assert!(mine.started_at.is_none());

    let theirs = a.get_job(theirs.id).await.unwrap().unwrap();
    assert_eq!(theirs.status, JobStatus::Running);
    assert_eq!(theirs.worker_id.as_deref(), Some("worker-b"));
}
