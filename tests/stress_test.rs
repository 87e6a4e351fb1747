//! Stress tests for the queue actor
//!
//! Random pause/resume/cancel traffic against auto-completing downloads, checking
//! after every operation that:
//! A - Concurrency bound: downloading items <= max_concurrent
//! B - Unique rows: one item per video id
//! C - Eventual progress: once traffic stops, everything completes or is cancelled

mod common;

use common::{test_settings, video_url, wait_until, ScriptedDownloader};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tubeloader::database::MemoryStore;
use tubeloader::queue::{AddOptions, QueueManager, QueueSnapshot, QueueStatus};
use tubeloader::utils::AppSettings;

const MAX_CONCURRENT: usize = 3;
const ITEMS: usize = 20;

fn check_invariants(snapshot: &QueueSnapshot) {
    assert!(
        snapshot.downloading.len() <= MAX_CONCURRENT,
        "{} downloads running",
        snapshot.downloading.len()
    );

    let all: Vec<_> = snapshot
        .downloading
        .iter()
        .chain(&snapshot.queued)
        .chain(&snapshot.paused)
        .chain(&snapshot.failed)
        .chain(&snapshot.completed)
        .collect();
    let videos: HashSet<&str> = all.iter().map(|i| i.video_id.as_str()).collect();
    assert_eq!(videos.len(), all.len(), "duplicate video rows");
}

async fn open(settings: AppSettings, delay: Duration) -> (QueueManager, Arc<ScriptedDownloader>) {
    let downloader = Arc::new(ScriptedDownloader::auto_complete(delay));
    let queue = QueueManager::open(settings, Arc::new(MemoryStore::new()), downloader.clone())
        .await
        .unwrap();
    (queue, downloader)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_random_operations() {
    let dir = tempdir().unwrap();
    let settings = AppSettings {
        max_concurrent: MAX_CONCURRENT,
        ..test_settings(dir.path())
    };
    let (queue, downloader) = open(settings, Duration::from_millis(20)).await;

    let ids = queue
        .add_to_queue((0..ITEMS).map(video_url).collect(), AddOptions::default())
        .await
        .unwrap()
        .download_ids;
    assert_eq!(ids.len(), ITEMS);

    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let id = &ids[rng.gen_range(0..ids.len())];
        let outcome = match rng.gen_range(0..10) {
            0..=3 => queue.pause_download(id).await.unwrap(),
            4..=8 => queue.resume_download(id).await.unwrap(),
            _ => queue.cancel_download(id).await.unwrap(),
        };
        // Rejections are expected; errors are not
        let _ = outcome;
        check_invariants(&queue.get_queue_status().await.unwrap());

        if rng.gen_bool(0.2) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    // Let everything drain
    for id in &ids {
        let item = queue.get_item(id).await.unwrap().unwrap();
        if item.status == QueueStatus::Paused {
            assert!(queue.resume_download(id).await.unwrap().success);
        }
    }

    let snapshot = wait_until(&queue, |s| {
        check_invariants(s);
        s.downloading.is_empty() && s.queued.is_empty()
    })
    .await;
    assert!(snapshot.paused.is_empty());
    assert!(snapshot.failed.is_empty());

    for id in &ids {
        let status = queue.get_item(id).await.unwrap().unwrap().status;
        assert!(
            matches!(status, QueueStatus::Completed | QueueStatus::Cancelled),
            "{} ended as {}",
            id,
            status
        );
    }
    assert!(downloader.max_running() <= MAX_CONCURRENT);

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_concurrent_handles() {
    let dir = tempdir().unwrap();
    let settings = AppSettings {
        max_concurrent: MAX_CONCURRENT,
        ..test_settings(dir.path())
    };
    let (queue, downloader) = open(settings, Duration::from_millis(5)).await;

    // Many clones adding overlapping batches at once
    let mut handles = Vec::new();
    for worker in 0..8 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let urls = (0..10).map(|n| video_url(worker * 5 + n)).collect();
            queue
                .add_to_queue(urls, AddOptions::default())
                .await
                .unwrap()
        }));
    }

    let mut added = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap().download_ids {
            assert!(added.insert(id), "id handed out twice");
        }
    }
    // Videos 0..45 overlap across workers, each admitted exactly once
    assert_eq!(added.len(), 45);

    let snapshot = wait_until(&queue, |s| {
        check_invariants(s);
        s.completed.len() == 45
    })
    .await;
    assert_eq!(snapshot.stats.total_completed, 45);
    assert!(downloader.max_running() <= MAX_CONCURRENT);

    queue.shutdown().await;
}
