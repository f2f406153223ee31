use filetime::{set_file_mtime, FileTime};
use flate2::read::GzDecoder;
use lk_core::LogKeeperConfig;
use lk_daemon::{Coordinator, LifecycleState};
use lk_storage::{list_archives, RotationOutcome};
use rand::RngCore;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const DAY: Duration = Duration::from_secs(86_400);

fn daemon_config(tmp: &TempDir) -> LogKeeperConfig {
    let mut config = LogKeeperConfig::new(
        tmp.path().join("logs"),
        tmp.path().join("archive"),
        "app.log",
    );
    config.max_size_bytes = 1024;
    config.max_age = 7 * DAY;
    config.retention_period = 30 * DAY;
    config.debounce_period = Duration::from_millis(100);
    config.sweep_interval = Duration::from_secs(3600);
    config
}

async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_startup_reconciles_oversized_log_and_expired_archive() {
    let tmp = TempDir::new().unwrap();
    let config = daemon_config(&tmp);
    std::fs::create_dir_all(&config.log_dir).unwrap();
    std::fs::create_dir_all(&config.archive_dir).unwrap();
    std::fs::write(config.active_log_path(), vec![b'x'; 4096]).unwrap();
    let expired = config.archive_dir.join("app_20200101_000000.log.gz");
    std::fs::write(&expired, b"old").unwrap();
    set_file_mtime(&expired, FileTime::from_system_time(SystemTime::now() - 40 * DAY)).unwrap();

    let coordinator = Arc::new(Coordinator::new(Arc::new(config.clone())));
    let shutdown = CancellationToken::new();
    let mut state = coordinator.subscribe();
    let handle = {
        let coordinator = Arc::clone(&coordinator);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { coordinator.run(shutdown).await })
    };

    state
        .wait_for(|s| *s == LifecycleState::Running)
        .await
        .unwrap();
    assert!(!expired.exists());
    assert_eq!(
        std::fs::metadata(config.active_log_path()).unwrap().len(),
        0
    );
    let archives = list_archives(&config.archive_dir, "app").await.unwrap();
    assert_eq!(archives.len(), 1);
    assert!(archives[0].is_compressed());

    shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(coordinator.state(), LifecycleState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_writes_trigger_debounced_rotation() {
    let tmp = TempDir::new().unwrap();
    let config = daemon_config(&tmp);
    std::fs::create_dir_all(&config.log_dir).unwrap();
    std::fs::write(config.active_log_path(), b"").unwrap();

    let coordinator = Arc::new(Coordinator::new(Arc::new(config.clone())));
    let shutdown = CancellationToken::new();
    let mut state = coordinator.subscribe();
    let handle = {
        let coordinator = Arc::clone(&coordinator);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { coordinator.run(shutdown).await })
    };
    state
        .wait_for(|s| *s == LifecycleState::Running)
        .await
        .unwrap();

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(config.active_log_path())
        .unwrap();
    for _ in 0..16 {
        file.write_all(&[b'y'; 128]).unwrap();
        file.flush().unwrap();
    }
    drop(file);

    let archive_dir = config.archive_dir.clone();
    let rotated = wait_until(|| {
        std::fs::read_dir(&archive_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .any(|e| e.file_name().to_string_lossy().ends_with(".log.gz"))
            })
            .unwrap_or(false)
    })
    .await;
    assert!(rotated, "no compressed archive appeared");

    shutdown.cancel();
    handle.await.unwrap().unwrap();
    let archives = list_archives(&config.archive_dir, "app").await.unwrap();
    assert_eq!(archives.len(), 1);
}

fn archive_listing(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_waits_for_in_flight_compression() {
    let tmp = TempDir::new().unwrap();
    let config = daemon_config(&tmp);
    std::fs::create_dir_all(&config.log_dir).unwrap();
    std::fs::write(config.active_log_path(), b"").unwrap();

    let coordinator = Arc::new(Coordinator::new(Arc::new(config.clone())));
    let shutdown = CancellationToken::new();
    let mut state = coordinator.subscribe();
    let handle = {
        let coordinator = Arc::clone(&coordinator);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { coordinator.run(shutdown).await })
    };
    state
        .wait_for(|s| *s == LifecycleState::Running)
        .await
        .unwrap();

    // Incompressible payload so gzip is still running when stop arrives.
    let mut payload = vec![0u8; 32 * 1024 * 1024];
    rand::thread_rng().fill_bytes(&mut payload);
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(config.active_log_path())
        .unwrap();
    file.write_all(&payload).unwrap();
    file.flush().unwrap();
    drop(file);

    let archive_dir = config.archive_dir.clone();
    let started = wait_until(|| !archive_listing(&archive_dir).is_empty()).await;
    assert!(started, "rotation never started");

    shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(coordinator.state(), LifecycleState::Stopped);

    let names = archive_listing(&config.archive_dir);
    assert_eq!(names.len(), 1, "{names:?}");
    assert!(names[0].ends_with(".log.gz"), "{names:?}");
    assert!(!names.iter().any(|n| n.ends_with(".partial")));
    let mut restored = Vec::new();
    GzDecoder::new(std::fs::File::open(config.archive_dir.join(&names[0])).unwrap())
        .read_to_end(&mut restored)
        .unwrap();
    assert!(restored == payload, "archived content differs from what was written");
}

#[tokio::test]
async fn test_run_once_reports_and_stops() {
    let tmp = TempDir::new().unwrap();
    let config = daemon_config(&tmp);
    std::fs::create_dir_all(&config.log_dir).unwrap();
    std::fs::write(config.active_log_path(), b"small").unwrap();

    let coordinator = Coordinator::new(Arc::new(config.clone()));
    let report = coordinator.run_once().await.unwrap();
    assert!(matches!(report.rotation, RotationOutcome::NotDue { .. }));
    assert!(report.sweep.is_clean());
    assert_eq!(report.backlog.map(|b| b.compressed.len()), Some(0));
    assert!(config.archive_dir.is_dir());
    assert_eq!(coordinator.state(), LifecycleState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_before_any_activity() {
    let tmp = TempDir::new().unwrap();
    let coordinator = Arc::new(Coordinator::new(Arc::new(daemon_config(&tmp))));
    let shutdown = CancellationToken::new();
    let mut state = coordinator.subscribe();
    let handle = {
        let coordinator = Arc::clone(&coordinator);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { coordinator.run(shutdown).await })
    };
    state
        .wait_for(|s| *s == LifecycleState::Running)
        .await
        .unwrap();

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("coordinator did not stop promptly")
        .unwrap()
        .unwrap();
    assert_eq!(coordinator.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_startup_fails_when_archive_dir_cannot_be_created() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let mut config = daemon_config(&tmp);
    config.archive_dir = blocker.join("archive");

    let coordinator = Coordinator::new(Arc::new(config));
    let result = coordinator.run(CancellationToken::new()).await;
    assert!(result.is_err());
    assert_eq!(coordinator.state(), LifecycleState::Stopped);
}
