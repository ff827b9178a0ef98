use std::sync::Arc;

use chrono::{TimeZone, Utc};
use hunt_engine::{
    FileStore, HintCatalog, HuntConfig, HuntController, HuntError, Identity, ManualClock,
    MemoryStore, ParticipantRecord, ParticipantStore, ScanOutcome, advance_level,
};

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap(),
    ))
}

async fn started(store: &impl ParticipantStore, id: &Identity, levels: u32, clock: &ManualClock) {
    use hunt_engine::Clock;
    let mut record = ParticipantRecord::new("Racer", levels);
    record.start_time = Some(clock.now());
    assert!(store.create(id, &record).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_advancements_clear_a_level_once() {
    let levels = 6;
    let config = Arc::new(HuntConfig::with_levels(levels));
    let store = Arc::new(MemoryStore::new(&HuntConfig::with_levels(levels)));
    let clock = clock();
    let id = Identity::parse("racer@example.com").unwrap();
    started(&store, &id, levels, &clock).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let (store, clock, config, id) = (
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&config),
            id.clone(),
        );
        tasks.push(tokio::spawn(async move {
            advance_level(&store, &clock, &config, &id, 1).await
        }));
    }

    let mut wins = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => wins += 1,
            Err(HuntError::SequenceViolation {
                asserted: 1,
                expected: Some(2),
            }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(wins, 1);

    let record = store.load(&id).await.unwrap().unwrap().record;
    assert_eq!(record.flag(1), Some(true));
    assert_eq!(record.flag(2), Some(false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scans_through_controller_never_skip() {
    let levels = 3;
    let ctl = Arc::new(
        HuntController::new(
            HuntConfig::with_levels(levels),
            MemoryStore::new(&HuntConfig::with_levels(levels)),
            clock(),
            HintCatalog::empty(),
        )
        .unwrap(),
    );
    let id = Identity::parse("swarm@example.com").unwrap();
    ctl.register(Some(&id), "Swarm").await.unwrap();
    ctl.begin_hunt(Some(&id)).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let (ctl, id) = (Arc::clone(&ctl), id.clone());
        tasks.push(tokio::spawn(async move {
            ctl.submit_scan(Some(&id), "qr1").await
        }));
    }
    let mut advanced = 0;
    for task in tasks {
        let report = task.await.unwrap().unwrap();
        match report.outcome {
            ScanOutcome::Advanced { cleared: 1 } => advanced += 1,
            ScanOutcome::Debounced | ScanOutcome::OutOfSequence | ScanOutcome::Mismatch { .. } => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(advanced, 1);
    let snap = ctl.snapshot(Some(&id)).await.unwrap();
    assert_eq!(snap.current_level, 2);
    assert_eq!(snap.signals_found, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_store_serialises_racing_commits() {
    let root = std::env::temp_dir().join(format!(
        "hunt-engine-race-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    let levels = 4;
    let config = Arc::new(HuntConfig::with_levels(levels));
    let store = Arc::new(FileStore::new(&root, &config));
    let clock = clock();
    let id = Identity::parse("disk@example.com").unwrap();
    started(&store, &id, levels, &clock).await;

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let (store, clock, config, id) = (
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&config),
            id.clone(),
        );
        tasks.push(tokio::spawn(async move {
            advance_level(&store, &clock, &config, &id, 1).await.is_ok()
        }));
    }
    let mut wins = 0;
    for task in tasks {
        if task.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);

    let reopened = FileStore::new(&root, &config);
    let record = reopened.load(&id).await.unwrap().unwrap().record;
    assert_eq!(record.flag(1), Some(true));
    assert_eq!(record.flag(2), Some(false));
    let _ = std::fs::remove_dir_all(root);
}
