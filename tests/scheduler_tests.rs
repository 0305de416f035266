
use std::sync::Arc;
use std::time::Duration;

use fleetd::config::LockScope;
use fleetd::control::{ControlMessage, LockServiceState};
use fleetd::lock::{LockService, MemoryLockService};
use fleetd::queue::{now_us, WorkQueue};
use fleetd::scheduler::{LocalSignal, Phase, SchedulerEvent, SchedulerExit, TimerKind};
use fleetd::storage::TENANT_TABLE;
use fleetd::supervisor::ExitOutcome;
use test_harness::{
    record_args_script, test_config, test_storage, TestScheduler, QUICK_JOB, STOPPABLE_JOB,
};

const ACTION: &str = "content::sync";

#[tokio::test]
async fn test_reaches_scheduling_once_dependencies_are_ready() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let mut t = TestScheduler::new(test_config(ACTION, QUICK_JOB), storage, locks);

    assert_eq!(t.scheduler.phase(), Phase::Init);
    t.start_scheduling().await;

    assert_eq!(t.scheduler.phase(), Phase::Scheduling);
    assert!(t.scheduler.state().storage_ready);
    assert!(t.scheduler.state().lock_service_ready);
    // Fleet mode sweeps tenants right away.
    assert!(t.scheduler.timers().is_armed(TimerKind::Tick));

    let statuses: Vec<String> = t
        .sent()
        .into_iter()
        .filter_map(|m| match m {
            ControlMessage::Status { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec!["waiting_for_dependencies", "scheduling"]);
}

#[tokio::test]
async fn test_immediate_run_locks_dequeues_and_spawns() {
    let dir = tempfile::tempdir().unwrap();
    let args_file = dir.path().join("args");
    let storage = test_storage(&["siteA"]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    let mut t = TestScheduler::new(
        test_config(ACTION, &record_args_script(&args_file)).with_param("mode", "full"),
        storage,
        locks.clone(),
    );
    t.start_scheduling().await;

    queue.enqueue(ACTION, now_us() - 1000, "siteA").await.unwrap();
    t.scheduler.fire_timer(TimerKind::Wakeup).await;

    assert_eq!(t.scheduler.phase(), Phase::RunningJob);
    let job = t.scheduler.running_job().expect("job should be running");
    assert_eq!(job.item.action, ACTION);
    assert_eq!(job.item.site, "siteA");
    assert_eq!(job.lock.name(), "siteA#content::sync");
    assert!(locks.holder_of("siteA#content::sync").is_some());
    // Removed before the child was started.
    assert_eq!(queue.scheduled_time(ACTION, "siteA").await.unwrap(), None);
    assert!(queue.scan(ACTION, 10).await.unwrap().is_empty());

    let exit = t.finish_child().await;
    assert_eq!(exit.outcome, ExitOutcome::Success);
    assert_eq!(t.scheduler.phase(), Phase::Scheduling);
    assert!(locks.holder_of("siteA#content::sync").is_none());
    assert_eq!(locks.release_count(), 1);

    let args = std::fs::read_to_string(&args_file).unwrap();
    assert_eq!(
        args.trim(),
        "--action content::sync --site siteA --param mode=full"
    );
}

#[tokio::test]
async fn test_future_item_arms_wakeup_for_its_due_time() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    let mut t = TestScheduler::new(test_config(ACTION, QUICK_JOB), storage, locks);
    t.start_scheduling().await;

    let due = now_us() + 5_000_000;
    queue.enqueue(ACTION, due, "siteA").await.unwrap();
    t.scheduler.fire_timer(TimerKind::Wakeup).await;

    assert_eq!(t.scheduler.phase(), Phase::Scheduling);
    assert!(t.scheduler.running_job().is_none());
    assert_eq!(t.scheduler.wakeup_at(), Some(due));

    let deadline = t.scheduler.timers().deadline(TimerKind::Wakeup).unwrap();
    let remaining = deadline - tokio::time::Instant::now();
    assert!(remaining > Duration::from_secs(4));
    assert!(remaining <= Duration::from_secs(5));
    assert_eq!(queue.scheduled_time(ACTION, "siteA").await.unwrap(), Some(due));
}

#[tokio::test]
async fn test_global_lock_contention_between_two_schedulers() {
    let storage = test_storage(&["siteA", "siteB"]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());

    let config = |holder: &str| {
        let mut config = test_config("backup", STOPPABLE_JOB).with_lock_scope(LockScope::Global);
        config.lock.holder = holder.to_string();
        config
    };
    let mut a = TestScheduler::new(config("host-a:1"), storage.clone(), locks.clone());
    let mut b = TestScheduler::new(config("host-b:2"), storage.clone(), locks.clone());
    a.start_scheduling().await;
    b.start_scheduling().await;

    let now = now_us();
    queue.enqueue("backup", now - 2000, "siteA").await.unwrap();
    queue.enqueue("backup", now - 1000, "siteB").await.unwrap();

    a.scheduler.fire_timer(TimerKind::Wakeup).await;
    b.scheduler.fire_timer(TimerKind::Wakeup).await;

    assert_eq!(a.scheduler.phase(), Phase::RunningJob);
    assert_eq!(locks.holder_of("global#backup").as_deref(), Some("host-a:1"));
    assert!(b.scheduler.running_job().is_none());
    // The loser keeps its item and retries later.
    assert!(queue.scheduled_time("backup", "siteB").await.unwrap().is_some());
    assert!(b.scheduler.timers().is_armed(TimerKind::Wakeup));

    a.scheduler
        .handle_event(SchedulerEvent::Signal(LocalSignal::Stop))
        .await;
    a.finish_child().await;
    assert_eq!(a.scheduler.phase(), Phase::Terminated);
    assert!(locks.holder_of("global#backup").is_none());

    b.scheduler.fire_timer(TimerKind::Wakeup).await;
    let job = b.scheduler.running_job().expect("retry should win the lock");
    assert_eq!(job.item.site, "siteB");
    assert_eq!(locks.holder_of("global#backup").as_deref(), Some("host-b:2"));

    b.control(ControlMessage::Stop).await;
    b.finish_child().await;
    assert_eq!(b.scheduler.phase(), Phase::Terminated);
}

#[tokio::test]
async fn test_stop_waits_for_running_child() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    let mut t = TestScheduler::new(test_config(ACTION, STOPPABLE_JOB), storage, locks.clone());
    t.start_scheduling().await;

    queue.enqueue(ACTION, now_us(), "siteA").await.unwrap();
    t.scheduler.fire_timer(TimerKind::Wakeup).await;
    assert_eq!(t.scheduler.phase(), Phase::RunningJob);

    t.control(ControlMessage::Stop).await;
    assert_eq!(t.scheduler.phase(), Phase::Stopping);
    assert!(t.scheduler.state().stopping);
    assert!(t.scheduler.running_job().is_some());
    assert!(t.scheduler.timers().next().is_none());

    // The worker exits 0 only if it actually read STOP.
    let exit = t.finish_child().await;
    assert_eq!(exit.outcome, ExitOutcome::Success);
    assert_eq!(t.scheduler.phase(), Phase::Terminated);
    assert_eq!(t.scheduler.exit_status(), Some(&SchedulerExit::Clean));
    assert_eq!(locks.release_count(), 1);
}

#[tokio::test]
async fn test_storage_loss_silences_storage_until_reconnect() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let mut t = TestScheduler::new(test_config(ACTION, QUICK_JOB), storage.clone(), locks);
    t.start_scheduling().await;
    t.sent();

    storage.set_available(false);
    t.scheduler.fire_timer(TimerKind::Wakeup).await;
    assert_eq!(t.scheduler.phase(), Phase::Disconnected);
    assert!(!t.scheduler.state().storage_ready);
    assert!(!t.scheduler.timers().is_armed(TimerKind::Tick));
    assert!(!t.scheduler.timers().is_armed(TimerKind::Wakeup));

    let deadline = t.scheduler.timers().deadline(TimerKind::Reconnect).unwrap();
    assert!(deadline - tokio::time::Instant::now() > Duration::from_secs(29));
    let calls = storage.call_count();

    // Nothing in the delay window touches storage.
    storage.set_available(true);
    t.control(ControlMessage::Ping {
        site: Some("siteA".to_string()),
    })
    .await;
    t.control(ControlMessage::StorageReady).await;
    assert_eq!(storage.call_count(), calls);
    assert_eq!(t.scheduler.phase(), Phase::Disconnected);

    t.scheduler.fire_timer(TimerKind::Reconnect).await;
    assert_eq!(t.scheduler.phase(), Phase::WaitingForDependencies);
    assert_eq!(storage.call_count(), calls);
    let probes = t
        .sent()
        .into_iter()
        .filter(|m| *m == ControlMessage::StorageStatus)
        .count();
    assert_eq!(probes, 1);

    t.control(ControlMessage::StorageReady).await;
    assert_eq!(t.scheduler.phase(), Phase::Scheduling);
}

#[tokio::test]
async fn test_lock_released_when_spawn_fails() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    let config = test_config(ACTION, QUICK_JOB).with_child("/nonexistent/fleetd-worker", vec![]);
    let mut t = TestScheduler::new(config, storage, locks.clone());
    t.start_scheduling().await;

    queue.enqueue(ACTION, now_us(), "siteA").await.unwrap();
    t.scheduler.fire_timer(TimerKind::Wakeup).await;

    assert_eq!(t.scheduler.phase(), Phase::Scheduling);
    assert!(t.scheduler.running_job().is_none());
    assert!(locks.holder_of("siteA#content::sync").is_none());
    assert_eq!(locks.release_count(), 1);
    // Abandoned, not retried.
    assert_eq!(queue.scheduled_time(ACTION, "siteA").await.unwrap(), None);
}

#[tokio::test]
async fn test_tick_sweeps_every_tenant() {
    let storage = test_storage(&["siteA", "siteB", "siteC"]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    let mut t = TestScheduler::new(test_config(ACTION, STOPPABLE_JOB), storage, locks);
    t.start_scheduling().await;

    t.scheduler.fire_timer(TimerKind::Tick).await;

    // One started, the rest wait their turn.
    assert_eq!(t.scheduler.phase(), Phase::RunningJob);
    assert_eq!(queue.scan(ACTION, 10).await.unwrap().len(), 2);
    let deadline = t.scheduler.timers().deadline(TimerKind::Tick).unwrap();
    assert!(deadline - tokio::time::Instant::now() > Duration::from_secs(290));

    t.control(ControlMessage::Stop).await;
    t.finish_child().await;
}

#[tokio::test]
async fn test_ping_enqueues_site_for_cron_action() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    let mut t = TestScheduler::new(test_config(ACTION, QUICK_JOB), storage, locks);
    t.start_scheduling().await;

    t.control(ControlMessage::Ping {
        site: Some("siteB".to_string()),
    })
    .await;
    assert!(queue.scheduled_time(ACTION, "siteB").await.unwrap().is_some());
    assert!(t.scheduler.timers().is_armed(TimerKind::Wakeup));

    t.scheduler.fire_timer(TimerKind::Wakeup).await;
    assert_eq!(t.scheduler.running_job().unwrap().item.site, "siteB");
    t.finish_child().await;
    assert_eq!(t.scheduler.phase(), Phase::Scheduling);
}

#[tokio::test]
async fn test_ping_ignored_for_plain_action() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    let mut config = test_config(ACTION, QUICK_JOB);
    config.cron_action = false;
    let mut t = TestScheduler::new(config, storage, locks);
    t.start_scheduling().await;

    t.control(ControlMessage::Ping {
        site: Some("siteB".to_string()),
    })
    .await;
    assert_eq!(queue.scheduled_time(ACTION, "siteB").await.unwrap(), None);
}

#[tokio::test]
async fn test_readiness_gives_up_after_retries() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let mut t = TestScheduler::new(test_config(ACTION, QUICK_JOB), storage, locks);

    t.scheduler
        .handle_event(SchedulerEvent::BusConnected)
        .await;
    t.control(ControlMessage::Ready).await;
    assert_eq!(t.scheduler.phase(), Phase::WaitingForDependencies);
    let deadline = t.scheduler.timers().deadline(TimerKind::Readiness).unwrap();
    assert!(deadline - tokio::time::Instant::now() > Duration::from_secs(59));

    for _ in 0..3 {
        t.scheduler.fire_timer(TimerKind::Readiness).await;
        assert_eq!(t.scheduler.phase(), Phase::WaitingForDependencies);
    }
    t.scheduler.fire_timer(TimerKind::Readiness).await;

    assert_eq!(t.scheduler.phase(), Phase::Terminated);
    assert!(matches!(
        t.scheduler.exit_status(),
        Some(SchedulerExit::Fatal(_))
    ));
    let probes = t
        .sent()
        .into_iter()
        .filter(|m| *m == ControlMessage::StorageStatus)
        .count();
    assert_eq!(probes, 4);
}

#[tokio::test]
async fn test_lock_service_down_blocks_scheduling() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    locks.set_ready(false);
    let mut t = TestScheduler::new(test_config(ACTION, QUICK_JOB), storage, locks);

    t.start_scheduling().await;
    assert_eq!(t.scheduler.phase(), Phase::WaitingForDependencies);

    t.control(ControlMessage::LockServiceStatus {
        status: LockServiceState::Up,
    })
    .await;
    assert_eq!(t.scheduler.phase(), Phase::Scheduling);
}

#[tokio::test]
async fn test_help_and_outbound_only_commands() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let mut t = TestScheduler::new(test_config(ACTION, QUICK_JOB), storage, locks);

    t.control(ControlMessage::Help).await;
    t.control(ControlMessage::StorageStatus).await;

    let sent = t.sent();
    assert!(matches!(&sent[0], ControlMessage::Commands { list } if list.contains(&"PING".to_string())));
    assert_eq!(
        sent[1],
        ControlMessage::Unknown {
            command: "STORAGE_STATUS".to_string()
        }
    );
}

#[tokio::test]
async fn test_single_site_mode_runs_once_and_stops() {
    let storage = test_storage(&["siteA", "siteB"]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    let config = test_config(ACTION, QUICK_JOB).with_site("siteA");
    let t = TestScheduler::new(config, storage, locks.clone());

    let (events_tx, events_rx) = tokio::sync::mpsc::channel(16);
    let run = tokio::spawn(t.scheduler.run(events_rx));
    for event in [
        SchedulerEvent::BusConnected,
        SchedulerEvent::Control(ControlMessage::StorageReady),
        SchedulerEvent::Control(ControlMessage::Ready),
    ] {
        events_tx.send(event).await.unwrap();
    }

    let exit = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("scheduler did not stop")
        .unwrap();
    assert_eq!(exit, SchedulerExit::Clean);
    assert_eq!(locks.release_count(), 1);
    // No sweep: siteB was never queued.
    assert!(queue.scan(ACTION, 10).await.unwrap().is_empty());
    assert_eq!(queue.scheduled_time(ACTION, "siteB").await.unwrap(), None);
}

#[tokio::test]
async fn test_single_site_mode_missing_site_is_fatal() {
    let storage = test_storage(&["siteA"]).await;
    let locks = Arc::new(MemoryLockService::new());
    let config = test_config(ACTION, QUICK_JOB).with_site("siteZ");
    let mut t = TestScheduler::new(config, storage, locks);

    t.start_scheduling().await;
    assert_eq!(t.scheduler.phase(), Phase::Terminated);
    assert_eq!(t.scheduler.exit_status().map(SchedulerExit::code), Some(1));
}

#[tokio::test]
async fn test_global_contention_waits_once_per_pass() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    locks
        .try_acquire("global#backup", "other-host:9", Duration::from_secs(3600))
        .await
        .unwrap()
        .unwrap();

    let mut config = test_config("backup", QUICK_JOB).with_lock_scope(LockScope::Global);
    config.lock.wait = Duration::from_millis(300);
    let mut t = TestScheduler::new(config, storage, locks);
    t.start_scheduling().await;

    let now = now_us();
    for i in 0..6 {
        queue
            .enqueue("backup", now - 1000 - i, &format!("site{}", i))
            .await
            .unwrap();
    }

    let started = std::time::Instant::now();
    t.scheduler.fire_timer(TimerKind::Wakeup).await;
    let elapsed = started.elapsed();

    // One bounded wait for the shared name, not one per item.
    assert!(elapsed < Duration::from_millis(900), "wakeup took {:?}", elapsed);
    assert!(t.scheduler.running_job().is_none());
    assert_eq!(queue.scan("backup", 10).await.unwrap().len(), 6);
    let retry_at = t.scheduler.wakeup_at().unwrap();
    assert!(retry_at > now);
    assert!(retry_at <= now_us() + 10_000_000);
}

#[tokio::test]
async fn test_exhausted_batch_rearms_wakeup() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    let config = test_config(ACTION, QUICK_JOB).with_child("/nonexistent/fleetd-worker", vec![]);
    let mut t = TestScheduler::new(config, storage, locks.clone());
    t.start_scheduling().await;

    let now = now_us();
    for i in 0..40 {
        queue
            .enqueue(ACTION, now - 1_000_000 + i, &format!("site{:02}", i))
            .await
            .unwrap();
    }
    let later = now + 60_000_000;
    queue.enqueue(ACTION, later, "later").await.unwrap();

    t.scheduler.fire_timer(TimerKind::Wakeup).await;
    assert_eq!(queue.scan(ACTION, 100).await.unwrap().len(), 9);
    assert!(t.scheduler.timers().is_armed(TimerKind::Wakeup));
    assert!(t.scheduler.wakeup_at().unwrap() <= now_us());

    t.scheduler.fire_timer(TimerKind::Wakeup).await;
    let remaining = queue.scan(ACTION, 100).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].site, "later");
    assert_eq!(t.scheduler.wakeup_at(), Some(later));
    assert_eq!(locks.release_count(), 40);
}

#[tokio::test]
async fn test_tick_retries_when_tenant_table_missing() {
    let storage = test_storage(&["siteA"]).await;
    let locks = Arc::new(MemoryLockService::new());
    let mut t = TestScheduler::new(test_config(ACTION, QUICK_JOB), storage.clone(), locks);
    t.start_scheduling().await;
    storage.drop_table(TENANT_TABLE).await;

    for retry in 1..=3 {
        t.scheduler.fire_timer(TimerKind::Tick).await;
        assert_eq!(t.scheduler.phase(), Phase::Scheduling);
        assert_eq!(t.scheduler.state().not_ready_retries, retry);
        let deadline = t.scheduler.timers().deadline(TimerKind::Tick).unwrap();
        let remaining = deadline - tokio::time::Instant::now();
        assert!(remaining > Duration::from_secs(9));
        assert!(remaining <= Duration::from_secs(10));
    }

    t.scheduler.fire_timer(TimerKind::Tick).await;
    assert_eq!(t.scheduler.phase(), Phase::Terminated);
    assert!(matches!(
        t.scheduler.exit_status(),
        Some(SchedulerExit::Fatal(_))
    ));
}

#[tokio::test]
async fn test_job_exit_during_outage_releases_lock() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    let mut t = TestScheduler::new(test_config(ACTION, QUICK_JOB), storage.clone(), locks.clone());
    t.start_scheduling().await;
    queue.enqueue(ACTION, now_us(), "siteA").await.unwrap();
    t.scheduler.fire_timer(TimerKind::Wakeup).await;
    assert_eq!(t.scheduler.phase(), Phase::RunningJob);

    storage.set_available(false);
    t.scheduler.fire_timer(TimerKind::Tick).await;
    assert_eq!(t.scheduler.phase(), Phase::Disconnected);
    assert!(t.scheduler.running_job().is_some());

    let exit = t.finish_child().await;
    assert_eq!(exit.outcome, ExitOutcome::Success);
    assert_eq!(t.scheduler.phase(), Phase::Disconnected);
    assert!(locks.holder_of("siteA#content::sync").is_none());
    assert_eq!(locks.release_count(), 1);

    storage.set_available(true);
    t.scheduler.fire_timer(TimerKind::Reconnect).await;
    t.control(ControlMessage::StorageReady).await;
    assert_eq!(t.scheduler.phase(), Phase::Scheduling);
}

#[tokio::test]
async fn test_reconnect_while_job_runs_resumes_running_job() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    let mut t = TestScheduler::new(test_config(ACTION, STOPPABLE_JOB), storage.clone(), locks.clone());
    t.start_scheduling().await;
    queue.enqueue(ACTION, now_us(), "siteA").await.unwrap();
    t.scheduler.fire_timer(TimerKind::Wakeup).await;

    storage.set_available(false);
    t.scheduler.fire_timer(TimerKind::Tick).await;
    assert_eq!(t.scheduler.phase(), Phase::Disconnected);

    storage.set_available(true);
    t.scheduler.fire_timer(TimerKind::Reconnect).await;
    t.control(ControlMessage::StorageReady).await;
    assert_eq!(t.scheduler.phase(), Phase::RunningJob);
    assert!(locks.holder_of("siteA#content::sync").is_some());

    t.control(ControlMessage::Stop).await;
    t.finish_child().await;
    assert_eq!(t.scheduler.phase(), Phase::Terminated);
    assert_eq!(locks.release_count(), 1);
}

#[tokio::test]
async fn test_ping_during_job_is_replayed_after_exit() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    let mut t = TestScheduler::new(test_config(ACTION, QUICK_JOB), storage, locks);
    t.start_scheduling().await;
    queue.enqueue(ACTION, now_us(), "siteA").await.unwrap();
    t.scheduler.fire_timer(TimerKind::Wakeup).await;
    assert_eq!(t.scheduler.running_job().unwrap().item.site, "siteA");

    t.control(ControlMessage::Ping {
        site: Some("siteB".to_string()),
    })
    .await;
    assert!(queue.scheduled_time(ACTION, "siteB").await.unwrap().is_some());
    assert!(!t.scheduler.timers().is_armed(TimerKind::Wakeup));

    t.finish_child().await;
    assert_eq!(t.scheduler.phase(), Phase::Scheduling);
    assert!(t.scheduler.running_job().is_none());
    assert!(t.scheduler.wakeup_at().unwrap() <= now_us());

    t.scheduler.fire_timer(TimerKind::Wakeup).await;
    assert_eq!(t.scheduler.running_job().unwrap().item.site, "siteB");
    t.finish_child().await;
}

#[tokio::test]
async fn test_lock_release_failure_disconnects() {
    let storage = test_storage(&[]).await;
    let locks = Arc::new(MemoryLockService::new());
    let queue = WorkQueue::new(storage.clone());
    let mut t = TestScheduler::new(test_config(ACTION, QUICK_JOB), storage, locks.clone());
    t.start_scheduling().await;
    queue.enqueue(ACTION, now_us(), "siteA").await.unwrap();
    t.scheduler.fire_timer(TimerKind::Wakeup).await;

    locks.set_ready(false);
    t.finish_child().await;

    assert_eq!(t.scheduler.phase(), Phase::Disconnected);
    assert!(t.scheduler.running_job().is_none());
    assert!(t.scheduler.timers().is_armed(TimerKind::Reconnect));
}
