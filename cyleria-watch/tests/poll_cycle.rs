mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{FakeFetcher, Profile, RecordingNotifier, build_app, build_app_with_store};
use cyleria_watch::domain::{MonitorRecord, SubscriptionSet};
use cyleria_watch::monitor::{AlertEvent, CycleReport, SchedulerPhase};
use cyleria_watch::store::{MemoryStateStore, SqliteStateStore, StateStore};
use profile_parser::NO_DEATH;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn subscribe_then_unchanged_cycle_is_silent() {
    let fetcher = FakeFetcher::new();
    fetcher.set("ghost", Profile::died(95, "2024-01-01 10:00", "Zginął od smoka"));
    let notifier = RecordingNotifier::new();
    let (app, _) = build_app(fetcher.clone(), notifier.clone()).await;

    app.subscriptions()
        .subscribe("guild", "Ghost", Some("42".to_string()))
        .await
        .unwrap();
    let report = app.scheduler().run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.checked, 1);
    assert_eq!(report.alerts, 0);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn level_crossing_produces_one_alert_and_updates_record() {
    let fetcher = FakeFetcher::new();
    fetcher.set("ghost", Profile::level(95));
    let notifier = RecordingNotifier::new();
    let (app, store) = build_app(fetcher.clone(), notifier.clone()).await;

    let baseline = app
        .subscriptions()
        .subscribe("guild", "ghost", Some("42".to_string()))
        .await
        .unwrap();
    assert_eq!(baseline, MonitorRecord::new(95, NO_DEATH, Some("42".to_string())));

    fetcher.set("ghost", Profile::level(101));
    let report = app.scheduler().run_cycle(&CancellationToken::new()).await;

    assert_eq!(
        report,
        CycleReport {
            checked: 1,
            skipped: 0,
            alerts: 1,
            delivered: 1,
            interrupted: false,
        }
    );
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "42");
    assert!(matches!(
        &sent[0].1,
        AlertEvent::LevelUp { new_level: 101, nickname, .. } if nickname == "ghost"
    ));

    let stored = store.load().await;
    assert_eq!(
        stored.get("guild", "ghost"),
        Some(&MonitorRecord::new(101, NO_DEATH, Some("42".to_string())))
    );

    // same bucket next time
    fetcher.set("ghost", Profile::level(104));
    let report = app.scheduler().run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.alerts, 0);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn timeout_leaves_state_untouched_and_next_cycle_retries() {
    let fetcher = FakeFetcher::new();
    fetcher.set("ghost", Profile::level(95));
    fetcher.set("shade", Profile::level(10));
    let notifier = RecordingNotifier::new();
    let (app, store) = build_app(fetcher.clone(), notifier.clone()).await;

    app.subscriptions()
        .subscribe("guild", "ghost", Some("42".to_string()))
        .await
        .unwrap();
    app.subscriptions()
        .subscribe("guild", "shade", Some("42".to_string()))
        .await
        .unwrap();

    fetcher.set("ghost", Profile::Timeout);
    fetcher.set("shade", Profile::level(20));
    let report = app.scheduler().run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.checked, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.alerts, 1, "other pairs still processed");
    assert_eq!(
        store.load().await.get("guild", "ghost").map(|r| r.last_level),
        Some(95)
    );

    fetcher.set("ghost", Profile::level(101));
    let report = app.scheduler().run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.alerts, 1);
    assert!(notifier.sent().iter().any(|(_, event)| matches!(
        event,
        AlertEvent::LevelUp { new_level: 101, .. }
    )));
}

#[tokio::test]
async fn missing_character_is_skipped() {
    let fetcher = FakeFetcher::new();
    fetcher.set("ghost", Profile::level(50));
    let (app, store) = build_app(fetcher.clone(), RecordingNotifier::new()).await;
    app.subscriptions().subscribe("guild", "ghost", None).await.unwrap();

    fetcher.set("ghost", Profile::Missing);
    let report = app.scheduler().run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.skipped, 1);
    assert_eq!(
        store.load().await.get("guild", "ghost").map(|r| r.last_level),
        Some(50)
    );
}

#[tokio::test]
async fn only_a_new_death_alerts() {
    let fetcher = FakeFetcher::new();
    fetcher.set("ghost", Profile::died(60, "2024-01-01 10:00", "Zginął od smoka"));
    let notifier = RecordingNotifier::new();
    let (app, _) = build_app(fetcher.clone(), notifier.clone()).await;
    app.subscriptions()
        .subscribe("guild", "ghost", Some("42".to_string()))
        .await
        .unwrap();

    app.scheduler().run_cycle(&CancellationToken::new()).await;
    assert!(notifier.sent().is_empty());

    fetcher.set("ghost", Profile::died(60, "2024-01-02 11:30", "Zginął od demona"));
    let report = app.scheduler().run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.alerts, 1);
    assert!(matches!(
        &notifier.sent()[0].1,
        AlertEvent::Death { description, .. } if description == "2024-01-02 11:30 - Zginął od demona"
    ));

    app.scheduler().run_cycle(&CancellationToken::new()).await;
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn alerts_without_destination_are_broadcast_but_not_delivered() {
    let fetcher = FakeFetcher::new();
    fetcher.set("ghost", Profile::level(9));
    let notifier = RecordingNotifier::new();
    let (app, _) = build_app(fetcher.clone(), notifier.clone()).await;
    app.subscriptions().subscribe("guild", "ghost", None).await.unwrap();
    let mut alerts = app.scheduler().subscribe_alerts();

    fetcher.set("ghost", Profile::level(10));
    let report = app.scheduler().run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.alerts, 1);
    assert_eq!(report.delivered, 0);
    assert!(notifier.sent().is_empty());

    let notice = alerts.try_recv().unwrap();
    assert_eq!(notice.scope, "guild");
    assert_eq!(notice.nickname, "ghost");
    assert_eq!(notice.destination, None);
}

#[tokio::test]
async fn delivery_failure_does_not_undo_state() {
    let fetcher = FakeFetcher::new();
    fetcher.set("ghost", Profile::level(9));
    let (app, store) = build_app(fetcher.clone(), RecordingNotifier::failing()).await;
    app.subscriptions()
        .subscribe("guild", "ghost", Some("42".to_string()))
        .await
        .unwrap();

    fetcher.set("ghost", Profile::level(10));
    let report = app.scheduler().run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.alerts, 1);
    assert_eq!(report.delivered, 0);
    assert_eq!(
        store.load().await.get("guild", "ghost").map(|r| r.last_level),
        Some(10)
    );
}

#[tokio::test]
async fn level_decrease_becomes_new_baseline() {
    let fetcher = FakeFetcher::new();
    fetcher.set("ghost", Profile::level(120));
    let notifier = RecordingNotifier::new();
    let (app, store) = build_app(fetcher.clone(), notifier.clone()).await;
    app.subscriptions()
        .subscribe("guild", "ghost", Some("42".to_string()))
        .await
        .unwrap();

    fetcher.set("ghost", Profile::level(98));
    app.scheduler().run_cycle(&CancellationToken::new()).await;
    assert!(notifier.sent().is_empty());
    assert_eq!(
        store.load().await.get("guild", "ghost").map(|r| r.last_level),
        Some(98)
    );
}

#[tokio::test]
async fn cancelled_cycle_touches_nothing() {
    let fetcher = FakeFetcher::new();
    fetcher.set("ghost", Profile::level(9));
    let (app, _) = build_app(fetcher.clone(), RecordingNotifier::new()).await;
    app.subscriptions().subscribe("guild", "ghost", None).await.unwrap();
    let calls_before = fetcher.calls();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = app.scheduler().run_cycle(&cancel).await;

    assert!(report.interrupted);
    assert_eq!(report.checked, 0);
    assert_eq!(fetcher.calls(), calls_before);
}

#[tokio::test]
async fn run_stops_on_cancel_and_returns_to_idle() {
    let fetcher = FakeFetcher::new();
    fetcher.set("ghost", Profile::level(9));
    let (app, _) = build_app(fetcher.clone(), RecordingNotifier::new()).await;
    app.subscriptions().subscribe("guild", "ghost", None).await.unwrap();
    let app = Arc::new(app);
    let phase = app.scheduler().phase();

    let cancel = CancellationToken::new();
    let runner = {
        let app = app.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { app.run(cancel).await })
    };

    // first cycle starts immediately
    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        while fetcher.calls() < 2 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(2), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(*phase.borrow(), SchedulerPhase::Idle);
}

#[tokio::test]
async fn sqlite_state_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("watch.db");
    let fetcher = FakeFetcher::new();
    fetcher.set("ghost", Profile::level(95));

    {
        let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::open(&path).await.unwrap());
        let app = build_app_with_store(store, fetcher.clone(), RecordingNotifier::new()).await;
        app.subscriptions()
            .subscribe("guild", "ghost", Some("42".to_string()))
            .await
            .unwrap();
        fetcher.set("ghost", Profile::level(101));
        app.scheduler().run_cycle(&CancellationToken::new()).await;
    }

    // A restart must not re-alert the transition already persisted.
    let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::open(&path).await.unwrap());
    let notifier = RecordingNotifier::new();
    let app = build_app_with_store(store, fetcher.clone(), notifier.clone()).await;
    assert_eq!(
        app.subscriptions().list("guild").await,
        vec![(
            "ghost".to_string(),
            MonitorRecord::new(101, NO_DEATH, Some("42".to_string()))
        )]
    );
    let report = app.scheduler().run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.alerts, 0);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn watchlist_is_merged_into_configured_scope() {
    let dir = tempfile::TempDir::new().unwrap();
    let players = dir.path().join("players.txt");
    std::fs::write(&players, "# members\nGhost\nShade\n").unwrap();

    let fetcher = FakeFetcher::new();
    fetcher.set("ghost", Profile::level(30));
    let mut config = common::test_config();
    config.watchlist.path = Some(players);
    config.watchlist.scope = "guild-1".to_string();
    config.watchlist.destination = Some("99".to_string());

    let store = Arc::new(cyleria_watch::store::MemoryStateStore::new());
    let app = cyleria_watch::app::App::with_parts(
        config,
        store.clone(),
        fetcher,
        RecordingNotifier::new(),
    )
    .await;

    assert_eq!(app.merge_watchlist().await.unwrap(), 2);
    assert_eq!(app.merge_watchlist().await.unwrap(), 0);

    let set = store.load().await;
    assert_eq!(
        set.get("guild-1", "ghost"),
        Some(&MonitorRecord::new(30, NO_DEATH, Some("99".to_string())))
    );
    assert_eq!(set.get("guild-1", "shade").map(|r| r.last_level), Some(0));
}

/// Memory store whose next `put` can be made to fail once.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStateStore,
    fail_next_put: AtomicBool,
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn load(&self) -> SubscriptionSet {
        self.inner.load().await
    }

    async fn save(&self, set: &SubscriptionSet) -> cyleria_watch::Result<()> {
        self.inner.save(set).await
    }

    async fn put(
        &self,
        scope: &str,
        nickname: &str,
        record: &MonitorRecord,
    ) -> cyleria_watch::Result<()> {
        if self.fail_next_put.swap(false, Ordering::SeqCst) {
            return Err(cyleria_watch::Error::Other("disk full".to_string()));
        }
        self.inner.put(scope, nickname, record).await
    }

    async fn remove(&self, scope: &str, nickname: &str) -> cyleria_watch::Result<()> {
        self.inner.remove(scope, nickname).await
    }
}

#[tokio::test]
async fn failed_persist_defers_alert_and_never_repeats_it() {
    let fetcher = FakeFetcher::new();
    fetcher.set("ghost", Profile::level(95));
    let store = Arc::new(FlakyStore::default());
    let notifier = RecordingNotifier::new();

    {
        let app = build_app_with_store(store.clone(), fetcher.clone(), notifier.clone()).await;
        app.subscriptions()
            .subscribe("guild", "ghost", Some("42".to_string()))
            .await
            .unwrap();

        fetcher.set("ghost", Profile::level(101));
        store.fail_next_put.store(true, Ordering::SeqCst);
        let report = app.scheduler().run_cycle(&CancellationToken::new()).await;
        assert_eq!(report.alerts, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            app.subscriptions().list("guild").await[0].1.last_level,
            95
        );

        let report = app.scheduler().run_cycle(&CancellationToken::new()).await;
        assert_eq!(report.alerts, 1);
        app.scheduler().run_cycle(&CancellationToken::new()).await;
        assert_eq!(
            store.load().await.get("guild", "ghost").map(|r| r.last_level),
            Some(101)
        );
        // dropped without a final flush
    }

    let app = build_app_with_store(store.clone(), fetcher.clone(), notifier.clone()).await;
    let report = app.scheduler().run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.alerts, 0);
    assert_eq!(notifier.sent().len(), 1);
}
