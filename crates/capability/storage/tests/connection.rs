use domain::{ConnectionState, KpiReading};
use kpi_storage::{
    InMemoryConnector, InMemoryKpiStore, KpiRow, StorageConnection, WriteError,
};
use bigdecimal::BigDecimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn readings(count: usize) -> Vec<KpiReading> {
    (0..count)
        .map(|index| KpiReading::new(format!("kpi-{index}"), 1, BigDecimal::from(index as i64)))
        .collect()
}

struct Harness {
    store: Arc<InMemoryKpiStore>,
    connector: Arc<InMemoryConnector>,
    storage: Arc<StorageConnection>,
    cancel: CancellationToken,
    scheduler: JoinHandle<()>,
}

impl Harness {
    fn start(failures: usize, liveness: Option<Duration>) -> Self {
        let store = Arc::new(InMemoryKpiStore::new());
        let connector = Arc::new(InMemoryConnector::failing(store.clone(), failures));
        let storage = Arc::new(
            StorageConnection::new(connector.clone()).with_liveness_interval(liveness),
        );
        let cancel = CancellationToken::new();
        let scheduler = storage.connect_with_retry(cancel.clone());
        Self {
            store,
            connector,
            storage,
            cancel,
            scheduler,
        }
    }

    async fn wait_for(&self, expected: ConnectionState) {
        self.storage
            .subscribe_state()
            .wait_for(|state| *state == expected)
            .await
            .map(|_| ())
            .expect("state channel open");
    }

    /// 等到调度器进入退避等待。
    async fn wait_retry_scheduled(&self) {
        while self.storage.next_retry_at().is_none() {
            tokio::task::yield_now().await;
        }
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.scheduler.await.expect("scheduler joined");
    }
}

fn gaps_secs(attempts: &[tokio::time::Instant]) -> Vec<u64> {
    attempts
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_secs())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn reconnect_delays_double_from_one_second() {
    let harness = Harness::start(4, None);
    harness.wait_for(ConnectionState::Connected).await;

    let attempts = harness.connector.attempts();
    assert_eq!(attempts.len(), 5);
    assert_eq!(gaps_secs(&attempts), [1, 2, 4, 8]);
    assert!(harness.storage.is_live());
    assert!(harness.storage.next_retry_at().is_none());
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn next_retry_at_is_exposed_while_waiting() {
    let harness = Harness::start(usize::MAX, None);
    harness.wait_retry_scheduled().await;

    let retry_at = harness.storage.next_retry_at().expect("retry scheduled");
    let last_attempt = *harness.connector.attempts().last().expect("attempted");
    assert_eq!(retry_at - last_attempt, Duration::from_secs(1));
    assert!(!harness.storage.is_live());
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn lost_connection_restarts_backoff_from_one_second() {
    let harness = Harness::start(3, None);
    harness.wait_for(ConnectionState::Connected).await;
    assert_eq!(gaps_secs(&harness.connector.attempts()), [1, 2, 4]);

    harness.store.lose_connection_on_call(0);
    harness.connector.fail_next(2);
    let report = harness
        .storage
        .write_batch("pump-1", 1_690_000_000_000, &readings(10))
        .await
        .expect("report");
    assert_eq!(report.failed(), 10);
    assert!(!harness.storage.is_live());

    harness.wait_for(ConnectionState::Connected).await;
    let attempts = harness.connector.attempts();
    assert_eq!(attempts.len(), 7);
    assert_eq!(gaps_secs(&attempts[4..]), [1, 2]);
    harness.stop().await;
}

#[tokio::test]
async fn reference_payload_writes_one_row() {
    let harness = Harness::start(0, None);
    harness.wait_for(ConnectionState::Connected).await;

    let value = BigDecimal::from_str("72.5").expect("decimal");
    let report = harness
        .storage
        .write_batch("pump-1", 1_690_000_000_000, &[KpiReading::new("temp", 1, value.clone())])
        .await
        .expect("report");

    assert_eq!(report.written(), 1);
    assert_eq!(harness.store.commits(), 1);
    assert_eq!(
        harness.store.rows(),
        vec![KpiRow {
            equipment: "pump-1".to_string(),
            timestamp_ms: 1_690_000_000_000,
            name: "temp".to_string(),
            unit_id: 1,
            value,
        }]
    );
    harness.stop().await;
}

#[tokio::test]
async fn chunks_of_one_hundred() {
    let harness = Harness::start(0, None);
    harness.wait_for(ConnectionState::Connected).await;

    for (count, commits) in [(1, 1), (100, 1), (101, 2), (250, 3)] {
        let before = harness.store.commits();
        let report = harness
            .storage
            .write_batch("press-2", 1, &readings(count))
            .await
            .expect("report");
        assert_eq!(harness.store.commits() - before, commits, "{count} readings");
        assert_eq!(report.committed_chunks(), commits);
        assert_eq!(report.written(), count);
        assert!(report.is_complete());
    }
    harness.stop().await;
}

#[tokio::test]
async fn rejected_chunk_does_not_stop_later_chunks() {
    let harness = Harness::start(0, None);
    harness.wait_for(ConnectionState::Connected).await;
    harness.store.reject_call(1);

    let batch = readings(250);
    let report = harness
        .storage
        .write_batch("pump-1", 1_690_000_000_000, &batch)
        .await
        .expect("report");

    assert_eq!(harness.store.calls(), 3);
    assert_eq!(harness.store.commits(), 2);
    assert_eq!(report.written(), 150);
    assert_eq!(report.failed(), 100);
    assert_eq!(
        report
            .chunks
            .iter()
            .map(|chunk| (chunk.rows, chunk.committed()))
            .collect::<Vec<_>>(),
        [(100, true), (100, false), (50, true)]
    );

    let names: Vec<String> = harness.store.rows().into_iter().map(|row| row.name).collect();
    let expected: Vec<String> = batch[..100]
        .iter()
        .chain(&batch[200..])
        .map(|reading| reading.name.clone())
        .collect();
    assert_eq!(names, expected);
    // 数据拒绝不影响连接状态
    assert!(harness.storage.is_live());
    harness.stop().await;
}

#[tokio::test]
async fn connection_loss_skips_remaining_chunks() {
    let harness = Harness::start(0, None);
    harness.wait_for(ConnectionState::Connected).await;
    harness.store.lose_connection_on_call(0);
    harness.connector.fail_next(usize::MAX);

    let report = harness
        .storage
        .write_batch("pump-1", 1, &readings(250))
        .await
        .expect("report");

    assert_eq!(harness.store.calls(), 1);
    assert_eq!(report.failed_chunks(), 3);
    assert!(
        report
            .chunks
            .iter()
            .all(|chunk| chunk.error.as_ref().is_some_and(|err| err.is_connection_lost()))
    );
    assert!(!harness.storage.is_live());
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn write_without_connection_does_nothing() {
    let harness = Harness::start(usize::MAX, None);
    harness.wait_retry_scheduled().await;

    let err = harness
        .storage
        .write_batch("pump-1", 1, &readings(5))
        .await
        .expect_err("not connected");
    assert_eq!(err, WriteError::NotConnected);
    assert_eq!(harness.store.calls(), 0);
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_liveness_probe_disconnects_and_reconnects() {
    let harness = Harness::start(0, Some(Duration::from_secs(5)));
    harness.wait_for(ConnectionState::Connected).await;

    harness.connector.fail_next(1);
    harness.store.set_ping_failure(true);
    harness.wait_for(ConnectionState::Disconnected).await;
    assert!(!harness.storage.is_live());

    harness.store.set_ping_failure(false);
    harness.wait_for(ConnectionState::Connected).await;
    let attempts = harness.connector.attempts();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[2] - attempts[1], Duration::from_secs(1));
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn write_loss_with_liveness_enabled_reconnects_without_waiting_for_probe() {
    let harness = Harness::start(0, Some(Duration::from_secs(30)));
    harness.wait_for(ConnectionState::Connected).await;
    harness.store.lose_connection_on_call(0);

    let report = harness
        .storage
        .write_batch("pump-1", 1, &readings(3))
        .await
        .expect("report");
    assert_eq!(report.failed(), 3);
    let lost_at = tokio::time::Instant::now();

    harness.wait_for(ConnectionState::Connected).await;
    let attempts = harness.connector.attempts();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[1] - lost_at < Duration::from_secs(1));
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_scheduler_mid_backoff() {
    let harness = Harness::start(usize::MAX, None);
    harness.wait_retry_scheduled().await;
    let attempts_before = harness.connector.attempts().len();
    let connector = harness.connector.clone();

    harness.stop().await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.attempts().len(), attempts_before);
}
