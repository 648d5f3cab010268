use crate::{
    BufferStats, CUSTOM_EPOCH, CachedUidGenerator, Error, Result, StaticWorkerIdAssigner,
    SystemClock, TimeSource, UidConfig, WorkerIdAssigner,
};
use core::time::Duration;
use std::collections::HashSet;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};
use std::thread::{self, scope};
use std::time::Instant;

const EPOCH: i64 = CUSTOM_EPOCH.as_secs() as i64;

struct MockTime {
    second: AtomicI64,
}

impl MockTime {
    fn at(second: i64) -> Arc<Self> {
        Arc::new(Self {
            second: AtomicI64::new(second),
        })
    }
}

impl TimeSource for MockTime {
    fn current_second(&self) -> i64 {
        self.second.load(Ordering::SeqCst)
    }
}

struct UnavailableRegistry;

impl WorkerIdAssigner for UnavailableRegistry {
    fn assign_worker_id(&self) -> Result<u64> {
        Err(Error::WorkerAssignment {
            reason: "no route to registry".to_string(),
        })
    }
}

/// 16 ids per second and no ticker, so fill levels are easy to predict.
fn small_config(boost_power: u32) -> UidConfig {
    UidConfig::default()
        .with_bits(28, 31, 4)
        .with_boost_power(boost_power)
        .with_schedule_interval_seconds(0)
        .with_padding_workers(1)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn end_to_end_with_defaults() {
    let generator =
        CachedUidGenerator::new(&UidConfig::default(), &StaticWorkerIdAssigner(7), SystemClock)
            .unwrap();

    let mut seen = HashSet::with_capacity(10_000);
    for _ in 0..10_000 {
        let uid = generator.get_uid().unwrap();
        assert!(seen.insert(uid));
    }

    let uid = *seen.iter().next().unwrap();
    assert!(generator.parse_uid(uid).contains(r#""workerId":7"#));
    assert_eq!(generator.parse(uid).worker_id, 7);

    generator.shutdown();
}

#[test]
fn construction_fills_ring() {
    let generator = CachedUidGenerator::new(
        &small_config(2),
        &StaticWorkerIdAssigner(3),
        MockTime::at(EPOCH + 1000),
    )
    .unwrap();

    assert_eq!(
        generator.stats(),
        BufferStats {
            capacity: 64,
            len: 64,
            padding_threshold: 32,
            last_padded_second: EPOCH + 1004,
        }
    );
    assert_eq!(generator.worker_id(), 3);
    assert_eq!(generator.layout().ids_per_second(), 16);
}

#[test]
fn parse_uid_renders_json_record() {
    let generator = CachedUidGenerator::new(
        &small_config(0),
        &StaticWorkerIdAssigner(7),
        MockTime::at(EPOCH + 1000),
    )
    .unwrap();

    let uid = generator.get_uid().unwrap();
    assert_eq!(
        generator.parse_uid(uid),
        format!(
            r#"{{"UID":"{uid}","timestamp":{},"deltaSeconds":1001,"workerId":7,"sequence":0}}"#,
            EPOCH + 1001
        )
    );
}

#[test]
fn low_fill_level_triggers_refill() {
    let generator = CachedUidGenerator::new(
        &small_config(2),
        &StaticWorkerIdAssigner(1),
        MockTime::at(EPOCH + 50),
    )
    .unwrap();

    let mut seen = HashSet::new();
    for _ in 0..40 {
        assert!(seen.insert(generator.get_uid().unwrap()));
    }
    // The initial pass covered four seconds, any refill moves past them.
    assert!(wait_until(|| generator.stats().last_padded_second > EPOCH + 54));
    assert!(wait_until(|| generator.stats().len >= 32));

    while seen.len() < 200 {
        match generator.get_uid() {
            Ok(uid) => assert!(seen.insert(uid)),
            Err(Error::BufferExhausted) => thread::yield_now(),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}

#[test]
fn empty_ring_reports_buffer_exhausted() {
    let generator =
        CachedUidGenerator::new(&small_config(0), &StaticWorkerIdAssigner(1), MockTime::at(EPOCH))
            .unwrap();
    generator.shutdown();
    for _ in 0..16 {
        generator.get_uid().unwrap();
    }

    let err = generator.get_uid().unwrap_err();
    assert_eq!(err, Error::BufferExhausted);
    assert!(err.is_retryable());
}

#[test]
fn spent_timestamp_budget_is_reported_as_fatal() {
    let config = small_config(0);
    let layout = config.layout().unwrap();
    // Only one more second is encodable, so refills fail after the first pass.
    let last = EPOCH + layout.max_delta_seconds() as i64;
    let generator =
        CachedUidGenerator::new(&config, &StaticWorkerIdAssigner(1), MockTime::at(last - 1))
            .unwrap();
    assert_eq!(generator.stats().len, 16);

    for _ in 0..16 {
        generator.get_uid().unwrap();
    }

    // The refill queued by the drain fails in the background. Until it has,
    // a miss is still the retryable kind.
    let mut err = Error::BufferExhausted;
    assert!(wait_until(|| {
        err = generator.get_uid().unwrap_err();
        err != Error::BufferExhausted
    }));
    assert!(matches!(err, Error::TimestampExhausted { second, .. } if second == last + 1));
    assert!(!err.is_retryable());

    // It keeps being reported rather than turning back into a retryable miss.
    for _ in 0..5 {
        assert_eq!(generator.get_uid().unwrap_err(), err);
    }
}

#[test]
fn concurrent_callers_get_unique_ids() {
    const THREADS: usize = 8;
    const IDS_PER_THREAD: usize = 2_000;

    let generator =
        CachedUidGenerator::new(&UidConfig::default(), &StaticWorkerIdAssigner(2), SystemClock)
            .unwrap();
    let seen = Mutex::new(HashSet::with_capacity(THREADS * IDS_PER_THREAD));

    scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                let local: Vec<u64> = (0..IDS_PER_THREAD)
                    .map(|_| generator.get_uid().unwrap())
                    .collect();
                let mut seen = seen.lock().unwrap();
                for uid in local {
                    assert!(seen.insert(uid));
                }
            });
        }
    });

    assert_eq!(seen.lock().unwrap().len(), THREADS * IDS_PER_THREAD);
}

#[test]
fn shutdown_keeps_serving_buffered_ids() {
    let generator = CachedUidGenerator::new(
        &small_config(1),
        &StaticWorkerIdAssigner(1),
        MockTime::at(EPOCH),
    )
    .unwrap();

    generator.shutdown();
    generator.shutdown();

    for _ in 0..32 {
        generator.get_uid().unwrap();
    }
    assert_eq!(generator.get_uid().unwrap_err(), Error::BufferExhausted);
}

#[test]
fn construction_errors_abort() {
    let invalid = UidConfig::default().with_padding_threshold_percent(0);
    assert!(matches!(
        CachedUidGenerator::new(&invalid, &StaticWorkerIdAssigner(1), SystemClock),
        Err(Error::ConfigInvalid { .. })
    ));

    let config = small_config(0);
    let too_big = config.layout().unwrap().max_worker_id() + 1;
    assert!(matches!(
        CachedUidGenerator::new(&config, &StaticWorkerIdAssigner(too_big), SystemClock),
        Err(Error::WorkerIdOutOfRange { .. })
    ));

    assert!(matches!(
        CachedUidGenerator::new(&config, &UnavailableRegistry, SystemClock),
        Err(Error::WorkerAssignment { .. })
    ));

    assert!(matches!(
        CachedUidGenerator::new(&config, &StaticWorkerIdAssigner(1), MockTime::at(EPOCH - 5)),
        Err(Error::BeforeEpoch { .. })
    ));
}
