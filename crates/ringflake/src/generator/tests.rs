use crate::{
    BitLayout, CUSTOM_EPOCH, Error, Result, SequenceClock, StaticWorkerIdAssigner, SystemClock,
    TimeSource, UidProvider, WorkerIdAssigner,
};
use std::collections::HashSet;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, AtomicUsize, Ordering},
};
use std::thread::scope;

const EPOCH: i64 = CUSTOM_EPOCH.as_secs() as i64;

/// A clock the test moves by hand.
struct MockTime {
    second: AtomicI64,
}

impl MockTime {
    fn at(second: i64) -> Arc<Self> {
        Arc::new(Self {
            second: AtomicI64::new(second),
        })
    }

    fn set(&self, second: i64) {
        self.second.store(second, Ordering::SeqCst);
    }
}

impl TimeSource for MockTime {
    fn current_second(&self) -> i64 {
        self.second.load(Ordering::SeqCst)
    }
}

/// Returns one scripted value per read and then sticks on the last one.
struct MockStepTime {
    values: Vec<i64>,
    index: AtomicUsize,
}

impl MockStepTime {
    fn new(values: Vec<i64>) -> Self {
        Self {
            values,
            index: AtomicUsize::new(0),
        }
    }
}

impl TimeSource for MockStepTime {
    fn current_second(&self) -> i64 {
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        self.values[i.min(self.values.len() - 1)]
    }
}

struct FailingAssigner;

impl WorkerIdAssigner for FailingAssigner {
    fn assign_worker_id(&self) -> Result<u64> {
        Err(Error::WorkerAssignment {
            reason: "registry offline".to_string(),
        })
    }
}

fn small_layout() -> BitLayout {
    // 16 ids per second keeps rollover tests short.
    BitLayout::new(40, 19, 4).unwrap()
}

#[test]
fn sequence_increments_within_same_second() {
    let time = MockTime::at(EPOCH + 42);
    let generator = SequenceClock::with_worker_id(BitLayout::default(), EPOCH, 1, time).unwrap();

    let id1 = generator.next_id().unwrap();
    let id2 = generator.next_id().unwrap();
    let id3 = generator.next_id().unwrap();

    let layout = generator.layout();
    assert_eq!(layout.decode(id1), (42, 1, 0));
    assert_eq!(layout.decode(id2), (42, 1, 1));
    assert_eq!(layout.decode(id3), (42, 1, 2));
    assert!(id1 < id2 && id2 < id3);
    assert_eq!(generator.last_second(), EPOCH + 42);
}

#[test]
fn sequence_resets_on_new_second() {
    let time = MockTime::at(EPOCH + 10);
    let generator =
        SequenceClock::with_worker_id(BitLayout::default(), EPOCH, 3, Arc::clone(&time)).unwrap();

    generator.next_id().unwrap();
    generator.next_id().unwrap();

    time.set(EPOCH + 11);
    let id = generator.next_id().unwrap();
    assert_eq!(generator.layout().decode(id), (11, 3, 0));
}

#[test]
fn full_second_is_strictly_increasing_then_rolls_over() {
    let second = EPOCH + 100;
    let layout = BitLayout::default();
    let per_second = layout.ids_per_second() as usize;

    // One read per call for the full second, one more for the call that
    // wraps, then the clock moves on.
    let mut script = vec![second; per_second + 1];
    script.push(second + 1);
    let generator =
        SequenceClock::with_worker_id(layout, EPOCH, 7, MockStepTime::new(script)).unwrap();

    let ids: Vec<u64> = (0..per_second).map(|_| generator.next_id().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), per_second);
    assert_eq!(layout.decode(ids[per_second - 1]), (100, 7, layout.max_sequence()));

    let wrapped = generator.next_id().unwrap();
    assert_eq!(layout.decode(wrapped), (101, 7, 0));
    assert!(wrapped > ids[per_second - 1]);
    assert_eq!(generator.last_second(), second + 1);
}

#[test]
fn rollover_waits_through_repeated_reads() {
    let second = EPOCH + 5;
    let layout = small_layout();
    let mut script = vec![second; 16 + 1];
    // The wait loop sees the same second a few more times before it moves.
    script.extend([second, second, second, second + 1]);
    let generator =
        SequenceClock::with_worker_id(layout, EPOCH, 2, MockStepTime::new(script)).unwrap();

    for seq in 0..16 {
        let id = generator.next_id().unwrap();
        assert_eq!(layout.decode(id), (5, 2, seq));
    }

    let id = generator.next_id().unwrap();
    assert_eq!(layout.decode(id), (6, 2, 0));
}

#[test]
fn clock_regression_is_refused() {
    let time = MockTime::at(EPOCH + 50);
    let generator =
        SequenceClock::with_worker_id(BitLayout::default(), EPOCH, 1, Arc::clone(&time)).unwrap();

    let first = generator.next_id().unwrap();

    time.set(EPOCH + 48);
    let err = generator.next_id().unwrap_err();
    assert_eq!(err, Error::ClockMovedBackward { seconds: 2 });
    assert!(err.is_retryable());
    assert_eq!(generator.last_second(), EPOCH + 50);

    // Once the clock catches up the sequence continues where it left off.
    time.set(EPOCH + 50);
    let next = generator.next_id().unwrap();
    assert_eq!(generator.layout().decode(next), (50, 1, 1));
    assert!(next > first);
}

#[test]
fn clock_regression_during_rollover_wait_keeps_state() {
    let second = EPOCH + 9;
    let layout = small_layout();
    let mut script = vec![second; 16 + 1];
    script.extend([second - 1, second + 1]);
    let generator =
        SequenceClock::with_worker_id(layout, EPOCH, 4, MockStepTime::new(script)).unwrap();

    for _ in 0..16 {
        generator.next_id().unwrap();
    }

    let err = generator.next_id().unwrap_err();
    assert_eq!(err, Error::ClockMovedBackward { seconds: 1 });
    assert_eq!(generator.last_second(), second);

    let id = generator.next_id().unwrap();
    assert_eq!(layout.decode(id), (10, 4, 0));
}

#[test]
fn exhausted_timestamp_is_refused() {
    let layout = BitLayout::default();
    let time = MockTime::at(EPOCH + layout.max_delta_seconds() as i64);
    let generator = SequenceClock::with_worker_id(layout, EPOCH, 1, Arc::clone(&time)).unwrap();

    // The last representable second still works.
    let id = generator.next_id().unwrap();
    assert_eq!(layout.delta_seconds_of(id), layout.max_delta_seconds());

    time.set(EPOCH + layout.max_delta_seconds() as i64 + 1);
    let err = generator.next_id().unwrap_err();
    assert!(matches!(err, Error::TimestampExhausted { .. }));
    assert!(!err.is_retryable());
}

#[test]
fn seconds_before_epoch_are_refused() {
    let time = MockTime::at(EPOCH - 1);
    let generator = SequenceClock::with_worker_id(BitLayout::default(), EPOCH, 1, time).unwrap();

    assert_eq!(
        generator.next_id().unwrap_err(),
        Error::BeforeEpoch {
            second: EPOCH - 1,
            epoch_seconds: EPOCH
        }
    );
}

#[test]
fn batch_covers_whole_second_without_touching_state() {
    let generator =
        SequenceClock::with_worker_id(BitLayout::default(), EPOCH, 9, MockTime::at(EPOCH))
            .unwrap();

    let batch = generator.next_batch_for_second(EPOCH + 3).unwrap();
    let layout = generator.layout();
    assert_eq!(batch.len() as u64, layout.ids_per_second());
    for (seq, id) in batch.iter().enumerate() {
        assert_eq!(layout.decode(*id), (3, 9, seq as u64));
    }
    assert_eq!(generator.last_second(), -1);

    assert_eq!(generator.provide(EPOCH + 3).unwrap(), batch);
}

#[test]
fn batch_outside_range_is_refused() {
    let layout = BitLayout::default();
    let generator = SequenceClock::with_worker_id(layout, EPOCH, 1, MockTime::at(EPOCH)).unwrap();

    let too_late = EPOCH + layout.max_delta_seconds() as i64 + 1;
    assert!(matches!(
        generator.next_batch_for_second(too_late),
        Err(Error::TimestampExhausted { .. })
    ));
    assert!(matches!(
        generator.next_batch_for_second(EPOCH - 10),
        Err(Error::BeforeEpoch { .. })
    ));
}

#[test]
fn parse_reports_fields_and_timestamp() {
    let generator =
        SequenceClock::with_worker_id(BitLayout::default(), EPOCH, 7, MockTime::at(EPOCH + 77))
            .unwrap();
    generator.next_id().unwrap();
    let id = generator.next_id().unwrap();

    let parts = generator.parse(id);
    assert_eq!(parts.uid, id);
    assert_eq!(parts.timestamp, EPOCH + 77);
    assert_eq!(parts.delta_seconds, 77);
    assert_eq!(parts.worker_id, 7);
    assert_eq!(parts.sequence, 1);
}

#[test]
fn worker_id_comes_from_assigner() {
    let generator = SequenceClock::new(
        BitLayout::default(),
        EPOCH,
        &StaticWorkerIdAssigner(12),
        MockTime::at(EPOCH),
    )
    .unwrap();
    assert_eq!(generator.worker_id(), 12);

    let err = SequenceClock::new(BitLayout::default(), EPOCH, &FailingAssigner, SystemClock)
        .unwrap_err();
    assert!(matches!(err, Error::WorkerAssignment { .. }));
}

#[test]
fn worker_id_out_of_range_is_refused() {
    let layout = BitLayout::default();
    let err = SequenceClock::with_worker_id(layout, EPOCH, layout.max_worker_id() + 1, SystemClock)
        .unwrap_err();
    assert_eq!(
        err,
        Error::WorkerIdOutOfRange {
            worker_id: layout.max_worker_id() + 1,
            max_worker_id: layout.max_worker_id(),
        }
    );

    SequenceClock::with_worker_id(layout, EPOCH, layout.max_worker_id(), SystemClock).unwrap();
}

#[test]
fn threaded_generation_is_unique() {
    const THREADS: usize = 8;
    const IDS_PER_THREAD: usize = 1024;

    let generator =
        SequenceClock::with_worker_id(BitLayout::default(), EPOCH, 1, SystemClock).unwrap();
    let seen = Mutex::new(HashSet::with_capacity(THREADS * IDS_PER_THREAD));

    scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..IDS_PER_THREAD {
                    let id = generator.next_id().unwrap();
                    assert!(seen.lock().unwrap().insert(id));
                }
            });
        }
    });

    assert_eq!(seen.lock().unwrap().len(), THREADS * IDS_PER_THREAD);
}
