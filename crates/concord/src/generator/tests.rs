use crate::{
    Backoff, DatedLayout, DatedSequenceIdGenerator, Error, Fixed, IdGenStatus, IdGenerator,
    InstanceIdentity, LocalCalendar, SequenceIdGenerator, SequenceLayout, TimeSource, WallClock,
    date_prefix,
    time::CalendarSource,
};
use chrono::{NaiveDate, NaiveDateTime};
use core::fmt;
use core::time::Duration;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::scope;
use std::time::Instant;

struct FixedTime {
    millis: u64,
}

impl TimeSource<u64> for FixedTime {
    fn current_millis(&self) -> u64 {
        self.millis
    }
}

/// A clock the test moves by hand.
#[derive(Clone, Default)]
struct StepTime {
    millis: Arc<AtomicU64>,
}

impl StepTime {
    fn at(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource<u64> for StepTime {
    fn current_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Advances by one millisecond every `reads_per_tick` reads.
struct SlowTime {
    reads: AtomicU64,
    reads_per_tick: u64,
}

impl TimeSource<u64> for SlowTime {
    fn current_millis(&self) -> u64 {
        self.reads.fetch_add(1, Ordering::SeqCst) / self.reads_per_tick
    }
}

#[derive(Clone)]
struct MockCalendar {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl MockCalendar {
    fn at(now: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }
}

impl CalendarSource for MockCalendar {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

fn datetime(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, s)
        .unwrap()
}

trait IdGenStatusExt {
    fn unwrap_ready(self) -> u64;
    fn unwrap_pending(self) -> u64;
}

impl IdGenStatusExt for IdGenStatus {
    fn unwrap_ready(self) -> u64 {
        match self {
            IdGenStatus::Ready { id } => id,
            IdGenStatus::Pending { yield_for } => {
                panic!("unexpected pending (yield for: {yield_for})")
            }
        }
    }

    fn unwrap_pending(self) -> u64 {
        match self {
            IdGenStatus::Ready { id } => panic!("unexpected ready ({id})"),
            IdGenStatus::Pending { yield_for } => yield_for,
        }
    }
}

fn assert_strictly_increasing<T: Ord + fmt::Debug>(ids: &[T]) {
    for pair in ids.windows(2) {
        assert!(pair[0] < pair[1], "{:?} !< {:?}", pair[0], pair[1]);
    }
}

fn run_generator_monotonic_threaded<G>(generator: &G, threads: usize, per_thread: usize)
where
    G: IdGenerator + Sync,
{
    let mut all = Vec::with_capacity(threads * per_thread);
    scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    let ids: Vec<u64> = (0..per_thread)
                        .map(|_| generator.next_id().unwrap())
                        .collect();
                    assert_strictly_increasing(&ids);
                    ids
                })
            })
            .collect();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
    });

    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(unique.len(), threads * per_thread, "duplicate IDs generated");
}

fn stress_threads() -> usize {
    (num_cpus::get() * 4).max(50)
}

#[test]
fn sequence_increments_within_same_tick() {
    let generator = SequenceIdGenerator::from_instance(
        1,
        SequenceLayout::default(),
        FixedTime { millis: 42 },
    )
    .unwrap();

    let first = generator.try_poll_id().unwrap().unwrap_ready();
    let second = generator.try_poll_id().unwrap().unwrap_ready();
    let third = generator.try_poll_id().unwrap().unwrap_ready();

    let layout = generator.layout();
    for (id, sequence) in [(first, 0), (second, 1), (third, 2)] {
        let parts = layout.decompose(id);
        assert_eq!(parts.timestamp, 42);
        assert_eq!(parts.instance, 1);
        assert_eq!(parts.sequence, sequence);
    }
    assert!(first < second && second < third);
}

#[test]
fn sequence_returns_pending_when_exhausted() {
    let generator =
        SequenceIdGenerator::from_instance(0, SequenceLayout::new(0, 2), FixedTime { millis: 7 })
            .unwrap();

    for _ in 0..4 {
        generator.try_poll_id().unwrap().unwrap_ready();
    }
    assert_eq!(generator.try_poll_id().unwrap().unwrap_pending(), 1);
    assert_eq!(generator.try_poll_id().unwrap().unwrap_pending(), 1);
}

#[test]
fn sequence_resets_when_clock_advances() {
    let time = StepTime::at(42);
    let generator =
        SequenceIdGenerator::from_instance(3, SequenceLayout::new(4, 1), time.clone()).unwrap();

    let a = generator.try_poll_id().unwrap().unwrap_ready();
    let b = generator.try_poll_id().unwrap().unwrap_ready();
    assert_eq!(generator.try_poll_id().unwrap().unwrap_pending(), 1);

    time.set(43);
    let c = generator.try_poll_id().unwrap().unwrap_ready();

    let layout = generator.layout();
    assert_eq!(layout.decompose(b).sequence, 1);
    assert_eq!(layout.decompose(c).timestamp, 43);
    assert_eq!(layout.decompose(c).sequence, 0);
    assert_strictly_increasing(&[a, b, c]);
}

#[test]
fn sequence_waits_out_clock_going_backwards() {
    let time = StepTime::at(50);
    let generator =
        SequenceIdGenerator::from_instance(0, SequenceLayout::default(), time.clone()).unwrap();

    let before = generator.try_poll_id().unwrap().unwrap_ready();
    time.set(45);
    assert_eq!(generator.try_poll_id().unwrap().unwrap_pending(), 5);

    time.set(50);
    let same_tick = generator.try_poll_id().unwrap().unwrap_ready();
    assert!(same_tick > before);
    assert_eq!(generator.layout().decompose(same_tick).sequence, 1);
}

#[test]
fn sequence_spills_into_later_milliseconds() {
    let time = SlowTime {
        reads: AtomicU64::new(0),
        reads_per_tick: 6,
    };
    let generator = SequenceIdGenerator::from_instance(1, SequenceLayout::new(4, 2), time).unwrap();

    let ids: Vec<u64> = (0..10)
        .map(|_| generator.next_id_with(Backoff::Spin).unwrap())
        .collect();

    assert_strictly_increasing(&ids);
    let last = generator.layout().decompose(ids[9]);
    assert!(last.timestamp >= 2, "10 IDs cannot fit in 2ms of 4 slots");
    assert!(ids.iter().all(|&id| generator.layout().decompose(id).instance == 1));
}

#[test]
fn sequence_reports_timestamp_overflow() {
    let layout = SequenceLayout::default();
    let generator = SequenceIdGenerator::from_instance(
        0,
        layout,
        FixedTime {
            millis: layout.max_timestamp() + 1,
        },
    )
    .unwrap();

    assert_eq!(
        generator.try_poll_id(),
        Err(Error::TimestampOverflow {
            timestamp: layout.max_timestamp() + 1,
            bits: 45,
        })
    );
    assert!(generator.next_id().is_err());
}

#[test]
fn sequence_layout_validation() {
    assert!(SequenceLayout::default().validate().is_ok());
    assert!(SequenceLayout::new(10, 14).validate().is_ok());
    assert!(SequenceLayout::new(0, 24).validate().is_ok());
    assert!(matches!(
        SequenceLayout::new(4, 0).validate(),
        Err(Error::InvalidLayout { .. })
    ));
    assert!(matches!(
        SequenceLayout::new(12, 13).validate(),
        Err(Error::InvalidLayout { .. })
    ));
    assert!(matches!(
        SequenceLayout::new(255, 255).validate(),
        Err(Error::InvalidLayout { .. })
    ));
    assert!(
        SequenceIdGenerator::from_instance(0, SequenceLayout::new(4, 0), FixedTime { millis: 0 })
            .is_err()
    );
}

#[test]
fn sequence_masks_instance_to_its_field() {
    let generator =
        SequenceIdGenerator::from_instance(0x1F3, SequenceLayout::new(4, 14), FixedTime { millis: 1 })
            .unwrap();
    assert_eq!(generator.instance(), 0x3);

    let identity = InstanceIdentity::new(Fixed(0x0A0B));
    let generator =
        SequenceIdGenerator::new(&identity, SequenceLayout::new(8, 10), FixedTime { millis: 1 })
            .unwrap();
    assert_eq!(generator.instance(), 0x0B);
}

#[test]
fn sequence_construction_fails_without_identity() {
    let identity = InstanceIdentity::new(|| -> crate::Result<u32> {
        Err(Error::IdentityUnavailable {
            reason: "offline".into(),
        })
    });
    let result = SequenceIdGenerator::new(&identity, SequenceLayout::default(), FixedTime { millis: 0 });
    assert!(matches!(result, Err(Error::IdentityUnavailable { .. })));
}

#[test]
fn sequence_generators_with_different_instances_never_collide() {
    let layout = SequenceLayout::default();
    let a = SequenceIdGenerator::from_instance(1, layout, FixedTime { millis: 99 }).unwrap();
    let b = SequenceIdGenerator::from_instance(2, layout, FixedTime { millis: 99 }).unwrap();

    let mut seen = HashSet::new();
    for _ in 0..1_000 {
        assert!(seen.insert(a.try_poll_id().unwrap().unwrap_ready()));
        assert!(seen.insert(b.try_poll_id().unwrap().unwrap_ready()));
    }
    assert_eq!(seen.len(), 2_000);
}

#[test]
fn sequence_layout_decompose_and_unix_millis() {
    let layout = SequenceLayout::new(4, 14).with_epoch(Duration::from_millis(1_000));
    let id = layout.compose(5_000, 9, 1_234);

    let parts = layout.decompose(id);
    assert_eq!(parts.timestamp, 5_000);
    assert_eq!(parts.instance, 9);
    assert_eq!(parts.sequence, 1_234);
    assert_eq!(layout.unix_millis(id), 6_000);
    assert_eq!(id, (5_000 << 18) | (9 << 14) | 1_234);
}

#[test]
fn sequence_threaded_ids_are_unique_and_ordered() {
    let identity = InstanceIdentity::new(Fixed(7));
    let generator = SequenceIdGenerator::with_wall_clock(&identity, SequenceLayout::default()).unwrap();
    run_generator_monotonic_threaded(&generator, stress_threads(), 256);
}

#[test]
fn sequence_threaded_through_arc() {
    let generator = Arc::new(
        SequenceIdGenerator::from_instance(0, SequenceLayout::new(0, 4), WallClock::default())
            .unwrap(),
    );
    run_generator_monotonic_threaded(&generator, 8, 200);
}

#[test]
fn sleep_backoff_waits_for_the_next_tick() {
    let time = StepTime::at(10);
    let generator =
        SequenceIdGenerator::from_instance(0, SequenceLayout::new(0, 1), time.clone()).unwrap();
    generator.next_id().unwrap();
    generator.next_id().unwrap();

    scope(|s| {
        s.spawn(|| {
            std::thread::sleep(Duration::from_millis(20));
            time.set(11);
        });
        let id = generator.next_id_with(Backoff::Sleep).unwrap();
        assert_eq!(generator.layout().decompose(id).timestamp, 11);
    });
}

#[test]
fn dated_id_reads_as_date_and_time() {
    let calendar = MockCalendar::at(datetime(2026, 5, 17, 12, 0, 0));
    let identity = InstanceIdentity::new(Fixed(1_042));
    let generator = DatedSequenceIdGenerator::new(&identity, DatedLayout::default(), calendar).unwrap();

    assert_eq!(generator.instance(), 42);
    assert_eq!(generator.current_prefix(), 260_517);

    let first = generator.try_poll_id().unwrap().unwrap_ready();
    let second = generator.try_poll_id().unwrap().unwrap_ready();
    assert_eq!(first, 260_517_432_000_420_000);
    assert_eq!(second, first + 1);

    let parts = generator.layout().decompose(second);
    assert_eq!(parts.date, 260_517);
    assert_eq!(parts.second, 43_200);
    assert_eq!(parts.instance, 42);
    assert_eq!(parts.sequence, 1);
}

#[test]
fn dated_prefix_changes_at_midnight() {
    let calendar = MockCalendar::at(datetime(2026, 12, 31, 23, 59, 59));
    let generator =
        DatedSequenceIdGenerator::from_instance(7, DatedLayout::default(), calendar.clone()).unwrap();

    let before = generator.try_poll_id().unwrap().unwrap_ready();
    calendar.set(datetime(2027, 1, 1, 0, 0, 0));
    let after = generator.try_poll_id().unwrap().unwrap_ready();

    let layout = generator.layout();
    assert_eq!(layout.decompose(before).date, 261_231);
    assert_eq!(layout.decompose(after).date, 270_101);
    assert_eq!(layout.decompose(after).second, 0);
    assert_eq!(layout.decompose(after).sequence, 0);
    assert_eq!(generator.current_prefix(), 270_101);
    assert!(after > before);
}

#[test]
fn dated_prefix_refreshes_after_idle_gap() {
    let calendar = MockCalendar::at(datetime(2026, 3, 1, 10, 0, 0));
    let generator =
        DatedSequenceIdGenerator::from_instance(1, DatedLayout::default(), calendar.clone()).unwrap();
    let monday = generator.try_poll_id().unwrap().unwrap_ready();

    // Next day, earlier second of day.
    calendar.set(datetime(2026, 3, 2, 9, 0, 0));
    let tuesday = generator.try_poll_id().unwrap().unwrap_ready();

    assert_eq!(generator.layout().decompose(tuesday).date, 260_302);
    assert!(tuesday > monday);
}

#[test]
fn dated_returns_pending_when_second_exhausted() {
    let calendar = MockCalendar::at(datetime(2026, 6, 1, 8, 0, 0));
    let generator =
        DatedSequenceIdGenerator::from_instance(3, DatedLayout::new(10, 10), calendar.clone())
            .unwrap();

    let ids: Vec<u64> = (0..10)
        .map(|_| generator.try_poll_id().unwrap().unwrap_ready())
        .collect();
    assert_strictly_increasing(&ids);
    assert_eq!(generator.try_poll_id().unwrap().unwrap_pending(), 1);

    calendar.set(datetime(2026, 6, 1, 8, 0, 1));
    let next = generator.try_poll_id().unwrap().unwrap_ready();
    assert_eq!(generator.layout().decompose(next).sequence, 0);
    assert!(next > ids[9]);
}

#[test]
fn dated_waits_out_calendar_going_backwards() {
    let calendar = MockCalendar::at(datetime(2026, 6, 1, 8, 0, 10));
    let generator =
        DatedSequenceIdGenerator::from_instance(0, DatedLayout::default(), calendar.clone()).unwrap();
    generator.try_poll_id().unwrap().unwrap_ready();

    calendar.set(datetime(2026, 6, 1, 8, 0, 4));
    assert_eq!(generator.try_poll_id().unwrap().unwrap_pending(), 6);

    calendar.set(datetime(2026, 5, 31, 23, 59, 59));
    assert_eq!(generator.try_poll_id().unwrap().unwrap_pending(), 28_811);
    assert_eq!(generator.current_prefix(), 260_601);
}

#[test]
fn dated_check_rollover_without_traffic() {
    let calendar = MockCalendar::at(datetime(2026, 1, 9, 23, 0, 0));
    let generator =
        DatedSequenceIdGenerator::from_instance(0, DatedLayout::default(), calendar.clone()).unwrap();

    assert!(!generator.check_rollover().unwrap());
    calendar.set(datetime(2026, 1, 10, 0, 30, 0));
    assert!(generator.check_rollover().unwrap());
    assert!(!generator.check_rollover().unwrap());
    assert_eq!(generator.current_prefix(), 260_110);

    // Going back never rolls the prefix backwards.
    calendar.set(datetime(2026, 1, 9, 23, 0, 0));
    assert!(!generator.check_rollover().unwrap());
    assert_eq!(generator.current_prefix(), 260_110);
}

#[test]
fn largest_dated_id_fits_in_i64() {
    for layout in [
        DatedLayout::new(1_000, 10_000),
        DatedLayout::new(1, 10_000_000),
        DatedLayout::new(1_000_000, 10),
    ] {
        assert!(layout.validate().is_ok());
        let id = layout.compose(991_231, 86_399, layout.instance_modulus - 1, layout.max_sequence());
        assert!(i64::try_from(id).is_ok(), "{layout:?} overflows i64 with {id}");
        assert_eq!(layout.decompose(id).date, 991_231);
    }
}

#[test]
fn dated_layout_validation() {
    assert!(DatedLayout::default().validate().is_ok());
    assert!(DatedLayout::new(1, 10).validate().is_ok());
    assert!(DatedLayout::new(1_000, 10_000).validate().is_ok());
    assert!(DatedLayout::new(1, 10_000_000).validate().is_ok());
    for bad in [
        DatedLayout::new(10_000, 10_000),
        DatedLayout::new(10, 10_000_000),
        DatedLayout::new(0, 10_000),
        DatedLayout::new(300, 10_000),
        DatedLayout::new(1_000, 1),
        DatedLayout::new(1_000, 2_500),
        DatedLayout::new(10_000, 100_000),
        DatedLayout::new(u64::MAX, 10),
    ] {
        assert!(
            matches!(bad.validate(), Err(Error::InvalidLayout { .. })),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn date_prefix_formats_two_digit_year() {
    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
    assert_eq!(date_prefix(date(2099, 12, 31)), Some(991_231));
    assert_eq!(date_prefix(date(2026, 5, 17)), Some(260_517));
    assert_eq!(date_prefix(date(2000, 1, 5)), Some(105));
}

#[test]
fn dated_threaded_ids_are_unique_and_ordered() {
    let identity = InstanceIdentity::new(Fixed(4));
    let generator =
        DatedSequenceIdGenerator::with_local_calendar(&identity, DatedLayout::new(10, 1_000_000))
            .unwrap();
    run_generator_monotonic_threaded(&generator, stress_threads(), 200);
}

#[test]
fn ticker_rolls_prefix_over_in_background() {
    let calendar = MockCalendar::at(datetime(2026, 8, 1, 23, 59, 59));
    let generator = Arc::new(
        DatedSequenceIdGenerator::from_instance(0, DatedLayout::default(), calendar.clone())
            .unwrap(),
    );
    let ticker = generator
        .spawn_rollover_ticker(Duration::from_millis(5))
        .unwrap();

    calendar.set(datetime(2026, 8, 2, 0, 0, 1));
    let deadline = Instant::now() + Duration::from_secs(5);
    while generator.current_prefix() != 260_802 {
        assert!(Instant::now() < deadline, "ticker never rolled over");
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(!ticker.is_finished());
    ticker.stop();
}

#[test]
fn ticker_stop_joins_promptly() {
    let generator = Arc::new(
        DatedSequenceIdGenerator::from_instance(
            0,
            DatedLayout::default(),
            MockCalendar::at(datetime(2026, 8, 1, 12, 0, 0)),
        )
        .unwrap(),
    );
    let ticker = generator
        .spawn_rollover_ticker(crate::DEFAULT_ROLLOVER_INTERVAL)
        .unwrap();

    let started = Instant::now();
    ticker.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn ticker_exits_when_generator_dropped() {
    let generator = Arc::new(
        DatedSequenceIdGenerator::from_instance(
            0,
            DatedLayout::default(),
            MockCalendar::at(datetime(2026, 8, 1, 12, 0, 0)),
        )
        .unwrap(),
    );
    let ticker = generator
        .spawn_rollover_ticker(Duration::from_millis(1))
        .unwrap();
    drop(generator);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !ticker.is_finished() {
        assert!(Instant::now() < deadline, "ticker outlived its generator");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn local_calendar_generator_produces_todays_prefix() {
    let today = || date_prefix(chrono::Local::now().date_naive()).unwrap();
    let before = today();
    let generator = DatedSequenceIdGenerator::from_instance(0, DatedLayout::default(), LocalCalendar)
        .unwrap();
    let id = generator.next_id().unwrap();
    let after = today();

    let date = generator.layout().decompose(id).date;
    assert!(before <= date && date <= after);
}

#[cfg(feature = "serde")]
#[test]
fn layouts_serde_round_trip() {
    let layout = SequenceLayout::new(6, 12).with_epoch(Duration::from_millis(1_700_000_000_000));
    let json = serde_json::to_string(&layout).unwrap();
    assert_eq!(serde_json::from_str::<SequenceLayout>(&json).unwrap(), layout);

    let dated = DatedLayout::new(100, 1_000);
    let json = serde_json::to_string(&dated).unwrap();
    assert_eq!(serde_json::from_str::<DatedLayout>(&json).unwrap(), dated);

    let defaulted: DatedLayout = serde_json::from_str("{}").unwrap();
    assert_eq!(defaulted, DatedLayout::default());
}
