use chrono::{NaiveDate, NaiveDateTime};
use concord::{
    CalendarSource, DatedLayout, DatedSequenceIdGenerator, DistributedLock, Fixed, IdGenStatus,
    IdGenerator, InstanceIdentity, LockConfig, MemoryStore, SequenceIdGenerator, SequenceLayout,
    TimeSource, WaitPolicy, WallClock,
};
use core::hint::black_box;
use core::time::Duration;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

struct FixedMockTime {
    millis: u64,
}

impl TimeSource<u64> for FixedMockTime {
    fn current_millis(&self) -> u64 {
        self.millis
    }
}

struct FixedCalendar(NaiveDateTime);

impl CalendarSource for FixedCalendar {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

fn fixed_calendar() -> FixedCalendar {
    FixedCalendar(
        NaiveDate::from_ymd_opt(2026, 1, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap(),
    )
}

// Number of IDs generated per benchmark iteration (per-thread for
// multi-threaded). Fits one unit of both default layouts.
const TOTAL_IDS: usize = 4096;

/// Benchmarks a hot-path generator where IDs are always `Ready`.
fn bench_generator<G>(c: &mut Criterion, group_name: &str, generator_factory: impl Fn() -> G)
where
    G: IdGenerator,
{
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let generator = generator_factory();
                for _ in 0..TOTAL_IDS {
                    match generator.try_poll_id() {
                        Ok(IdGenStatus::Ready { id }) => {
                            black_box(id);
                        }
                        _ => unreachable!(),
                    }
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks a shared generator across threads, yielding on `Pending`.
fn bench_generator_contended<G>(c: &mut Criterion, group_name: &str, generator_fn: impl Fn() -> G)
where
    G: IdGenerator + Send + Sync,
{
    let mut group = c.benchmark_group(group_name);

    for thread_count in [1, 2, 4, 8, 16] {
        let ids_per_thread = TOTAL_IDS / thread_count;

        group.throughput(Throughput::Elements(TOTAL_IDS as u64));
        group.bench_function(format!("elems/{TOTAL_IDS}/threads/{thread_count}"), |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();

                for _ in 0..iters {
                    let generator = Arc::new(generator_fn());
                    let barrier = Arc::new(Barrier::new(thread_count + 1));
                    scope(|s| {
                        for _ in 0..thread_count {
                            let generator = Arc::clone(&generator);
                            let barrier = Arc::clone(&barrier);
                            s.spawn(move || {
                                barrier.wait();
                                for _ in 0..ids_per_thread {
                                    black_box(generator.next_id().unwrap());
                                }
                            });
                        }
                        barrier.wait();
                    });
                }

                start.elapsed()
            });
        });
    }

    group.finish();
}

fn benchmark_mock_sequence(c: &mut Criterion) {
    bench_generator(c, "mock/sequence", || {
        SequenceIdGenerator::from_instance(1, SequenceLayout::default(), FixedMockTime { millis: 1 })
            .unwrap()
    });
}

fn benchmark_mock_dated(c: &mut Criterion) {
    bench_generator(c, "mock/dated", || {
        DatedSequenceIdGenerator::from_instance(1, DatedLayout::default(), fixed_calendar()).unwrap()
    });
}

fn benchmark_wall_clock_sequence_threaded(c: &mut Criterion) {
    bench_generator_contended(c, "wall_clock/sequence/threaded", || {
        SequenceIdGenerator::from_instance(1, SequenceLayout::default(), WallClock::default())
            .unwrap()
    });
}

fn benchmark_memory_lock_cycle(c: &mut Criterion) {
    let identity = InstanceIdentity::new(Fixed(1));
    let ids = SequenceIdGenerator::with_wall_clock(&identity, SequenceLayout::default()).unwrap();
    let lock = DistributedLock::new(MemoryStore::new(), ids, LockConfig::default());
    let owner = lock.owner().unwrap();
    let no_wait = WaitPolicy::Timeout(Duration::ZERO);

    let mut group = c.benchmark_group("memory/lock");
    group.throughput(Throughput::Elements(1));
    group.bench_function("acquire_release", |b| {
        b.iter(|| {
            assert!(lock.acquire_with(&owner, "bench", Duration::from_secs(60), no_wait));
            black_box(lock.release(&owner, "bench"));
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_mock_sequence,
    benchmark_mock_dated,
    benchmark_wall_clock_sequence_threaded,
    benchmark_memory_lock_cycle,
);
criterion_main!(benches);
