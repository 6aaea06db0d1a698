//! Cache benchmarks.
//!
//! Measures paged-cache performance for:
//! - Mapping a file and opening cursors
//! - Sequential and random page access (cache hits)
//! - Writes through an exclusive cursor
//! - Eviction under memory pressure

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use paged_cache::{Cache, CacheConfig, Flags};
use tempfile::TempDir;

const PAGE_SIZE: usize = 4096;

fn open_cache(max_pages: usize) -> (TempDir, Cache, std::path::PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("test.db");
    let cache = Cache::new(CacheConfig::new(PAGE_SIZE, max_pages));
    (dir, cache, path)
}

fn seed_pages(file: &paged_cache::PagedFile, count: u64) {
    let mut cursor = file.io(0, Flags::EXCLUSIVE_LOCK).unwrap();
    for i in 0..count {
        cursor.next_at(i).unwrap();
        cursor.put_byte(0x42).unwrap();
    }
}

fn bench_sequential_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_sequential");

    let (_dir, cache, path) = open_cache(256);
    let file = cache.map(&path, PAGE_SIZE).unwrap();
    seed_pages(&file, 100);

    group.throughput(Throughput::Elements(100));
    group.bench_function("100_pages_sequential", |b| {
        b.iter(|| {
            let mut cursor = file.io(0, Flags::SHARED_LOCK).unwrap();
            for i in 0..100u64 {
                cursor.next_at(i).unwrap();
                black_box(cursor.get_byte().unwrap());
            }
        });
    });

    group.finish();
}

fn bench_random_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_random");

    let (_dir, cache, path) = open_cache(128);
    let file = cache.map(&path, PAGE_SIZE).unwrap();
    seed_pages(&file, 100);

    let mut access_pattern = Vec::new();
    let mut seed: u32 = 12345;
    for _ in 0..1000 {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
        access_pattern.push((seed as u64) % 100);
    }

    group.throughput(Throughput::Elements(1000));
    group.bench_function("1000_random_accesses", |b| {
        b.iter(|| {
            let mut cursor = file.io(0, Flags::SHARED_LOCK).unwrap();
            for &page_index in &access_pattern {
                cursor.next_at(page_index).unwrap();
                black_box(cursor.get_byte().unwrap());
            }
        });
    });

    group.finish();
}

fn bench_page_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_write");

    let (_dir, cache, path) = open_cache(256);
    let file = cache.map(&path, PAGE_SIZE).unwrap();

    group.throughput(Throughput::Bytes(PAGE_SIZE as u64 * 50));
    group.bench_function("50_pages_write", |b| {
        b.iter(|| {
            let mut cursor = file.io(0, Flags::EXCLUSIVE_LOCK).unwrap();
            for i in 0..50u64 {
                cursor.next_at(i).unwrap();
                cursor.put_bytes(&[0x42u8; PAGE_SIZE]).unwrap();
            }
        });
    });

    group.finish();
}

fn bench_eviction_pressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_eviction");

    let pool_size = 32;
    let access_pages = 100u64;

    let (_dir, cache, path) = open_cache(pool_size);
    let file = cache.map(&path, PAGE_SIZE).unwrap();
    seed_pages(&file, access_pages);

    group.throughput(Throughput::Elements(access_pages));
    group.bench_function("eviction_heavy", |b| {
        b.iter(|| {
            let mut cursor = file.io(0, Flags::SHARED_LOCK).unwrap();
            for i in 0..access_pages {
                cursor.next_at(i).unwrap();
                black_box(cursor.get_byte().unwrap());
            }
        });
    });

    group.finish();
}

fn bench_working_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_working_set");

    let pool_size = 64;
    let (_dir, cache, path) = open_cache(pool_size);
    let file = cache.map(&path, PAGE_SIZE).unwrap();
    seed_pages(&file, 100);

    for working_set_size in &[32u64, 48, 64, 80] {
        group.throughput(Throughput::Elements(*working_set_size * 100));
        group.bench_with_input(
            BenchmarkId::from_parameter(working_set_size),
            working_set_size,
            |b, &size| {
                b.iter(|| {
                    let mut cursor = file.io(0, Flags::SHARED_LOCK).unwrap();
                    for _ in 0..100 {
                        for i in 0..size {
                            cursor.next_at(i).unwrap();
                            black_box(cursor.get_byte().unwrap());
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_sequential_access,
    bench_random_access,
    bench_page_write,
    bench_eviction_pressure,
    bench_working_set
);
criterion_main!(benches);
