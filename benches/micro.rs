//! Micro-benchmarks for the LSM write and read paths.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- put       # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use tempfile::TempDir;
use wrendb::lsm::tree::LsmTree;
use wrendb::options::LsmOptions;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Default value payload (128 bytes).
const VALUE_128B: &[u8; 128] = &[0xAB; 128];

fn make_key(i: u64) -> Vec<u8> {
    format!("key-{i:012}").into_bytes()
}

/// Small write buffer so flushes and compactions happen during sustained
/// writes.
fn open_small_buffer(dir: &std::path::Path) -> LsmTree {
    LsmTree::open(
        dir,
        LsmOptions {
            write_buffer_size: 64 * 1024,
            sst_file_size: 256 * 1024,
            ..LsmOptions::default()
        },
    )
    .expect("open")
}

/// Large write buffer so everything stays in the memtable.
fn open_memtable_only(dir: &std::path::Path) -> LsmTree {
    LsmTree::open(
        dir,
        LsmOptions {
            write_buffer_size: 64 * 1024 * 1024,
            ..LsmOptions::default()
        },
    )
    .expect("open")
}

/// Pre-populate a tree with `count` sequential keys and flush, so reads
/// hit SSTables.
fn prepopulate(dir: &std::path::Path, count: u64) -> LsmTree {
    let tree = open_small_buffer(dir);
    for i in 0..count {
        tree.put(make_key(i), VALUE_128B.to_vec()).unwrap();
    }
    tree.flush().unwrap();
    tree
}

// ------------------------------------------------------------------------------------------------
// Benchmarks
// ------------------------------------------------------------------------------------------------

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Elements(1));

    group.bench_function("memtable_only_128b", |b| {
        let tmp = TempDir::new().unwrap();
        let tree = open_memtable_only(tmp.path());
        let mut i = 0u64;
        b.iter(|| {
            tree.put(make_key(i), VALUE_128B.to_vec()).unwrap();
            i += 1;
        });
        tree.close().unwrap();
    });

    group.bench_function("with_flushes_128b", |b| {
        let tmp = TempDir::new().unwrap();
        let tree = open_small_buffer(tmp.path());
        let mut i = 0u64;
        b.iter(|| {
            tree.put(make_key(i), VALUE_128B.to_vec()).unwrap();
            i += 1;
        });
        tree.close().unwrap();
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("hit_from_ssts", |b| {
        let tmp = TempDir::new().unwrap();
        let tree = prepopulate(tmp.path(), 10_000);
        let mut i = 0u64;
        b.iter(|| {
            let key = make_key(i % 10_000);
            black_box(tree.get(&key).unwrap());
            i += 1;
        });
        tree.close().unwrap();
    });

    group.bench_function("miss_bloom_filtered", |b| {
        let tmp = TempDir::new().unwrap();
        let tree = prepopulate(tmp.path(), 10_000);
        b.iter(|| {
            black_box(tree.get(b"absent-key").unwrap());
        });
        tree.close().unwrap();
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");

    group.bench_function("full_10k", |b| {
        let tmp = TempDir::new().unwrap();
        let tree = prepopulate(tmp.path(), 10_000);
        b.iter(|| {
            let count = tree.scan(None, None).unwrap().count();
            black_box(count);
        });
        tree.close().unwrap();
    });

    group.finish();
}

criterion_group!(benches, bench_put, bench_get, bench_scan);
criterion_main!(benches);
