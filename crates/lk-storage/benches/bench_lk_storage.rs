use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lk_core::LogKeeperConfig;
use lk_storage::{list_archives, Compressor, RetentionSweeper, RotationEngine};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

fn log_lines(bytes: usize) -> Vec<u8> {
    let line = b"2024-01-01T00:00:00Z INFO request handled path=/api/v1/items status=200\n";
    line.iter().cycle().take(bytes).copied().collect()
}

fn bench_compress(c: &mut Criterion) {
    let data_1m = log_lines(1024 * 1024);

    for level in [1u32, 6, 9] {
        c.bench_function(&format!("gzip_1mb_level_{level}"), |b| {
            let tmp = TempDir::new().unwrap();
            let compressor = Compressor::new(level);
            b.iter(|| {
                let path = tmp.path().join("app_20240101_000000.log");
                std::fs::write(&path, &data_1m).unwrap();
                let out = compressor.compress(&path).unwrap();
                black_box(&out);
                std::fs::remove_file(out).unwrap();
            })
        });
    }
}

fn bench_rotation(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let data_100k = log_lines(100 * 1024);

    c.bench_function("rotate_100kb_uncompressed", |b| {
        let tmp = TempDir::new().unwrap();
        let logs = tmp.path().join("logs");
        let archive = tmp.path().join("archive");
        std::fs::create_dir_all(&logs).unwrap();
        std::fs::create_dir_all(&archive).unwrap();
        let mut config = LogKeeperConfig::new(logs, archive, "app.log");
        config.max_size_bytes = 1024;
        config.compression_enabled = false;
        let config = Arc::new(config);
        let engine = RotationEngine::new(config.clone());
        b.iter(|| {
            std::fs::write(config.active_log_path(), &data_100k).unwrap();
            black_box(rt.block_on(engine.evaluate_and_rotate()));
        })
    });
}

fn bench_sweep_listing(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let tmp = TempDir::new().unwrap();
    for i in 0..1000 {
        let name = format!("app_20240101_000000_{i}.log.gz");
        std::fs::write(tmp.path().join(name), b"x").unwrap();
    }
    let config = Arc::new(LogKeeperConfig::new(tmp.path().join("logs"), tmp.path(), "app.log"));
    let sweeper = RetentionSweeper::new(config);

    c.bench_function("list_archives_1000", |b| {
        b.iter(|| black_box(rt.block_on(list_archives(tmp.path(), "app")).unwrap()))
    });
    c.bench_function("sweep_nothing_expired_1000", |b| {
        b.iter(|| black_box(rt.block_on(sweeper.sweep())))
    });
}

criterion_group!(benches, bench_compress, bench_rotation, bench_sweep_listing);
criterion_main!(benches);
