use std::fs;
use std::path::Path;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use dustat_core::cli::ScanConfig;
use dustat_filter::FilterSet;
use dustat_scan::collaborators::ExtensionCategorizer;
use dustat_scan::mount::ProcMountsTable;
use dustat_scan::Scanner;
use dustat_treemap::{build_treemap, render, Rect, RenderCancelToken};

fn create_test_tree(root: &Path, depth: usize, breadth: usize) -> std::io::Result<()> {
    if depth == 0 {
        return Ok(());
    }
    for i in 0..breadth {
        let dir = root.join(format!("dir_{depth:03}_{i:03}"));
        fs::create_dir_all(&dir)?;
        for f in 0..breadth {
            fs::write(dir.join(format!("file_{f:03}.txt")), vec![0u8; 4096 * (f + 1)])?;
        }
        create_test_tree(&dir, depth - 1, breadth / 2)?;
    }
    Ok(())
}

fn bench_layout(c: &mut Criterion) {
    let temp_dir = std::env::temp_dir().join("dustat_treemap_bench");
    let _ = fs::remove_dir_all(&temp_dir);
    fs::create_dir_all(&temp_dir).unwrap();
    create_test_tree(&temp_dir, 4, 4).unwrap();

    let config = ScanConfig::default();
    let filters = FilterSet::new();
    let mut scanner = Scanner::new(config.clone(), filters, Box::new(ProcMountsTable::new()));
    let root = scanner.start(&temp_dir).expect("scan starts");
    while !scanner.tick().expect("tick succeeds") {}

    let mut group = c.benchmark_group("treemap_layout");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(15));

    let rect = Rect::new(0.0, 0.0, 1024.0, 768.0);
    group.bench_function(BenchmarkId::from_parameter("squarified_1024x768"), |b| {
        b.iter(|| black_box(build_treemap(&mut scanner.tree, root, rect, &config)))
    });

    group.finish();
    let _ = fs::remove_dir_all(&temp_dir);
}

fn bench_render(c: &mut Criterion) {
    let temp_dir = std::env::temp_dir().join("dustat_render_bench");
    let _ = fs::remove_dir_all(&temp_dir);
    fs::create_dir_all(&temp_dir).unwrap();
    create_test_tree(&temp_dir, 3, 5).unwrap();

    let config = ScanConfig::default();
    let filters = FilterSet::new();
    let mut scanner = Scanner::new(config.clone(), filters, Box::new(ProcMountsTable::new()));
    let root = scanner.start(&temp_dir).expect("scan starts");
    while !scanner.tick().expect("tick succeeds") {}

    let rect = Rect::new(0.0, 0.0, 800.0, 600.0);
    let tile = build_treemap(&mut scanner.tree, root, rect, &config);
    let categorizer = ExtensionCategorizer::new();
    let cancel = RenderCancelToken::new();

    let mut group = c.benchmark_group("treemap_render");
    group.sample_size(10);
    group.bench_function("800x600", |b| {
        b.iter(|| black_box(render(&tile, 800, 600, &config, &categorizer, &cancel).unwrap()))
    });
    group.finish();
    let _ = fs::remove_dir_all(&temp_dir);
}

criterion_group!(benches, bench_layout, bench_render);
criterion_main!(benches);
