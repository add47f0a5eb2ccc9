use std::fs;
use std::path::Path;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use dustat_core::cli::ScanConfig;
use dustat_core::node::{NodeId, SortColumn, SortOrder};
use dustat_filter::FilterSet;
use dustat_scan::mount::ProcMountsTable;
use dustat_scan::Scanner;

fn create_test_tree(root: &Path, depth: usize, breadth: usize) -> std::io::Result<()> {
    if depth == 0 {
        return Ok(());
    }
    for i in 0..breadth {
        let dir = root.join(format!("dir_{depth:03}_{i:03}"));
        fs::create_dir_all(&dir)?;
        for f in 0..breadth {
            fs::write(dir.join(format!("file_{f:03}.bin")), vec![0u8; 1024])?;
        }
        create_test_tree(&dir, depth - 1, breadth / 2)?;
    }
    Ok(())
}

fn scan_to_completion(root: &Path) -> (dustat_core::tree::Tree, NodeId) {
    let config = ScanConfig::default();
    let filters = FilterSet::new();
    let mut scanner = Scanner::new(config, filters, Box::new(ProcMountsTable::new()));
    let top = scanner.start(root).expect("scan starts");
    while !scanner.tick().expect("tick succeeds") {}
    (scanner.tree, top)
}

fn bench_scan(c: &mut Criterion) {
    let temp_dir = std::env::temp_dir().join("dustat_scan_bench");
    let _ = fs::remove_dir_all(&temp_dir);
    fs::create_dir_all(&temp_dir).unwrap();

    let mut group = c.benchmark_group("scan");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(20));

    for (depth, breadth) in &[(3, 4), (4, 3)] {
        let test_root = temp_dir.join(format!("test_d{depth}_b{breadth}"));
        fs::create_dir_all(&test_root).unwrap();
        create_test_tree(&test_root, *depth, *breadth).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(format!("d{depth}_b{breadth}")), &test_root, |b, root| {
            b.iter(|| black_box(scan_to_completion(root)))
        });
    }

    group.finish();
    let _ = fs::remove_dir_all(&temp_dir);
}

fn bench_sorted_children(c: &mut Criterion) {
    let temp_dir = std::env::temp_dir().join("dustat_sort_bench");
    let _ = fs::remove_dir_all(&temp_dir);
    fs::create_dir_all(&temp_dir).unwrap();
    create_test_tree(&temp_dir, 2, 40).unwrap();
    let (mut tree, root) = scan_to_completion(&temp_dir);

    let mut group = c.benchmark_group("sorted_children");
    group.bench_function("size_descending", |b| {
        b.iter(|| {
            black_box(tree.sorted_children(root, SortColumn::Size, SortOrder::Descending));
        })
    });
    group.finish();
    let _ = fs::remove_dir_all(&temp_dir);
}

criterion_group!(benches, bench_scan, bench_sorted_children);
criterion_main!(benches);
