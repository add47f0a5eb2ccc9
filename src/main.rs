use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use colored::Colorize;

use dustat_core::cli::{parse_args, Args, ColorMode, OutputFormat, ScanConfig};
use dustat_core::format::human_size;
use dustat_core::node::NodeId;
use dustat_core::tree::Tree;
use dustat_filter::{ExcludeKind, ExcludeRule, FilterSet, IgnoreFilter, PatternFilter};
use dustat_scan::collaborators::ExtensionCategorizer;
use dustat_scan::mount::ProcMountsTable;
use dustat_scan::Scanner;

fn main() -> Result<()> {
    env_logger::init();
    let program_start = Instant::now();
    let args = parse_args();

    let use_colors = match args.color {
        ColorMode::Auto => atty::is(atty::Stream::Stdout),
        ColorMode::Always => true,
        ColorMode::Never => false,
    };

    let config = ScanConfig::from(&args);
    let filters = build_filter_set(&args)?;

    let scan_start = Instant::now();
    let mut scanner = Scanner::new(config.clone(), filters, Box::new(ProcMountsTable::new()));

    let root = if let Some(cache_path) = &args.read_cache {
        scanner.start_from_cache(cache_path).with_context(|| format!("reading cache {}", cache_path.display()))?;
        run_to_completion(&mut scanner);
        scanner.toplevel().context("cache file contained no toplevel entry")?
    } else {
        let top = scanner.start(&args.path).with_context(|| format!("scanning {}", args.path.display()))?;
        run_to_completion(&mut scanner);
        top
    };
    let scan_elapsed = scan_start.elapsed();

    scanner.tree.mark_dirty(root);
    scanner.tree.recalc(root);

    if !args.no_cache && args.read_cache.is_none() {
        let cache_path = args.cache_file.clone().unwrap_or_else(|| default_cache_path(&args.path));
        let start_path = std::fs::canonicalize(&args.path).unwrap_or_else(|_| args.path.clone());
        if let Err(e) = dustat_scan::write_cache(&scanner.tree, root, &start_path, &cache_path) {
            log::warn!("could not write cache to {}: {e}", cache_path.display());
        }
    }

    let render_start = Instant::now();
    if !args.quiet {
        match args.format {
            OutputFormat::Tree => {
                print_tree(&scanner.tree, root, use_colors);
            }
            OutputFormat::Json => {
                println!("{}", build_json(&scanner.tree, root));
            }
            OutputFormat::Png => {
                render_treemap(&mut scanner.tree, root, &args, &config)?;
            }
        }
    }
    let render_elapsed = render_start.elapsed();

    if args.stats {
        print_stats(&scanner.tree, root, scan_elapsed, render_elapsed, program_start.elapsed());
    }

    Ok(())
}

fn run_to_completion(scanner: &mut Scanner) {
    let mut guard: u64 = 0;
    loop {
        match scanner.tick() {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => {
                log::error!("scan step failed: {e}");
                scanner.abort();
                break;
            }
        }
        for event in scanner.drain_events() {
            log::trace!("scan event: {event:?}");
        }
        guard += 1;
        if guard % 100_000 == 0 {
            log::debug!("scan still running after {guard} ticks");
        }
    }
    for event in scanner.drain_events() {
        log::trace!("scan event: {event:?}");
    }
}

fn default_cache_path(scan_path: &Path) -> PathBuf {
    scan_path.join(dustat_cache::CACHE_FILE_NAME)
}

fn build_filter_set(args: &Args) -> Result<FilterSet> {
    let mut filters = FilterSet::new();
    for pattern in &args.exclude_patterns {
        let rule = ExcludeRule::new(ExcludeKind::Wildcard, pattern, true, false, false)
            .with_context(|| format!("invalid --exclude pattern {pattern:?}"))?;
        filters.exclude_rules.push(rule);
    }
    for pattern in &args.ignore_patterns {
        let pattern_filter =
            PatternFilter::new(pattern, true).with_context(|| format!("invalid --ignore pattern {pattern:?}"))?;
        filters.ignore_filters.push(IgnoreFilter::Pattern(pattern_filter));
    }
    Ok(filters)
}

// ============================================================================
// ASCII tree output
// ============================================================================

/// A listing's size column: a directory's subtree total, a file's
/// hard-link-divided size (mirrors `dustat_core::sort`'s own `size_of`).
fn entry_size(tree: &Tree, id: NodeId) -> u64 {
    let node = tree.get(id);
    if node.kind.is_dir() {
        node.dir().total_size
    } else {
        tree.size(id)
    }
}

fn print_tree(tree: &Tree, root: NodeId, use_colors: bool) {
    let node = tree.get(root);
    let header = format!("{} [{}]", node.name.to_string_lossy(), human_size(node.dir().total_size));
    println!("{}", if use_colors { header.blue().bold().to_string() } else { header });
    print_tree_children(tree, root, "", use_colors);
}

fn print_tree_children(tree: &Tree, dir: NodeId, prefix: &str, use_colors: bool) {
    let mut children: Vec<NodeId> = tree.children(dir).collect();
    if let Some(dot) = tree.get(dir).dir().dot_entry {
        children.extend(tree.children(dot));
    }
    children.sort_by(|a, b| {
        let sa = entry_size(tree, *a);
        let sb = entry_size(tree, *b);
        sb.cmp(&sa)
    });

    for (i, &child) in children.iter().enumerate() {
        let is_last = i + 1 == children.len();
        let branch = if is_last { "└── " } else { "├── " };
        let child_node = tree.get(child);
        let size = entry_size(tree, child);
        let label = format!("{} [{}]", child_node.name.to_string_lossy(), human_size(size));
        let line = if use_colors && child_node.kind.is_dir() {
            format!("{}{}{}", prefix, branch.cyan(), label.bright_blue())
        } else {
            format!("{prefix}{branch}{label}")
        };
        println!("{line}");

        if child_node.kind.is_dir() {
            let next_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
            print_tree_children(tree, child, &next_prefix, use_colors);
        }
    }
}

// ============================================================================
// JSON output
// ============================================================================

fn build_json(tree: &Tree, root: NodeId) -> String {
    let value = json_node(tree, root);
    serde_json::to_string_pretty(&value).expect("tree JSON is always serializable")
}

fn json_node(tree: &Tree, id: NodeId) -> serde_json::Value {
    let node = tree.get(id);
    let size = entry_size(tree, id);
    let mut value = serde_json::json!({
        "name": node.name.to_string_lossy(),
        "size": size,
        "is_dir": node.kind.is_dir(),
    });

    if node.kind.is_dir() {
        let mut children: Vec<NodeId> = tree.children(id).collect();
        if let Some(dot) = node.dir().dot_entry {
            children.extend(tree.children(dot));
        }
        let children_json: Vec<serde_json::Value> = children.iter().map(|c| json_node(tree, *c)).collect();
        value["children"] = serde_json::Value::Array(children_json);
    }

    value
}

// ============================================================================
// Treemap PNG output
// ============================================================================

fn render_treemap(tree: &mut Tree, root: NodeId, args: &Args, config: &ScanConfig) -> Result<()> {
    let rect = dustat_treemap::Rect::new(0.0, 0.0, args.png_width as f64, args.png_height as f64);
    let tile = dustat_treemap::build_treemap(tree, root, rect, config);

    let categorizer = ExtensionCategorizer::new();
    let cancel = dustat_treemap::RenderCancelToken::new();
    let frame = dustat_treemap::render(&tile, args.png_width, args.png_height, config, &categorizer, &cancel)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    frame.write_png(&args.png_out).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    println!("wrote treemap to {}", args.png_out.display());
    Ok(())
}

// ============================================================================
// Summary statistics
// ============================================================================

fn print_stats(tree: &Tree, root: NodeId, scan_elapsed: std::time::Duration, render_elapsed: std::time::Duration, total_elapsed: std::time::Duration) {
    let d = tree.get(root).dir();
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\n{}", "=".repeat(60));
    let _ = writeln!(stderr, "{:<28} {}", "Items scanned:", d.total_items);
    let _ = writeln!(stderr, "{:<28} {}", "Files:", d.total_files);
    let _ = writeln!(stderr, "{:<28} {}", "Subdirectories:", d.total_subdirs);
    let _ = writeln!(stderr, "{:<28} {}", "Total size:", human_size(d.total_size));
    let _ = writeln!(stderr, "{:<28} {}", "Scan time:", format_duration(scan_elapsed));
    let _ = writeln!(stderr, "{:<28} {}", "Output time:", format_duration(render_elapsed));
    let _ = writeln!(stderr, "{:<28} {}", "Total time:", format_duration(total_elapsed));
    let _ = writeln!(stderr, "{}", "=".repeat(60));
}

fn format_duration(duration: std::time::Duration) -> String {
    format!("{:.3} ms", duration.as_secs_f64() * 1000.0)
}
