use std::path::PathBuf;

use clap::Parser;

// ============================================================================
// Output Format Options
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Tree,
    Json,
    Png,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tree" | "ascii" => Ok(OutputFormat::Tree),
            "json" => Ok(OutputFormat::Json),
            "png" | "treemap" => Ok(OutputFormat::Png),
            other => Err(format!("unknown format: {other}")),
        }
    }
}

// ============================================================================
// Color Mode Options
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl std::str::FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ColorMode::Auto),
            "always" => Ok(ColorMode::Always),
            "never" => Ok(ColorMode::Never),
            other => Err(format!("unknown color mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    Squarified,
    SliceAndDice,
}

impl std::str::FromStr for LayoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "squarified" | "squarify" => Ok(LayoutMode::Squarified),
            "slice" | "slice-and-dice" | "slicedice" => Ok(LayoutMode::SliceAndDice),
            other => Err(format!("unknown layout mode: {other}")),
        }
    }
}

/// dustat - a disk-usage analyzer with a persistent scan cache and a
/// squarified treemap renderer.
#[derive(Parser, Debug)]
#[command(name = "dustat")]
#[command(about = "Scan a directory tree, cache the result, and render a treemap")]
pub struct Args {
    /// Directory to scan (defaults to the current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Force a full rescan, ignoring any `.qdirstat.cache.gz` found along the way
    #[arg(short, long)]
    pub force: bool,

    // ========================================================================
    // Cache options
    // ========================================================================
    /// Write the scan result to this cache file path instead of the default
    #[arg(long)]
    pub cache_file: Option<PathBuf>,

    /// Disable cache writing entirely
    #[arg(long)]
    pub no_cache: bool,

    /// Read a cache file directly instead of scanning the filesystem
    #[arg(long)]
    pub read_cache: Option<PathBuf>,

    // ========================================================================
    // Output & display options
    // ========================================================================
    /// Suppress tree output (useful when only writing a cache or a treemap)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format: tree, json, or png
    #[arg(long, default_value = "tree")]
    pub format: OutputFormat,

    /// Color output: auto, always, never
    #[arg(long, default_value = "auto")]
    pub color: ColorMode,

    /// Where to write the treemap PNG (only used with `--format png`)
    #[arg(long, default_value = "treemap.png")]
    pub png_out: PathBuf,

    /// Treemap image width in pixels
    #[arg(long, default_value_t = 1024)]
    pub png_width: u32,

    /// Treemap image height in pixels
    #[arg(long, default_value_t = 768)]
    pub png_height: u32,

    // ========================================================================
    // Filtering & traversal options
    // ========================================================================
    /// Cross filesystem (mount point) boundaries while scanning
    #[arg(long)]
    pub cross_filesystems: bool,

    /// Treat hard-linked files at their full size rather than size / links
    #[arg(long)]
    pub ignore_hard_links: bool,

    /// Exclude paths matching this wildcard/regex pattern (repeatable)
    #[arg(long = "exclude")]
    pub exclude_patterns: Vec<String>,

    /// Ignore files matching this suffix/wildcard pattern, e.g. `*.tmp` (repeatable)
    #[arg(long = "ignore")]
    pub ignore_patterns: Vec<String>,

    // ========================================================================
    // Treemap options
    // ========================================================================
    /// Layout algorithm: squarified or slice-and-dice
    #[arg(long, default_value = "squarified")]
    pub layout: LayoutMode,

    /// Ambient light intensity in [0, 1] for cushion shading
    #[arg(long, default_value_t = 0.5)]
    pub ambient_light: f64,

    // ========================================================================
    // Diagnostics
    // ========================================================================
    /// Display summary statistics (item counts, timing, cache location)
    #[arg(long)]
    pub stats: bool,
}

pub fn parse_args() -> Args {
    Args::parse()
}

/// Every scan/layout tunable named in the spec, separated from [`Args`] so
/// library callers can construct one directly without going through clap.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub cross_filesystems: bool,
    pub ignore_hard_links: bool,
    pub exclude_patterns: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub squarified: bool,
    pub min_tile_size: f64,
    pub min_squarified_tile_height: f64,
    pub cushion_height: f64,
    pub cushion_height_scale: f64,
    pub ambient_light: f64,
    pub render_tile_threshold_squarified: f64,
    pub render_tile_threshold_slice_dice: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            cross_filesystems: false,
            ignore_hard_links: false,
            exclude_patterns: Vec::new(),
            ignore_patterns: Vec::new(),
            squarified: true,
            min_tile_size: 1.0,
            min_squarified_tile_height: 3.0,
            cushion_height: 0.5,
            cushion_height_scale: 0.75,
            ambient_light: 0.5,
            render_tile_threshold_squarified: 6.0,
            render_tile_threshold_slice_dice: 4.0,
        }
    }
}

impl From<&Args> for ScanConfig {
    fn from(args: &Args) -> Self {
        ScanConfig {
            cross_filesystems: args.cross_filesystems,
            ignore_hard_links: args.ignore_hard_links,
            exclude_patterns: args.exclude_patterns.clone(),
            ignore_patterns: args.ignore_patterns.clone(),
            squarified: args.layout == LayoutMode::Squarified,
            ambient_light: args.ambient_light,
            ..ScanConfig::default()
        }
    }
}
