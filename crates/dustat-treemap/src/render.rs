//! Cushion rasterization (§4.9, §5): walks a [`Tile`] tree and paints pixel
//! colors into an RGB buffer, splitting work across a `rayon::ThreadPool`
//! sized `2 * num_cpus` the way `ptree-traversal` sizes its scan pool
//! (`traversal.rs`), then encodes the result as PNG via the `image` crate.

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use dustat_core::cli::ScanConfig;
use dustat_core::error::{DustatError, DustatResult};
use dustat_scan::collaborators::Categorizer;

use crate::cushion::LightSource;
use crate::layout::Tile;

const CANCEL_NONE: u8 = 0;
const CANCEL_REQUESTED: u8 = 1;
const CANCEL_RESTART: u8 = 2;

/// Tri-state cancellation token for an in-flight render (§5): a plain
/// "cancel" drops the frame, "restart" means a new render should begin as
/// soon as this one unwinds (covers a resize arriving mid-render).
#[derive(Default)]
pub struct RenderCancelToken(AtomicU8);

impl RenderCancelToken {
    pub fn new() -> Self {
        RenderCancelToken(AtomicU8::new(CANCEL_NONE))
    }

    pub fn cancel(&self) {
        self.0.store(CANCEL_REQUESTED, Ordering::SeqCst);
    }

    pub fn restart(&self) {
        self.0.store(CANCEL_RESTART, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(CANCEL_NONE, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst) != CANCEL_NONE
    }

    pub fn wants_restart(&self) -> bool {
        self.0.load(Ordering::SeqCst) == CANCEL_RESTART
    }
}

/// A rendered frame: flat RGB8 pixels, row-major, `width * height * 3` bytes.
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    fn blank(width: u32, height: u32) -> Self {
        Frame { width, height, pixels: vec![0u8; width as usize * height as usize * 3] }
    }

    fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels[idx..idx + 3].copy_from_slice(&rgb);
    }

    pub fn write_png(&self, path: &Path) -> DustatResult<()> {
        let image = image::RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| DustatError::Render("rendered buffer size mismatch".to_string()))?;
        image.save(path).map_err(|e| DustatError::Render(e.to_string()))?;
        Ok(())
    }
}

/// Parallel entry point: builds a `2 * num_cpus` pool (§5's render-plane
/// sizing) and paints `root` into a fresh `width x height` frame.
pub fn render(
    root: &Tile,
    width: u32,
    height: u32,
    config: &ScanConfig,
    categorizer: &dyn Categorizer,
    cancel: &RenderCancelToken,
) -> DustatResult<Frame> {
    let frame = Mutex::new(Frame::blank(width, height));
    let threads = (2 * num_cpus::get()).max(2);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| DustatError::Render(e.to_string()))?;

    let light = LightSource::new(config.ambient_light);
    pool.in_place_scope_fifo(|scope| {
        render_tile(scope, root, &frame, &light, config, categorizer, cancel);
    });

    if cancel.is_cancelled() {
        return Err(DustatError::Render("render cancelled".to_string()));
    }
    Ok(frame.into_inner().expect("render mutex not poisoned"))
}

/// `addRenderThread()` (§4.9, §5): spawns a fresh scope task per subtree
/// whose tile area clears the configured threshold, and whose children are
/// themselves worth splitting further; small subtrees paint inline on
/// whichever thread reaches them, avoiding a task per leaf tile.
fn render_tile<'scope>(
    scope: &rayon::ScopeFifo<'scope>,
    tile: &'scope Tile,
    frame: &'scope Mutex<Frame>,
    light: &'scope LightSource,
    config: &'scope ScanConfig,
    categorizer: &'scope dyn Categorizer,
    cancel: &'scope RenderCancelToken,
) {
    if cancel.is_cancelled() {
        return;
    }

    if tile.is_leaf {
        paint_leaf(tile, frame, light, categorizer);
        return;
    }

    let threshold = if config.squarified {
        config.render_tile_threshold_squarified
    } else {
        config.render_tile_threshold_slice_dice
    };
    let worth_splitting = tile.rect.w.min(tile.rect.h) >= threshold && tile.children.len() > 1;

    if worth_splitting {
        for child in &tile.children {
            scope.spawn_fifo(move |s| render_tile(s, child, frame, light, config, categorizer, cancel));
        }
    } else {
        for child in &tile.children {
            render_tile(scope, child, frame, light, config, categorizer, cancel);
        }
    }
}

fn paint_leaf(tile: &Tile, frame: &Mutex<Frame>, light: &LightSource, categorizer: &dyn Categorizer) {
    let category = categorizer.category(&tile.path);
    let base = hex_to_rgb(category.color);

    let x0 = tile.rect.x.floor().max(0.0) as u32;
    let y0 = tile.rect.y.floor().max(0.0) as u32;
    let x1 = (tile.rect.x + tile.rect.w).ceil().max(0.0) as u32;
    let y1 = (tile.rect.y + tile.rect.h).ceil().max(0.0) as u32;

    let mut guard = frame.lock().expect("render mutex not poisoned");
    for y in y0..y1 {
        for x in x0..x1 {
            let local_x = x as f64 - tile.rect.x;
            let local_y = y as f64 - tile.rect.y;
            let intensity = light.intensity_at(&tile.cushion, local_x, local_y);
            let rgb = shade(base, intensity);
            guard.set_pixel(x, y, rgb);
        }
    }
}

fn shade(base: [u8; 3], intensity: f64) -> [u8; 3] {
    let scale = intensity.clamp(0.0, 1.0);
    [
        (base[0] as f64 * scale).round() as u8,
        (base[1] as f64 * scale).round() as u8,
        (base[2] as f64 * scale).round() as u8,
    ]
}

/// Parses a `"#rrggbb"` category color (§6.4) into RGB bytes. Malformed
/// input falls back to mid-gray rather than panicking on a bad categorizer.
fn hex_to_rgb(hex: &str) -> [u8; 3] {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return [128, 128, 128];
    }
    let parse = |s: &str| u8::from_str_radix(s, 16).unwrap_or(128);
    [parse(&hex[0..2]), parse(&hex[2..4]), parse(&hex[4..6])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_to_rgb_parses_known_colors() {
        assert_eq!(hex_to_rgb("#dd5500"), [0xdd, 0x55, 0x00]);
        assert_eq!(hex_to_rgb("bad"), [128, 128, 128]);
    }

    #[test]
    fn cancel_token_starts_clear_and_reports_restart() {
        let token = RenderCancelToken::new();
        assert!(!token.is_cancelled());
        token.restart();
        assert!(token.wants_restart());
        token.clear();
        assert!(!token.wants_restart());
    }

    #[test]
    fn shade_scales_each_channel_by_intensity() {
        assert_eq!(shade([200, 100, 50], 0.5), [100, 50, 25]);
        assert_eq!(shade([200, 100, 50], 1.0), [200, 100, 50]);
    }
}
