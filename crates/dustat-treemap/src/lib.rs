//! Treemap layout and cushion rendering (§4.8, §4.9): turns a scanned
//! [`dustat_core::tree::Tree`] into a tile geometry tree and rasterizes it
//! to an RGB frame, the way QDirStat's `TreemapView`/`TreemapTile` pair
//! does, minus the Qt widget plumbing (out of scope; see SPEC_FULL.md §1).

pub mod cushion;
pub mod layout;
pub mod render;

pub use cushion::{CushionHeightSequence, CushionSurface, LightSource};
pub use layout::{build_treemap, Orientation, Rect, Tile};
pub use render::{render, Frame, RenderCancelToken};
