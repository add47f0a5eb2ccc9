pub mod cli;
pub mod error;
pub mod fileset;
pub mod format;
pub mod node;
pub mod sort;
pub mod tree;

pub use cli::{parse_args, Args, ColorMode, LayoutMode, OutputFormat, ScanConfig};
pub use error::{DustatError, DustatResult};
pub use fileset::FileInfoSet;
pub use node::{DirData, Node, NodeId, NodeKind, ReadState, SortColumn, SortOrder};
pub use tree::Tree;
