pub mod exclude;
pub mod ignore;
pub mod set;
pub mod wildcard;

pub use exclude::{ExcludeKind, ExcludeRule};
pub use ignore::{IgnoreFilter, PackageFilter, PatternFilter};
pub use set::FilterSet;
pub use wildcard::{suffix_fast_path, wildcard_to_regex};
