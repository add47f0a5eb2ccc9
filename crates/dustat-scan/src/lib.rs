pub mod collaborators;
pub mod events;
pub mod job;
pub mod local;
pub mod mount;
pub mod pkg;
pub mod scanner;
pub mod unix_stat;

pub use collaborators::{Categorizer, Category, ExtensionCategorizer, InstalledPackage, NullPackageManager, PackageManager};
pub use events::ScanEvent;
pub use job::{CacheFileReader, Job, JobQueue};
pub use local::run_local_dir_job;
pub use mount::{is_system_mount, should_cross, MountPointInfo, MountPointTable, ProcMountsTable};
pub use pkg::scan_packages;
pub use scanner::{write_cache, Scanner};
