pub const CACHE_FILE_NAME: &str = ".qdirstat.cache.gz";
pub const MAX_LINE_LEN: usize = 5000;
pub const MAX_FIELDS: usize = 32;
pub const MAX_ERROR_COUNT: u64 = 1000;
