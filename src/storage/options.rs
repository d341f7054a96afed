//! Runtime configuration for the storage layer.

use super::page::{DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};

/// Storage configuration, filled by whoever parses the outer config.
///
/// All fields have defaults that allow zero-configuration startup;
/// [`validate`](Self::validate) only performs quick sanity checks.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Page size in bytes. Must fit the u16 offsets used inside pages.
    pub page_size: usize,
    /// Number of buffer pool frames.
    pub buffer_pool_frames: usize,
    /// Victim policy selection: `"clock"`, `"lruk"`, or `"lruk:k=N"`.
    pub replacer: String,
    /// Ascending free-space bucket thresholds in bytes.
    pub fsm_thresholds: Vec<u32>,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_frames: 256,
            replacer: "clock".to_string(),
            fsm_thresholds: vec![128, 512, 1024, 2048, 4096, 8192],
        }
    }
}

impl StorageOptions {
    /// Quick sanity check; detailed validation happens where values are used.
    pub fn validate(&self) -> bool {
        if self.page_size < MIN_PAGE_SIZE || self.page_size > (u16::MAX as usize + 1) {
            return false;
        }
        if self.buffer_pool_frames == 0 {
            return false;
        }
        if self.fsm_thresholds.is_empty() {
            return false;
        }
        true
    }
}
