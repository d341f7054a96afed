//! Buffer pool: page caching with pluggable victim policies.
//!
//! The pool owns a fixed arena of frames and keeps exactly one in-memory
//! copy of every cached page. Access goes through RAII guards that pin the
//! page for the guard's lifetime:
//!
//! ```no_run
//! use std::sync::Arc;
//! use quarry::storage::{BufferPool, MemIo, PageId, ReplacerConfig};
//!
//! let disk = Arc::new(MemIo::new(8192));
//! let pool = BufferPool::new(disk, 64, ReplacerConfig::Clock.build(64));
//!
//! let mut guard = pool.new_page().unwrap();
//! let pid = guard.page_id();
//! guard.data_mut()[0..5].copy_from_slice(b"hello");
//! guard.mark_dirty();
//! drop(guard); // unpins; the dirty bit sticks until flushed
//!
//! let guard = pool.fetch_page(pid).unwrap();
//! assert_eq!(&guard.data()[0..5], b"hello");
//! ```

mod arena;
mod error;
mod frame;
mod guard;
mod pool;
mod replacer;

pub use error::BufferPoolError;
pub use frame::FrameId;
pub use guard::{PageReadGuard, PageWriteGuard};
pub use pool::{BufferPool, BufferStats, FlushCallback};
pub use replacer::{ClockReplacer, LruKReplacer, Replacer, ReplacerConfig};
