// dataslot - Storing data on objects by allocated slot ID
// Lets unrelated code attach data to a shared object without knowing about each other

#![warn(rust_2018_idioms)]

//! # Architecture
//!
//! ```text
//! SlotAllocator (shared, locked)
//!   └─→ table: [0, 1, -, 3]      ← "-" is a freed identifier, reused first-fit
//!
//! SlotList (one per object, unlocked)
//!   └─→ [ (v0, d0) | (-, -) | - | (v3, d3) ]
//! ```
//!
//! A feature allocates one [`SlotId`] at startup and stores its per-object data in each object's
//! [`SlotList`] under that identifier. Freeing the identifier does not touch any list; stored
//! data lives until the list is destroyed or the slot is overwritten.

pub mod allocator;
pub mod config;
pub mod list;
pub mod slot;

// Re-exports for convenience
pub use allocator::{AllocatorStats, SlotAllocator};
pub use config::SlotConfig;
pub use list::{Destructor, Replaced, SlotList};
pub use slot::SlotId;

/// dataslot error types
///
/// Only resource exhaustion and configuration problems are errors. Passing an identifier that
/// was not allocated from the given allocator is a bug in the caller and panics.
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Out of memory: {0}")]
        OutOfMemory(String),

        #[error("Capacity exceeded: {what} is limited to {limit} slots")]
        CapacityExceeded { what: &'static str, limit: usize },

        #[error("Config error: {0}")]
        Config(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
