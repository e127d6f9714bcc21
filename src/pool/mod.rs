//! Resource pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Worker processing a connection
//!     → readers.acquire() (scratch reader, held for the connection's lifetime)
//!     → buffers.acquire() (handler body, then composed response)
//!     → guard dropped after the socket write → object back to its pool
//! ```
//!
//! # Design Decisions
//! - One pool per resource type; no runtime type checks
//! - Release is tied to `Drop` of the borrow guard, so a composed response
//!   cannot return to the pool while its bytes are still being written
//! - Objects are reset on acquire, so every borrower starts from empty

pub mod object_pool;
pub mod scratch;

use std::sync::Arc;

use bytes::BytesMut;

use crate::config::PoolConfig;

pub use object_pool::{Pool, Pooled, Reusable};
pub use scratch::ScratchReader;

const BUFFER_CAPACITY: usize = 1024;
const READER_CAPACITY: usize = 2048;

/// The process-wide pools shared by all workers.
#[derive(Debug, Clone)]
pub struct Pools {
    /// Response-assembly buffers.
    pub buffers: Arc<Pool<BytesMut>>,
    /// Request-decode scratch readers.
    pub readers: Arc<Pool<ScratchReader>>,
}

impl Pools {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            buffers: Pool::new(config.max_idle, || BytesMut::with_capacity(BUFFER_CAPACITY)),
            readers: Pool::new(config.max_idle, || ScratchReader::with_capacity(READER_CAPACITY)),
        }
    }
}

impl Default for Pools {
    fn default() -> Self {
        Self::new(&PoolConfig::default())
    }
}
