mod error;
mod segment;
mod heap;
mod gc;

pub use error::HeapError;
pub use segment::{Body, HeapObject};
pub use heap::{Heap, HeapSettings, HeapStats, content_hash};
pub use gc::{GcCycle, RootProvider};

// ── Tests ─────────────────────────────────────────────────────────────
