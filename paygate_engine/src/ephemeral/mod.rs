//! In-process implementations of the ephemeral stores, backed by `moka` caches.
//!
//! Each key is updated atomically through moka's per-key compute API, so concurrent requests for the same user or
//! session never interleave inside a single store call.
mod cart_store;
mod session_store;

pub use cart_store::MemoryCartStore;
pub use session_store::MemorySessionStore;
