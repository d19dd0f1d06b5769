//! `soma-memory` – durable identity and spatial memory.
//!
//! Backed by a local SQLite database.  Three concerns share one store:
//!
//! - **Faces** – named identities with one or more encoding vectors, matched
//!   by cosine similarity, guarded against ambiguous registration.
//! - **Rooms** – named visual signatures matched by nearest neighbour.
//! - **Object sightings** – a bounded per-class history (oldest evicted).
//!
//! All writes are committed before the call returns, so a crash loses at
//! most the in-flight perception cycle, never committed memory.

pub mod store;

pub use store::{FaceRecord, MemoryConfig, MemoryStore, ObjectSightingRecord, cosine_similarity};
