//! [`MemoryStore`] – SQLite-backed face, room, and object memory.
//!
//! # Storage layout
//!
//! | table | columns |
//! |---|---|
//! | `faces` | `name` TEXT PK, `created` TEXT, `updated` TEXT |
//! | `face_samples` | `id` INTEGER PK, `name` TEXT → faces, `encoding` BLOB, `added` TEXT |
//! | `rooms` | `name` TEXT PK, `features` BLOB, `updated` TEXT |
//! | `object_sightings` | `id` INTEGER PK, `class` TEXT, `x,y,w,h` REAL, `seen` TEXT |
//!
//! Encoding vectors are stored as little-endian f32 BLOBs (4 × N bytes).
//!
//! # Example
//!
//! ```rust
//! use soma_memory::{MemoryConfig, MemoryStore};
//!
//! let store = MemoryStore::open_in_memory(MemoryConfig::default()).unwrap();
//! store.register("Rocky", &[1.0, 0.0, 0.0]).unwrap();
//!
//! let hit = store.lookup(&[1.0, 0.0, 0.0]).unwrap();
//! assert_eq!(hit.unwrap().0, "Rocky");
//! ```

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use soma_types::{BoundingBox, SomaError};
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Matching thresholds and retention bounds.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Minimum cosine similarity for a face lookup to count as a match.
    pub face_match: f32,
    /// Similarity at which two encodings are considered the same person
    /// (the ambiguous-registration guard).
    pub face_collide: f32,
    /// Minimum cosine similarity for a room signature match.
    pub room_match: f32,
    /// Maximum stored encoding samples per identity (oldest evicted).
    pub max_samples_per_face: usize,
    /// Object-sighting rows retained per class (oldest evicted).
    pub object_retention: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            face_match: 0.6,
            face_collide: 0.92,
            room_match: 0.75,
            max_samples_per_face: 8,
            object_retention: 50,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Record types
// ─────────────────────────────────────────────────────────────────────────────

/// Public view of a registered identity (encodings stay in the store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub name: String,
    pub samples: usize,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// One remembered object sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSightingRecord {
    pub class: String,
    pub rect: BoundingBox,
    pub seen: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding serialisation + similarity
// ─────────────────────────────────────────────────────────────────────────────

fn encoding_to_bytes(encoding: &[f32]) -> Vec<u8> {
    encoding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_encoding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity between two equal-length vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` if either vector has zero norm
/// or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn storage(e: impl std::fmt::Display) -> SomaError {
    SomaError::Storage(e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed memory store.  Synchronous; callers under an async runtime
/// hold it behind a mutex with short critical sections.
pub struct MemoryStore {
    conn: Connection,
    cfg: MemoryConfig,
}

impl MemoryStore {
    /// Open (or create) a persistent database at `path`.
    pub fn open(path: &str, cfg: MemoryConfig) -> Result<Self, SomaError> {
        let conn = Connection::open(path).map_err(storage)?;
        let store = Self { conn, cfg };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory(cfg: MemoryConfig) -> Result<Self, SomaError> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        let store = Self { conn, cfg };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), SomaError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS faces (
                    name    TEXT NOT NULL PRIMARY KEY,
                    created TEXT NOT NULL,
                    updated TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS face_samples (
                    id       INTEGER PRIMARY KEY AUTOINCREMENT,
                    name     TEXT NOT NULL REFERENCES faces(name) ON DELETE CASCADE,
                    encoding BLOB NOT NULL,
                    added    TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS rooms (
                    name     TEXT NOT NULL PRIMARY KEY,
                    features BLOB NOT NULL,
                    updated  TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS object_sightings (
                    id    INTEGER PRIMARY KEY AUTOINCREMENT,
                    class TEXT NOT NULL,
                    x     REAL NOT NULL,
                    y     REAL NOT NULL,
                    w     REAL NOT NULL,
                    h     REAL NOT NULL,
                    seen  TEXT NOT NULL
                );",
            )
            .map_err(storage)
    }

    // ── Faces ────────────────────────────────────────────────────────────

    /// Register `encoding` under `name`, creating the identity or merging a
    /// new sample into an existing one.
    ///
    /// # Errors
    ///
    /// [`SomaError::DuplicateLowConfidence`] when the registration is
    /// ambiguous: the encoding matches none of the samples already filed
    /// under `name` (an existing identity is never silently overwritten
    /// with a different face), or it is near-identical to a *different*
    /// registered identity.  The store refuses to resolve either case on
    /// its own.
    pub fn register(&self, name: &str, encoding: &[f32]) -> Result<FaceRecord, SomaError> {
        if encoding.is_empty() {
            return Err(SomaError::invalid("face encoding must be non-empty"));
        }

        let samples = self.all_samples()?;
        let mut name_exists = false;
        let mut best_own: Option<f32> = None;
        let mut best_other: Option<(String, f32)> = None;
        for (sample_name, sample) in &samples {
            let sim = cosine_similarity(sample, encoding);
            if sample_name == name {
                name_exists = true;
                best_own = Some(best_own.map_or(sim, |b: f32| b.max(sim)));
            } else if best_other.as_ref().is_none_or(|(_, b)| sim > *b) {
                best_other = Some((sample_name.clone(), sim));
            }
        }

        let matches_own = best_own.unwrap_or(f32::MIN) >= self.cfg.face_match;

        // A known identity only accepts samples that actually match it.
        if name_exists && !matches_own {
            debug!(name, "distinct face under existing identity refused");
            return Err(SomaError::DuplicateLowConfidence {
                name: name.to_string(),
            });
        }

        // Ambiguity guard: looks like somebody else, and nothing like the
        // samples already filed under `name`.
        if let Some((other, sim)) = &best_other
            && *sim >= self.cfg.face_collide
            && !matches_own
        {
            debug!(name, other = %other, similarity = *sim, "ambiguous face registration refused");
            return Err(SomaError::DuplicateLowConfidence {
                name: name.to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO faces (name, created, updated) VALUES (?1, ?2, ?2)
                 ON CONFLICT(name) DO UPDATE SET updated = ?2",
                params![name, now],
            )
            .map_err(storage)?;

        // Skip samples that add no information over what is already stored.
        if best_own.unwrap_or(f32::MIN) < 0.995 {
            self.conn
                .execute(
                    "INSERT INTO face_samples (name, encoding, added) VALUES (?1, ?2, ?3)",
                    params![name, encoding_to_bytes(encoding), now],
                )
                .map_err(storage)?;
            self.conn
                .execute(
                    "DELETE FROM face_samples WHERE name = ?1 AND id NOT IN (
                        SELECT id FROM face_samples WHERE name = ?1
                        ORDER BY id DESC LIMIT ?2
                    )",
                    params![name, self.cfg.max_samples_per_face as i64],
                )
                .map_err(storage)?;
        }

        self.face(name)?
            .ok_or_else(|| SomaError::Storage(format!("face '{name}' vanished after insert")))
    }

    /// Best identity match for `encoding`, or `None` below the threshold.
    pub fn lookup(&self, encoding: &[f32]) -> Result<Option<(String, f32)>, SomaError> {
        if encoding.is_empty() {
            return Ok(None);
        }
        let mut best: Option<(String, f32)> = None;
        for (name, sample) in self.all_samples()? {
            let sim = cosine_similarity(&sample, encoding);
            if best.as_ref().is_none_or(|(_, b)| sim > *b) {
                best = Some((name, sim));
            }
        }
        Ok(best.filter(|(_, sim)| *sim >= self.cfg.face_match))
    }

    /// All registered identities, alphabetically.
    pub fn faces(&self) -> Result<Vec<FaceRecord>, SomaError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT f.name, f.created, f.updated, COUNT(s.id)
                 FROM faces f LEFT JOIN face_samples s ON s.name = f.name
                 GROUP BY f.name ORDER BY f.name ASC",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(storage)?;

        let mut records = Vec::new();
        for row in rows {
            let (name, created, updated, samples) = row.map_err(storage)?;
            records.push(FaceRecord {
                name,
                samples: samples as usize,
                created: parse_ts(&created)?,
                updated: parse_ts(&updated)?,
            });
        }
        Ok(records)
    }

    /// Single identity by name.
    pub fn face(&self, name: &str) -> Result<Option<FaceRecord>, SomaError> {
        Ok(self.faces()?.into_iter().find(|r| r.name == name))
    }

    /// Remove an identity and its samples.  Returns `true` when it existed.
    pub fn forget(&self, name: &str) -> Result<bool, SomaError> {
        self.conn
            .execute("DELETE FROM face_samples WHERE name = ?1", params![name])
            .map_err(storage)?;
        let removed = self
            .conn
            .execute("DELETE FROM faces WHERE name = ?1", params![name])
            .map_err(storage)?;
        Ok(removed > 0)
    }

    fn all_samples(&self) -> Result<Vec<(String, Vec<f32>)>, SomaError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, encoding FROM face_samples ORDER BY id ASC")
            .map_err(storage)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(storage)?;
        let mut samples = Vec::new();
        for row in rows {
            let (name, blob) = row.map_err(storage)?;
            samples.push((name, bytes_to_encoding(&blob)));
        }
        Ok(samples)
    }

    // ── Rooms ────────────────────────────────────────────────────────────

    /// Store (or replace) the visual signature of a named room.
    pub fn upsert_room(&self, name: &str, features: &[f32]) -> Result<(), SomaError> {
        if features.is_empty() {
            return Err(SomaError::invalid("room features must be non-empty"));
        }
        self.conn
            .execute(
                "INSERT INTO rooms (name, features, updated) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET features = ?2, updated = ?3",
                params![name, encoding_to_bytes(features), Utc::now().to_rfc3339()],
            )
            .map_err(storage)?;
        Ok(())
    }

    /// Nearest-neighbour room match for live scene features.
    pub fn match_room(&self, features: &[f32]) -> Result<Option<(String, f32)>, SomaError> {
        if features.is_empty() {
            return Ok(None);
        }
        let mut stmt = self
            .conn
            .prepare("SELECT name, features FROM rooms")
            .map_err(storage)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(storage)?;

        let mut best: Option<(String, f32)> = None;
        for row in rows {
            let (name, blob) = row.map_err(storage)?;
            let sim = cosine_similarity(&bytes_to_encoding(&blob), features);
            if best.as_ref().is_none_or(|(_, b)| sim > *b) {
                best = Some((name, sim));
            }
        }
        Ok(best.filter(|(_, sim)| *sim >= self.cfg.room_match))
    }

    // ── Object sightings ─────────────────────────────────────────────────

    /// Append an object sighting, evicting the oldest rows beyond the
    /// per-class retention bound.
    pub fn record_object_sighting(
        &self,
        class: &str,
        rect: BoundingBox,
        seen: DateTime<Utc>,
    ) -> Result<(), SomaError> {
        self.conn
            .execute(
                "INSERT INTO object_sightings (class, x, y, w, h, seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![class, rect.x, rect.y, rect.w, rect.h, seen.to_rfc3339()],
            )
            .map_err(storage)?;
        self.conn
            .execute(
                "DELETE FROM object_sightings WHERE class = ?1 AND id NOT IN (
                    SELECT id FROM object_sightings WHERE class = ?1
                    ORDER BY id DESC LIMIT ?2
                )",
                params![class, self.cfg.object_retention as i64],
            )
            .map_err(storage)?;
        Ok(())
    }

    /// Recent sightings of `class`, newest first.
    pub fn object_history(
        &self,
        class: &str,
        limit: usize,
    ) -> Result<Vec<ObjectSightingRecord>, SomaError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT class, x, y, w, h, seen FROM object_sightings
                 WHERE class = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map(params![class, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(storage)?;

        let mut records = Vec::new();
        for row in rows {
            let (class, x, y, w, h, seen) = row.map_err(storage)?;
            records.push(ObjectSightingRecord {
                class,
                rect: BoundingBox {
                    x: x as f32,
                    y: y as f32,
                    w: w as f32,
                    h: h as f32,
                },
                seen: parse_ts(&seen)?,
            });
        }
        Ok(records)
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, SomaError> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| SomaError::Storage(format!("bad timestamp '{raw}': {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
