//! # dwarfidea
//!
//! A read-only query engine for **DwarfIdea** databases: compact,
//! offline-distributable files mapping short binary keys (cellular network
//! identifiers, Wi-Fi BSSIDs) to approximate geographic coordinates with an
//! optional per-entry payload. Databases are produced by a separate offline
//! toolchain; this crate only reads them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Database                             │
//! │                                                             │
//! │  raw key ──► key map ──► index search ──► block decode      │
//! │                 │             │               │             │
//! │                 │             │     ┌─────────┴─────────┐   │
//! │                 │             │     │ FSE⁻¹ → ZRLT⁻¹ →  │   │
//! │                 │             │     │ SBRT⁻¹ → BWTS⁻¹   │   │
//! │                 │             │     └─────────┬─────────┘   │
//! │                 ▼             ▼               ▼             │
//! │           result cache   (mmap file)   per-block caches    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`db`] | Facade — open a file, look up keys, close |
//! | [`index`] | Binary search over the sorted block index |
//! | [`block`] | Segment decoding, key walk, coordinate reconstruction |
//! | [`fse`] | Finite State Entropy tables and dual-state decompression |
//! | [`transform`] | Inverse ZRLT / SBRT (rank) / BWTS block transforms |
//! | [`bitstream`] | Backward entropy-coder bit source and forward MSB reader |
//! | [`encoding`] | Varints, file cursor, big-endian key integers |
//! | [`keymap`] | Optional key-prefix remapping |
//! | [`cache`] | Bounded LRU maps for results and decoded blocks |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dwarfidea::{Database, DbConfig};
//!
//! let mut db = Database::open("cells.dwi", DbConfig::default())?;
//!
//! // A cellular database takes 10-byte keys: MCC, MNC, area, cell id.
//! let key = [0x00, 0xE4, 0x00, 0x02, 0x12, 0x34, 0x00, 0x00, 0x56, 0x78];
//! if let Some(result) = db.lookup(&key)? {
//!     println!(
//!         "({}, {}) ± {} m",
//!         result.coords.lat,
//!         result.coords.lon,
//!         db.max_dist_error()
//!     );
//! }
//!
//! db.close();
//! # Ok::<(), dwarfidea::DbError>(())
//! ```
//!
//! ## Guarantees
//!
//! - **Read-only:** the file is memory-mapped read-only and never written.
//! - **Bounded memory:** results and decoded block buffers live in LRU
//!   caches of configurable capacity; misses are cached too.
//! - **Degradation under corruption:** a block that fails to decode only
//!   makes its own keys unresolvable; the rest of the file stays usable.
//! - **Bounded error:** returned coordinates are within the header's
//!   `max_dist_error` meters (great-circle) of the stored position.

pub mod bitstream;
pub mod block;
pub mod cache;
pub mod db;
pub mod encoding;
pub mod fse;
pub mod index;
pub mod keymap;
pub mod transform;

pub use block::Coords;
pub use db::{Database, DbConfig, DbError, FormatError, LookupResult};
