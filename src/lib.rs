//! # sortstat
//!
//! An embeddable **external-merge sorter** and **index statistics
//! (`ANALYZE`)** engine for paged relational stores. Neither component
//! manages storage itself — both drive a narrow [`store::PagedStore`]
//! collaborator interface, so they plug into a host database's existing
//! pager/B-tree layer instead of owning their own file format.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Host engine                          │
//! │                                                               │
//! │   ┌──────────────┐          ┌──────────────────────────┐    │
//! │   │   Sorter     │ <------- │        Analyzer          │    │
//! │   │ (ext. merge) │  driven  │ (ANALYZE stat1 / stat4)   │    │
//! │   └──────┬───────┘   by     └──────────────┬────────────┘    │
//! │          │                                  │                 │
//! │          └──────────────┬───────────────────┘                 │
//! │                         │                                     │
//! │              ┌──────────▼──────────┐                          │
//! │              │ Comparator + PagedStore │  (narrow collaborator │
//! │              │   (caller-supplied)     │   boundary, §6.1)     │
//! │              └──────────┬──────────┘                          │
//! │                         │                                     │
//! │            ┌────────────▼────────────┐                        │
//! │            │ MemoryStore / FileStore │  reference impls       │
//! │            └─────────────────────────┘                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`comparator`] | Key ordering capability the sorter/analyzer never bypass |
//! | [`key`] | Reference index-key codec and comparator (the "VDBE glue" §1 excludes, supplied so the crate runs standalone) |
//! | [`store`] | The `PagedStore`/`StoreCursor` collaborator interface, plus `memory`/`file` reference implementations |
//! | [`sorter`] | External-merge sorter: spill, adaptive fan-in, stable N-way merge |
//! | [`analyzer`] | `ANALYZE`-style index statistics: stat1 summaries and stat4 sample histograms |
//!
//! ## Key Features
//!
//! - **Bounded working set** — the sorter never assumes the whole input
//!   fits in memory; it spills to runs in the collaborator store once the
//!   store itself reports its cache has overflowed.
//! - **Adaptive multi-way merge** — a tournament (winner) tree drives
//!   O(log N) comparisons per output row, with fan-in capped by the
//!   store's outstanding page-reference budget rather than a fixed count.
//! - **Stable sort** — equal keys always come back in their original
//!   insertion order, across spilled runs and merge passes alike.
//! - **Bounded-memory statistics** — the analyzer computes per-prefix
//!   distinct counts and a fixed-size sample reservoir in one forward
//!   pass over sorted input, never materializing the full index.
//! - **Collaborator-agnostic core** — the sorter and analyzer never touch
//!   a file descriptor or page directly; both reference implementations
//!   in [`store`] exist only to make this crate runnable and testable on
//!   its own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sortstat::comparator::BytewiseComparator;
//! use sortstat::sorter::{Sorter, SorterConfig};
//! use sortstat::store::memory::MemoryStore;
//!
//! let store = MemoryStore::default();
//! let comparator = BytewiseComparator;
//! let mut sorter = Sorter::open(&store, &comparator, SorterConfig::default()).unwrap();
//!
//! for key in [b"banana".as_slice(), b"apple", b"cherry"] {
//!     sorter.insert(key).unwrap();
//! }
//!
//! let mut eof = sorter.rewind().unwrap();
//! while !eof {
//!     println!("{:?}", sorter.current_key().unwrap());
//!     eof = sorter.next().unwrap();
//! }
//! ```

#![allow(dead_code)]

pub mod analyzer;
pub mod comparator;
pub mod key;
pub mod sorter;
pub mod store;
