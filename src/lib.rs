//! # nexus-hive
//!
//! A bucketed sequence container with O(1) amortized insertion, O(1)
//! erasure, and stable element positions, built on jump-counting
//! skipfields.
//!
//! ## Design Philosophy
//!
//! Elements live in a chain of fixed-capacity blocks; each block pairs
//! its slot array with a skipfield (a run-length index of erased slots)
//! in one allocation. Iteration reads only the skipfield and block links,
//! jumping any run of holes in constant time; element storage is never
//! inspected to decide a step. Erased slots double as free-list nodes, so
//! reuse costs no extra memory.
//!
//! Pointers and cursors to live elements stay valid across insertions and
//! unrelated erasures: nothing ever reallocates or shifts. This suits
//! long-lived object graphs (particle systems, component stores, task
//! tables) where handles are retained while inserts and random erasures
//! interleave.
//!
//! ## Insertion Priority
//!
//! 1. **Reuse** an erased slot (LIFO per block, most recently erased
//!    block first)
//! 2. **Bump** into the end block's trailing capacity (sequential,
//!    cache-friendly)
//! 3. **Recycle** a parked empty block
//! 4. **Grow** a new block of capacity `min(len, max)`: geometric
//!    growth, bounded by the configured limits
//!
//! ## Example
//!
//! ```rust
//! use nexus_hive::Hive;
//!
//! let mut h: Hive<i32> = Hive::new();
//! let c = h.insert(1);
//! h.insert(2);
//! h.insert(3);
//!
//! // Erase through a cursor; remaining elements keep their positions.
//! unsafe { h.erase(c) };
//! assert_eq!(h.len(), 2);
//! assert_eq!(h.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
//!
//! // The erased slot is reused by the next insertion.
//! h.insert(4);
//! assert_eq!(h.iter().copied().sum::<i32>(), 9);
//! ```
//!
//! ## Skipfield Width
//!
//! The second type parameter selects the skipfield integer: `u16` (the
//! default) allows blocks of up to 65535 elements; `u8` halves the index
//! overhead and caps blocks at 255 elements:
//!
//! ```rust
//! use nexus_hive::Hive;
//!
//! let mut small: Hive<u64, u8> = Hive::new();
//! small.insert(1);
//! ```

#![warn(missing_docs)]

mod block;
mod cursor;
mod hive;
mod index;
mod iter;

pub use cursor::Cursor;
pub use hive::{Hive, Limits, LimitsError, SpliceError};
pub use index::SkipIndex;
pub use iter::{IntoIter, Iter, IterMut};
