//! # flalloc - A Free-List Memory Allocator Library
//!
//! This crate provides a **free-list allocator**: a single growable region,
//! obtained from `sbrk(2)` (or from a bounded in-process arena), carved into
//! variable-size blocks that are reused, split and coalesced.
//!
//! ## Overview
//!
//! Every block carries an in-band header, and the blocks form a singly
//! linked list in address order:
//!
//! ```text
//!   Managed region:
//!
//!   ┌──────┬─────────┬──────┬──────────────┬──────┬──────┬──────┬───────┐
//!   │ hdr  │  used   │ hdr  │     free     │ hdr  │ used │ hdr  │ free  │
//!   └──────┴─────────┴──────┴──────────────┴──────┴──────┴──────┴───────┘
//!   ▲  │              ▲  │                  ▲  │          ▲             ▲
//!   │  └──── next ────┘  └────── next ──────┘  └── next ──┘             │
//!  head                                                         end of region
//! ```
//!
//! An allocation searches the list for a free block with one of four fit
//! policies, grows the region when nothing fits, and splits off the unused
//! tail of oversized blocks. A release marks the block free and merges it
//! with free neighbours.
//!
//! ## Crate Structure
//!
//! ```text
//!   flalloc
//!   ├── align      - 4-byte size rounding (align!, checked_align)
//!   ├── block      - In-band header layout and payload handles
//!   ├── config     - Per-heap configuration
//!   ├── error      - HeapError
//!   ├── ffi        - malloc/free/calloc/realloc over sbrk (unix)
//!   ├── fit        - First, best, worst and next fit search
//!   ├── heap       - The allocation engine
//!   ├── source     - Region providers (ArenaSource, SbrkSource)
//!   └── stats      - Counters and the exit-time report
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use flalloc::{ArenaSource, Heap};
//!
//! let mut heap = Heap::new(ArenaSource::new(4096));
//!
//! let payload = heap.allocate(12).unwrap();
//! heap.bytes_mut(payload).unwrap()[..5].copy_from_slice(b"hello");
//!
//! let payload = heap.resize(Some(payload), 64).unwrap();
//! assert_eq!(&heap.bytes(payload).unwrap()[..5], b"hello");
//!
//! heap.release(Some(payload));
//! println!("{}", heap.stats());
//! ```
//!
//! ## Splitting and Coalescing
//!
//! ```text
//!   Split (request 16 from a free 96-byte block):
//!
//!   ┌─────┬──────────────────────────┐       ┌─────┬──────┬─────┬────────┐
//!   │ hdr │         96 free          │  ──▶  │ hdr │16 use│ hdr │56 free │
//!   └─────┴──────────────────────────┘       └─────┴──────┴─────┴────────┘
//!
//!   Coalesce (release B while A and C are free):
//!
//!   ┌─────┬──────┬─────┬──────┬─────┬──────┐       ┌─────┬──────────────────────┐
//!   │ hdr │A free│ hdr │B used│ hdr │C free│  ──▶  │ hdr │       one free       │
//!   └─────┴──────┴─────┴──────┴─────┴──────┘       └─────┴──────────────────────┘
//! ```
//!
//! A remainder is only split off when it can hold a header plus 4 bytes.
//! Release merges forward (with the successor) first, then backward (into the
//! predecessor, found by scanning from the head).
//!
//! ## Features
//!
//! - `first-fit` (default), `best-fit`, `worst-fit`, `next-fit`: the policy
//!   used by [`HeapConfig::default`]
//! - `malloc-abi`: export [`ffi`]'s functions as the C allocator
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Never shrinks**: Memory is not returned to the OS
//! - **4-byte alignment**: Payloads are not aligned any further
//! - **No corruption checks**: Beyond bounds checks and double-release detection

pub mod align;
mod block;
mod config;
mod error;
#[cfg(unix)]
pub mod ffi;
mod fit;
mod heap;
mod source;
mod stats;

pub use block::{HEADER_SIZE, MIN_PAYLOAD, Payload};
pub use config::HeapConfig;
pub use error::{HeapError, Result};
pub use fit::{FitPolicy, ParsePolicyError};
pub use heap::{BlockInfo, Heap};
#[cfg(unix)]
pub use source::{SbrkSource, program_break};
pub use source::{ArenaSource, HeapSource};
pub use stats::HeapStats;
