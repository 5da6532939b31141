use thiserror::Error;

/// Failures detected by the allocation engine.
///
/// The C-style primitives collapse all of these into a null/`None` return,
/// except [`HeapError::DoubleRelease`], which is fatal there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
  #[error("zero-sized request")]
  ZeroSize,

  #[error("out of memory: could not grow the heap by {requested} bytes")]
  OutOfMemory { requested: usize },

  #[error("double release of the block at offset {offset:#x}")]
  DoubleRelease { offset: usize },

  #[error("payload offset {offset:#x} is not a live allocation of this heap")]
  InvalidPointer { offset: usize },

  #[error("zeroed allocation of {count} x {elem_size} bytes overflows usize")]
  SizeOverflow { count: usize, elem_size: usize },
}

pub type Result<T> = std::result::Result<T, HeapError>;
