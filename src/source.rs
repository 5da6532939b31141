//! Backing memory for a [`Heap`](crate::Heap).
//!
//! A source owns one contiguous byte region that only ever grows at its end.
//! The engine addresses it exclusively through offsets, so a source is free
//! to move its bytes around between calls (as [`ArenaSource`] does) as long as
//! offsets stay stable.

use log::warn;

use crate::align::ALIGNMENT;

pub trait HeapSource {
  /// Appends `increment` bytes to the end of the region.
  ///
  /// Returns the offset of the first new byte, or `None` when the underlying
  /// provider refuses. A refusal must leave the region unchanged.
  fn extend(
    &mut self,
    increment: usize,
  ) -> Option<usize>;

  /// Current size of the region in bytes.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn bytes(&self) -> &[u8];

  fn bytes_mut(&mut self) -> &mut [u8];
}

/// In-process region backed by a byte vector with a hard size limit.
///
/// Hitting the limit is how tests observe out-of-memory deterministically.
#[derive(Debug, Clone)]
pub struct ArenaSource {
  bytes: Vec<u8>,
  limit: usize,
}

impl ArenaSource {
  pub fn new(limit: usize) -> Self {
    Self {
      bytes: Vec::new(),
      limit,
    }
  }

  pub fn limit(&self) -> usize {
    self.limit
  }
}

impl Default for ArenaSource {
  fn default() -> Self {
    Self::new(usize::MAX)
  }
}

impl HeapSource for ArenaSource {
  fn extend(
    &mut self,
    increment: usize,
  ) -> Option<usize> {
    let offset = self.bytes.len();
    let new_len = offset.checked_add(increment)?;

    if new_len > self.limit {
      return None;
    }

    self.bytes.try_reserve_exact(increment).ok()?;
    self.bytes.resize(new_len, 0);

    Some(offset)
  }

  fn len(&self) -> usize {
    self.bytes.len()
  }

  fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    &mut self.bytes
  }
}

#[cfg(unix)]
pub use self::sbrk::{SbrkSource, program_break};

#[cfg(unix)]
mod sbrk {
  use std::{ptr, slice};

  use libc::{c_void, intptr_t, sbrk};

  use super::*;

  /// Current program break, as reported by `sbrk(0)`.
  pub fn program_break() -> *mut u8 {
    unsafe { sbrk(0) as *mut u8 }
  }

  fn failed(address: *mut c_void) -> bool {
    address == usize::MAX as *mut c_void
  }

  /// The process data segment, extended with `sbrk(2)`.
  ///
  /// Memory is never handed back to the OS. If anything else moves the
  /// program break between two extensions the region would stop being
  /// contiguous; such an extension is reported as a refusal and the stray
  /// bytes are leaked.
  #[derive(Debug)]
  pub struct SbrkSource {
    base: *mut u8,
    len: usize,
  }

  impl SbrkSource {
    pub const fn new() -> Self {
      Self {
        base: ptr::null_mut(),
        len: 0,
      }
    }

    /// Address of the byte at `offset` inside the region.
    pub fn address(
      &self,
      offset: usize,
    ) -> *mut u8 {
      self.base.wrapping_add(offset)
    }

    /// Offset of `address` inside the region, if it lies within it.
    pub fn offset_of(
      &self,
      address: *const u8,
    ) -> Option<usize> {
      let offset = (address as usize).checked_sub(self.base as usize)?;

      if self.base.is_null() || offset >= self.len {
        return None;
      }

      Some(offset)
    }
  }

  impl Default for SbrkSource {
    fn default() -> Self {
      Self::new()
    }
  }

  impl HeapSource for SbrkSource {
    fn extend(
      &mut self,
      increment: usize,
    ) -> Option<usize> {
      unsafe {
        // The first extension also pads the break up to ALIGNMENT.
        let pad = if self.base.is_null() {
          let brk = sbrk(0);
          if failed(brk) {
            return None;
          }
          (ALIGNMENT - brk as usize % ALIGNMENT) % ALIGNMENT
        } else {
          0
        };

        let request = increment
          .checked_add(pad)
          .and_then(|total| intptr_t::try_from(total).ok())?;

        let address = sbrk(request);
        if failed(address) {
          return None;
        }

        let start = (address as *mut u8).add(pad);

        if self.base.is_null() {
          self.base = start;
        } else if start != self.base.add(self.len) {
          warn!(
            "program break moved underneath the heap: expected {:?}, got {:?}",
            self.base.add(self.len),
            start
          );
          return None;
        }

        let offset = self.len;
        self.len += increment;

        Some(offset)
      }
    }

    fn len(&self) -> usize {
      self.len
    }

    fn bytes(&self) -> &[u8] {
      if self.base.is_null() {
        return &[];
      }
      // `base..base + len` came from sbrk and is owned by this source alone.
      unsafe { slice::from_raw_parts(self.base, self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
      if self.base.is_null() {
        return &mut [];
      }
      unsafe { slice::from_raw_parts_mut(self.base, self.len) }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_extends_contiguously() {
    let mut arena = ArenaSource::new(64);

    assert!(arena.is_empty());
    assert_eq!(arena.extend(24), Some(0));
    assert_eq!(arena.extend(16), Some(24));
    assert_eq!(arena.len(), 40);
    assert!(arena.bytes().iter().all(|&b| b == 0));
  }

  #[test]
  fn test_arena_refuses_past_limit() {
    let mut arena = ArenaSource::new(32);

    assert_eq!(arena.extend(24), Some(0));
    assert_eq!(arena.extend(16), None);
    // a refusal leaves the region untouched
    assert_eq!(arena.len(), 24);
    assert_eq!(arena.extend(8), Some(24));
    assert_eq!(arena.extend(usize::MAX), None);
  }

  #[cfg(unix)]
  #[test]
  fn test_sbrk_first_extension() {
    let mut source = SbrkSource::new();

    assert!(source.bytes().is_empty());

    let offset = source.extend(64).expect("sbrk refused 64 bytes");
    assert_eq!(offset, 0);
    assert_eq!(source.len(), 64);
    assert_eq!(source.address(0) as usize % ALIGNMENT, 0);

    source.bytes_mut().fill(0x5A);
    assert!(source.bytes().iter().all(|&b| b == 0x5A));

    assert_eq!(source.offset_of(source.address(63)), Some(63));
    assert_eq!(source.offset_of(source.address(64)), None);
  }
}
