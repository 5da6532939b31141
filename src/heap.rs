use log::{debug, error, trace, warn};

use crate::{
  align::{ALIGNMENT, checked_align},
  block::{Block, HEADER_SIZE, MIN_PAYLOAD, Payload, walk},
  config::HeapConfig,
  error::{HeapError, Result},
  fit::FitPolicy,
  source::HeapSource,
  stats::HeapStats,
};

/// Public snapshot of one block on the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Offset of the header inside the region.
  pub offset: usize,
  /// Payload capacity in bytes.
  pub size: usize,
  pub free: bool,
}

impl BlockInfo {
  pub fn payload(&self) -> Payload {
    Payload::of_block(self.offset)
  }
}

/// A free-list allocator over one growable region.
///
/// All allocator state lives here: the list head and tail, the next-fit
/// cursor and the counters. Not thread safe; wrap the whole heap in a lock
/// to share it.
pub struct Heap<S: HeapSource> {
  source: S,
  config: HeapConfig,
  head: Option<usize>,
  tail: Option<usize>,
  cursor: Option<usize>,
  stats: HeapStats,
}

impl<S: HeapSource> Heap<S> {
  pub fn new(source: S) -> Self {
    Self::with_config(source, HeapConfig::default())
  }

  pub fn with_config(
    source: S,
    config: HeapConfig,
  ) -> Self {
    Self {
      source,
      config,
      head: None,
      tail: None,
      cursor: None,
      stats: HeapStats::default(),
    }
  }

  pub fn policy(&self) -> FitPolicy {
    self.config.policy
  }

  pub fn stats(&self) -> &HeapStats {
    &self.stats
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  /// Blocks in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    walk(self.source.bytes(), self.head).map(|(offset, block)| BlockInfo {
      offset,
      size: block.size,
      free: block.is_free,
    })
  }

  /// Allocates at least `size` bytes. `None` for zero-sized requests and
  /// when the heap cannot grow.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<Payload> {
    self.try_allocate(size).ok()
  }

  /// Releases a payload; `None` is a no-op.
  ///
  /// The payload must have been returned by this heap. Releasing it twice is
  /// a fatal usage error and panics.
  pub fn release(
    &mut self,
    payload: Option<Payload>,
  ) {
    if let Err(err) = self.try_release(payload) {
      panic!("fatal heap error: {err}");
    }
  }

  /// Allocates `count * elem_size` bytes, all zeroed.
  pub fn allocate_zeroed(
    &mut self,
    count: usize,
    elem_size: usize,
  ) -> Option<Payload> {
    self.try_allocate_zeroed(count, elem_size).ok()
  }

  /// Resizes an allocation, moving it when the current block is too small.
  ///
  /// On failure the original allocation stays live and untouched. Panics
  /// when `payload` is not a live allocation of this heap.
  pub fn resize(
    &mut self,
    payload: Option<Payload>,
    new_size: usize,
  ) -> Option<Payload> {
    match self.try_resize(payload, new_size) {
      Ok(payload) => Some(payload),
      Err(err @ (HeapError::DoubleRelease { .. } | HeapError::InvalidPointer { .. })) => {
        panic!("fatal heap error: {err}")
      }
      Err(_) => None,
    }
  }

  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<Payload> {
    trace!("allocate({size})");

    let size = checked_align(size).ok_or(HeapError::OutOfMemory { requested: size })?;
    if size == 0 {
      return Err(HeapError::ZeroSize);
    }

    self.stats.requested = self.stats.requested.saturating_add(size);

    let found = self.config.policy.find(self.source.bytes(), self.head, self.cursor, size);

    let at = match found {
      Some(at) => {
        self.stats.reuses += 1;
        if self.config.policy == FitPolicy::Next {
          self.cursor = Some(at);
        }
        at
      }
      None => self.grow(size).inspect_err(|err| warn!("allocate({size}): {err}"))?,
    };

    self.split(at, size);

    let mut block = self.read(at);
    block.is_free = false;
    self.write(at, block);

    self.stats.mallocs += 1;

    Ok(Payload::of_block(at))
  }

  pub fn try_release(
    &mut self,
    payload: Option<Payload>,
  ) -> Result<()> {
    let Some(payload) = payload else {
      return Ok(());
    };

    trace!("release({:#x})", payload.offset());

    let at = self.locate(payload)?;
    let mut block = self.read(at);

    if block.is_free {
      error!("double release of payload {:#x}", payload.offset());
      return Err(HeapError::DoubleRelease {
        offset: payload.offset(),
      });
    }

    block.is_free = true;
    self.write(at, block);
    self.stats.frees += 1;

    // forward first: the predecessor then absorbs the already merged block
    self.coalesce_forward(at);
    self.coalesce_backward(at);

    Ok(())
  }

  pub fn try_allocate_zeroed(
    &mut self,
    count: usize,
    elem_size: usize,
  ) -> Result<Payload> {
    let size = count
      .checked_mul(elem_size)
      .ok_or(HeapError::SizeOverflow { count, elem_size })?;

    let payload = self.try_allocate(size)?;
    self.bytes_mut(payload)?.fill(0);

    Ok(payload)
  }

  pub fn try_resize(
    &mut self,
    payload: Option<Payload>,
    new_size: usize,
  ) -> Result<Payload> {
    let Some(payload) = payload else {
      return self.try_allocate(new_size);
    };

    trace!("resize({:#x}, {new_size})", payload.offset());

    let old = self.read(self.locate(payload)?);
    if old.is_free {
      return Err(HeapError::InvalidPointer {
        offset: payload.offset(),
      });
    }

    if old.size >= new_size {
      return Ok(payload);
    }

    let moved = self.try_allocate(new_size)?;

    let len = old.size.min(new_size);
    let from = payload.offset();
    self
      .source
      .bytes_mut()
      .copy_within(from..from + len, moved.offset());

    self.try_release(Some(payload))?;

    Ok(moved)
  }

  /// Payload capacity of a live or free block.
  pub fn payload_size(
    &self,
    payload: Payload,
  ) -> Result<usize> {
    Ok(self.read(self.locate(payload)?).size)
  }

  /// The whole granted region of `payload`, which may exceed the request.
  pub fn bytes(
    &self,
    payload: Payload,
  ) -> Result<&[u8]> {
    let size = self.payload_size(payload)?;
    let from = payload.offset();

    Ok(&self.source.bytes()[from..from + size])
  }

  pub fn bytes_mut(
    &mut self,
    payload: Payload,
  ) -> Result<&mut [u8]> {
    let size = self.payload_size(payload)?;
    let from = payload.offset();

    Ok(&mut self.source.bytes_mut()[from..from + size])
  }

  /// Appends a block of `size` payload bytes at the end of the region.
  fn grow(
    &mut self,
    size: usize,
  ) -> Result<usize> {
    let increment = HEADER_SIZE
      .checked_add(size)
      .ok_or(HeapError::OutOfMemory { requested: size })?;

    let at = self
      .source
      .extend(increment)
      .ok_or(HeapError::OutOfMemory {
        requested: increment,
      })?;

    self.write(at, Block::new(size, false, None));

    match self.tail {
      Some(tail) => {
        let mut last = self.read(tail);
        debug_assert_eq!(last.end(tail), at);
        last.next = Some(at);
        self.write(tail, last);
      }
      None => self.head = Some(at),
    }
    self.tail = Some(at);

    self.stats.grows += 1;
    self.stats.blocks += 1;
    self.stats.max_heap = self.stats.max_heap.max(self.source.len());

    debug!("grew heap by {increment} bytes, new block at {at:#x}");

    Ok(at)
  }

  /// Carves the tail of the block at `at` into a free block when more than
  /// `size` plus one minimal block is available.
  fn split(
    &mut self,
    at: usize,
    size: usize,
  ) {
    let mut block = self.read(at);

    if block.size < size + HEADER_SIZE + MIN_PAYLOAD {
      return;
    }

    let rest_at = at + HEADER_SIZE + size;
    let rest = Block::new(block.size - size - HEADER_SIZE, true, block.next);
    self.write(rest_at, rest);

    block.size = size;
    block.next = Some(rest_at);
    self.write(at, block);

    if self.tail == Some(at) {
      self.tail = Some(rest_at);
    }

    self.stats.splits += 1;
    self.stats.blocks += 1;

    debug!("split block {at:#x}: {size} used, {} free at {rest_at:#x}", rest.size);
  }

  fn coalesce_forward(
    &mut self,
    at: usize,
  ) {
    let mut block = self.read(at);

    let Some(next_at) = block.next else {
      return;
    };
    let next = self.read(next_at);
    if !next.is_free {
      return;
    }

    block.size += HEADER_SIZE + next.size;
    block.next = next.next;
    self.write(at, block);

    self.absorbed(next_at, at);
  }

  fn coalesce_backward(
    &mut self,
    at: usize,
  ) {
    let prev = walk(self.source.bytes(), self.head).find(|(_, block)| block.next == Some(at));

    let Some((prev_at, mut prev)) = prev else {
      return;
    };
    if !prev.is_free {
      return;
    }

    let block = self.read(at);
    prev.size += HEADER_SIZE + block.size;
    prev.next = block.next;
    self.write(prev_at, prev);

    self.absorbed(at, prev_at);
  }

  /// Bookkeeping after the block at `gone` was merged into `into`.
  fn absorbed(
    &mut self,
    gone: usize,
    into: usize,
  ) {
    if self.tail == Some(gone) {
      self.tail = Some(into);
    }
    if self.cursor == Some(gone) {
      self.cursor = Some(into);
    }

    self.stats.coalesces += 1;
    self.stats.blocks -= 1;

    debug!("coalesced block {gone:#x} into {into:#x}");
  }

  /// Header offset of `payload`, checked against the region bounds.
  fn locate(
    &self,
    payload: Payload,
  ) -> Result<usize> {
    let invalid = HeapError::InvalidPointer {
      offset: payload.offset(),
    };

    let len = self.source.len();
    let at = payload.block().ok_or(invalid)?;

    if self.head.is_none() || payload.offset() % ALIGNMENT != 0 || payload.offset() > len {
      return Err(invalid);
    }

    // a header that claims bytes past the region cannot be ours
    let block = self.read(at);
    let end = HEADER_SIZE.checked_add(block.size).and_then(|n| n.checked_add(at));
    let Some(end) = end.filter(|&end| end <= len) else {
      return Err(invalid);
    };
    if block.next.is_some_and(|next| next < end || next > len - HEADER_SIZE) {
      return Err(invalid);
    }

    Ok(at)
  }

  fn read(
    &self,
    at: usize,
  ) -> Block {
    Block::read(self.source.bytes(), at)
  }

  fn write(
    &mut self,
    at: usize,
    block: Block,
  ) {
    block.write(self.source.bytes_mut(), at);
  }
}
