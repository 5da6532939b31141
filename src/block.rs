use crate::align::ALIGNMENT;

/// Bytes of in-band metadata in front of every payload.
///
/// ```text
///   0        8        16       20       24
///   ┌────────┬────────┬────────┬────────┐
///   │  size  │  next  │  free  │  pad   │
///   └────────┴────────┴────────┴────────┘
/// ```
pub const HEADER_SIZE: usize = 24;

/// Smallest payload a split remainder may carry.
pub const MIN_PAYLOAD: usize = ALIGNMENT;

const SIZE_AT: usize = 0;
const NEXT_AT: usize = 8;
const FREE_AT: usize = 16;

const NIL: u64 = u64::MAX;

/// Decoded view of a block header living at some offset of the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  pub size: usize,
  pub is_free: bool,
  pub next: Option<usize>,
}

impl Block {
  pub fn new(
    size: usize,
    is_free: bool,
    next: Option<usize>,
  ) -> Self {
    Self { size, is_free, next }
  }

  /// Decodes the header stored at `at`.
  ///
  /// Callers only pass offsets of blocks reachable from the list head, which
  /// always lie fully inside `bytes`.
  pub fn read(
    bytes: &[u8],
    at: usize,
  ) -> Self {
    let next = match read_word(bytes, at + NEXT_AT) {
      NIL => None,
      offset => Some(offset as usize),
    };

    Self {
      size: read_word(bytes, at + SIZE_AT) as usize,
      is_free: read_word(bytes, at + FREE_AT) & 0xffff_ffff != 0,
      next,
    }
  }

  pub fn write(
    &self,
    bytes: &mut [u8],
    at: usize,
  ) {
    let next = self.next.map_or(NIL, |offset| offset as u64);

    write_word(bytes, at + SIZE_AT, self.size as u64);
    write_word(bytes, at + NEXT_AT, next);
    // free flag and padding share the last word
    write_word(bytes, at + FREE_AT, self.is_free as u64);
  }

  /// Offset one past the block's payload, i.e. where an adjacent block starts.
  pub fn end(
    &self,
    at: usize,
  ) -> usize {
    at + HEADER_SIZE + self.size
  }
}

/// Walks the list in address order starting at `from`.
pub fn walk(
  bytes: &[u8],
  from: Option<usize>,
) -> Walk<'_> {
  Walk { bytes, current: from }
}

pub struct Walk<'a> {
  bytes: &'a [u8],
  current: Option<usize>,
}

impl Iterator for Walk<'_> {
  type Item = (usize, Block);

  fn next(&mut self) -> Option<Self::Item> {
    let at = self.current?;
    let block = Block::read(self.bytes, at);
    self.current = block.next;
    Some((at, block))
  }
}

fn read_word(
  bytes: &[u8],
  at: usize,
) -> u64 {
  let mut word = [0u8; 8];
  word.copy_from_slice(&bytes[at..at + 8]);
  u64::from_le_bytes(word)
}

fn write_word(
  bytes: &mut [u8],
  at: usize,
  value: u64,
) {
  bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

/// Handle to a payload handed out by the allocator.
///
/// It is the payload's byte offset inside the managed region; the block
/// header sits [`HEADER_SIZE`] bytes before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(usize);

impl Payload {
  pub fn from_offset(offset: usize) -> Self {
    Self(offset)
  }

  pub fn offset(self) -> usize {
    self.0
  }

  pub(crate) fn of_block(block: usize) -> Self {
    Self(block + HEADER_SIZE)
  }

  /// Offset of the header, or `None` when the payload cannot be preceded by one.
  pub(crate) fn block(self) -> Option<usize> {
    self.0.checked_sub(HEADER_SIZE)
  }
}
