//! Free-list search policies.
//!
//! Every policy scans the address-ordered block list and returns the offset
//! of a free block whose payload can hold `size` bytes. None of them write to
//! the region; the next-fit cursor is owned and advanced by the caller.

use std::{cmp::Reverse, fmt, str::FromStr};

use thiserror::Error;

use crate::block::{Block, walk};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitPolicy {
  /// First free block large enough, from the head.
  First,
  /// Smallest free block large enough.
  Best,
  /// Largest free block large enough.
  Worst,
  /// First free block large enough after the last match, wrapping around.
  Next,
}

impl FitPolicy {
  /// Policy chosen by the crate features this build was compiled with.
  ///
  /// When several policy features are enabled, `next-fit` wins over
  /// `worst-fit`, which wins over `best-fit`, which wins over the default
  /// `first-fit`.
  pub const BUILD: FitPolicy = if cfg!(feature = "next-fit") {
    FitPolicy::Next
  } else if cfg!(feature = "worst-fit") {
    FitPolicy::Worst
  } else if cfg!(feature = "best-fit") {
    FitPolicy::Best
  } else {
    FitPolicy::First
  };

  pub const ALL: [FitPolicy; 4] = [
    FitPolicy::First,
    FitPolicy::Best,
    FitPolicy::Worst,
    FitPolicy::Next,
  ];

  pub fn name(self) -> &'static str {
    match self {
      FitPolicy::First => "first",
      FitPolicy::Best => "best",
      FitPolicy::Worst => "worst",
      FitPolicy::Next => "next",
    }
  }

  /// Finds a free block of at least `size` payload bytes.
  ///
  /// `cursor` is the block matched by the previous successful next-fit
  /// search; the other policies ignore it.
  pub(crate) fn find(
    self,
    bytes: &[u8],
    head: Option<usize>,
    cursor: Option<usize>,
    size: usize,
  ) -> Option<usize> {
    let fits = |(_, block): &(usize, Block)| block.is_free && block.size >= size;

    let found = match self {
      FitPolicy::First => walk(bytes, head).find(fits),
      FitPolicy::Best => walk(bytes, head)
        .filter(fits)
        .min_by_key(|(_, block)| block.size),
      // min over Reverse keeps the first of several equally large blocks
      FitPolicy::Worst => walk(bytes, head)
        .filter(fits)
        .min_by_key(|(_, block)| Reverse(block.size)),
      FitPolicy::Next => match cursor {
        None => walk(bytes, head).find(fits),
        Some(cursor) => {
          let after = Block::read(bytes, cursor).next;
          walk(bytes, after)
            .chain(walk(bytes, head).take_while(|(at, _)| *at <= cursor))
            .find(fits)
        }
      },
    };

    found.map(|(at, _)| at)
  }
}

impl Default for FitPolicy {
  fn default() -> Self {
    Self::BUILD
  }
}

impl fmt::Display for FitPolicy {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown fit policy `{0}` (expected first, best, worst or next)")]
pub struct ParsePolicyError(String);

impl FromStr for FitPolicy {
  type Err = ParsePolicyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let name = s.trim().to_ascii_lowercase();
    let name = name.strip_suffix("-fit").unwrap_or(&name);

    FitPolicy::ALL
      .into_iter()
      .find(|policy| policy.name() == name)
      .ok_or_else(|| ParsePolicyError(s.to_owned()))
  }
}
