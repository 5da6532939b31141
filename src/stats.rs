use std::fmt;

/// Counters maintained by the engine, purely for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Successful allocations.
  pub mallocs: usize,
  /// Successful releases of a live block.
  pub frees: usize,
  /// Allocations served by a block that was already on the list.
  pub reuses: usize,
  pub grows: usize,
  pub splits: usize,
  pub coalesces: usize,
  /// Blocks currently on the list, free or not.
  pub blocks: usize,
  /// Sum of aligned request sizes.
  pub requested: usize,
  /// High-water mark of bytes under management.
  pub max_heap: usize,
}

/// Renders the exit-time report.
impl fmt::Display for HeapStats {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "heap management statistics")?;
    writeln!(f, "mallocs:\t{}", self.mallocs)?;
    writeln!(f, "frees:\t\t{}", self.frees)?;
    writeln!(f, "reuses:\t\t{}", self.reuses)?;
    writeln!(f, "grows:\t\t{}", self.grows)?;
    writeln!(f, "splits:\t\t{}", self.splits)?;
    writeln!(f, "coalesces:\t{}", self.coalesces)?;
    writeln!(f, "blocks:\t\t{}", self.blocks)?;
    writeln!(f, "requested:\t{}", self.requested)?;
    writeln!(f, "max heap:\t{}", self.max_heap)
  }
}
