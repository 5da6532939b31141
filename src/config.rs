use crate::fit::FitPolicy;

/// Knobs of a [`Heap`](crate::Heap) instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
  pub policy: FitPolicy,
}

impl HeapConfig {
  /// Configuration selected by the crate features.
  pub const BUILD: HeapConfig = HeapConfig {
    policy: FitPolicy::BUILD,
  };

  pub fn with_policy(policy: FitPolicy) -> Self {
    Self { policy }
  }
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self::BUILD
  }
}
