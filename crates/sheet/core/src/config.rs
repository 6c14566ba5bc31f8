/// Tuning knobs for derived state resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolverConfig {
    /// Contribution count above which a resolution carries a warning.
    pub contribution_warn_threshold: usize,
}

impl ResolverConfig {
    pub const DEFAULT_CONTRIBUTION_WARN_THRESHOLD: usize = 256;

    pub fn new(contribution_warn_threshold: usize) -> Self {
        Self {
            contribution_warn_threshold,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CONTRIBUTION_WARN_THRESHOLD)
    }
}
