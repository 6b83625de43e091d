use derive_more::Display;
use getset::CopyGetters;
use serde::{Deserialize, Serialize};

/// Retention bucket. Each tier gets its own directory below `<root>/<database>`.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[display("manual")]
    Manual,
    #[display("hourly")]
    Hourly,
    #[display("daily")]
    Daily,
    #[display("weekly")]
    Weekly,
    #[display("monthly")]
    Monthly,
}

/// A tier together with how many artifacts it keeps.
///
/// A keep count of 0 keeps everything: pruning is skipped, nothing is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct RetentionTier {
    tier: Tier,
    keep_count: usize,
}

impl RetentionTier {
    pub fn new(tier: Tier, keep_count: usize) -> Self {
        Self { tier, keep_count }
    }

    pub fn manual() -> Self {
        Self::new(Tier::Manual, 0)
    }

    pub fn prunes(&self) -> bool {
        self.tier != Tier::Manual && self.keep_count > 0
    }
}

impl Default for RetentionTier {
    fn default() -> Self {
        Self::manual()
    }
}
