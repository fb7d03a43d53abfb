use std::fmt;

/// What the router does when a trigger's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Skip the match and log a warning.
    Drop,
    /// Wait for queue capacity, stalling the router until the trigger catches up.
    #[default]
    Block,
}

impl OverflowPolicy {
    pub fn is_drop(&self) -> bool {
        matches!(self, OverflowPolicy::Drop)
    }

    pub fn is_block(&self) -> bool {
        matches!(self, OverflowPolicy::Block)
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Drop => write!(f, "Drop"),
            OverflowPolicy::Block => write!(f, "Block"),
        }
    }
}
