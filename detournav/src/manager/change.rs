use std::fmt;

/// Kind of change a tile went through.
///
/// `Remove` dominates when changes are merged; `Update` jobs are
/// debounced and bypass the persistent cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeType {
    Remove,
    Add,
    Update,
}

impl ChangeType {
    /// Merges a new change into a pending one.
    pub fn merge(self, other: ChangeType) -> ChangeType {
        if other == ChangeType::Remove {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Remove => write!(f, "remove"),
            ChangeType::Add => write!(f, "add"),
            ChangeType::Update => write!(f, "update"),
        }
    }
}
