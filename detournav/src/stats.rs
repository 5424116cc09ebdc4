//! Navigator statistics.

use std::fmt;

use crate::manager::TileCachedRecastMeshManagerStats;
use crate::updater::AsyncNavMeshUpdaterStats;

/// Snapshot of every navigator component's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NavigatorStats {
    pub agents: usize,
    pub updater: AsyncNavMeshUpdaterStats,
    pub recast: TileCachedRecastMeshManagerStats,
}

impl fmt::Display for NavigatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Navigator agents: {}", self.agents)?;
        writeln!(f, "{}", self.updater)?;
        writeln!(f, "Recast tiles: {}", self.recast.tiles)?;
        writeln!(f, "Recast objects: {}", self.recast.objects)?;
        writeln!(f, "Recast heightfields: {}", self.recast.heightfields)?;
        write!(f, "Recast water: {}", self.recast.water)
    }
}
