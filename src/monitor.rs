//! Geometry synchronizer.
//!
//! Reconciles the registry's monitor list against the physical region list
//! reported by the display server. Monitors are created or dropped only here,
//! and clients on a dropped monitor move to monitor 0 rather than being lost.

use crate::registry::Registry;
use crate::types::Rect;

/// Summary of one synchronization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopologyChange {
    pub created: usize,
    pub removed: usize,
    /// Clients relocated to monitor 0
    pub migrated: usize,
}

impl TopologyChange {
    /// Whether any region, monitor or client actually changed
    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.removed == 0 && self.migrated == 0
    }
}

/// Pair monitors with `regions` positionally.
///
/// Surplus regions get fresh empty monitors. Surplus monitors are dropped
/// from the tail and their clients appended to monitor 0 in order. An empty
/// region list leaves the monitor set untouched, since the registry must
/// always hold at least one monitor.
pub fn synchronize(registry: &mut Registry, regions: &[Rect]) -> TopologyChange {
    let mut change = TopologyChange::default();
    if regions.is_empty() {
        log::warn!("Topology query returned no regions, keeping current monitors");
        return change;
    }

    while registry.monitor_count() < regions.len() {
        let region = regions[registry.monitor_count()];
        registry.push_monitor(Some(region));
        change.created += 1;
    }

    while registry.monitor_count() > regions.len() {
        let ids = registry.monitor_ids();
        let (first, last) = (ids[0], ids[ids.len() - 1]);
        let moved = registry.retire_monitor(last, first);
        log::info!("Dropped surplus monitor, migrated {} client(s) to monitor 0", moved);
        change.removed += 1;
        change.migrated += moved;
    }

    let ids = registry.monitor_ids().to_vec();
    for (idx, (id, region)) in ids.into_iter().zip(regions.iter().copied()).enumerate() {
        if let Some(monitor) = registry.monitor_mut(id) {
            if monitor.region != Some(region) {
                log::info!(
                    "Monitor {}: {}x{}+{}+{}",
                    idx,
                    region.width,
                    region.height,
                    region.x,
                    region.y
                );
                monitor.region = Some(region);
            }
        }
    }

    debug_assert_eq!(registry.monitor_count(), regions.len());
    change
}
