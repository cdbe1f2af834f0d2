// # Region Store
//
// In-memory set of the regions watched by the current monitoring session.
//
// ## Ownership
//
// The store is owned by the engine task and exclusively owns its regions
// for the lifetime of a session. It is cleared on stop and on a failed
// start. Nothing is persisted; re-registering regions after a process
// restart is the platform's concern.
//
// ## Expiry
//
// A region registered with a lifetime gets a deadline when it is added.
// Transitions observed after the deadline are discarded by the engine;
// the region itself stays stored until the session ends or it is removed.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::model::Region;

/// Regions keyed by identifier
///
/// # Example
///
/// ```rust
/// use geofence_core::{Region, RegionStore};
///
/// let mut store = RegionStore::new();
/// store.add_regions(vec![Region::new("home", 1.0, 1.0, 100.0)]).unwrap();
///
/// assert!(store.contains("home"));
/// assert!(store.add_regions(vec![Region::new("home", 2.0, 2.0, 50.0)]).is_err());
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegionStore {
    regions: HashMap<String, Region>,
    deadlines: HashMap<String, Instant>,
}

impl RegionStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch of regions, all or nothing
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Every region was added
    /// - `Err(Error::DuplicateId)`: An id repeats inside the batch or is
    ///   already stored; the store is unchanged
    /// - `Err(Error::InvalidRegion)`: A region failed validation; the store
    ///   is unchanged
    pub fn add_regions(&mut self, regions: impl IntoIterator<Item = Region>) -> Result<()> {
        let batch: Vec<Region> = regions.into_iter().collect();

        let mut seen = HashSet::with_capacity(batch.len());
        for region in &batch {
            region.validate()?;
            if self.regions.contains_key(&region.id) || !seen.insert(region.id.as_str()) {
                return Err(Error::duplicate_id(region.id.clone()));
            }
        }

        let now = Instant::now();
        for region in batch {
            if let Some(lifetime) = region.expires_after() {
                self.deadlines.insert(region.id.clone(), now + lifetime);
            }
            self.regions.insert(region.id.clone(), region);
        }
        Ok(())
    }

    /// Remove the given regions, skipping ids that are not stored
    ///
    /// Returns the removed regions in the order their ids were given.
    pub fn remove<S: AsRef<str>>(&mut self, ids: &[S]) -> Vec<Region> {
        ids.iter()
            .filter_map(|id| {
                let id = id.as_ref();
                self.deadlines.remove(id);
                self.regions.remove(id)
            })
            .collect()
    }

    /// Remove every region
    pub fn clear(&mut self) {
        self.regions.clear();
        self.deadlines.clear();
    }

    /// Whether the region's lifetime has run out at `at`
    ///
    /// Regions without a lifetime, and unknown ids, never expire.
    pub fn is_expired(&self, id: &str, at: Instant) -> bool {
        self.deadlines
            .get(id)
            .is_some_and(|deadline| at >= *deadline)
    }

    /// Look up a region by id
    pub fn get(&self, id: &str) -> Result<&Region> {
        self.regions.get(id).ok_or_else(|| Error::not_found(id))
    }

    /// Whether a region with this id is stored
    pub fn contains(&self, id: &str) -> bool {
        self.regions.contains_key(id)
    }

    /// Whether any of the ids is stored
    pub fn contains_any<S: AsRef<str>>(&self, ids: &[S]) -> bool {
        ids.iter().any(|id| self.contains(id.as_ref()))
    }

    /// Find a region centered exactly on the given point
    ///
    /// A `radius` of `None` or a negative value matches any radius.
    pub fn find_by_coordinate(
        &self,
        latitude: f64,
        longitude: f64,
        radius: Option<f64>,
    ) -> Option<&Region> {
        self.regions.values().find(|region| {
            region.center.latitude == latitude
                && region.center.longitude == longitude
                && match radius {
                    Some(r) if r >= 0.0 => region.radius == r,
                    _ => true,
                }
        })
    }

    /// Snapshot of all regions, sorted by id
    pub fn regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self.regions.values().cloned().collect();
        regions.sort_by(|a, b| a.id.cmp(&b.id));
        regions
    }

    /// Number of stored regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn region(id: &str) -> Region {
        Region::new(id, 1.0, 1.0, 100.0)
    }

    #[test]
    fn test_store_basic() {
        let mut store = RegionStore::new();
        assert!(store.is_empty());

        store.add_regions(vec![region("home"), region("work")]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("home").unwrap().id, "home");
        assert!(matches!(store.get("gym"), Err(Error::NotFound(_))));

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn duplicate_in_batch_leaves_store_unchanged() {
        let mut store = RegionStore::new();
        store.add_regions(vec![region("home")]).unwrap();

        let result = store.add_regions(vec![region("work"), region("gym"), region("work")]);
        assert!(matches!(result, Err(Error::DuplicateId(id)) if id == "work"));
        assert_eq!(store.len(), 1);
        assert!(!store.contains("gym"));
    }

    #[test]
    fn duplicate_against_existing_is_rejected() {
        let mut store = RegionStore::new();
        store.add_regions(vec![region("home")]).unwrap();

        let result = store.add_regions(vec![region("park"), region("home")]);
        assert!(matches!(result, Err(Error::DuplicateId(_))));
        assert!(!store.contains("park"));
    }

    #[test]
    fn invalid_region_aborts_batch() {
        let mut store = RegionStore::new();
        let result = store.add_regions(vec![region("home"), Region::new("bad", 1.0, 1.0, 0.0)]);

        assert!(matches!(result, Err(Error::InvalidRegion(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn coordinate_lookup_optionally_ignores_radius() {
        let mut store = RegionStore::new();
        store
            .add_regions(vec![Region::new("pier", 40.5, -73.9, 75.0)])
            .unwrap();

        assert!(store.find_by_coordinate(40.5, -73.9, Some(75.0)).is_some());
        assert!(store.find_by_coordinate(40.5, -73.9, Some(80.0)).is_none());
        assert!(store.find_by_coordinate(40.5, -73.9, None).is_some());
        assert!(store.find_by_coordinate(40.5, -73.9, Some(-1.0)).is_some());
        assert!(store.find_by_coordinate(40.6, -73.9, None).is_none());
    }

    #[test]
    fn remove_skips_unknown_ids() {
        let mut store = RegionStore::new();
        store
            .add_regions(vec![region("home"), region("work"), region("gym")])
            .unwrap();

        let removed = store.remove(&["work", "atlantis", "home"]);
        let ids: Vec<_> = removed.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["work", "home"]);
        assert_eq!(store.len(), 1);
        assert!(store.contains("gym"));

        assert!(store.remove(&["work"]).is_empty());
    }

    #[test]
    fn expiry_is_measured_from_registration() {
        let mut store = RegionStore::new();
        store
            .add_regions(vec![
                region("pop-up").with_expiry(Duration::from_secs(60)),
                region("home"),
            ])
            .unwrap();

        let now = Instant::now();
        let later = now + Duration::from_secs(120);
        assert!(!store.is_expired("pop-up", now));
        assert!(store.is_expired("pop-up", later));
        assert!(!store.is_expired("home", later));
        assert!(!store.is_expired("atlantis", later));

        // Removing and re-adding starts a new lifetime
        store.remove(&["pop-up"]);
        assert!(!store.is_expired("pop-up", later));
    }

    #[test]
    fn contains_any_matches_one_of_many() {
        let mut store = RegionStore::new();
        store.add_regions(vec![region("home")]).unwrap();

        assert!(store.contains_any(&["gym", "home"]));
        assert!(!store.contains_any(&["gym", "work"]));
        assert!(!store.contains_any::<&str>(&[]));
    }
}
