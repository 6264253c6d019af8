use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// One quantified trace of a feature (e.g. a transition of an analyte).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureComponent {
    pub component_name: String,
    pub retention_time: f64,
    pub intensity: f64,
    #[serde(default)]
    pub meta: BTreeMap<String, f64>,
    pub used: bool,
    pub modified_at: NaiveDateTime,
}

impl FeatureComponent {
    pub fn new(component_name: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            retention_time: 0.0,
            intensity: 0.0,
            meta: BTreeMap::new(),
            used: true,
            modified_at: NaiveDateTime::UNIX_EPOCH,
        }
    }
}

/// One detected analyte signal, composed of sub-record components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub unique_id: u64,
    /// Secondary grouping key (originating transition group).
    pub group_name: String,
    pub components: Vec<FeatureComponent>,
}

impl Feature {
    pub fn new(unique_id: u64, group_name: impl Into<String>) -> Self {
        Self {
            unique_id,
            group_name: group_name.into(),
            components: Vec::new(),
        }
    }

    pub fn with_components(
        unique_id: u64,
        group_name: impl Into<String>,
        component_names: &[&str],
    ) -> Self {
        let mut ret = Self::new(unique_id, group_name);
        ret.components = component_names
            .iter()
            .map(|n| FeatureComponent::new(*n))
            .collect();
        ret
    }

    fn find_component(&self, component_name: &str) -> Option<&FeatureComponent> {
        self.components
            .iter()
            .find(|c| c.component_name == component_name)
    }
}

/// The current working set of features for one injection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub features: Vec<Feature>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_features(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn unique_ids(&self) -> BTreeSet<u64> {
        self.features.iter().map(|f| f.unique_id).collect()
    }

    pub fn find(&self, unique_id: u64) -> Option<&Feature> {
        self.features.iter().find(|f| f.unique_id == unique_id)
    }

    pub fn clear(&mut self) {
        self.features.clear();
    }
}

/// Append-only audit trail of every feature an injection has ever produced.
///
/// A recorded unique ID is never removed; reconciliation only flips
/// component `used` flags and refreshes `modified_at` stamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureHistory {
    pub records: Vec<Feature>,
}

impl FeatureHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn unique_ids(&self) -> BTreeSet<u64> {
        self.records.iter().map(|f| f.unique_id).collect()
    }

    pub fn find(&self, unique_id: u64) -> Option<&Feature> {
        self.records.iter().find(|f| f.unique_id == unique_id)
    }

    /// Explicit session reset; the only operation that shrinks a history.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Fold a freshly computed collection into the trail.
    ///
    /// An empty history bootstraps to a stamped copy of `fresh`. Otherwise
    /// records merge three ways by unique ID: fresh-only records append,
    /// history-only records soft-delete (components `used = false`), and
    /// records present on both sides with a matching group recurse the same
    /// logic per component name, splicing newly seen components in.
    pub fn reconcile(&mut self, fresh: &FeatureSet, now: NaiveDateTime) {
        if self.records.is_empty() {
            for feature in &fresh.features {
                self.records.push(stamped(feature, true, now));
            }
            return;
        }

        let fresh_ids = fresh.unique_ids();
        for record in &mut self.records {
            if !fresh_ids.contains(&record.unique_id) {
                for component in &mut record.components {
                    component.used = false;
                    component.modified_at = now;
                }
            }
        }

        for feature in &fresh.features {
            let matched = self.records.iter().position(|r| {
                r.unique_id == feature.unique_id && r.group_name == feature.group_name
            });
            match matched {
                None => {
                    // Unknown ID, or a known ID under a different group:
                    // both append rather than guess at record identity.
                    self.records.push(stamped(feature, true, now));
                }
                Some(i) => {
                    let record = &mut self.records[i];
                    for component in &mut record.components {
                        match feature.find_component(&component.component_name) {
                            Some(_) => {
                                component.used = true;
                                component.modified_at = now;
                            }
                            None => {
                                component.used = false;
                                component.modified_at = now;
                            }
                        }
                    }
                    for fresh_component in &feature.components {
                        if record
                            .find_component(&fresh_component.component_name)
                            .is_none()
                        {
                            let mut spliced = fresh_component.clone();
                            spliced.used = true;
                            spliced.modified_at = now;
                            record.components.push(spliced);
                        }
                    }
                }
            }
        }
    }

    /// Restamp only the `used` flags by feature-level presence in `fresh`.
    ///
    /// Applied after a selection step narrows the working set without
    /// updating the history itself; no timestamps are touched and no
    /// component-level matching happens.
    pub fn annotate_used(&mut self, fresh: &FeatureSet) {
        let fresh_ids = fresh.unique_ids();
        for record in &mut self.records {
            let used = fresh_ids.contains(&record.unique_id);
            for component in &mut record.components {
                component.used = used;
            }
        }
    }

    /// Project the records still in use back into a working feature set,
    /// carrying only their used components.
    pub fn to_feature_set(&self) -> FeatureSet {
        let mut ret = FeatureSet::new();
        for record in &self.records {
            let components: Vec<FeatureComponent> = record
                .components
                .iter()
                .filter(|c| c.used)
                .cloned()
                .collect();
            if !components.is_empty() {
                let mut feature = Feature::new(record.unique_id, record.group_name.clone());
                feature.components = components;
                ret.features.push(feature);
            }
        }
        ret
    }
}

fn stamped(feature: &Feature, used: bool, now: NaiveDateTime) -> Feature {
    let mut ret = feature.clone();
    for component in &mut ret.components {
        component.used = used;
        component.modified_at = now;
    }
    ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn fresh(features: &[(u64, &str, &[&str])]) -> FeatureSet {
        FeatureSet::from_features(
            features
                .iter()
                .map(|(id, group, comps)| Feature::with_components(*id, *group, comps))
                .collect(),
        )
    }

    #[test]
    fn test_bootstrap_copies_fresh_verbatim_with_stamps() {
        let mut history = FeatureHistory::new();
        history.reconcile(&fresh(&[(1, "g1", &["a"]), (2, "g1", &["b"])]), ts(1));
        assert_eq!(history.len(), 2);
        assert!(history
            .records
            .iter()
            .flat_map(|r| &r.components)
            .all(|c| c.used && c.modified_at == ts(1)));
    }

    #[test]
    fn test_new_feature_appends() {
        let mut history = FeatureHistory::new();
        history.reconcile(&fresh(&[(1, "g1", &["a"])]), ts(1));
        history.reconcile(&fresh(&[(1, "g1", &["a"]), (2, "g2", &["b"])]), ts(2));
        assert_eq!(history.len(), 2);
        let added = history.find(2).unwrap();
        assert!(added.components[0].used);
        assert_eq!(added.components[0].modified_at, ts(2));
    }

    #[test]
    fn test_removed_feature_is_soft_deleted_not_dropped() {
        let mut history = FeatureHistory::new();
        history.reconcile(&fresh(&[(1, "g1", &["a"]), (2, "g1", &["b"])]), ts(1));
        history.reconcile(&fresh(&[(1, "g1", &["a"])]), ts(2));
        assert_eq!(history.len(), 2);
        let removed = history.find(2).unwrap();
        assert!(removed.components.iter().all(|c| !c.used));
        assert!(removed.components.iter().all(|c| c.modified_at == ts(2)));
        let kept = history.find(1).unwrap();
        assert!(kept.components.iter().all(|c| c.used));
    }

    #[test]
    fn test_component_level_three_way_merge() {
        let mut history = FeatureHistory::new();
        history.reconcile(&fresh(&[(1, "g1", &["a", "b"])]), ts(1));
        // component b vanishes, component c appears
        history.reconcile(&fresh(&[(1, "g1", &["a", "c"])]), ts(2));
        let record = history.find(1).unwrap();
        assert_eq!(record.components.len(), 3);
        let by_name = |n: &str| record.components.iter().find(|c| c.component_name == n).unwrap();
        assert!(by_name("a").used);
        assert!(!by_name("b").used);
        assert!(by_name("c").used);
        assert_eq!(by_name("c").modified_at, ts(2));
    }

    #[test]
    fn test_same_id_different_group_appends_new_record() {
        let mut history = FeatureHistory::new();
        history.reconcile(&fresh(&[(1, "g1", &["a"])]), ts(1));
        history.reconcile(&fresh(&[(1, "g2", &["a"])]), ts(2));
        assert_eq!(history.records.len(), 2);
    }

    #[test]
    fn test_monotonic_growth_of_unique_ids() {
        let mut history = FeatureHistory::new();
        let mut seen = 0;
        let rounds: Vec<FeatureSet> = vec![
            fresh(&[(1, "g", &["a"]), (2, "g", &["a"])]),
            fresh(&[(2, "g", &["a"])]),
            fresh(&[(3, "g", &["a"])]),
            fresh(&[]),
        ];
        for (i, round) in rounds.iter().enumerate() {
            history.reconcile(round, ts(i as u32 + 1));
            let count = history.unique_ids().len();
            assert!(count >= seen, "history shrank on round {i}");
            seen = count;
        }
        assert_eq!(seen, 3);
    }

    #[test]
    fn test_annotate_used_flips_flags_without_timestamps() {
        let mut history = FeatureHistory::new();
        history.reconcile(&fresh(&[(1, "g", &["a"]), (2, "g", &["b"])]), ts(1));
        history.annotate_used(&fresh(&[(2, "g", &["b"])]));
        assert!(!history.find(1).unwrap().components[0].used);
        assert!(history.find(2).unwrap().components[0].used);
        // timestamps untouched
        assert!(history
            .records
            .iter()
            .flat_map(|r| &r.components)
            .all(|c| c.modified_at == ts(1)));
        // and back on again
        history.annotate_used(&fresh(&[(1, "g", &["a"]), (2, "g", &["b"])]));
        assert!(history.find(1).unwrap().components[0].used);
    }

    #[test]
    fn test_to_feature_set_projects_used_components_only() {
        let mut history = FeatureHistory::new();
        history.reconcile(&fresh(&[(1, "g", &["a", "b"]), (2, "g", &["c"])]), ts(1));
        history.reconcile(&fresh(&[(1, "g", &["a"])]), ts(2));
        let set = history.to_feature_set();
        assert_eq!(set.len(), 1);
        assert_eq!(set.features[0].unique_id, 1);
        assert_eq!(set.features[0].components.len(), 1);
        assert_eq!(set.features[0].components[0].component_name, "a");
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let input = fresh(&[(1, "g", &["a"])]);
        let mut once = FeatureHistory::new();
        once.reconcile(&input, ts(1));
        let mut twice = FeatureHistory::new();
        twice.reconcile(&input, ts(1));
        twice.reconcile(&input, ts(1));
        assert_eq!(once, twice);
    }
}
