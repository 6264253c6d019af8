use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Acceptance bounds for one component or component group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentFilter {
    pub name: String,
    #[serde(default)]
    pub retention_time_l: Option<f64>,
    #[serde(default)]
    pub retention_time_u: Option<f64>,
    #[serde(default)]
    pub intensity_l: Option<f64>,
    #[serde(default)]
    pub intensity_u: Option<f64>,
    #[serde(default)]
    pub overall_quality_l: Option<f64>,
    #[serde(default)]
    pub overall_quality_u: Option<f64>,
    /// Bounds on arbitrary metadata values, keyed by metadata name.
    #[serde(default)]
    pub meta_bounds: BTreeMap<String, (f64, f64)>,
}

impl ComponentFilter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retention_time_l: None,
            retention_time_u: None,
            intensity_l: None,
            intensity_u: None,
            overall_quality_l: None,
            overall_quality_u: None,
            meta_bounds: BTreeMap::new(),
        }
    }
}

/// One screening category: filters, QCs, or RSD/background estimations.
/// Shared by reference across the injections of a sequence segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureFilterSet {
    pub component_filters: Vec<ComponentFilter>,
    pub group_filters: Vec<ComponentFilter>,
}

impl FeatureFilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.component_filters.is_empty() && self.group_filters.is_empty()
    }

    pub fn find_component_filter(&self, name: &str) -> Option<&ComponentFilter> {
        self.component_filters.iter().find(|f| f.name == name)
    }

    pub fn find_group_filter(&self, name: &str) -> Option<&ComponentFilter> {
        self.group_filters.iter().find(|f| f.name == name)
    }

    pub fn clear(&mut self) {
        self.component_filters.clear();
        self.group_filters.clear();
    }
}

/// Outcome of comparing computed features against reference data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub accuracy: Option<f64>,
    pub recall: Option<f64>,
    pub precision: Option<f64>,
}

impl ValidationMetrics {
    pub fn is_empty(&self) -> bool {
        self.accuracy.is_none() && self.recall.is_none() && self.precision.is_none()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        let mut set = FeatureFilterSet::new();
        set.component_filters.push(ComponentFilter::new("glu-L_1"));
        set.group_filters.push(ComponentFilter::new("glu-L"));
        assert!(set.find_component_filter("glu-L_1").is_some());
        assert!(set.find_group_filter("glu-L").is_some());
        assert!(set.find_component_filter("glu-L").is_none());
        assert!(!set.is_empty());
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_validation_metrics_emptiness() {
        let mut metrics = ValidationMetrics::default();
        assert!(metrics.is_empty());
        metrics.accuracy = Some(0.98);
        assert!(!metrics.is_empty());
        metrics.clear();
        assert!(metrics.is_empty());
    }
}
