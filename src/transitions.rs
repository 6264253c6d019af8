use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// One targeted transition the instrument method monitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetedTransition {
    pub transition_name: String,
    pub transition_group: String,
    pub precursor_mz: f64,
    pub product_mz: f64,
    #[serde(default)]
    pub retention_time: Option<f64>,
}

/// The sequence-wide list of targeted transitions. Shared by reference
/// across every injection of a sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionList {
    pub transitions: Vec<TargetedTransition>,
}

impl TransitionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn find(&self, transition_name: &str) -> Option<&TargetedTransition> {
        self.transitions
            .iter()
            .find(|t| t.transition_name == transition_name)
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.transitions
            .iter()
            .map(|t| t.transition_group.as_str())
            .unique()
            .collect()
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
    }
}

/// Expected outcomes for known samples, consumed by the validation step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub rows: Vec<ReferenceRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRow {
    pub sample_name: String,
    pub component_name: String,
    pub retention_time: f64,
    #[serde(default)]
    pub concentration: Option<f64>,
}

impl ReferenceData {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows_for_sample(&self, sample_name: &str) -> Vec<&ReferenceRow> {
        self.rows
            .iter()
            .filter(|r| r.sample_name == sample_name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_and_groups() {
        let list = TransitionList {
            transitions: vec![
                TargetedTransition {
                    transition_name: "glu-L.glu-L_1.Heavy".into(),
                    transition_group: "glu-L".into(),
                    precursor_mz: 148.0,
                    product_mz: 84.0,
                    retention_time: Some(2.5),
                },
                TargetedTransition {
                    transition_name: "glu-L.glu-L_1.Light".into(),
                    transition_group: "glu-L".into(),
                    precursor_mz: 147.0,
                    product_mz: 84.0,
                    retention_time: None,
                },
            ],
        };
        assert!(list.find("glu-L.glu-L_1.Heavy").is_some());
        assert!(list.find("missing").is_none());
        assert_eq!(list.group_names(), vec!["glu-L"]);
    }

    #[test]
    fn test_reference_rows_by_sample() {
        let data = ReferenceData {
            rows: vec![ReferenceRow {
                sample_name: "s1".into(),
                component_name: "c1".into(),
                retention_time: 1.0,
                concentration: None,
            }],
        };
        assert_eq!(data.rows_for_sample("s1").len(), 1);
        assert!(data.rows_for_sample("s2").is_empty());
    }
}
