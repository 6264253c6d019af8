use crate::error::CoreError;
use crate::features::FeatureSet;
use crate::qc::FeatureFilterSet;
use crate::quant::{CalibrationRecord, QuantitationMethod};
use crate::raw_data::{shared, RawDataHandle, Shared};
use crate::sample_meta::SampleMetadata;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use tracing::debug;

/// One analytical-instrument run: its identity plus its raw-data handle.
#[derive(Debug, Clone, Default)]
pub struct Injection {
    pub meta: SampleMetadata,
    pub raw_data: RawDataHandle,
}

impl Injection {
    pub fn injection_name(&self) -> String {
        self.meta.injection_name()
    }
}

/// A named sub-group of injections sharing segment-scoped configuration
/// (one calibration set). Holds the canonical shared handles its member
/// injections co-own.
#[derive(Debug, Clone)]
pub struct SequenceSegment {
    pub name: String,
    pub sample_indices: Vec<usize>,
    quantitation_methods: Shared<Vec<QuantitationMethod>>,
    feature_filter: Shared<FeatureFilterSet>,
    feature_qc: Shared<FeatureFilterSet>,
    rsd_estimations: Shared<FeatureFilterSet>,
    background_estimations: Shared<FeatureFilterSet>,
    pub calibration: BTreeMap<String, CalibrationRecord>,
}

impl SequenceSegment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sample_indices: Vec::new(),
            quantitation_methods: shared(Vec::new()),
            feature_filter: shared(FeatureFilterSet::new()),
            feature_qc: shared(FeatureFilterSet::new()),
            rsd_estimations: shared(FeatureFilterSet::new()),
            background_estimations: shared(FeatureFilterSet::new()),
            calibration: BTreeMap::new(),
        }
    }

    pub fn quantitation_methods(&self) -> Shared<Vec<QuantitationMethod>> {
        std::sync::Arc::clone(&self.quantitation_methods)
    }

    pub fn feature_filter(&self) -> Shared<FeatureFilterSet> {
        std::sync::Arc::clone(&self.feature_filter)
    }

    pub fn feature_qc(&self) -> Shared<FeatureFilterSet> {
        std::sync::Arc::clone(&self.feature_qc)
    }

    pub fn rsd_estimations(&self) -> Shared<FeatureFilterSet> {
        std::sync::Arc::clone(&self.rsd_estimations)
    }

    pub fn background_estimations(&self) -> Shared<FeatureFilterSet> {
        std::sync::Arc::clone(&self.background_estimations)
    }

    /// Hand this segment's shared handles to an injection joining it.
    fn attach(&self, raw_data: &mut RawDataHandle) {
        raw_data.set_quantitation_methods_shared(self.quantitation_methods());
        raw_data.set_feature_filter_shared(self.feature_filter());
        raw_data.set_feature_qc_shared(self.feature_qc());
        raw_data.set_rsd_estimations_shared(self.rsd_estimations());
        raw_data.set_background_estimations_shared(self.background_estimations());
    }
}

/// A named group of related samples processed together by sample-group
/// steps (e.g. replicates to merge).
#[derive(Debug, Clone, Default)]
pub struct SampleGroup {
    pub name: String,
    pub sample_indices: Vec<usize>,
}

impl SampleGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sample_indices: Vec::new(),
        }
    }
}

/// The ordered collection of all injections in a session, partitioned into
/// sequence segments and sample groups. Built once per session; injections
/// and their groupings are appended together, row by row.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    injections: Vec<Injection>,
    segments: Vec<SequenceSegment>,
    sample_groups: Vec<SampleGroup>,
    workflow: Vec<String>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn injections(&self) -> &[Injection] {
        &self.injections
    }

    pub fn injections_mut(&mut self) -> &mut [Injection] {
        &mut self.injections
    }

    pub fn segments(&self) -> &[SequenceSegment] {
        &self.segments
    }

    pub fn set_segments(&mut self, segments: Vec<SequenceSegment>) {
        self.segments = segments;
    }

    pub fn sample_groups(&self) -> &[SampleGroup] {
        &self.sample_groups
    }

    pub fn set_sample_groups(&mut self, sample_groups: Vec<SampleGroup>) {
        self.sample_groups = sample_groups;
    }

    pub fn workflow(&self) -> &[String] {
        &self.workflow
    }

    pub fn set_workflow(&mut self, workflow: Vec<String>) {
        self.workflow = workflow;
    }

    pub fn is_empty(&self) -> bool {
        self.injections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.injections.len()
    }

    pub fn find_segment(&self, name: &str) -> Option<&SequenceSegment> {
        self.segments.iter().find(|s| s.name == name)
    }

    pub fn find_sample_group(&self, name: &str) -> Option<&SampleGroup> {
        self.sample_groups.iter().find(|g| g.name == name)
    }

    /// Select injections by their injection names, in the order given.
    pub fn injections_named(&self, names: &[String]) -> Vec<&Injection> {
        names
            .iter()
            .filter_map(|name| {
                self.injections
                    .iter()
                    .find(|i| &i.injection_name() == name)
            })
            .collect()
    }

    /// Append one sample row: validate its metadata, bootstrap its raw-data
    /// handle from the passed feature set, and wire up shared ownership.
    ///
    /// The first injection creates the sequence-wide parameter, transition
    /// and reference-data instances; later injections adopt them from
    /// injection zero. The declared segment name selects (or creates) the
    /// segment whose quantitation/screening handles the injection co-owns,
    /// and the declared group name does the same for sample groups.
    pub fn add_injection(
        &mut self,
        meta: SampleMetadata,
        feature_set: FeatureSet,
        now: NaiveDateTime,
    ) -> Result<(), CoreError> {
        if !meta.validate() {
            return Err(CoreError::invalid_input(format!(
                "sample metadata for '{}' is not valid",
                meta.sample_name
            )));
        }

        let mut raw_data = RawDataHandle::new();
        raw_data.feature_history_mut().reconcile(&feature_set, now);
        raw_data.set_feature_set(feature_set);

        if let Some(first) = self.injections.first() {
            raw_data.set_parameters_shared(first.raw_data.parameters());
            raw_data.set_transitions_shared(first.raw_data.transitions());
            raw_data.set_reference_data_shared(first.raw_data.reference_data());
        }

        let index = self.injections.len();
        match self
            .segments
            .iter()
            .position(|s| s.name == meta.sequence_segment_name)
        {
            Some(i) => {
                let segment = &mut self.segments[i];
                segment.sample_indices.push(index);
                segment.attach(&mut raw_data);
            }
            None => {
                debug!("creating sequence segment '{}'", meta.sequence_segment_name);
                let mut segment = SequenceSegment::new(meta.sequence_segment_name.clone());
                segment.sample_indices.push(index);
                segment.attach(&mut raw_data);
                self.segments.push(segment);
            }
        }

        match self
            .sample_groups
            .iter()
            .position(|g| g.name == meta.sample_group_name)
        {
            Some(i) => self.sample_groups[i].sample_indices.push(index),
            None => {
                debug!("creating sample group '{}'", meta.sample_group_name);
                let mut group = SampleGroup::new(meta.sample_group_name.clone());
                group.sample_indices.push(index);
                self.sample_groups.push(group);
            }
        }

        self.injections.push(Injection { meta, raw_data });
        Ok(())
    }

    /// Session close: drop everything, groupings and workflow included.
    pub fn clear(&mut self) {
        self.injections.clear();
        self.segments.clear();
        self.sample_groups.clear();
        self.workflow.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param_value::ParamValue;
    use crate::parameters::Parameter;
    use crate::raw_data::{read, write};
    use crate::sample_meta::SampleType;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn meta(sample: &str, segment: &str, group: &str) -> SampleMetadata {
        let mut m = SampleMetadata::new(sample);
        m.sample_group_name = group.to_string();
        m.sequence_segment_name = segment.to_string();
        m.filename = format!("{sample}.mzML");
        m.sample_type = SampleType::Unknown;
        m
    }

    fn two_injection_sequence() -> Sequence {
        let mut sequence = Sequence::new();
        sequence
            .add_injection(meta("s1", "seg1", "g1"), FeatureSet::new(), now())
            .unwrap();
        sequence
            .add_injection(meta("s2", "seg1", "g1"), FeatureSet::new(), now())
            .unwrap();
        sequence
    }

    #[test]
    fn test_invalid_metadata_is_rejected() {
        let mut sequence = Sequence::new();
        let err = sequence
            .add_injection(SampleMetadata::default(), FeatureSet::new(), now())
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidInput);
        assert!(sequence.is_empty());
    }

    #[test]
    fn test_segments_partition_by_declared_name() {
        let mut sequence = Sequence::new();
        sequence
            .add_injection(meta("s1", "seg1", "g1"), FeatureSet::new(), now())
            .unwrap();
        sequence
            .add_injection(meta("s2", "seg2", "g1"), FeatureSet::new(), now())
            .unwrap();
        sequence
            .add_injection(meta("s3", "seg1", "g2"), FeatureSet::new(), now())
            .unwrap();
        assert_eq!(sequence.segments().len(), 2);
        assert_eq!(sequence.find_segment("seg1").unwrap().sample_indices, vec![0, 2]);
        assert_eq!(sequence.find_segment("seg2").unwrap().sample_indices, vec![1]);
        assert_eq!(sequence.sample_groups().len(), 2);
        assert_eq!(
            sequence.find_sample_group("g1").unwrap().sample_indices,
            vec![0, 1]
        );
    }

    #[test]
    fn test_sequence_wide_parameters_are_shared() {
        let sequence = two_injection_sequence();
        let first = &sequence.injections()[0];
        let second = &sequence.injections()[1];
        write(&first.raw_data.parameters())
            .add_parameter("FeatureFinder", Parameter::new("n", ParamValue::Int(7)));
        assert!(read(&second.raw_data.parameters())
            .find_parameter("FeatureFinder", "n")
            .is_some());
    }

    #[test]
    fn test_segment_scoped_resources_are_not_shared_across_segments() {
        let mut sequence = Sequence::new();
        sequence
            .add_injection(meta("s1", "seg1", "g1"), FeatureSet::new(), now())
            .unwrap();
        sequence
            .add_injection(meta("s2", "seg2", "g1"), FeatureSet::new(), now())
            .unwrap();
        let first = &sequence.injections()[0];
        let second = &sequence.injections()[1];
        write(&first.raw_data.feature_filter())
            .component_filters
            .push(crate::qc::ComponentFilter::new("c1"));
        assert!(read(&second.raw_data.feature_filter()).is_empty());
    }

    #[test]
    fn test_same_segment_injections_share_screening_sets() {
        let sequence = two_injection_sequence();
        let first = &sequence.injections()[0];
        let second = &sequence.injections()[1];
        write(&first.raw_data.feature_qc())
            .component_filters
            .push(crate::qc::ComponentFilter::new("c1"));
        assert_eq!(
            read(&second.raw_data.feature_qc()).component_filters.len(),
            1
        );
        // and the segment's own handle observes it too
        assert_eq!(
            read(&sequence.find_segment("seg1").unwrap().feature_qc())
                .component_filters
                .len(),
            1
        );
    }

    #[test]
    fn test_history_bootstraps_from_initial_feature_set() {
        let mut sequence = Sequence::new();
        let features = FeatureSet::from_features(vec![
            crate::features::Feature::with_components(1, "g", &["a"]),
        ]);
        sequence
            .add_injection(meta("s1", "seg1", "g1"), features, now())
            .unwrap();
        let injection = &sequence.injections()[0];
        assert_eq!(injection.raw_data.feature_history().len(), 1);
        assert_eq!(injection.raw_data.feature_set().len(), 1);
    }

    #[test]
    fn test_injections_named_selects_in_given_order() {
        let sequence = two_injection_sequence();
        let names = vec![
            sequence.injections()[1].injection_name(),
            sequence.injections()[0].injection_name(),
        ];
        let picked = sequence.injections_named(&names);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].meta.sample_name, "s2");
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut sequence = two_injection_sequence();
        sequence.set_workflow(vec!["PICK_FEATURES".to_string()]);
        sequence.clear();
        assert!(sequence.is_empty());
        assert!(sequence.segments().is_empty());
        assert!(sequence.sample_groups().is_empty());
        assert!(sequence.workflow().is_empty());
    }
}
