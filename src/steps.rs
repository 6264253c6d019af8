use crate::error::CoreError;
use crate::features::FeatureSet;
use crate::file_bindings::{file_id, FileBindingSet};
use crate::param_value::ParamValue;
use crate::parameters::{FunctionParameters, Parameter, ParameterSet};
use crate::processor::AnalyticalProcessor;
use crate::quant::{CalibrationRecord, QuantitationMethod};
use crate::raw_data::{read, write, RawDataHandle};
use crate::sample_meta::SampleType;
use crate::sequence::{SampleGroup, Sequence, SequenceSegment};
use crate::storage::PersistenceLayer;
use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Collaborators and clock a step runs against. Owned by the engine for
/// the duration of one command-list run.
pub struct StepContext<'a> {
    pub processor: &'a dyn AnalyticalProcessor,
    pub storage: &'a dyn PersistenceLayer,
    pub now: NaiveDateTime,
}

/// A processing step applied to every injection of the sequence.
pub trait RawDataStep: Send + Sync {
    fn name(&self) -> &'static str;

    fn parameter_schema(&self) -> ParameterSet {
        ParameterSet::new()
    }

    /// Symbolic file ids this step reads.
    fn required_inputs(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Symbolic file ids this step writes.
    fn outputs(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn process(
        &self,
        raw_data: &mut RawDataHandle,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError>;
}

/// A processing step applied to every sequence segment.
pub trait SegmentStep: Send + Sync {
    fn name(&self) -> &'static str;

    fn parameter_schema(&self) -> ParameterSet {
        ParameterSet::new()
    }

    fn required_inputs(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn process(
        &self,
        segment: &mut SequenceSegment,
        sequence: &Sequence,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError>;
}

/// A processing step applied to every sample group.
pub trait SampleGroupStep: Send + Sync {
    fn name(&self) -> &'static str;

    fn parameter_schema(&self) -> ParameterSet {
        ParameterSet::new()
    }

    fn required_inputs(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn process(
        &self,
        group: &mut SampleGroup,
        sequence: &mut Sequence,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError>;
}

fn float_param(
    name: &str,
    value: f32,
    description: &str,
    min: Option<f32>,
    max: Option<f32>,
) -> Parameter {
    let mut p = Parameter::new(name, ParamValue::Float(value));
    p.set_description(description);
    p.set_constraints_min_max(min.map(ParamValue::Float), max.map(ParamValue::Float));
    p
}

fn schema(function_name: &str, parameters: Vec<Parameter>) -> ParameterSet {
    let mut fp = FunctionParameters::new(function_name);
    for p in parameters {
        fp.add_parameter(p);
    }
    let mut set = ParameterSet::new();
    set.add_function_parameters(fp);
    set
}

// ---------------------------------------------------------------------------
// raw-data steps

/// Hand the instrument raw file to the external processor for parsing.
pub struct LoadRawData;

impl RawDataStep for LoadRawData {
    fn name(&self) -> &'static str {
        "LOAD_RAW_DATA"
    }

    fn required_inputs(&self) -> Vec<&'static str> {
        vec![file_id::RAW_INPUT]
    }

    fn process(
        &self,
        raw_data: &mut RawDataHandle,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        if !filenames.has(file_id::RAW_INPUT) {
            return Err(CoreError::not_found("no raw-input binding for injection"));
        }
        ctx.processor
            .process_raw_data(self.name(), raw_data, parameters, filenames)
    }
}

/// Rebuild the working feature set from a stored history file.
pub struct LoadFeatures;

impl RawDataStep for LoadFeatures {
    fn name(&self) -> &'static str {
        "LOAD_FEATURES"
    }

    fn required_inputs(&self) -> Vec<&'static str> {
        vec![file_id::FEATURES_INPUT]
    }

    fn process(
        &self,
        raw_data: &mut RawDataHandle,
        _parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        let bytes = ctx.storage.load(file_id::FEATURES_INPUT, filenames)?;
        let history: crate::features::FeatureHistory = serde_json::from_slice(&bytes)?;
        raw_data.set_feature_set(history.to_feature_set());
        raw_data.set_feature_history(history);
        Ok(())
    }
}

/// Detect features in the raw signal.
pub struct PickFeatures;

impl RawDataStep for PickFeatures {
    fn name(&self) -> &'static str {
        "PICK_FEATURES"
    }

    fn parameter_schema(&self) -> ParameterSet {
        schema(
            "FeatureFinder",
            vec![
                float_param(
                    "peak_width",
                    20.0,
                    "expected chromatographic peak width in seconds",
                    Some(0.0),
                    None,
                ),
                float_param(
                    "signal_to_noise",
                    1.0,
                    "minimal signal-to-noise ratio kept",
                    Some(0.0),
                    None,
                ),
            ],
        )
    }

    fn process(
        &self,
        raw_data: &mut RawDataHandle,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        ctx.processor
            .process_raw_data(self.name(), raw_data, parameters, filenames)?;
        let fresh = raw_data.feature_set().clone();
        raw_data.feature_history_mut().reconcile(&fresh, ctx.now);
        Ok(())
    }
}

/// Screen the working set against the segment's feature filters.
pub struct FilterFeatures;

impl RawDataStep for FilterFeatures {
    fn name(&self) -> &'static str {
        "FILTER_FEATURES"
    }

    fn parameter_schema(&self) -> ParameterSet {
        schema(
            "FeatureFilter",
            vec![float_param(
                "flag_or_filter_threshold",
                1.0,
                "fraction of failed checks above which a feature is removed",
                Some(0.0),
                Some(1.0),
            )],
        )
    }

    fn process(
        &self,
        raw_data: &mut RawDataHandle,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        if read(&raw_data.feature_filter()).is_empty() {
            warn!("{}: feature filters are empty", self.name());
        }
        ctx.processor
            .process_raw_data(self.name(), raw_data, parameters, filenames)?;
        let fresh = raw_data.feature_set().clone();
        raw_data.feature_history_mut().reconcile(&fresh, ctx.now);
        Ok(())
    }
}

/// Flag features against the segment's QC bounds.
pub struct CheckFeatures;

impl RawDataStep for CheckFeatures {
    fn name(&self) -> &'static str {
        "CHECK_FEATURES"
    }

    fn process(
        &self,
        raw_data: &mut RawDataHandle,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        ctx.processor
            .process_raw_data(self.name(), raw_data, parameters, filenames)?;
        let fresh = raw_data.feature_set().clone();
        raw_data.feature_history_mut().reconcile(&fresh, ctx.now);
        Ok(())
    }
}

/// Narrow the working set to the best candidate per transition group.
/// Selection does not rewrite the history; it only re-annotates which
/// recorded features are still in use.
pub struct SelectFeatures;

impl RawDataStep for SelectFeatures {
    fn name(&self) -> &'static str {
        "SELECT_FEATURES"
    }

    fn parameter_schema(&self) -> ParameterSet {
        schema(
            "FeatureSelector",
            vec![float_param(
                "retention_time_window",
                30.0,
                "window around the expected retention time",
                Some(0.0),
                None,
            )],
        )
    }

    fn process(
        &self,
        raw_data: &mut RawDataHandle,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        ctx.processor
            .process_raw_data(self.name(), raw_data, parameters, filenames)?;
        let fresh = raw_data.feature_set().clone();
        raw_data.feature_history_mut().annotate_used(&fresh);
        Ok(())
    }
}

/// Compare the working set against the sequence's reference data.
pub struct ValidateFeatures;

impl RawDataStep for ValidateFeatures {
    fn name(&self) -> &'static str {
        "VALIDATE_FEATURES"
    }

    fn parameter_schema(&self) -> ParameterSet {
        schema(
            "FeatureValidator",
            vec![float_param(
                "retention_time_tolerance",
                1.0,
                "maximal retention-time distance for a match",
                Some(0.0),
                None,
            )],
        )
    }

    fn process(
        &self,
        raw_data: &mut RawDataHandle,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        if read(&raw_data.reference_data()).is_empty() {
            return Err(CoreError::invalid_input(
                "cannot validate features without reference data",
            ));
        }
        ctx.processor
            .process_raw_data(self.name(), raw_data, parameters, filenames)?;
        let metrics = raw_data.validation_metrics();
        info!(
            "{}: accuracy={:?} recall={:?} precision={:?}",
            self.name(),
            metrics.accuracy,
            metrics.recall,
            metrics.precision
        );
        Ok(())
    }
}

/// Convert feature responses into concentrations via the segment's
/// quantitation methods.
pub struct QuantifyFeatures;

impl RawDataStep for QuantifyFeatures {
    fn name(&self) -> &'static str {
        "QUANTIFY_FEATURES"
    }

    fn process(
        &self,
        raw_data: &mut RawDataHandle,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        if read(&raw_data.quantitation_methods()).is_empty() {
            warn!("{}: no quantitation methods loaded", self.name());
        }
        ctx.processor
            .process_raw_data(self.name(), raw_data, parameters, filenames)?;
        let fresh = raw_data.feature_set().clone();
        raw_data.feature_history_mut().reconcile(&fresh, ctx.now);
        Ok(())
    }
}

/// Persist the current history (working set included) for this injection.
pub struct StoreFeatures;

impl RawDataStep for StoreFeatures {
    fn name(&self) -> &'static str {
        "STORE_FEATURES"
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![file_id::FEATURES_OUTPUT]
    }

    fn process(
        &self,
        raw_data: &mut RawDataHandle,
        _parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec_pretty(raw_data.feature_history())?;
        ctx.storage
            .store(file_id::FEATURES_OUTPUT, filenames, &bytes)
    }
}

/// Drop the audit trail and the working set for this injection.
pub struct ClearFeatureHistory;

impl RawDataStep for ClearFeatureHistory {
    fn name(&self) -> &'static str {
        "CLEAR_FEATURE_HISTORY"
    }

    fn process(
        &self,
        raw_data: &mut RawDataHandle,
        _parameters: &ParameterSet,
        _filenames: &FileBindingSet,
        _ctx: &StepContext,
    ) -> Result<(), CoreError> {
        raw_data.feature_history_mut().clear();
        raw_data.feature_set_mut().clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// segment steps

/// Fit calibration curves from the segment's standards and refresh the
/// shared quantitation methods in place.
pub struct CalculateCalibration;

impl SegmentStep for CalculateCalibration {
    fn name(&self) -> &'static str {
        "CALCULATE_CALIBRATION"
    }

    fn parameter_schema(&self) -> ParameterSet {
        let mut set = schema(
            "CalibrationFitter",
            vec![float_param(
                "min_points",
                4.0,
                "minimal number of standards for an acceptable fit",
                Some(2.0),
                None,
            )],
        );
        let mut model = Parameter::new(
            "transformation_model",
            ParamValue::String("linear".to_string()),
        );
        model.set_description("regression model fitted through the standards");
        model.set_constraints_list(vec![
            ParamValue::String("linear".to_string()),
            ParamValue::String("quadratic".to_string()),
        ]);
        set.add_parameter("CalibrationFitter", model);
        set
    }

    fn process(
        &self,
        segment: &mut SequenceSegment,
        sequence: &Sequence,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        let standards = segment
            .sample_indices
            .iter()
            .filter_map(|&i| sequence.injections().get(i))
            .filter(|inj| inj.meta.sample_type == SampleType::Standard)
            .count();
        if standards == 0 {
            return Err(CoreError::invalid_input(format!(
                "segment '{}' has no standards to calibrate from",
                segment.name
            )));
        }
        ctx.processor
            .process_segment(self.name(), segment, sequence, parameters, filenames)?;
        // every known method carries a record, fitted or not
        let methods: Vec<QuantitationMethod> =
            read(&segment.quantitation_methods()).clone();
        for method in &methods {
            segment
                .calibration
                .entry(method.component_name.clone())
                .or_insert_with(|| CalibrationRecord::new(method.component_name.clone()));
        }
        info!(
            "{}: segment '{}' calibrated from {standards} standards, {} records",
            self.name(),
            segment.name,
            segment.calibration.len()
        );
        Ok(())
    }
}

/// Replace the segment's shared quantitation methods from a stored file;
/// all co-owning injections observe the update.
pub struct LoadQuantitationMethods;

impl SegmentStep for LoadQuantitationMethods {
    fn name(&self) -> &'static str {
        "LOAD_QUANTITATION_METHODS"
    }

    fn required_inputs(&self) -> Vec<&'static str> {
        vec![file_id::QUANTITATION_METHODS]
    }

    fn process(
        &self,
        segment: &mut SequenceSegment,
        _sequence: &Sequence,
        _parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        let bytes = ctx.storage.load(file_id::QUANTITATION_METHODS, filenames)?;
        let methods: Vec<QuantitationMethod> = serde_json::from_slice(&bytes)?;
        // update through the shared handle, not a replacement handle
        *write(&segment.quantitation_methods()) = methods;
        Ok(())
    }
}

/// Persist the segment's shared quantitation methods.
pub struct StoreQuantitationMethods;

impl SegmentStep for StoreQuantitationMethods {
    fn name(&self) -> &'static str {
        "STORE_QUANTITATION_METHODS"
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![file_id::QUANTITATION_METHODS]
    }

    fn process(
        &self,
        segment: &mut SequenceSegment,
        _sequence: &Sequence,
        _parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec_pretty(&*read(&segment.quantitation_methods()))?;
        ctx.storage
            .store(file_id::QUANTITATION_METHODS, filenames, &bytes)
    }
}

// ---------------------------------------------------------------------------
// sample-group steps

/// Union the working sets of a group's injections into its first member,
/// folding the merge into that member's history.
pub struct MergeInjections;

impl SampleGroupStep for MergeInjections {
    fn name(&self) -> &'static str {
        "MERGE_INJECTIONS"
    }

    fn process(
        &self,
        group: &mut SampleGroup,
        sequence: &mut Sequence,
        _parameters: &ParameterSet,
        _filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        let Some(&first_index) = group.sample_indices.first() else {
            return Err(CoreError::invalid_input(format!(
                "sample group '{}' has no members",
                group.name
            )));
        };
        let mut merged = FeatureSet::new();
        for &index in &group.sample_indices {
            let Some(injection) = sequence.injections().get(index) else {
                return Err(CoreError::internal(format!(
                    "sample group '{}' refers to missing injection {index}",
                    group.name
                )));
            };
            for feature in &injection.raw_data.feature_set().features {
                if merged.find(feature.unique_id).is_none() {
                    merged.features.push(feature.clone());
                }
            }
        }
        info!(
            "{}: group '{}' merged into {} features",
            self.name(),
            group.name,
            merged.len()
        );
        let first = &mut sequence.injections_mut()[first_index];
        first.raw_data.feature_history_mut().reconcile(&merged, ctx.now);
        first.raw_data.set_feature_set(merged);
        Ok(())
    }
}

/// Persist the merged working set of a group (its first member's).
pub struct StoreFeaturesSampleGroup;

impl SampleGroupStep for StoreFeaturesSampleGroup {
    fn name(&self) -> &'static str {
        "STORE_FEATURES_SAMPLE_GROUP"
    }

    fn outputs(&self) -> Vec<&'static str> {
        vec![file_id::FEATURES_OUTPUT]
    }

    fn process(
        &self,
        group: &mut SampleGroup,
        sequence: &mut Sequence,
        _parameters: &ParameterSet,
        filenames: &FileBindingSet,
        ctx: &StepContext,
    ) -> Result<(), CoreError> {
        let Some(&first_index) = group.sample_indices.first() else {
            return Err(CoreError::invalid_input(format!(
                "sample group '{}' has no members",
                group.name
            )));
        };
        let Some(injection) = sequence.injections().get(first_index) else {
            return Err(CoreError::internal(format!(
                "sample group '{}' refers to missing injection {first_index}",
                group.name
            )));
        };
        let bytes = serde_json::to_vec_pretty(injection.raw_data.feature_set())?;
        ctx.storage
            .store(file_id::FEATURES_OUTPUT, filenames, &bytes)
    }
}

// ---------------------------------------------------------------------------
// registries

lazy_static! {
    pub static ref RAW_DATA_STEPS: BTreeMap<&'static str, Arc<dyn RawDataStep>> = {
        let mut m: BTreeMap<&'static str, Arc<dyn RawDataStep>> = BTreeMap::new();
        m.insert("LOAD_RAW_DATA", Arc::new(LoadRawData));
        m.insert("LOAD_FEATURES", Arc::new(LoadFeatures));
        m.insert("PICK_FEATURES", Arc::new(PickFeatures));
        m.insert("FILTER_FEATURES", Arc::new(FilterFeatures));
        m.insert("CHECK_FEATURES", Arc::new(CheckFeatures));
        m.insert("SELECT_FEATURES", Arc::new(SelectFeatures));
        m.insert("VALIDATE_FEATURES", Arc::new(ValidateFeatures));
        m.insert("QUANTIFY_FEATURES", Arc::new(QuantifyFeatures));
        m.insert("STORE_FEATURES", Arc::new(StoreFeatures));
        m.insert("CLEAR_FEATURE_HISTORY", Arc::new(ClearFeatureHistory));
        m
    };
    pub static ref SEGMENT_STEPS: BTreeMap<&'static str, Arc<dyn SegmentStep>> = {
        let mut m: BTreeMap<&'static str, Arc<dyn SegmentStep>> = BTreeMap::new();
        m.insert("CALCULATE_CALIBRATION", Arc::new(CalculateCalibration));
        m.insert("LOAD_QUANTITATION_METHODS", Arc::new(LoadQuantitationMethods));
        m.insert("STORE_QUANTITATION_METHODS", Arc::new(StoreQuantitationMethods));
        m
    };
    pub static ref SAMPLE_GROUP_STEPS: BTreeMap<&'static str, Arc<dyn SampleGroupStep>> = {
        let mut m: BTreeMap<&'static str, Arc<dyn SampleGroupStep>> = BTreeMap::new();
        m.insert("MERGE_INJECTIONS", Arc::new(MergeInjections));
        m.insert("STORE_FEATURES_SAMPLE_GROUP", Arc::new(StoreFeaturesSampleGroup));
        m
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Feature;
    use crate::processor::NullProcessor;
    use crate::sample_meta::SampleMetadata;
    use crate::storage::LocalStorage;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn ctx<'a>(processor: &'a NullProcessor, storage: &'a LocalStorage) -> StepContext<'a> {
        StepContext {
            processor,
            storage,
            now: now(),
        }
    }

    fn meta(sample: &str, segment: &str, sample_type: SampleType) -> SampleMetadata {
        let mut m = SampleMetadata::new(sample);
        m.sample_group_name = "g1".to_string();
        m.sequence_segment_name = segment.to_string();
        m.filename = format!("{sample}.mzML");
        m.sample_type = sample_type;
        m
    }

    #[test]
    fn test_registries_are_disjoint() {
        for name in RAW_DATA_STEPS.keys() {
            assert!(!SEGMENT_STEPS.contains_key(name));
            assert!(!SAMPLE_GROUP_STEPS.contains_key(name));
        }
        for name in SEGMENT_STEPS.keys() {
            assert!(!SAMPLE_GROUP_STEPS.contains_key(name));
        }
    }

    #[test]
    fn test_registry_names_match_step_names() {
        for (name, step) in RAW_DATA_STEPS.iter() {
            assert_eq!(*name, step.name());
        }
        for (name, step) in SEGMENT_STEPS.iter() {
            assert_eq!(*name, step.name());
        }
        for (name, step) in SAMPLE_GROUP_STEPS.iter() {
            assert_eq!(*name, step.name());
        }
    }

    #[test]
    fn test_store_then_load_features_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let processor = NullProcessor;
        let storage = LocalStorage;
        let ctx = ctx(&processor, &storage);

        let mut raw_data = RawDataHandle::new();
        let fresh = FeatureSet::from_features(vec![Feature::with_components(1, "g", &["a"])]);
        raw_data.feature_history_mut().reconcile(&fresh, now());
        raw_data.set_feature_set(fresh);

        let mut filenames = FileBindingSet::new();
        let path = dir.path().join("inj1.features.json");
        filenames.set_full_path(file_id::FEATURES_OUTPUT, &path);
        filenames.set_full_path(file_id::FEATURES_INPUT, &path);

        StoreFeatures
            .process(&mut raw_data, &ParameterSet::new(), &filenames, &ctx)
            .unwrap();

        let mut reloaded = RawDataHandle::new();
        LoadFeatures
            .process(&mut reloaded, &ParameterSet::new(), &filenames, &ctx)
            .unwrap();
        assert_eq!(reloaded.feature_history().len(), 1);
        assert_eq!(reloaded.feature_set().len(), 1);
    }

    #[test]
    fn test_clear_feature_history_step() {
        let processor = NullProcessor;
        let storage = LocalStorage;
        let ctx = ctx(&processor, &storage);
        let mut raw_data = RawDataHandle::new();
        let fresh = FeatureSet::from_features(vec![Feature::with_components(1, "g", &["a"])]);
        raw_data.feature_history_mut().reconcile(&fresh, now());
        raw_data.set_feature_set(fresh);
        ClearFeatureHistory
            .process(&mut raw_data, &ParameterSet::new(), &FileBindingSet::new(), &ctx)
            .unwrap();
        assert!(raw_data.feature_history().is_empty());
        assert!(raw_data.feature_set().is_empty());
    }

    #[test]
    fn test_validate_features_requires_reference_data() {
        let processor = NullProcessor;
        let storage = LocalStorage;
        let ctx = ctx(&processor, &storage);
        let mut raw_data = RawDataHandle::new();
        let err = ValidateFeatures
            .process(&mut raw_data, &ParameterSet::new(), &FileBindingSet::new(), &ctx)
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidInput);
    }

    #[test]
    fn test_calibration_requires_standards() {
        let processor = NullProcessor;
        let storage = LocalStorage;
        let ctx = ctx(&processor, &storage);
        let mut sequence = Sequence::new();
        sequence
            .add_injection(meta("s1", "seg1", SampleType::Unknown), FeatureSet::new(), now())
            .unwrap();
        let mut segment = sequence.segments()[0].clone();
        let err = CalculateCalibration
            .process(
                &mut segment,
                &sequence,
                &ParameterSet::new(),
                &FileBindingSet::new(),
                &ctx,
            )
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidInput);
    }

    #[test]
    fn test_calibration_creates_records_per_method() {
        let processor = NullProcessor;
        let storage = LocalStorage;
        let ctx = ctx(&processor, &storage);
        let mut sequence = Sequence::new();
        sequence
            .add_injection(
                meta("std1", "seg1", SampleType::Standard),
                FeatureSet::new(),
                now(),
            )
            .unwrap();
        let mut segment = sequence.segments()[0].clone();
        write(&segment.quantitation_methods()).push(QuantitationMethod::new("glu-L"));
        CalculateCalibration
            .process(
                &mut segment,
                &sequence,
                &ParameterSet::new(),
                &FileBindingSet::new(),
                &ctx,
            )
            .unwrap();
        assert!(segment.calibration.contains_key("glu-L"));
        assert!(segment.calibration["glu-L"].outlier_points.is_empty());
        assert!(segment.calibration["glu-L"].excluded_points.is_empty());
    }

    #[test]
    fn test_load_quantitation_methods_updates_co_owners_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let processor = NullProcessor;
        let storage = LocalStorage;
        let ctx = ctx(&processor, &storage);
        let mut sequence = Sequence::new();
        sequence
            .add_injection(meta("s1", "seg1", SampleType::Unknown), FeatureSet::new(), now())
            .unwrap();

        let path = dir.path().join("seg1_quantitationMethods.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&vec![QuantitationMethod::new("glu-L")]).unwrap(),
        )
        .unwrap();
        let mut filenames = FileBindingSet::new();
        filenames.set_full_path(file_id::QUANTITATION_METHODS, &path);

        let mut segment = sequence.segments()[0].clone();
        LoadQuantitationMethods
            .process(
                &mut segment,
                &sequence,
                &ParameterSet::new(),
                &filenames,
                &ctx,
            )
            .unwrap();
        // the injection co-owns the handle, so it observes the load
        let injection = &sequence.injections()[0];
        assert_eq!(read(&injection.raw_data.quantitation_methods()).len(), 1);
    }

    #[test]
    fn test_merge_injections_unions_by_unique_id() {
        let processor = NullProcessor;
        let storage = LocalStorage;
        let ctx = ctx(&processor, &storage);
        let mut sequence = Sequence::new();
        sequence
            .add_injection(
                meta("s1", "seg1", SampleType::Unknown),
                FeatureSet::from_features(vec![
                    Feature::with_components(1, "g", &["a"]),
                    Feature::with_components(2, "g", &["b"]),
                ]),
                now(),
            )
            .unwrap();
        sequence
            .add_injection(
                meta("s2", "seg1", SampleType::Unknown),
                FeatureSet::from_features(vec![
                    Feature::with_components(2, "g", &["b"]),
                    Feature::with_components(3, "g", &["c"]),
                ]),
                now(),
            )
            .unwrap();
        let mut group = sequence.sample_groups()[0].clone();
        MergeInjections
            .process(
                &mut group,
                &mut sequence,
                &ParameterSet::new(),
                &FileBindingSet::new(),
                &ctx,
            )
            .unwrap();
        let first = &sequence.injections()[0];
        assert_eq!(first.raw_data.feature_set().len(), 3);
        assert_eq!(first.raw_data.feature_history().unique_ids().len(), 3);
    }

    #[test]
    fn test_select_features_annotates_instead_of_reconciling() {
        let processor = NullProcessor;
        let storage = LocalStorage;
        let ctx = ctx(&processor, &storage);
        let mut raw_data = RawDataHandle::new();
        let both = FeatureSet::from_features(vec![
            Feature::with_components(1, "g", &["a"]),
            Feature::with_components(2, "g", &["b"]),
        ]);
        raw_data.feature_history_mut().reconcile(&both, now());
        // the working set was narrowed to feature 1 by an earlier caller
        raw_data.set_feature_set(FeatureSet::from_features(vec![
            Feature::with_components(1, "g", &["a"]),
        ]));
        SelectFeatures
            .process(&mut raw_data, &ParameterSet::new(), &FileBindingSet::new(), &ctx)
            .unwrap();
        let history = raw_data.feature_history();
        assert!(history.find(1).unwrap().components[0].used);
        assert!(!history.find(2).unwrap().components[0].used);
        // annotate leaves the original stamps alone
        assert!(history
            .records
            .iter()
            .flat_map(|r| &r.components)
            .all(|c| c.modified_at == now()));
    }

    #[test]
    fn test_pick_features_schema_carries_constraints() {
        let schema = PickFeatures.parameter_schema();
        let p = schema.find_parameter("FeatureFinder", "peak_width").unwrap();
        assert_eq!(p.min(), Some(&ParamValue::Float(0.0)));
        assert!(p.is_valid_value(&ParamValue::Float(5.0), false));
        assert!(!p.is_valid_value(&ParamValue::Float(-1.0), false));
    }
}
