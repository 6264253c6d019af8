use crate::features::{FeatureHistory, FeatureSet};
use crate::parameters::ParameterSet;
use crate::qc::{FeatureFilterSet, ValidationMetrics};
use crate::quant::QuantitationMethod;
use crate::transitions::{ReferenceData, TransitionList};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared-ownership handle for configuration resources that fan out across
/// injections. Mutating through any co-owner is visible to all of them.
pub type Shared<T> = Arc<RwLock<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

/// Read guard that survives a poisoned lock (a panic in another holder
/// leaves the data intact for our single-writer discipline).
pub fn read<T>(handle: &Shared<T>) -> RwLockReadGuard<'_, T> {
    handle.read().unwrap_or_else(|e| e.into_inner())
}

pub fn write<T>(handle: &Shared<T>) -> RwLockWriteGuard<'_, T> {
    handle.write().unwrap_or_else(|e| e.into_inner())
}

/// Per-injection data: exclusive results plus references to the
/// configuration resources the injection shares with its sequence
/// (parameters, transitions, reference data) and its segment
/// (quantitation methods and the four screening categories).
///
/// Each shared resource has a setter pair: `set_x` copies a value in and
/// makes this handle the sole owner of a fresh instance; `set_x_shared`
/// adopts an existing reference and co-owns it.
#[derive(Debug, Clone, Default)]
pub struct RawDataHandle {
    // exclusive results
    feature_set: FeatureSet,
    feature_history: FeatureHistory,
    validation_metrics: ValidationMetrics,
    // sequence-shared configuration
    parameters: Shared<ParameterSet>,
    transitions: Shared<TransitionList>,
    reference_data: Shared<ReferenceData>,
    // segment-shared configuration
    quantitation_methods: Shared<Vec<QuantitationMethod>>,
    feature_filter: Shared<FeatureFilterSet>,
    feature_qc: Shared<FeatureFilterSet>,
    rsd_estimations: Shared<FeatureFilterSet>,
    background_estimations: Shared<FeatureFilterSet>,
}

macro_rules! shared_accessors {
    ($field:ident, $set:ident, $set_shared:ident, $ty:ty) => {
        pub fn $field(&self) -> Shared<$ty> {
            Arc::clone(&self.$field)
        }

        /// Copy in: become sole owner of a new instance.
        pub fn $set(&mut self, value: $ty) {
            self.$field = shared(value);
        }

        /// Adopt: co-own an existing shared instance.
        pub fn $set_shared(&mut self, handle: Shared<$ty>) {
            self.$field = handle;
        }
    };
}

impl RawDataHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feature_set(&self) -> &FeatureSet {
        &self.feature_set
    }

    pub fn feature_set_mut(&mut self) -> &mut FeatureSet {
        &mut self.feature_set
    }

    pub fn set_feature_set(&mut self, feature_set: FeatureSet) {
        self.feature_set = feature_set;
    }

    pub fn feature_history(&self) -> &FeatureHistory {
        &self.feature_history
    }

    pub fn feature_history_mut(&mut self) -> &mut FeatureHistory {
        &mut self.feature_history
    }

    pub fn set_feature_history(&mut self, feature_history: FeatureHistory) {
        self.feature_history = feature_history;
    }

    pub fn validation_metrics(&self) -> &ValidationMetrics {
        &self.validation_metrics
    }

    pub fn validation_metrics_mut(&mut self) -> &mut ValidationMetrics {
        &mut self.validation_metrics
    }

    shared_accessors!(parameters, set_parameters, set_parameters_shared, ParameterSet);
    shared_accessors!(transitions, set_transitions, set_transitions_shared, TransitionList);
    shared_accessors!(
        reference_data,
        set_reference_data,
        set_reference_data_shared,
        ReferenceData
    );
    shared_accessors!(
        quantitation_methods,
        set_quantitation_methods,
        set_quantitation_methods_shared,
        Vec<QuantitationMethod>
    );
    shared_accessors!(
        feature_filter,
        set_feature_filter,
        set_feature_filter_shared,
        FeatureFilterSet
    );
    shared_accessors!(feature_qc, set_feature_qc, set_feature_qc_shared, FeatureFilterSet);
    shared_accessors!(
        rsd_estimations,
        set_rsd_estimations,
        set_rsd_estimations_shared,
        FeatureFilterSet
    );
    shared_accessors!(
        background_estimations,
        set_background_estimations,
        set_background_estimations_shared,
        FeatureFilterSet
    );

    /// Reset exclusive results and re-home every shared reference to a
    /// fresh empty instance, so detaching this handle never mutates the
    /// resources its former co-owners still hold.
    pub fn clear(&mut self) {
        self.feature_set.clear();
        self.feature_history.clear();
        self.validation_metrics.clear();
        self.parameters = shared(ParameterSet::new());
        self.transitions = shared(TransitionList::new());
        self.reference_data = shared(ReferenceData::default());
        self.quantitation_methods = shared(Vec::new());
        self.feature_filter = shared(FeatureFilterSet::new());
        self.feature_qc = shared(FeatureFilterSet::new());
        self.rsd_estimations = shared(FeatureFilterSet::new());
        self.background_estimations = shared(FeatureFilterSet::new());
    }
}
