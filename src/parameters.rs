use crate::error::CoreError;
use crate::param_value::ParamValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::error;

/// One named, typed, constraint-validated processing parameter.
///
/// A parameter either *is* a schema (a library-declared default with its
/// allowed shape) or is a user-chosen value that may carry a link to the
/// schema it overrides. The link is established by merging and is never
/// serialized; reloading a parameter file and re-merging recreates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    name: String,
    value: ParamValue,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    min: Option<ParamValue>,
    #[serde(default)]
    max: Option<ParamValue>,
    #[serde(default)]
    valid_values: Option<Vec<ParamValue>>,
    #[serde(default)]
    is_schema: bool,
    #[serde(skip)]
    schema: Option<Arc<Parameter>>,
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.value == other.value
            && self.description == other.description
            && self.tags == other.tags
            && self.min == other.min
            && self.max == other.max
            && self.valid_values == other.valid_values
    }
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
            description: String::new(),
            tags: BTreeSet::new(),
            min: None,
            max: None,
            valid_values: None,
            is_schema: false,
            schema: None,
        }
    }

    /// Build from the canonical wire shape: a map of attribute name to
    /// string value, with at least a `name` entry. A `value` without a
    /// `type` is parsed shape-first; with a `type` it is cast, and a failed
    /// cast is reported and leaves the parameter `Uninitialized`.
    pub fn from_attributes(attributes: &BTreeMap<String, String>) -> Result<Self, CoreError> {
        let name = attributes
            .get("name")
            .ok_or_else(|| CoreError::invalid_input("parameter attributes lack a 'name'"))?;
        let mut param = Parameter::new(name.clone(), ParamValue::Uninitialized);
        if let Some(value) = attributes.get("value") {
            match attributes.get("type") {
                Some(type_name) => match ParamValue::cast(value, type_name) {
                    Ok(v) => param.value = v,
                    Err(e) => {
                        error!("parameter '{name}': {e}");
                        param.value = ParamValue::Uninitialized;
                    }
                },
                None => param.value = ParamValue::parse(value),
            }
        }
        if let Some(description) = attributes.get("description") {
            param.description = description.clone();
        }
        // min/max constraints apply to numeric tags only
        let numeric = |v: &ParamValue| {
            matches!(
                v,
                ParamValue::Int(_) | ParamValue::Long(_) | ParamValue::Float(_)
            )
        };
        if let Some(min) = attributes.get("min") {
            let parsed = ParamValue::parse(min);
            if numeric(&parsed) {
                param.min = Some(parsed);
            }
        }
        if let Some(max) = attributes.get("max") {
            let parsed = ParamValue::parse(max);
            if numeric(&parsed) {
                param.max = Some(parsed);
            }
        }
        if let Some(valid_strings) = attributes.get("valid_strings") {
            if let ParamValue::StringList(members) = ParamValue::parse(valid_strings) {
                param.valid_values =
                    Some(members.into_iter().map(ParamValue::String).collect());
            }
        }
        if let Some(tags) = attributes.get("tags") {
            param.tags = tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(param)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ParamValue {
        &self.value
    }

    pub fn set_value(&mut self, value: ParamValue) {
        self.value = value;
    }

    pub fn value_as_string(&self) -> String {
        self.value.to_string()
    }

    /// Re-type a value from free text. A parameter that already has a type
    /// keeps it: text that cannot be cast into that type is reported and
    /// the value becomes `Uninitialized`. An untyped parameter adopts the
    /// parsed shape.
    pub fn set_value_from_string(&mut self, value: &str) {
        if self.value.is_uninitialized() {
            self.value = ParamValue::parse(value);
            return;
        }
        match ParamValue::cast(value, self.value.type_name()) {
            Ok(v) => self.value = v,
            Err(e) => {
                error!("parameter '{}': {e}", self.name);
                self.value = ParamValue::Uninitialized;
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.value.type_name()
    }

    pub fn description(&self) -> &str {
        if self.description.is_empty() {
            if let Some(schema) = &self.schema {
                return schema.description();
            }
        }
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    pub fn set_constraints_min_max(&mut self, min: Option<ParamValue>, max: Option<ParamValue>) {
        self.min = min;
        self.max = max;
    }

    pub fn set_constraints_list(&mut self, valid_values: Vec<ParamValue>) {
        self.valid_values = Some(valid_values);
    }

    pub fn min(&self) -> Option<&ParamValue> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&ParamValue> {
        self.max.as_ref()
    }

    pub fn valid_values(&self) -> Option<&[ParamValue]> {
        self.valid_values.as_deref()
    }

    pub fn is_schema(&self) -> bool {
        self.is_schema
    }

    pub fn set_as_schema(&mut self, is_schema: bool) {
        self.is_schema = is_schema;
    }

    pub fn schema(&self) -> Option<&Arc<Parameter>> {
        self.schema.as_ref()
    }

    pub fn set_schema(&mut self, schema: Parameter) {
        self.schema = Some(Arc::new(schema));
    }

    /// Human-readable rendering of the active constraints.
    pub fn restrictions_as_string(&self, use_schema: bool) -> String {
        if use_schema {
            if let Some(schema) = &self.schema {
                return schema.restrictions_as_string(false);
            }
        }
        if let Some(valid_values) = &self.valid_values {
            let mut out = String::from("[");
            let mut sep = "";
            for v in valid_values {
                out.push_str(sep);
                out.push_str(&v.to_string());
                sep = ",";
            }
            out.push(']');
            return out;
        }
        let mut out = String::new();
        if let Some(min) = &self.min {
            out.push_str(&format!("min:{min}"));
        }
        if let Some(max) = &self.max {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&format!("max:{max}"));
        }
        out
    }

    pub fn is_valid(&self, use_schema: bool) -> bool {
        self.is_valid_value(&self.value, use_schema)
    }

    /// Validity of a candidate value against this parameter's constraints.
    ///
    /// With `use_schema`, a linked schema performs the check against its own
    /// declared type and constraints instead. A tag mismatch is invalid
    /// regardless of magnitude.
    pub fn is_valid_value(&self, value: &ParamValue, use_schema: bool) -> bool {
        if use_schema {
            if let Some(schema) = &self.schema {
                return schema.is_valid_value(value, false);
            }
        }
        if !self.value.same_tag(value) {
            return false;
        }
        if let Some(valid_values) = &self.valid_values {
            return match value {
                ParamValue::String(_) => valid_values.contains(value),
                ParamValue::StringList(members) => members
                    .iter()
                    .all(|m| valid_values.contains(&ParamValue::String(m.clone()))),
                _ => {
                    error!(
                        "parameter '{}' ({}): cannot compare with a string list",
                        self.name,
                        self.type_name()
                    );
                    false
                }
            };
        }
        let mut valid = true;
        if let Some(min) = &self.min {
            valid &= match value.cmp_same_tag(min) {
                Some(ordering) => ordering != std::cmp::Ordering::Less,
                None => match (value.as_float_lossy(), min.as_float_lossy()) {
                    (Some(l), Some(r)) => l >= r,
                    _ => false,
                },
            };
        }
        if let Some(max) = &self.max {
            valid &= match value.cmp_same_tag(max) {
                Some(ordering) => ordering != std::cmp::Ordering::Greater,
                None => match (value.as_float_lossy(), max.as_float_lossy()) {
                    (Some(l), Some(r)) => l <= r,
                    _ => false,
                },
            };
        }
        valid
    }
}

/// The ordered, name-unique parameters owned by one processing function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionParameters {
    function_name: String,
    parameters: Vec<Parameter>,
}

impl FunctionParameters {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            parameters: Vec::new(),
        }
    }

    pub fn from_records(
        function_name: impl Into<String>,
        records: &[BTreeMap<String, String>],
    ) -> Result<Self, CoreError> {
        let mut ret = Self::new(function_name);
        for record in records {
            ret.add_parameter(Parameter::from_attributes(record)?);
        }
        Ok(ret)
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Append unless a parameter of that name already exists.
    pub fn add_parameter(&mut self, parameter: Parameter) {
        if self.find_parameter(parameter.name()).is_none() {
            self.parameters.push(parameter);
        }
    }

    pub fn find_parameter(&self, parameter_name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name() == parameter_name)
    }

    pub fn find_parameter_mut(&mut self, parameter_name: &str) -> Option<&mut Parameter> {
        self.parameters
            .iter_mut()
            .find(|p| p.name() == parameter_name)
    }

    /// Fold `other` into this set. A parameter unknown here is appended;
    /// a parameter known here keeps its value, and when `other`'s copy is a
    /// schema while ours is not, ours gains the schema link. The already
    /// non-schema side is never overwritten, which is what lets a library
    /// default merge under a user override without clobbering it.
    pub fn merge(&mut self, other: &FunctionParameters) {
        for parameter in &other.parameters {
            match self
                .parameters
                .iter()
                .position(|p| p.name() == parameter.name())
            {
                None => self.parameters.push(parameter.clone()),
                Some(i) => {
                    let existing = &mut self.parameters[i];
                    if parameter.is_schema() && !existing.is_schema() {
                        existing.set_schema(parameter.clone());
                    }
                }
            }
        }
    }

    pub fn set_as_schema(&mut self, is_schema: bool) {
        for parameter in &mut self.parameters {
            parameter.set_as_schema(is_schema);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// All parameters of a configuration source, grouped by owning function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    functions: BTreeMap<String, FunctionParameters>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the canonical wire shape: function name to a list of
    /// attribute records.
    pub fn from_table(
        table: &BTreeMap<String, Vec<BTreeMap<String, String>>>,
    ) -> Result<Self, CoreError> {
        let mut ret = Self::new();
        for (function_name, records) in table {
            ret.add_function_parameters(FunctionParameters::from_records(
                function_name.clone(),
                records,
            )?);
        }
        Ok(ret)
    }

    pub fn merge(&mut self, other: &ParameterSet) {
        for (function_name, function_parameters) in &other.functions {
            match self.functions.entry(function_name.clone()) {
                std::collections::btree_map::Entry::Occupied(mut existing) => {
                    existing.get_mut().merge(function_parameters);
                }
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(function_parameters.clone());
                }
            }
        }
    }

    pub fn add_function_parameters(&mut self, function_parameters: FunctionParameters) {
        self.functions.insert(
            function_parameters.function_name().to_string(),
            function_parameters,
        );
    }

    pub fn add_parameter(&mut self, function_name: &str, parameter: Parameter) {
        self.functions
            .entry(function_name.to_string())
            .or_insert_with(|| FunctionParameters::new(function_name))
            .add_parameter(parameter);
    }

    pub fn find_function(&self, function_name: &str) -> Option<&FunctionParameters> {
        self.functions.get(function_name)
    }

    pub fn find_parameter(&self, function_name: &str, parameter_name: &str) -> Option<&Parameter> {
        self.functions
            .get(function_name)?
            .find_parameter(parameter_name)
    }

    pub fn find_parameter_mut(
        &mut self,
        function_name: &str,
        parameter_name: &str,
    ) -> Option<&mut Parameter> {
        self.functions
            .get_mut(function_name)?
            .find_parameter_mut(parameter_name)
    }

    pub fn set_as_schema(&mut self, is_schema: bool) {
        for function_parameters in self.functions.values_mut() {
            function_parameters.set_as_schema(is_schema);
        }
    }

    pub fn clear(&mut self) {
        self.functions.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FunctionParameters)> {
        self.functions.iter()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
