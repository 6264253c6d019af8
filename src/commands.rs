use crate::error::CoreError;
use crate::file_bindings::{
    default_group_bindings, default_injection_bindings, FileBindingSet, Tag,
};
use crate::parameters::ParameterSet;
use crate::sequence::Sequence;
use crate::steps::{
    RawDataStep, SampleGroupStep, SegmentStep, RAW_DATA_STEPS, SAMPLE_GROUP_STEPS, SEGMENT_STEPS,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

/// Which entity collection a command dispatches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    RawData,
    Segment,
    SampleGroup,
}

/// A resolved work unit: one step bound to its target entity kind, with
/// one file-binding set per entity it will be applied to. Owned by the
/// engine once built; never shared.
pub enum Command {
    RawData {
        step: Arc<dyn RawDataStep>,
        bindings: BTreeMap<String, FileBindingSet>,
    },
    Segment {
        step: Arc<dyn SegmentStep>,
        bindings: BTreeMap<String, FileBindingSet>,
    },
    SampleGroup {
        step: Arc<dyn SampleGroupStep>,
        bindings: BTreeMap<String, FileBindingSet>,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::RawData { .. } => CommandKind::RawData,
            Command::Segment { .. } => CommandKind::Segment,
            Command::SampleGroup { .. } => CommandKind::SampleGroup,
        }
    }

    pub fn step_name(&self) -> &'static str {
        match self {
            Command::RawData { step, .. } => step.name(),
            Command::Segment { step, .. } => step.name(),
            Command::SampleGroup { step, .. } => step.name(),
        }
    }

    pub fn bindings(&self) -> &BTreeMap<String, FileBindingSet> {
        match self {
            Command::RawData { bindings, .. }
            | Command::Segment { bindings, .. }
            | Command::SampleGroup { bindings, .. } => bindings,
        }
    }

    pub fn parameter_schema(&self) -> ParameterSet {
        match self {
            Command::RawData { step, .. } => step.parameter_schema(),
            Command::Segment { step, .. } => step.parameter_schema(),
            Command::SampleGroup { step, .. } => step.parameter_schema(),
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind())
            .field("step", &self.step_name())
            .field("entities", &self.bindings().len())
            .finish()
    }
}

/// Directory layout the per-entity file bindings are templated over.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandBuilder {
    pub main_dir: String,
    pub raw_input_dir: String,
    pub features_input_dir: String,
    pub features_output_dir: String,
}

impl CommandBuilder {
    pub fn new(main_dir: impl Into<String>) -> Self {
        let main_dir = main_dir.into();
        Self {
            raw_input_dir: format!("{main_dir}/raw"),
            features_input_dir: format!("{main_dir}/features"),
            features_output_dir: format!("{main_dir}/features"),
            main_dir,
        }
    }

    fn apply_dirs(&self, filenames: &mut FileBindingSet) {
        filenames.set_tag(Tag::MainDir, self.main_dir.clone());
        filenames.set_tag(Tag::RawInputPath, self.raw_input_dir.clone());
        filenames.set_tag(Tag::FeaturesInputPath, self.features_input_dir.clone());
        filenames.set_tag(Tag::FeaturesOutputPath, self.features_output_dir.clone());
    }

    /// Resolve one step name, case-insensitively, against the raw-data,
    /// segment and sample-group tables in that priority order, binding it
    /// per entity of the matching collection.
    pub fn create_command(
        &self,
        sequence: &Sequence,
        name: &str,
    ) -> Result<Command, CoreError> {
        let wanted = name.trim().to_ascii_uppercase();
        if let Some(step) = RAW_DATA_STEPS.get(wanted.as_str()) {
            let mut bindings = BTreeMap::new();
            for injection in sequence.injections() {
                let key = injection.injection_name();
                let mut filenames = default_injection_bindings();
                self.apply_dirs(&mut filenames);
                filenames.set_tag(Tag::InputRawFilename, injection.meta.filename.clone());
                filenames.set_tag(Tag::InputInjectionName, key.clone());
                filenames.set_tag(Tag::OutputInjectionName, key.clone());
                filenames.set_tag(Tag::InputGroupName, injection.meta.sample_group_name.clone());
                filenames.set_tag(
                    Tag::OutputGroupName,
                    injection.meta.sample_group_name.clone(),
                );
                bindings.insert(key, filenames);
            }
            return Ok(Command::RawData {
                step: Arc::clone(step),
                bindings,
            });
        }
        if let Some(step) = SEGMENT_STEPS.get(wanted.as_str()) {
            let mut bindings = BTreeMap::new();
            for segment in sequence.segments() {
                let mut filenames = default_group_bindings();
                self.apply_dirs(&mut filenames);
                filenames.set_tag(Tag::InputGroupName, segment.name.clone());
                filenames.set_tag(Tag::OutputGroupName, segment.name.clone());
                bindings.insert(segment.name.clone(), filenames);
            }
            return Ok(Command::Segment {
                step: Arc::clone(step),
                bindings,
            });
        }
        if let Some(step) = SAMPLE_GROUP_STEPS.get(wanted.as_str()) {
            let mut bindings = BTreeMap::new();
            for group in sequence.sample_groups() {
                let mut filenames = default_group_bindings();
                self.apply_dirs(&mut filenames);
                filenames.set_tag(Tag::InputGroupName, group.name.clone());
                filenames.set_tag(Tag::OutputGroupName, group.name.clone());
                bindings.insert(group.name.clone(), filenames);
            }
            return Ok(Command::SampleGroup {
                step: Arc::clone(step),
                bindings,
            });
        }
        error!("no step registered under the name '{name}'");
        Err(CoreError::not_found(format!(
            "no step registered under the name '{name}'"
        )))
    }

    /// Resolve a whole workflow. Any unresolvable name fails the build and
    /// yields no commands at all; an empty input is an empty success.
    pub fn build_commands(
        &self,
        sequence: &Sequence,
        names: &[String],
    ) -> Result<Vec<Command>, CoreError> {
        let mut commands = Vec::with_capacity(names.len());
        for name in names {
            commands.push(self.create_command(sequence, name)?);
        }
        Ok(commands)
    }

    /// The merged schema of every step in a workflow, marked as schema so
    /// it can be folded under user overrides.
    pub fn parameter_schema(
        &self,
        sequence: &Sequence,
        names: &[String],
    ) -> Result<ParameterSet, CoreError> {
        let mut merged = ParameterSet::new();
        for command in self.build_commands(sequence, names)? {
            merged.merge(&command.parameter_schema());
        }
        merged.set_as_schema(true);
        Ok(merged)
    }
}
