use crate::commands::{Command, CommandKind};
use crate::error::CoreError;
use crate::observer::{CollectionObserver, ObserverHandle, ObserverRegistry};
use crate::parameters::ParameterSet;
use crate::processor::AnalyticalProcessor;
use crate::raw_data::read;
use crate::sequence::Sequence;
use crate::steps::StepContext;
use crate::storage::PersistenceLayer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Where the engine currently is in a submitted command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    Dispatching,
    BatchRunning(CommandKind),
    BatchDone(CommandKind),
    Failed,
}

/// One entity's step failure, as reported to the error observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub entity: String,
    pub step: String,
    pub message: String,
}

/// Outcome of one contiguous same-kind batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub kind: CommandKind,
    pub steps: Vec<String>,
    pub entities: usize,
    pub errors: Vec<StepFailure>,
}

/// Outcome of one whole command-list run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub batches: Vec<BatchReport>,
}

impl WorkflowReport {
    pub fn error_count(&self) -> usize {
        self.batches.iter().map(|b| b.errors.len()).sum()
    }
}

/// Drives a command list against a sequence: groups adjacent same-kind
/// commands into batches and hands each batch to the runner of the
/// matching entity collection, emitting lifecycle notifications along the
/// way.
///
/// Failure semantics: a step error is an entity-scoped unit (remaining
/// steps for that entity are skipped, remaining entities still run), but a
/// missing precondition shared by the whole batch (empty sequence, a
/// binding table without an entity's entry) aborts the batch and the
/// remaining command list.
pub struct WorkflowEngine {
    processor: Arc<dyn AnalyticalProcessor>,
    storage: Arc<dyn PersistenceLayer>,
    injection_observers: ObserverRegistry,
    segment_observers: ObserverRegistry,
    sample_group_observers: ObserverRegistry,
    state: EngineState,
}

impl WorkflowEngine {
    pub fn new(processor: Arc<dyn AnalyticalProcessor>, storage: Arc<dyn PersistenceLayer>) -> Self {
        Self {
            processor,
            storage,
            injection_observers: ObserverRegistry::new(),
            segment_observers: ObserverRegistry::new(),
            sample_group_observers: ObserverRegistry::new(),
            state: EngineState::Idle,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn subscribe_injection_observer(
        &mut self,
        observer: Arc<dyn CollectionObserver>,
    ) -> ObserverHandle {
        self.injection_observers.subscribe(observer)
    }

    pub fn subscribe_segment_observer(
        &mut self,
        observer: Arc<dyn CollectionObserver>,
    ) -> ObserverHandle {
        self.segment_observers.subscribe(observer)
    }

    pub fn subscribe_sample_group_observer(
        &mut self,
        observer: Arc<dyn CollectionObserver>,
    ) -> ObserverHandle {
        self.sample_group_observers.subscribe(observer)
    }

    pub fn unsubscribe_injection_observer(&mut self, handle: ObserverHandle) -> bool {
        self.injection_observers.unsubscribe(handle)
    }

    pub fn unsubscribe_segment_observer(&mut self, handle: ObserverHandle) -> bool {
        self.segment_observers.unsubscribe(handle)
    }

    pub fn unsubscribe_sample_group_observer(&mut self, handle: ObserverHandle) -> bool {
        self.sample_group_observers.unsubscribe(handle)
    }

    /// Run a command list to completion. Batches are maximal runs of
    /// adjacent same-kind commands; batch boundaries occur only at kind
    /// changes, never at argument differences.
    pub fn run(
        &mut self,
        sequence: &mut Sequence,
        commands: &[Command],
    ) -> Result<WorkflowReport, CoreError> {
        self.state = EngineState::Dispatching;
        let mut report = WorkflowReport::default();
        if commands.is_empty() {
            self.state = EngineState::Idle;
            return Ok(report);
        }
        if sequence.is_empty() {
            self.state = EngineState::Failed;
            return Err(CoreError::invalid_input(
                "no sequence loaded; cannot run a workflow",
            ));
        }

        let now = chrono::Utc::now().naive_utc();
        let ctx = StepContext {
            processor: self.processor.as_ref(),
            storage: self.storage.as_ref(),
            now,
        };

        let mut i = 0;
        while i < commands.len() {
            let kind = commands[i].kind();
            let mut j = i + 1;
            while j < commands.len() && commands[j].kind() == kind {
                j += 1;
            }
            let batch = &commands[i..j];
            debug!(
                "dispatching batch of {} {:?} commands",
                batch.len(),
                kind
            );
            self.state = EngineState::BatchRunning(kind);
            let batch_report = match kind {
                CommandKind::RawData => self.run_injection_batch(sequence, batch, &ctx),
                CommandKind::Segment => self.run_segment_batch(sequence, batch, &ctx),
                CommandKind::SampleGroup => self.run_sample_group_batch(sequence, batch, &ctx),
            };
            match batch_report {
                Ok(batch_report) => report.batches.push(batch_report),
                Err(e) => {
                    self.state = EngineState::Failed;
                    return Err(e);
                }
            }
            self.state = EngineState::BatchDone(kind);
            i = j;
        }

        self.state = EngineState::Idle;
        info!(
            "workflow finished: {} batches, {} errors",
            report.batches.len(),
            report.error_count()
        );
        Ok(report)
    }

    /// The merged schema every step of a batch declares, marked as schema
    /// so entity parameter sets can fold it under their user values.
    fn batch_schema(batch: &[Command]) -> ParameterSet {
        let mut schema = ParameterSet::new();
        for command in batch {
            schema.merge(&command.parameter_schema());
        }
        schema.set_as_schema(true);
        schema
    }

    fn run_injection_batch(
        &self,
        sequence: &mut Sequence,
        batch: &[Command],
        ctx: &StepContext,
    ) -> Result<BatchReport, CoreError> {
        let schema = Self::batch_schema(batch);
        let mut errors = Vec::new();
        let entities = sequence.len();
        self.injection_observers.notify_collection_start(entities);
        for injection in sequence.injections_mut() {
            let entity = injection.injection_name();
            self.injection_observers.notify_entity_start(&entity);
            let mut parameters = read(&injection.raw_data.parameters()).clone();
            parameters.merge(&schema);
            for command in batch {
                let Command::RawData { step, bindings } = command else {
                    return Err(CoreError::internal("mixed kinds in an injection batch"));
                };
                let Some(filenames) = bindings.get(&entity) else {
                    return Err(CoreError::invalid_input(format!(
                        "no file bindings for injection '{entity}'"
                    )));
                };
                debug!("step {} on injection {entity}", step.name());
                if let Err(e) =
                    step.process(&mut injection.raw_data, &parameters, filenames, ctx)
                {
                    self.injection_observers
                        .notify_error(&entity, step.name(), &e.message);
                    errors.push(StepFailure {
                        entity: entity.clone(),
                        step: step.name().to_string(),
                        message: e.message,
                    });
                    break;
                }
            }
            self.injection_observers.notify_entity_end(&entity);
        }
        self.injection_observers.notify_collection_end();
        Ok(BatchReport {
            kind: CommandKind::RawData,
            steps: batch.iter().map(|c| c.step_name().to_string()).collect(),
            entities,
            errors,
        })
    }

    fn run_segment_batch(
        &self,
        sequence: &mut Sequence,
        batch: &[Command],
        ctx: &StepContext,
    ) -> Result<BatchReport, CoreError> {
        let schema = Self::batch_schema(batch);
        let mut errors = Vec::new();
        let mut segments = sequence.segments().to_vec();
        let entities = segments.len();
        self.segment_observers.notify_collection_start(entities);
        for segment in &mut segments {
            let entity = segment.name.clone();
            self.segment_observers.notify_entity_start(&entity);
            // all injections of a segment share one parameter set; read it
            // through the first member
            let Some(first) = segment
                .sample_indices
                .first()
                .and_then(|&i| sequence.injections().get(i))
            else {
                return Err(CoreError::invalid_input(format!(
                    "sequence segment '{entity}' has no injections"
                )));
            };
            let mut parameters = read(&first.raw_data.parameters()).clone();
            parameters.merge(&schema);
            for command in batch {
                let Command::Segment { step, bindings } = command else {
                    return Err(CoreError::internal("mixed kinds in a segment batch"));
                };
                let Some(filenames) = bindings.get(&entity) else {
                    return Err(CoreError::invalid_input(format!(
                        "no file bindings for sequence segment '{entity}'"
                    )));
                };
                debug!("step {} on segment {entity}", step.name());
                if let Err(e) = step.process(segment, sequence, &parameters, filenames, ctx) {
                    self.segment_observers
                        .notify_error(&entity, step.name(), &e.message);
                    errors.push(StepFailure {
                        entity: entity.clone(),
                        step: step.name().to_string(),
                        message: e.message,
                    });
                    break;
                }
            }
            self.segment_observers.notify_entity_end(&entity);
        }
        self.segment_observers.notify_collection_end();
        sequence.set_segments(segments);
        Ok(BatchReport {
            kind: CommandKind::Segment,
            steps: batch.iter().map(|c| c.step_name().to_string()).collect(),
            entities,
            errors,
        })
    }

    fn run_sample_group_batch(
        &self,
        sequence: &mut Sequence,
        batch: &[Command],
        ctx: &StepContext,
    ) -> Result<BatchReport, CoreError> {
        let schema = Self::batch_schema(batch);
        let mut errors = Vec::new();
        let mut groups = sequence.sample_groups().to_vec();
        let entities = groups.len();
        self.sample_group_observers.notify_collection_start(entities);
        for group in &mut groups {
            let entity = group.name.clone();
            self.sample_group_observers.notify_entity_start(&entity);
            let Some(first) = group
                .sample_indices
                .first()
                .and_then(|&i| sequence.injections().get(i))
            else {
                return Err(CoreError::invalid_input(format!(
                    "sample group '{entity}' has no injections"
                )));
            };
            let mut parameters = read(&first.raw_data.parameters()).clone();
            parameters.merge(&schema);
            for command in batch {
                let Command::SampleGroup { step, bindings } = command else {
                    return Err(CoreError::internal("mixed kinds in a sample-group batch"));
                };
                let Some(filenames) = bindings.get(&entity) else {
                    return Err(CoreError::invalid_input(format!(
                        "no file bindings for sample group '{entity}'"
                    )));
                };
                debug!("step {} on sample group {entity}", step.name());
                if let Err(e) = step.process(group, sequence, &parameters, filenames, ctx) {
                    self.sample_group_observers
                        .notify_error(&entity, step.name(), &e.message);
                    errors.push(StepFailure {
                        entity: entity.clone(),
                        step: step.name().to_string(),
                        message: e.message,
                    });
                    break;
                }
            }
            self.sample_group_observers.notify_entity_end(&entity);
        }
        self.sample_group_observers.notify_collection_end();
        sequence.set_sample_groups(groups);
        Ok(BatchReport {
            kind: CommandKind::SampleGroup,
            steps: batch.iter().map(|c| c.step_name().to_string()).collect(),
            entities,
            errors,
        })
    }
}
