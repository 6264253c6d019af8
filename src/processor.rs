use crate::error::CoreError;
use crate::file_bindings::FileBindingSet;
use crate::parameters::ParameterSet;
use crate::raw_data::RawDataHandle;
use crate::sequence::{SampleGroup, Sequence, SequenceSegment};

/// Boundary to the external analytical-processing library.
///
/// The engine treats every call as a synchronous black box: it blocks until
/// the processor returns or fails, and a failure carries a human-readable
/// message. The processor receives the merged (schema + user) parameters
/// and the entity's resolved file bindings; it mutates results through the
/// entity handle it is given.
pub trait AnalyticalProcessor: Send + Sync {
    fn process_raw_data(
        &self,
        step: &str,
        raw_data: &mut RawDataHandle,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
    ) -> Result<(), CoreError> {
        let _ = (step, raw_data, parameters, filenames);
        Ok(())
    }

    fn process_segment(
        &self,
        step: &str,
        segment: &mut SequenceSegment,
        sequence: &Sequence,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
    ) -> Result<(), CoreError> {
        let _ = (step, segment, sequence, parameters, filenames);
        Ok(())
    }

    fn process_sample_group(
        &self,
        step: &str,
        group: &mut SampleGroup,
        sequence: &mut Sequence,
        parameters: &ParameterSet,
        filenames: &FileBindingSet,
    ) -> Result<(), CoreError> {
        let _ = (step, group, sequence, parameters, filenames);
        Ok(())
    }

    /// Parameter defaults the processor declares for a step, if any.
    fn parameter_schema(&self, step: &str) -> ParameterSet {
        let _ = step;
        ParameterSet::new()
    }
}

/// Processor that performs no numeric work at all. Useful for dry runs of
/// the bookkeeping pipeline and as the CLI default when no backend is
/// wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProcessor;

impl AnalyticalProcessor for NullProcessor {}
