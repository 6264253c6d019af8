pub mod commands;
pub mod engine;
pub mod error;
pub mod features;
pub mod file_bindings;
pub mod io;
pub mod observer;
pub mod param_value;
pub mod parameters;
pub mod processor;
pub mod qc;
pub mod quant;
pub mod raw_data;
pub mod sample_meta;
pub mod sequence;
pub mod steps;
pub mod storage;
pub mod transitions;

pub use commands::{Command, CommandBuilder, CommandKind};
pub use engine::{EngineState, WorkflowEngine, WorkflowReport};
pub use error::{CoreError, ErrorCode};
pub use features::{Feature, FeatureComponent, FeatureHistory, FeatureSet};
pub use param_value::ParamValue;
pub use parameters::{FunctionParameters, Parameter, ParameterSet};
pub use processor::{AnalyticalProcessor, NullProcessor};
pub use raw_data::RawDataHandle;
pub use sample_meta::{SampleMetadata, SampleType};
pub use sequence::{Injection, SampleGroup, Sequence, SequenceSegment};
pub use storage::{LocalStorage, PersistenceLayer};
