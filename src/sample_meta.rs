use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::error;

/// Role of an injection inside a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    Unknown,
    Standard,
    QC,
    Blank,
    DoubleBlank,
    Solvent,
}

impl Default for SampleType {
    fn default() -> Self {
        SampleType::Unknown
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleType::Unknown => "Unknown",
            SampleType::Standard => "Standard",
            SampleType::QC => "QC",
            SampleType::Blank => "Blank",
            SampleType::DoubleBlank => "Double Blank",
            SampleType::Solvent => "Solvent",
        };
        write!(f, "{name}")
    }
}

impl FromStr for SampleType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Unknown" => Ok(SampleType::Unknown),
            "Standard" => Ok(SampleType::Standard),
            "QC" => Ok(SampleType::QC),
            "Blank" => Ok(SampleType::Blank),
            "Double Blank" => Ok(SampleType::DoubleBlank),
            "Solvent" => Ok(SampleType::Solvent),
            _ => Err(()),
        }
    }
}

/// Identity and acquisition context of one injection. Exclusively owned by
/// its Injection; nothing here is shared across the sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub sample_name: String,
    pub sample_group_name: String,
    pub sequence_segment_name: String,
    pub filename: String,
    pub sample_type: SampleType,
    pub inj_number: u32,
    pub rack_number: u32,
    pub plate_number: u32,
    pub pos_number: u32,
    pub dilution_factor: f64,
    pub batch_name: String,
    pub acq_method_name: String,
    pub operator_name: String,
    pub acquisition_date_time: NaiveDateTime,
}

impl Default for SampleMetadata {
    fn default() -> Self {
        Self {
            sample_name: String::new(),
            sample_group_name: String::new(),
            sequence_segment_name: String::new(),
            filename: String::new(),
            sample_type: SampleType::Unknown,
            inj_number: 0,
            rack_number: 0,
            plate_number: 0,
            pos_number: 0,
            dilution_factor: 1.0,
            batch_name: String::new(),
            acq_method_name: String::new(),
            operator_name: String::new(),
            acquisition_date_time: NaiveDateTime::UNIX_EPOCH,
        }
    }
}

impl SampleMetadata {
    pub fn new(sample_name: impl Into<String>) -> Self {
        Self {
            sample_name: sample_name.into(),
            ..Self::default()
        }
    }

    /// The unique key an injection is addressed by throughout a session.
    pub fn injection_name(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.sample_name,
            self.inj_number,
            self.batch_name,
            self.acquisition_date_time.format("%Y-%m-%d_%H%M%S")
        )
    }

    /// Mandatory fields for joining a sequence. Every violation is reported;
    /// the row is rejected when any is missing.
    pub fn validate(&self) -> bool {
        let mut is_valid = true;
        if self.sample_name.is_empty() {
            error!("sequence row: sample_name must be specified");
            is_valid = false;
        }
        if self.sample_group_name.is_empty() {
            error!("sequence row: sample_group_name must be specified");
            is_valid = false;
        }
        if self.sequence_segment_name.is_empty() {
            error!("sequence row: sequence_segment_name must be specified");
            is_valid = false;
        }
        if self.filename.is_empty() {
            error!("sequence row: filename must be specified");
            is_valid = false;
        }
        is_valid
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
