use crate::error::CoreError;
use crate::features::FeatureSet;
use crate::parameters::{Parameter, ParameterSet};
use crate::sample_meta::{SampleMetadata, SampleType};
use crate::sequence::Sequence;
use chrono::{NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

const ACQUISITION_TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

fn field<'a>(
    headers: &csv::StringRecord,
    record: &'a csv::StringRecord,
    name: &str,
) -> Option<&'a str> {
    headers
        .iter()
        .position(|h| h == name)
        .and_then(|i| record.get(i))
        .map(str::trim)
}

fn numeric_field<T: std::str::FromStr>(
    headers: &csv::StringRecord,
    record: &csv::StringRecord,
    name: &str,
    default: T,
) -> T {
    field(headers, record, name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Read a sequence table. Every row becomes a `SampleMetadata`; rows that
/// cannot even be read are reported and skipped.
pub fn read_sequence_file(path: impl AsRef<Path>) -> Result<Vec<SampleMetadata>, CoreError> {
    let path = path.as_ref();
    info!("loading sequence table {}", path.display());
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("sequence row {}: {e}; skipping", line + 2);
                continue;
            }
        };
        let mut meta = SampleMetadata::default();
        meta.sample_name = field(&headers, &record, "sample_name")
            .unwrap_or_default()
            .to_string();
        meta.sample_group_name = field(&headers, &record, "sample_group_name")
            .unwrap_or_default()
            .to_string();
        meta.sequence_segment_name = field(&headers, &record, "sequence_segment_name")
            .unwrap_or_default()
            .to_string();
        meta.filename = field(&headers, &record, "filename")
            .unwrap_or_default()
            .to_string();
        meta.sample_type = field(&headers, &record, "sample_type")
            .and_then(|s| {
                s.parse::<SampleType>()
                    .map_err(|_| warn!("unknown sample type '{s}', treating as Unknown"))
                    .ok()
            })
            .unwrap_or(SampleType::Unknown);
        meta.inj_number = numeric_field(&headers, &record, "inj_number", 0);
        meta.rack_number = numeric_field(&headers, &record, "rack_number", 0);
        meta.plate_number = numeric_field(&headers, &record, "plate_number", 0);
        meta.pos_number = numeric_field(&headers, &record, "pos_number", 0);
        meta.dilution_factor = numeric_field(&headers, &record, "dilution_factor", 1.0);
        meta.batch_name = field(&headers, &record, "batch_name")
            .unwrap_or_default()
            .to_string();
        meta.acq_method_name = field(&headers, &record, "acq_method_name")
            .unwrap_or_default()
            .to_string();
        meta.operator_name = field(&headers, &record, "operator_name")
            .unwrap_or_default()
            .to_string();
        if let Some(raw) = field(&headers, &record, "acquisition_date_and_time") {
            match NaiveDateTime::parse_from_str(raw, ACQUISITION_TIME_FORMAT) {
                Ok(t) => meta.acquisition_date_time = t,
                Err(_) => warn!("row {}: unparseable acquisition time '{raw}'", line + 2),
            }
        }
        rows.push(meta);
    }
    Ok(rows)
}

/// Build a sequence from a sequence table, skipping rows with invalid
/// metadata (every skip is reported by the validation itself).
pub fn create_sequence(path: impl AsRef<Path>) -> Result<Sequence, CoreError> {
    let rows = read_sequence_file(path)?;
    let mut sequence = Sequence::new();
    let now = Utc::now().naive_utc();
    for meta in rows {
        let sample_name = meta.sample_name.clone();
        if let Err(e) = sequence.add_injection(meta, FeatureSet::new(), now) {
            warn!("skipping sequence row '{sample_name}': {e}");
        }
    }
    if sequence.is_empty() {
        warn!("sequence table produced an empty sequence");
    }
    Ok(sequence)
}

/// Load a stored workflow: a one-column CSV of step names.
pub fn load_workflow(path: impl AsRef<Path>) -> Result<Vec<String>, CoreError> {
    let path = path.as_ref();
    info!("loading workflow {}", path.display());
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    if !headers.iter().any(|h| h == "command_name") {
        return Err(CoreError::invalid_input(format!(
            "workflow file '{}' lacks a 'command_name' column",
            path.display()
        )));
    }
    let mut names = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(name) = field(&headers, &record, "command_name") {
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Store the current workflow as a one-column CSV of step names.
pub fn store_workflow(path: impl AsRef<Path>, names: &[String]) -> Result<(), CoreError> {
    let path = path.as_ref();
    info!("storing workflow {}", path.display());
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["command_name"])?;
    for name in names {
        writer.write_record([name])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read user parameter overrides: one row per parameter, grouped by the
/// `function` column, the remaining columns being the canonical attribute
/// wire shape.
pub fn read_parameters_file(path: impl AsRef<Path>) -> Result<ParameterSet, CoreError> {
    let path = path.as_ref();
    info!("loading parameters {}", path.display());
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut set = ParameterSet::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let Some(function) = field(&headers, &record, "function").filter(|f| !f.is_empty())
        else {
            warn!("parameter row {}: missing function; skipping", line + 2);
            continue;
        };
        let mut attributes = BTreeMap::new();
        for attribute in [
            "name",
            "type",
            "value",
            "description",
            "tags",
            "min",
            "max",
            "valid_strings",
        ] {
            if let Some(value) = field(&headers, &record, attribute) {
                if !value.is_empty() {
                    attributes.insert(attribute.to_string(), value.to_string());
                }
            }
        }
        match Parameter::from_attributes(&attributes) {
            Ok(parameter) => set.add_parameter(function, parameter),
            Err(e) => warn!("parameter row {}: {e}; skipping", line + 2),
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param_value::ParamValue;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_sequence_file_parses_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "sequence.csv",
            "sample_name,sample_group_name,sequence_segment_name,filename,sample_type,inj_number,batch_name,acquisition_date_and_time\n\
             s1,g1,seg1,s1.mzML,Standard,1,b1,16-05-2015 11:30:00\n\
             s2,g1,seg1,s2.mzML,Mystery,2,b1,16-05-2015 11:45:00\n",
        );
        let rows = read_sequence_file(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sample_type, SampleType::Standard);
        assert_eq!(rows[0].inj_number, 1);
        assert_eq!(
            rows[0].acquisition_date_time.format("%Y-%m-%d").to_string(),
            "2015-05-16"
        );
        // unknown sample type degrades to Unknown, row survives
        assert_eq!(rows[1].sample_type, SampleType::Unknown);
    }

    #[test]
    fn test_create_sequence_skips_invalid_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "sequence.csv",
            "sample_name,sample_group_name,sequence_segment_name,filename\n\
             s1,g1,seg1,s1.mzML\n\
             ,g1,seg1,missing-name.mzML\n\
             s3,g2,seg1,s3.mzML\n",
        );
        let sequence = create_sequence(&path).unwrap();
        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence.sample_groups().len(), 2);
    }

    #[test]
    fn test_workflow_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.csv");
        let names = vec![
            "LOAD_RAW_DATA".to_string(),
            "PICK_FEATURES".to_string(),
            "STORE_FEATURES".to_string(),
        ];
        store_workflow(&path, &names).unwrap();
        assert_eq!(load_workflow(&path).unwrap(), names);
    }

    #[test]
    fn test_workflow_requires_command_name_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "workflow.csv", "step\nPICK_FEATURES\n");
        assert!(load_workflow(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_workflow("/no/such/workflow.csv").is_err());
        assert!(read_sequence_file("/no/such/sequence.csv").is_err());
    }

    #[test]
    fn test_read_parameters_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "parameters.csv",
            "function,name,type,value,description,min,max\n\
             FeatureFinder,peak_width,float,2.5,user override,0,60\n\
             FeatureFinder,use_smoothing,bool,TRUE,,,\n\
             ,orphan,int,1,,,\n",
        );
        let set = read_parameters_file(&path).unwrap();
        let fp = set.find_function("FeatureFinder").unwrap();
        assert_eq!(fp.len(), 2);
        assert_eq!(
            fp.find_parameter("peak_width").unwrap().value(),
            &ParamValue::Float(2.5)
        );
        assert_eq!(
            fp.find_parameter("use_smoothing").unwrap().value(),
            &ParamValue::Bool(true)
        );
        // the function-less row was skipped, not adopted
        assert_eq!(set.len(), 1);
    }
}
