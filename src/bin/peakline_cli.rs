use anyhow::{anyhow, Result};
use peakline::observer::LogObserver;
use peakline::{
    io, CommandBuilder, LocalStorage, NullProcessor, Sequence, WorkflowEngine,
};
use serde::Serialize;
use std::env;
use std::sync::Arc;

fn usage() {
    eprintln!(
        "Usage:\n  \
  peakline_cli steps\n  \
  peakline_cli schema --main-dir DIR --sequence SEQUENCE.csv STEP [STEP...]\n  \
  peakline_cli run --main-dir DIR --sequence SEQUENCE.csv \
[--parameters PARAMS.csv] [--workflow WORKFLOW.csv | STEP [STEP...]]\n\n  \
  The workflow is taken from --workflow when given, otherwise from the\n  \
  step names on the command line."
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Default)]
struct RunArgs {
    main_dir: String,
    sequence: String,
    parameters: Option<String>,
    workflow: Option<String>,
    steps: Vec<String>,
}

fn parse_run_args(args: &[String]) -> Result<RunArgs> {
    let mut parsed = RunArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--main-dir" => {
                parsed.main_dir = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow!("--main-dir needs a value"))?
                    .clone();
                i += 2;
            }
            "--sequence" => {
                parsed.sequence = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow!("--sequence needs a value"))?
                    .clone();
                i += 2;
            }
            "--parameters" => {
                parsed.parameters = Some(
                    args.get(i + 1)
                        .ok_or_else(|| anyhow!("--parameters needs a value"))?
                        .clone(),
                );
                i += 2;
            }
            "--workflow" => {
                parsed.workflow = Some(
                    args.get(i + 1)
                        .ok_or_else(|| anyhow!("--workflow needs a value"))?
                        .clone(),
                );
                i += 2;
            }
            other if other.starts_with("--") => {
                return Err(anyhow!("unknown option '{other}'"));
            }
            step => {
                parsed.steps.push(step.to_string());
                i += 1;
            }
        }
    }
    if parsed.main_dir.is_empty() {
        return Err(anyhow!("--main-dir is required"));
    }
    if parsed.sequence.is_empty() {
        return Err(anyhow!("--sequence is required"));
    }
    Ok(parsed)
}

fn load_sequence_and_workflow(args: &RunArgs) -> Result<(Sequence, Vec<String>)> {
    let mut sequence = io::create_sequence(&args.sequence)?;
    let workflow = match &args.workflow {
        Some(path) => io::load_workflow(path)?,
        None => args.steps.clone(),
    };
    if workflow.is_empty() {
        return Err(anyhow!("no workflow steps given"));
    }
    sequence.set_workflow(workflow.clone());
    Ok((sequence, workflow))
}

fn cmd_steps() -> Result<()> {
    #[derive(Serialize)]
    struct Listing {
        raw_data: Vec<&'static str>,
        sequence_segment: Vec<&'static str>,
        sample_group: Vec<&'static str>,
    }
    print_json(&Listing {
        raw_data: peakline::steps::RAW_DATA_STEPS.keys().copied().collect(),
        sequence_segment: peakline::steps::SEGMENT_STEPS.keys().copied().collect(),
        sample_group: peakline::steps::SAMPLE_GROUP_STEPS.keys().copied().collect(),
    })
}

fn cmd_schema(args: &[String]) -> Result<()> {
    let parsed = parse_run_args(args)?;
    let (sequence, workflow) = load_sequence_and_workflow(&parsed)?;
    let builder = CommandBuilder::new(parsed.main_dir.clone());
    let schema = builder
        .parameter_schema(&sequence, &workflow)
        .map_err(|e| anyhow!("{e}"))?;
    print_json(&schema)
}

fn cmd_run(args: &[String]) -> Result<()> {
    let parsed = parse_run_args(args)?;
    let (mut sequence, workflow) = load_sequence_and_workflow(&parsed)?;

    let builder = CommandBuilder::new(parsed.main_dir.clone());
    if let Some(path) = &parsed.parameters {
        let mut user = io::read_parameters_file(path).map_err(|e| anyhow!("{e}"))?;
        let schema = builder
            .parameter_schema(&sequence, &workflow)
            .map_err(|e| anyhow!("{e}"))?;
        user.merge(&schema);
        if let Some(first) = sequence.injections().first() {
            *peakline::raw_data::write(&first.raw_data.parameters()) = user;
        }
    }
    let commands = builder
        .build_commands(&sequence, &workflow)
        .map_err(|e| anyhow!("{e}"))?;

    let mut engine = WorkflowEngine::new(Arc::new(NullProcessor), Arc::new(LocalStorage));
    engine.subscribe_injection_observer(Arc::new(LogObserver::new("injections")));
    engine.subscribe_segment_observer(Arc::new(LogObserver::new("segments")));
    engine.subscribe_sample_group_observer(Arc::new(LogObserver::new("sample groups")));

    let report = engine
        .run(&mut sequence, &commands)
        .map_err(|e| anyhow!("{e}"))?;
    print_json(&report)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1) else {
        usage();
        return Err(anyhow!("no command given"));
    };
    match command.as_str() {
        "steps" => cmd_steps(),
        "schema" => cmd_schema(&args[2..]),
        "run" => cmd_run(&args[2..]),
        _ => {
            usage();
            Err(anyhow!("unknown command '{command}'"))
        }
    }
}
