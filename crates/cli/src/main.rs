use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use railyard_engine::{
    AvailableBindings, EchoHandler, HandlerRegistry, LaneType, ReadyWorkflow, RunRequest, StepGraph, WorkflowRunner, check_readiness,
    drive_workflow_run, parse_workflow_file, validate_bindings,
};
use railyard_types::{ControlConfig, ProgressEvent, RunControl, Step, WorkflowDefinition};
use railyard_util::EngineConfig;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();
    let config = EngineConfig::load().context("failed to load engine configuration")?;

    match matches.subcommand() {
        Some(("run", sub)) => run_workflow(sub, config).await,
        Some(("check", sub)) => check_workflow(sub),
        Some(("validate", sub)) => validate_workflow(sub),
        _ => {
            build_cli().print_help()?;
            Ok(())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok()))
        .with_writer(std::io::stderr)
        .try_init();
}

/// `RUST_LOG` directives, or `info` when unset or unparsable.
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn build_cli() -> Command {
    let file = Arg::new("file")
        .long("file")
        .short('f')
        .required(true)
        .value_parser(clap::value_parser!(PathBuf))
        .help("Path to workflow YAML/JSON");
    let name = Arg::new("name")
        .long("name")
        .action(ArgAction::Set)
        .help("Workflow name within file");
    let connection = Arg::new("connection")
        .long("connection")
        .action(ArgAction::Append)
        .help("Connection available to tool-call steps (repeatable)");
    let table = Arg::new("table")
        .long("table")
        .action(ArgAction::Append)
        .help("Table available to table steps (repeatable)");

    Command::new("railyard")
        .about("Validate and run Railyard step-graph workflows")
        .subcommand(
            Command::new("run")
                .about("Run a workflow with the echo handler and stream progress events as JSON lines")
                .arg(file.clone())
                .arg(name.clone())
                .arg(connection.clone())
                .arg(table.clone())
                .arg(
                    Arg::new("input")
                        .long("input")
                        .short('i')
                        .action(ArgAction::Append)
                        .help("Workflow input as key=value; values are parsed as JSON when possible"),
                )
                .arg(
                    Arg::new("auto-approve")
                        .long("auto-approve")
                        .action(ArgAction::SetTrue)
                        .help("Approve every suspend step as soon as it suspends"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Print the readiness report of a workflow")
                .arg(file.clone())
                .arg(name.clone())
                .arg(connection)
                .arg(table),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate the step graph and print it as a tree")
                .arg(file)
                .arg(name),
        )
}

fn load_definition(matches: &ArgMatches) -> Result<WorkflowDefinition> {
    let file = matches.get_one::<PathBuf>("file").context("missing --file")?;
    let bundle = parse_workflow_file(file)?;
    let name = matches.get_one::<String>("name").map(String::as_str);
    bundle.select(name).cloned()
}

fn available_bindings(matches: &ArgMatches) -> AvailableBindings {
    let values = |id: &str| -> Vec<String> { matches.get_many::<String>(id).into_iter().flatten().cloned().collect() };
    AvailableBindings::new(values("connection"), values("table"))
}

fn parse_inputs(matches: &ArgMatches) -> Result<Map<String, Value>> {
    let mut inputs = Map::new();
    for pair in matches.get_many::<String>("input").into_iter().flatten() {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("input '{pair}' must look like key=value"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        inputs.insert(key.trim().to_string(), value);
    }
    Ok(inputs)
}

async fn run_workflow(matches: &ArgMatches, config: EngineConfig) -> Result<()> {
    let definition = load_definition(matches)?;
    let workflow = ReadyWorkflow::check(&definition, &available_bindings(matches))?;
    for warning in &workflow.report().warnings {
        warn!(%warning, "readiness warning");
    }
    let inputs = parse_inputs(matches)?;

    let auto_approve = matches.get_flag("auto-approve");
    let internal_prefix = config.internal_step_prefix.clone();
    let runner = WorkflowRunner::new(HandlerRegistry::uniform(Arc::new(EchoHandler)), config);
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ProgressEvent>();

    let interrupt_tx = control_tx.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; cancelling run");
            let _ = interrupt_tx.send(RunControl::Cancel);
        }
    });

    let printer = async move {
        while let Some(event) = event_rx.recv().await {
            if auto_approve && let ProgressEvent::StepSuspended { step_id, .. } = &event {
                info!(step_id = %step_id, "auto-approving suspended step");
                let _ = control_tx.send(RunControl::Approve {
                    step_id: step_id.clone(),
                    payload: Value::Null,
                });
            }
            if event.is_internal(&internal_prefix) {
                continue;
            }
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(error) => warn!(%error, "failed to serialize progress event"),
            }
        }
    };

    let (report, ()) = tokio::join!(
        drive_workflow_run(&runner, &workflow, RunRequest::new(inputs), control_rx, event_tx),
        printer
    );
    interrupt.abort();

    info!(run_id = %report.run_id, status = ?report.status, duration_ms = report.total_duration_ms, "run finished");
    if !report.is_success() {
        bail!(
            "run {} finished with status {:?}: {}",
            report.run_id,
            report.status,
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn check_workflow(matches: &ArgMatches) -> Result<()> {
    let definition = load_definition(matches)?;
    let report = check_readiness(&definition, &available_bindings(matches));
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.can_execute {
        bail!("workflow '{}' is not ready to run", definition.id);
    }
    Ok(())
}

fn validate_workflow(matches: &ArgMatches) -> Result<()> {
    let definition = load_definition(matches)?;
    let graph = StepGraph::from_definition(&definition).with_context(|| format!("workflow '{}' is invalid", definition.id))?;

    println!("{} ({} steps)", definition.id, graph.len());
    print_scope(&graph, graph.top_level_steps(), 1);

    let bindings = validate_bindings(&graph, &definition.inputs);
    for warning in &bindings.warnings {
        println!("warning: {warning}");
    }
    for error in &bindings.errors {
        println!("error: {error}");
    }
    if !bindings.errors.is_empty() {
        bail!("workflow '{}' has {} binding error(s)", definition.id, bindings.errors.len());
    }
    Ok(())
}

fn print_scope(graph: &StepGraph, steps: Vec<&Step>, depth: usize) {
    let indent = "  ".repeat(depth);
    for step in steps {
        let kind = match step.control() {
            Some(control) => format!("control/{}", control.control_type()),
            None => step.step_type().to_string(),
        };
        println!("{indent}{}. {} [{kind}]", step.list_index, step.id);

        match step.control() {
            Some(ControlConfig::Branch(branch)) => {
                for (lane, condition) in branch.conditions.iter().enumerate() {
                    println!("{indent}  when {}:", condition.expression);
                    print_scope(graph, graph.lane_children_of(&step.id, lane, LaneType::Branch), depth + 2);
                }
                if let Some(lane) = branch.else_lane() {
                    println!("{indent}  else:");
                    print_scope(graph, graph.lane_children_of(&step.id, lane, LaneType::Branch), depth + 2);
                }
            }
            Some(ControlConfig::Parallel(parallel)) => {
                for (lane, config) in parallel.lanes.iter().enumerate() {
                    let label = config.name.clone().unwrap_or_else(|| lane.to_string());
                    println!("{indent}  lane {label}:");
                    print_scope(graph, graph.lane_children_of(&step.id, lane, LaneType::Parallel), depth + 2);
                }
            }
            Some(control) if control.owns_children() => print_scope(graph, graph.children_of(&step.id), depth + 1),
            _ => {}
        }
    }
}
