//! Run entry points: look up a workflow, drive it through suspensions, report.
//!
//! Re-exports [`run_workflow`], [`run_with_config`], [`drive`], [`Answers`] and
//! the report types.

mod answers;
mod report;

use std::io::{BufRead, Write};
use std::sync::Arc;

use serde_json::Value;
use stategraph::{
    CompiledStateGraph, Delta, InMemoryStore, RunConfig, RunError, RunResult, Suspension,
};

use crate::config::{CliConfig, Error, RunOptions};
use crate::middleware::WithNodeLogging;
use crate::workflows;

pub use answers::{parse_answer, Answers};
pub use report::{write_report, RunReport};

/// Runs workflow `name` with config from env / .env plus `options`.
///
/// Suspensions are answered from `options.answers`, then from stdin. Output
/// goes to stdout.
pub async fn run_workflow(name: &str, options: &RunOptions) -> Result<RunResult, Error> {
    dotenv::dotenv().ok();
    let mut config = CliConfig::from_env()?;
    config.apply_options(options);
    let stdin = std::io::stdin();
    let mut answers = Answers::from_args(&options.answers, Some(stdin.lock()))?;
    let mut out = std::io::stdout();
    run_with_config(name, &config, options.state.as_deref(), &mut answers, &mut out).await
}

/// Runs workflow `name` under `config`.
///
/// `state` is a JSON object merged over the workflow's default input. Writes
/// progress and the final state to `out`, and a report when the config names
/// a target.
pub async fn run_with_config<R: BufRead, W: Write>(
    name: &str,
    config: &CliConfig,
    state: Option<&str>,
    answers: &mut Answers<R>,
    out: &mut W,
) -> Result<RunResult, Error> {
    let workflow = workflows::find(name).ok_or_else(|| {
        let known: Vec<&str> = workflows::all().iter().map(|w| w.name).collect();
        format!("unknown workflow '{}' (known: {})", name, known.join(", "))
    })?;

    let mut input = (workflow.default_input)();
    if let Some(raw) = state {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| format!("--state is not JSON: {}", e))?;
        let overrides = Delta::from_value(value).ok_or("--state must be a JSON object")?;
        for (key, value) in overrides.iter() {
            input.insert(key.clone(), value.clone());
        }
    }

    let graph = (workflow.build)(Arc::new(InMemoryStore::new()))
        .with_node_logging()
        .compile()?;
    tracing::info!(workflow = name, max_steps = config.max_steps, "starting workflow");

    let result = drive(&graph, input, config.run_config(), answers, out).await?;
    print_result(&result, out)?;

    if let Some(path) = config.report_target(result.run_id()) {
        let mut report = RunReport::from_result(name, &result);
        if result.suspended().is_some() {
            match graph.checkpointer().load(result.run_id()).await {
                Ok(record) => report.history = record.history,
                Err(e) => tracing::warn!(error = %e, "could not load history for report"),
            }
        }
        write_report(&path, &report)?;
        writeln!(out, "report written to {}", path.display())?;
    }
    Ok(result)
}

/// Invokes `graph` and resumes every suspension with the next answer.
///
/// Stops when the run completes or fails, or when no answer is left (the
/// run stays suspended). A rejected answer is reported and the next one is
/// tried against the same suspension.
pub async fn drive<R: BufRead, W: Write>(
    graph: &CompiledStateGraph,
    input: Delta,
    config: RunConfig,
    answers: &mut Answers<R>,
    out: &mut W,
) -> Result<RunResult, Error> {
    let mut result = graph.invoke(input, config.clone()).await?;
    while let RunResult::Suspended(suspension) = &result {
        let suspension = suspension.clone();
        print_suspension(&suspension, out)?;
        let Some(answer) = answers.next_answer()? else {
            writeln!(
                out,
                "no answer available; run '{}' left suspended",
                suspension.run_id
            )?;
            break;
        };
        match graph
            .resume_with_config(&suspension.run_id, answer, config.clone())
            .await
        {
            Ok(next) => result = next,
            Err(e @ RunError::InvalidResumeInput { .. }) => {
                writeln!(out, "answer rejected: {}", e)?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(result)
}

fn print_suspension<W: Write>(suspension: &Suspension, out: &mut W) -> Result<(), Error> {
    writeln!(out, "[{}] {}", suspension.node_id, suspension.reason)?;
    for field in &suspension.resume_schema.fields {
        writeln!(
            out,
            "  {}: {}{}",
            field.name,
            field.field_type,
            if field.required { "" } else { " (optional)" }
        )?;
    }
    writeln!(out, "answer with a JSON object:")?;
    out.flush()?;
    Ok(())
}

fn print_result<W: Write>(result: &RunResult, out: &mut W) -> Result<(), Error> {
    writeln!(out, "---")?;
    writeln!(out, "status: {}", result.status())?;
    writeln!(out, "run id: {}", result.run_id())?;
    if let Some(failure) = result.failed() {
        writeln!(out, "error: {}", failure.error)?;
    }
    writeln!(
        out,
        "{}",
        serde_json::to_string_pretty(&result.state().to_json())?
    )?;
    Ok(())
}
