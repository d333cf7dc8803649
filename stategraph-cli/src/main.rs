//! `stategraph` binary: list bundled workflows or run one.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stategraph::RunStatus;
use stategraph_cli::{run_workflow, workflows, RunOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stategraph")]
#[command(about = "Run stateful workflow graphs with fan-out, retries and human-in-the-loop pauses")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List bundled workflows.
    List,
    /// Run a bundled workflow.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Workflow name (see `stategraph list`).
    workflow: String,

    /// JSON object merged over the workflow's default input.
    #[arg(long, value_name = "JSON")]
    state: Option<String>,

    /// Round budget (default 25, or STATEGRAPH_MAX_STEPS).
    #[arg(long, value_name = "N")]
    max_steps: Option<u64>,

    /// Answer for the next suspension (JSON object). Repeatable; stdin is read after these run out.
    #[arg(long = "answer", value_name = "JSON")]
    answers: Vec<String>,

    /// Write a JSON report to this file.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Run id used as checkpoint key.
    #[arg(long, value_name = "ID")]
    run_id: Option<String>,

    /// Debug logs (node enter/exit, rounds, retries) on stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::List => {
            for workflow in workflows::all() {
                println!("{:<12} {}", workflow.name, workflow.description);
            }
        }
        Command::Run(args) => {
            init_tracing(args.verbose);
            let options = RunOptions {
                max_steps: args.max_steps,
                state: args.state,
                answers: args.answers,
                report: args.report,
                run_id: args.run_id,
            };
            match run_workflow(&args.workflow, &options).await {
                Ok(result) => match result.status() {
                    RunStatus::Completed => {}
                    RunStatus::Suspended => std::process::exit(2),
                    RunStatus::Failed => std::process::exit(1),
                },
                Err(e) => {
                    eprintln!("error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
