//! stategraph-cli library: bundled demo workflows and the driver that runs them.
//!
//! Looks up a workflow by name, builds and compiles its graph, runs it and
//! answers suspensions from queued answers or stdin, then prints the final
//! state and optionally writes a JSON report.
//!
//! ## Usage
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), stategraph_cli::Error> {
//! let options = stategraph_cli::RunOptions {
//!     answers: vec![r#"{"decision": "approved"}"#.to_string()],
//!     state: Some(r#"{"email_type": "promotion"}"#.to_string()),
//!     ..Default::default()
//! };
//! let result = stategraph_cli::run_workflow("email", &options).await?;
//! println!("{}", result.status());
//! # Ok(())
//! # }
//! ```

mod config;
mod middleware;
mod run;
pub mod workflows;

pub use config::{CliConfig, Error, RunOptions};
pub use middleware::{LoggingMiddleware, WithNodeLogging};
pub use run::{
    drive, parse_answer, run_with_config, run_workflow, write_report, Answers, RunReport,
};
