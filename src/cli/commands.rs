use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `stepforge` - plan, execute, verify and replan tasks against a tool set.
#[derive(Parser, Debug)]
#[command(name = "stepforge")]
#[command(version)]
#[command(about = "Run step plans against capability-matched tools.", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.stepforge/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a plan file and print the result as JSON
    Run {
        /// Plan template (JSON step array or {"taskDescription", "steps"})
        #[arg(short, long)]
        plan: PathBuf,

        /// Task description (defaults to the template's)
        #[arg(short, long)]
        task: Option<String>,

        /// Fail the plan if it is still running after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Validate a plan file and show which tools its steps resolve to
    Check {
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// List registered tools
    Tools,
}
