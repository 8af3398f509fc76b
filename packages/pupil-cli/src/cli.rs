use clap::{Args, Parser, Subcommand};
use pupil_rs::Task;

#[derive(Parser)]
#[command(
    name = "pupilproc",
    version,
    about = "Pupil dilation conditioning for cognitive-task eye-tracking sessions",
    long_about = "Condition raw gaze exports (.gazedata or spreadsheet) from verbal fluency, word-list encoding\n\
                  and word-list recall sessions into baseline-corrected, time-binned dilation tables."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Process one subject's session
    Run(RunArgs),
    /// Process many sessions in parallel
    Batch(BatchArgs),
    /// Check that a file can be ingested
    Validate(ValidateArgs),
    /// List the supported tasks and their default parameters
    Tasks(TasksArgs),
}

/// Parameters shared by `run` and `batch`. Flags override the JSON config,
/// which overrides the task preset.
#[derive(Args, Clone, Default)]
pub struct ProcessingArgs {
    /// JSON task configuration; fields it leaves out keep the task preset
    /// (see `pupilproc tasks --json` for the full set)
    #[arg(long, env = "PUPILPROC_CONFIG")]
    pub config: Option<String>,

    /// Upper plausible pupil diameter (mm)
    #[arg(long)]
    pub hi: Option<f64>,

    /// Lower plausible pupil diameter (mm)
    #[arg(long)]
    pub lo: Option<f64>,

    /// Samples discarded on each side of a blink
    #[arg(long)]
    pub padding: Option<usize>,

    /// Output bin width in milliseconds
    #[arg(long)]
    pub bin_width_ms: Option<u32>,

    /// Coarse (quartile) bin width in milliseconds
    #[arg(long)]
    pub quartile_width_ms: Option<u32>,

    /// Low-pass cutoff in Hz
    #[arg(long)]
    pub cutoff_hz: Option<f64>,

    /// Butterworth filter order
    #[arg(long)]
    pub filter_order: Option<usize>,
}

#[derive(Args)]
pub struct RunArgs {
    /// Task the recording comes from (fluency, encoding, recall)
    #[arg(long)]
    pub task: Task,

    /// Gaze export to process
    #[arg(long)]
    pub file: String,

    /// Directory for the CSV tables (default: next to the input file)
    #[arg(short, long)]
    pub output_dir: Option<String>,

    #[command(flatten)]
    pub processing: ProcessingArgs,

    /// Also write <stem>_PlotRequest.json
    #[arg(long, default_value_t = false)]
    pub plot_request: bool,

    /// Print the full result as JSON on stdout
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Task of every file in the batch
    #[arg(long)]
    pub task: Task,

    /// Glob pattern for input files (e.g. "data/*.gazedata")
    #[arg(long, conflicts_with = "files")]
    pub glob: Option<String>,

    /// Explicit list of input files
    #[arg(long, num_args = 1..)]
    pub files: Option<Vec<String>>,

    /// Directory for the CSV tables (default: next to each input file)
    #[arg(short, long)]
    pub output_dir: Option<String>,

    #[command(flatten)]
    pub processing: ProcessingArgs,

    /// Also write <stem>_PlotRequest.json per subject
    #[arg(long, default_value_t = false)]
    pub plot_request: bool,

    /// Worker threads (default: one per core)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Stop starting new subjects after the first failure
    #[arg(long, default_value_t = false)]
    pub fail_fast: bool,

    /// List the files that would be processed and exit
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Print a JSON summary on stdout
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Input file path
    #[arg(long)]
    pub file: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct TasksArgs {
    /// Output as JSON, including each task's full default configuration
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
