//! CLI argument parsing using clap

use clap::Parser;

/// Measure the startup time of "Hello, world!" programs across language runtimes
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "startup-time")]
#[command(author, version, about, long_about = None)]
#[command(after_help = r#"Examples:
  startup-time
  startup-time --only compiled --omit jvm
  startup-time --count 20 --json
  startup-time --time 30 --verbose
  startup-time --help-only
  startup-time --clean
"#)]
pub struct Cli {
    /// The number of times to run each program (minimum: 2)
    #[arg(long = "count", short = 'c', visible_alias = "rounds", value_name = "INTEGER")]
    pub count: Option<u32>,

    /// Remove the build directory and exit (targets will be recompiled on the next run)
    #[arg(long)]
    pub clean: bool,

    /// Specify the build directory (default: <cache dir>/startup-time)
    #[arg(long, short = 'd', value_name = "PATH", env = "STARTUP_TIME_BUILD_DIR")]
    pub dir: Option<String>,

    /// Show the IDs and groups that can be passed to --only and --omit
    #[arg(long = "help-only", short = 'H', visible_alias = "help-omit")]
    pub help_only: bool,

    /// Output the results in JSON format (implies --quiet)
    #[arg(long, short = 'j')]
    pub json: bool,

    /// Only run the specified tests (comma-separated list of IDs/groups)
    #[arg(long, short = 'o', value_name = "LIST", value_delimiter = ',')]
    pub only: Vec<String>,

    /// Don't run the specified tests (comma-separated list of IDs/groups)
    #[arg(long, short = 'O', value_name = "LIST", value_delimiter = ',')]
    pub omit: Vec<String>,

    /// Suppress all inessential output
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Specify the minimum number of seconds to run the test suite for (minimum: 2, default: 10)
    #[arg(long, short = 't', value_name = "INTEGER")]
    pub time: Option<u64>,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Path to the test catalog (YAML)
    #[arg(long, value_name = "PATH", env = "STARTUP_TIME_TESTS")]
    pub tests: Option<String>,

    /// Directory of source files mirrored into the build directory
    #[arg(long, value_name = "PATH", env = "STARTUP_TIME_SRC")]
    pub src: Option<String>,
}
