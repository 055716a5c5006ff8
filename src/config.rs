//! Runtime configuration built once from the command line

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;

/// Default test duration in seconds (duration mode)
pub const DEFAULT_DURATION: u64 = 10;
/// Lower bound for --time
pub const MINIMUM_DURATION: u64 = 2;
/// Lower bound for --count
pub const MINIMUM_ROUNDS: u32 = 2;

/// The single action performed by an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Benchmark,
    Clean,
    ShowIds,
}

/// Output format for results and the id/group listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Default,
    Verbose,
}

/// How much work each test is given during timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementSpec {
    /// Run each program exactly this many times
    Count(u32),
    /// Run the whole suite for at least this long
    Duration(Duration),
}

impl MeasurementSpec {
    /// Split a suite-wide duration budget evenly across `tests` tests.
    /// Count mode is returned unchanged.
    pub fn per_test(self, tests: usize) -> Self {
        match self {
            MeasurementSpec::Duration(total) if tests > 0 => {
                MeasurementSpec::Duration(total / u32::try_from(tests).unwrap_or(u32::MAX))
            }
            other => other,
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub action: Action,
    pub format: Format,
    pub verbosity: Verbosity,
    pub spec: MeasurementSpec,
    /// Directory the targets are built in (and run from)
    pub build_dir: PathBuf,
    /// Directory whose files are mirrored into the build directory
    pub source_dir: PathBuf,
    /// Path to the YAML test catalog
    pub catalog: PathBuf,
    /// Test/group ids passed to --only
    pub only: Vec<String>,
    /// Test/group ids passed to --omit
    pub omit: Vec<String>,
}

impl Config {
    /// Create config from CLI arguments
    pub fn from_cli(cli: &Cli) -> Self {
        let action = if cli.clean {
            Action::Clean
        } else if cli.help_only {
            Action::ShowIds
        } else {
            Action::Benchmark
        };

        let format = if cli.json { Format::Json } else { Format::Table };

        // --json implies --quiet so stdout stays machine-readable
        let verbosity = if cli.json || cli.quiet {
            Verbosity::Quiet
        } else if cli.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Default
        };

        let spec = match (cli.count, cli.time) {
            (Some(rounds), _) => MeasurementSpec::Count(rounds.max(MINIMUM_ROUNDS)),
            (None, time) => {
                let secs = time.unwrap_or(DEFAULT_DURATION).max(MINIMUM_DURATION);
                MeasurementSpec::Duration(Duration::from_secs(secs))
            }
        };

        Self {
            action,
            format,
            verbosity,
            spec,
            build_dir: cli
                .dir
                .as_deref()
                .map(absolute)
                .unwrap_or_else(default_build_dir),
            source_dir: cli
                .src
                .as_deref()
                .map(absolute)
                .unwrap_or_else(|| resources_dir().join("src")),
            catalog: cli
                .tests
                .as_deref()
                .map(absolute)
                .unwrap_or_else(|| resources_dir().join("tests.yaml")),
            only: clean_selectors(&cli.only),
            omit: clean_selectors(&cli.omit),
        }
    }
}

/// Get the default build directory
pub fn default_build_dir() -> PathBuf {
    let cache = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
    cache.join("startup-time")
}

/// The bundled catalog and sources shipped with the crate
fn resources_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("resources")
}

/// Programs are run from the build directory, so relative paths given on the
/// command line are anchored to the current directory up front
fn absolute(path: &str) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| PathBuf::from(path))
}

fn clean_selectors(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(args: &[&str]) -> Config {
        let mut argv = vec!["startup-time"];
        argv.extend_from_slice(args);
        Config::from_cli(&Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_default_is_duration_mode() {
        let config = config(&[]);
        assert_eq!(config.action, Action::Benchmark);
        assert_eq!(
            config.spec,
            MeasurementSpec::Duration(Duration::from_secs(DEFAULT_DURATION))
        );
    }

    #[test]
    fn test_minimums_are_clamped() {
        assert_eq!(config(&["--count", "1"]).spec, MeasurementSpec::Count(2));
        assert_eq!(
            config(&["--time", "0"]).spec,
            MeasurementSpec::Duration(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_count_takes_precedence_over_time() {
        assert_eq!(
            config(&["--count", "7", "--time", "30"]).spec,
            MeasurementSpec::Count(7)
        );
    }

    #[test]
    fn test_json_implies_quiet() {
        let config = config(&["--json", "--verbose"]);
        assert_eq!(config.format, Format::Json);
        assert_eq!(config.verbosity, Verbosity::Quiet);
    }

    #[test]
    fn test_clean_wins_over_show_ids() {
        assert_eq!(config(&["--clean", "--help-only"]).action, Action::Clean);
        assert_eq!(config(&["-H"]).action, Action::ShowIds);
    }

    #[test]
    fn test_selectors_are_trimmed() {
        let config = config(&["--only", " ruby , python,"]);
        assert_eq!(config.only, vec!["ruby", "python"]);
    }

    #[test]
    fn test_relative_dir_is_made_absolute() {
        let config = config(&["--dir", "build"]);
        assert!(config.build_dir.is_absolute());
        assert!(config.build_dir.ends_with("build"));
    }

    #[test]
    fn test_per_test_duration_split() {
        let spec = MeasurementSpec::Duration(Duration::from_secs(10));
        assert_eq!(
            spec.per_test(4),
            MeasurementSpec::Duration(Duration::from_millis(2500))
        );
        assert_eq!(MeasurementSpec::Count(3).per_test(4), MeasurementSpec::Count(3));
        assert_eq!(spec.per_test(0), spec);
    }

    #[test]
    fn test_huge_duration_split_does_not_overflow() {
        let max = u64::MAX.to_string();
        let config = config(&["--time", max.as_str()]);
        assert_eq!(
            config.spec.per_test(1),
            MeasurementSpec::Duration(Duration::from_secs(u64::MAX))
        );
        assert!(matches!(config.spec.per_test(3), MeasurementSpec::Duration(d) if d > Duration::ZERO));
    }
}
