//! Benchmark runner
//!
//! Each runnable test is run once to check it prints the expected output,
//! then timed repeatedly. The fastest run is its result.

use anyhow::Result;
use rand::seq::SliceRandom;
use rand::thread_rng;
use regex::Regex;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::builder::Resolution;
use crate::config::{Config, MeasurementSpec, Verbosity};
use crate::errors::ExecutionError;
use crate::registry::TestSpec;
use crate::report::TimingResult;
use crate::utils::{expand_template, resolve_executable, shell_escape, shell_join, truncate_ms};

/// Every program must print exactly this
static EXPECTED_OUTPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\AHello, world!(?:\r?\n)?\z").expect("expected-output pattern is valid")
});

/// Environment variable prefixes belonging to the harness itself, removed
/// from the environment of timed programs
const HARNESS_ENV_PREFIXES: &[&str] = &["CARGO", "RUST_", "STARTUP_TIME_"];

/// Returns true if `output` is an acceptable Hello, world! line
pub fn is_expected_output(output: &str) -> bool {
    EXPECTED_OUTPUT.is_match(output)
}

/// A selected test whose compiler and interpreter (if any) are installed
#[derive(Debug, Clone)]
pub struct RunnableTest<'a> {
    pub id: String,
    pub spec: &'a TestSpec,
    /// Absolute path of the native executable or interpreter
    pub executable: PathBuf,
    /// The command's first token, passed as argv[0]
    pub argv0: String,
    pub args: Vec<String>,
    pub interpreter: Option<PathBuf>,
    pub compiler: Option<PathBuf>,
    /// Directory the program runs in
    pub dir: PathBuf,
}

impl RunnableTest<'_> {
    /// The command line, for display
    pub fn command_line(&self) -> String {
        let mut args = vec![self.executable.to_string_lossy().into_owned()];
        args.extend(self.args.iter().cloned());
        shell_join(&args)
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.executable);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.arg0(&self.argv0);
        }

        command.args(&self.args).current_dir(&self.dir);
        command
    }
}

/// Join the selected tests with the build results, keeping those which can
/// actually run.
///
/// A native test needs its executable in the build directory; an interpreted
/// test needs its interpreter on the PATH. Anything else is skipped silently.
pub fn runnable_tests<'a>(
    selected: &[&'a TestSpec],
    resolution: &Resolution,
    build_dir: &Path,
) -> Vec<RunnableTest<'a>> {
    let mut tests = Vec::new();

    for &spec in selected {
        if resolution.is_disabled(&spec.id) {
            continue;
        }

        let Some((argv0, args)) = spec.command.split_first() else {
            continue;
        };

        let (executable, interpreter) = if spec.is_native() {
            let executable = build_dir.join(argv0);
            if !executable.exists() {
                debug!(test = %spec.id, path = %executable.display(), "Executable not found, skipping");
                continue;
            }
            (executable, None)
        } else {
            let Some(interpreter) = resolve_executable(argv0) else {
                debug!(test = %spec.id, interpreter = %argv0, "Interpreter not found, skipping");
                continue;
            };
            (interpreter.clone(), Some(interpreter))
        };

        tests.push(RunnableTest {
            id: spec.id.clone(),
            spec,
            executable,
            argv0: argv0.clone(),
            args: args.to_vec(),
            interpreter,
            compiler: resolution.compiler(&spec.id).map(Path::to_path_buf),
            dir: build_dir.to_path_buf(),
        });
    }

    tests
}

/// Run the program once and make sure it succeeds with the expected output
pub fn check_output(test: &RunnableTest) -> Result<(), ExecutionError> {
    let output = test
        .command()
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ExecutionError::SpawnFailed {
            id: test.id.clone(),
            message: e.to_string(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExecutionError::Failed {
            id: test.id.clone(),
            status: output.status.to_string(),
            output: format!("{}{}", stdout, stderr),
        });
    }

    if !is_expected_output(&stdout) {
        return Err(ExecutionError::InvalidOutput {
            id: test.id.clone(),
            output: stdout.into_owned(),
        });
    }

    Ok(())
}

/// Outcome of timing one test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    pub fastest: Duration,
    pub rounds: u32,
    /// Sum of every run's duration
    pub elapsed: Duration,
}

/// Take samples until the budget in `spec` is used up and keep the fastest.
///
/// In count mode exactly that many samples are taken. In duration mode
/// samples are taken until their total meets the budget, so the last one may
/// overshoot it.
pub fn measure<F>(spec: MeasurementSpec, mut sample: F) -> Result<Measurement>
where
    F: FnMut() -> Result<Duration>,
{
    let mut fastest = Duration::MAX;
    let mut rounds = 0;
    let mut elapsed = Duration::ZERO;

    loop {
        let time = sample()?;
        fastest = fastest.min(time);
        elapsed += time;
        rounds += 1;

        let done = match spec {
            MeasurementSpec::Count(count) => rounds >= count,
            MeasurementSpec::Duration(budget) => elapsed >= budget,
        };

        if done {
            break;
        }
    }

    Ok(Measurement {
        fastest,
        rounds,
        elapsed,
    })
}

/// Names of the harness's own variables in the current environment
fn harness_env_vars() -> Vec<OsString> {
    std::env::vars_os()
        .map(|(key, _)| key)
        .filter(|key| {
            key.to_str()
                .is_some_and(|k| HARNESS_ENV_PREFIXES.iter().any(|p| k.starts_with(p)))
        })
        .collect()
}

/// Runs the correctness check and timing loop for each test
pub struct Runner<'a> {
    config: &'a Config,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Time every test in random order. Results are sorted fastest first.
    pub fn run(&self, mut tests: Vec<RunnableTest>) -> Result<Vec<TimingResult>> {
        if tests.is_empty() {
            return Ok(Vec::new());
        }

        // split a suite-wide duration across the tests
        let spec = self.config.spec.per_test(tests.len());
        debug!(tests = tests.len(), spec = ?spec, "Starting benchmark");

        // so cache warmth doesn't track catalog order
        tests.shuffle(&mut thread_rng());

        let mut results = Vec::with_capacity(tests.len());
        for test in &tests {
            results.push(self.time(test, spec)?);
        }

        results.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(results)
    }

    /// Check then time a single test
    pub fn time(&self, test: &RunnableTest, spec: MeasurementSpec) -> Result<TimingResult> {
        let verbosity = self.config.verbosity;

        if verbosity == Verbosity::Verbose {
            println!();
            println!("test: {}", test.id);
            self.print_versions(test);
            println!("command: {}", test.command_line());
        } else if verbosity == Verbosity::Default {
            print!(".");
            std::io::stdout().flush()?;
        }

        check_output(test)?;

        let unset = harness_env_vars();
        let measurement = measure(spec, || {
            let mut command = test.command();
            for key in &unset {
                command.env_remove(key);
            }
            command.stdin(Stdio::null()).stdout(Stdio::null());

            let start = Instant::now();
            let status = command.status().map_err(|e| ExecutionError::SpawnFailed {
                id: test.id.clone(),
                message: e.to_string(),
            })?;
            let time = start.elapsed();

            if !status.success() {
                return Err(ExecutionError::Failed {
                    id: test.id.clone(),
                    status: status.to_string(),
                    output: String::new(),
                }
                .into());
            }

            Ok(time)
        })?;

        debug!(
            test = %test.id,
            rounds = measurement.rounds,
            fastest_us = measurement.fastest.as_micros() as u64,
            elapsed_ms = measurement.elapsed.as_millis() as u64,
            "Timed"
        );

        if verbosity == Verbosity::Verbose && matches!(spec, MeasurementSpec::Duration(_)) {
            println!("rounds: {}", measurement.rounds);
        }

        Ok(TimingResult {
            id: test.id.clone(),
            name: test.spec.name.clone(),
            time: truncate_ms(measurement.fastest),
        })
    }

    /// Print the compiler's (or interpreter's) version
    fn print_versions(&self, test: &RunnableTest) {
        let compiler = test
            .compiler
            .as_ref()
            .or(test.interpreter.as_ref())
            .map(|p| shell_escape(&p.to_string_lossy()))
            .unwrap_or_default();
        let interpreter = test
            .interpreter
            .as_ref()
            .map(|p| shell_escape(&p.to_string_lossy()))
            .unwrap_or_default();

        let templates = test
            .spec
            .version_templates(test.compiler.is_some(), test.interpreter.is_some());

        for template in templates {
            let command = expand_template(
                &template,
                &[("compiler", compiler.as_str()), ("interpreter", interpreter.as_str())],
            );

            match Command::new("sh").arg("-c").arg(&command).status() {
                Ok(status) if status.success() => {}
                Ok(status) => warn!(test = %test.id, %command, %status, "Version command failed"),
                Err(e) => warn!(test = %test.id, %command, error = %e, "Version command failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Action, Format};
    use crate::registry::Registry;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn write_script(path: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn config(dir: &Path, spec: MeasurementSpec) -> Config {
        Config {
            action: Action::Benchmark,
            format: Format::Json,
            verbosity: Verbosity::Quiet,
            spec,
            build_dir: dir.to_path_buf(),
            source_dir: dir.join("src"),
            catalog: dir.join("tests.yaml"),
            only: Vec::new(),
            omit: Vec::new(),
        }
    }

    const CATALOG: &str = r#"
missing:
  name: Missing
  command: not-built
present:
  name: Present
  command: hello
lowercase:
  name: Lowercase
  command: hello-lower
failing:
  name: Failing
  command: hello-fail
script:
  name: Script
  command: [sh, hello.sh]
no-interpreter:
  name: No Interpreter
  command: [definitely-not-a-real-interpreter-3f9a, hello.x]
env-dump:
  name: Env Dump
  command: hello-env
"#;

    fn setup() -> (TempDir, Registry) {
        let tmp = TempDir::new().unwrap();
        write_script(&tmp.path().join("hello"), "echo 'Hello, world!'");
        write_script(&tmp.path().join("hello-lower"), "echo 'hello, world!'");
        write_script(&tmp.path().join("hello-fail"), "echo 'Hello, world!'; exit 2");
        fs::write(tmp.path().join("hello.sh"), "echo 'Hello, world!'\n").unwrap();
        write_script(
            &tmp.path().join("hello-env"),
            "env | grep -c '^STARTUP_TIME_RUNNER_MARK=' >> seen.txt; echo 'Hello, world!'",
        );
        (tmp, Registry::from_yaml(CATALOG).unwrap())
    }

    fn runnable<'r>(tmp: &TempDir, registry: &'r Registry, id: &str) -> RunnableTest<'r> {
        let selected = vec![registry.get(id).unwrap()];
        runnable_tests(&selected, &Resolution::default(), tmp.path())
            .pop()
            .unwrap()
    }

    #[test]
    fn test_expected_output() {
        assert!(is_expected_output("Hello, world!\n"));
        assert!(is_expected_output("Hello, world!\r\n"));
        assert!(is_expected_output("Hello, world!"));
        assert!(!is_expected_output("hello, world!\n"));
        assert!(!is_expected_output("Hello, world!\nextra"));
        assert!(!is_expected_output("Hello, world!\n\n"));
        assert!(!is_expected_output(""));
    }

    #[test]
    fn test_only_existing_executables_are_runnable() {
        let (tmp, registry) = setup();
        let selected = registry
            .select(
                &["missing".to_string(), "present".to_string()],
                &[],
            )
            .unwrap();
        assert_eq!(selected.len(), 2);

        let tests = runnable_tests(&selected, &Resolution::default(), tmp.path());
        let ids: Vec<_> = tests.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["present"]);
        assert!(tests[0].executable.is_absolute());
        assert!(tests[0].interpreter.is_none());
    }

    #[test]
    fn test_missing_interpreter_is_skipped() {
        let (tmp, registry) = setup();
        let selected = registry
            .select(&["script".to_string(), "no-interpreter".to_string()], &[])
            .unwrap();

        let tests = runnable_tests(&selected, &Resolution::default(), tmp.path());
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].id, "script");
        assert_eq!(tests[0].argv0, "sh");
        assert_eq!(tests[0].args, vec!["hello.sh"]);
        assert!(tests[0].interpreter.is_some());
    }

    #[test]
    fn test_check_output_accepts_hello_world() {
        let (tmp, registry) = setup();
        check_output(&runnable(&tmp, &registry, "present")).unwrap();
        check_output(&runnable(&tmp, &registry, "script")).unwrap();
    }

    #[test]
    fn test_check_output_rejects_wrong_output() {
        let (tmp, registry) = setup();
        let err = check_output(&runnable(&tmp, &registry, "lowercase")).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidOutput { ref id, .. } if id == "lowercase"));
    }

    #[test]
    fn test_check_output_rejects_failed_process() {
        let (tmp, registry) = setup();
        let err = check_output(&runnable(&tmp, &registry, "failing")).unwrap_err();
        match err {
            ExecutionError::Failed { id, output, .. } => {
                assert_eq!(id, "failing");
                assert!(output.contains("Hello, world!"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_count_mode_takes_minimum() {
        let mut samples = vec![7, 5, 9].into_iter().map(Duration::from_millis);
        let m = measure(MeasurementSpec::Count(3), || Ok(samples.next().unwrap())).unwrap();
        assert_eq!(m.rounds, 3);
        assert_eq!(m.fastest, Duration::from_millis(5));
        assert_eq!(m.elapsed, Duration::from_millis(21));
    }

    #[test]
    fn test_count_mode_equal_samples() {
        let m = measure(MeasurementSpec::Count(3), || Ok(Duration::from_millis(5))).unwrap();
        assert_eq!(truncate_ms(m.fastest), 5.0);
    }

    #[test]
    fn test_duration_mode_meets_budget() {
        let budget = Duration::from_millis(35);
        let step = Duration::from_millis(10);
        let m = measure(MeasurementSpec::Duration(budget), || Ok(step)).unwrap();
        assert_eq!(m.rounds, 4);
        assert!(m.elapsed >= budget);
        assert!(m.elapsed < budget + step);
    }

    #[test]
    fn test_fastest_is_no_slower_than_any_sample() {
        let mut seen = Vec::new();
        let mut n = 0u64;
        let m = measure(MeasurementSpec::Count(20), || {
            n += 1;
            let t = Duration::from_micros((n * 7919) % 1000 + 100);
            seen.push(t);
            Ok(t)
        })
        .unwrap();
        assert_eq!(seen.len(), 20);
        assert!(seen.iter().all(|t| m.fastest <= *t));
        assert!(seen.contains(&m.fastest));
    }

    #[test]
    fn test_sample_errors_propagate() {
        let result = measure(MeasurementSpec::Count(3), || Err(anyhow::anyhow!("boom")));
        assert!(result.is_err());
    }

    #[test]
    fn test_run_times_every_test() {
        let (tmp, registry) = setup();
        let config = config(tmp.path(), MeasurementSpec::Count(2));
        let selected = registry
            .select(&["present".to_string(), "script".to_string()], &[])
            .unwrap();
        let tests = runnable_tests(&selected, &Resolution::default(), tmp.path());

        let results = Runner::new(&config).run(tests).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].time <= results[1].time);
        assert!(results.iter().all(|r| r.time > 0.0));
    }

    #[test]
    fn test_run_aborts_on_invalid_output() {
        let (tmp, registry) = setup();
        let config = config(tmp.path(), MeasurementSpec::Count(2));
        let selected = registry
            .select(&["present".to_string(), "lowercase".to_string()], &[])
            .unwrap();
        let tests = runnable_tests(&selected, &Resolution::default(), tmp.path());

        let err = Runner::new(&config).run(tests).unwrap_err();
        assert!(err.downcast_ref::<ExecutionError>().is_some());
    }

    #[test]
    fn test_timed_runs_drop_harness_env() {
        let (tmp, registry) = setup();
        let config = config(tmp.path(), MeasurementSpec::Count(2));
        // SAFETY: no other test reads or writes this variable
        unsafe { std::env::set_var("STARTUP_TIME_RUNNER_MARK", "1") };

        let test = runnable(&tmp, &registry, "env-dump");
        Runner::new(&config).time(&test, config.spec).unwrap();

        // the correctness check sees the full environment, timed runs don't
        let seen = fs::read_to_string(tmp.path().join("seen.txt")).unwrap();
        assert_eq!(seen.lines().collect::<Vec<_>>(), vec!["1", "0", "0"]);
    }

    #[test]
    fn test_empty_run() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), MeasurementSpec::Count(2));
        assert!(Runner::new(&config).run(Vec::new()).unwrap().is_empty());
    }
}
