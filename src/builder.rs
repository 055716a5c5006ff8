//! Build directory management
//!
//! `Builder::build` brings the build directory up to date:
//!
//! 1. mirror the files in the source directory into the build directory
//! 2. compile every selected test whose compiler is installed
//!
//! Tests whose compiler can't be found are disabled in the returned
//! [`Resolution`] rather than failing the run.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::BuildError;
use crate::graph::{BuildAction, BuildGraph, BuildTask};
use crate::registry::{CompileStrategy, Registry, TestSpec};
use crate::utils::{expand_template, resolve_executable, shell_escape};

/// Toolchain discovery result for one test
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toolchain {
    /// Set when the compiler (or an earlier stage's compiler) is missing
    pub disabled: bool,
    /// Absolute path of the resolved compiler
    pub compiler: Option<PathBuf>,
}

/// Per-run toolchain discovery results, keyed by test ID
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    tests: BTreeMap<String, Toolchain>,
    /// Number of targets rebuilt by the last build
    pub rebuilt: usize,
}

impl Resolution {
    /// Tests not seen by the builder are treated as enabled
    pub fn is_disabled(&self, id: &str) -> bool {
        self.tests.get(id).is_some_and(|t| t.disabled)
    }

    pub fn compiler(&self, id: &str) -> Option<&Path> {
        self.tests.get(id).and_then(|t| t.compiler.as_deref())
    }

    fn enable(&mut self, id: &str, compiler: Option<PathBuf>) {
        self.tests.insert(
            id.to_string(),
            Toolchain {
                disabled: false,
                compiler,
            },
        );
    }

    fn disable(&mut self, id: &str) {
        self.tests.insert(
            id.to_string(),
            Toolchain {
                disabled: true,
                compiler: None,
            },
        );
    }
}

/// Cleans and prepares the build directory
pub struct Builder<'a> {
    config: &'a Config,
}

impl<'a> Builder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Remove the build directory and its contents
    pub fn clean(&self) -> Result<()> {
        let dir = &self.config.build_dir;
        if dir.exists() {
            fs::remove_dir_all(dir)
                .with_context(|| format!("Failed to remove build directory: {}", dir.display()))?;
            info!(path = %dir.display(), "Removed build directory");
        }
        Ok(())
    }

    /// Ensure the build directory holds everything the selected tests need
    pub fn build(&self, registry: &Registry, selected: &[&TestSpec]) -> Result<Resolution> {
        let dir = &self.config.build_dir;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create build directory: {}", dir.display()))?;

        let (graph, mut resolution) = self.plan(registry, selected)?;
        resolution.rebuilt = graph.evaluate(|target, action| self.execute(target, action))?;

        info!(rebuilt = resolution.rebuilt, "Build directory is up to date");
        Ok(resolution)
    }

    /// Register the build graph for the selected tests without running it
    pub fn plan(&self, registry: &Registry, selected: &[&TestSpec]) -> Result<(BuildGraph, Resolution)> {
        let mut graph = BuildGraph::new(&self.config.build_dir);
        let mut resolution = Resolution::default();

        self.mirror_sources(&mut graph)?;

        for test in selected {
            if test.compile.is_none() {
                resolution.enable(&test.id, None);
                continue;
            }

            match test.strategy {
                // needs the bytecode stage's node, registered below
                CompileStrategy::TwoStage { .. } => {}
                _ => match register(&mut graph, test) {
                    Some((target, compiler)) => {
                        graph.connect(&target);
                        resolution.enable(&test.id, Some(compiler));
                    }
                    None => resolution.disable(&test.id),
                },
            }
        }

        for test in selected {
            if let CompileStrategy::TwoStage { ref bytecode } = test.strategy
                && test.compile.is_some()
            {
                match register_two_stage(&mut graph, registry, test, bytecode) {
                    Some((target, compiler)) => {
                        graph.connect(&target);
                        resolution.enable(&test.id, Some(compiler));
                    }
                    None => resolution.disable(&test.id),
                }
            }
        }

        Ok((graph, resolution))
    }

    /// Add a copy node for each file in the source directory so edits there
    /// propagate to the build directory
    fn mirror_sources(&self, graph: &mut BuildGraph) -> Result<()> {
        let src = &self.config.source_dir;
        if !src.is_dir() {
            warn!(path = %src.display(), "Source directory not found");
            return Ok(());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(src)
            .with_context(|| format!("Failed to read source directory: {}", src.display()))?
        {
            let path = entry?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            let from = fs::canonicalize(&path).unwrap_or(path);
            graph.add_node(
                name.clone(),
                vec![from.clone()],
                BuildAction::Copy { from },
            );
            graph.connect(&name);
        }

        Ok(())
    }

    /// Run the action for a stale node
    fn execute(&self, target: &str, action: &BuildAction) -> Result<()> {
        let dir = &self.config.build_dir;

        match action {
            BuildAction::Copy { from } => {
                debug!(from = %from.display(), to = %target, "cp");
                fs::copy(from, dir.join(target))
                    .with_context(|| format!("Failed to copy {} to {}", from.display(), target))?;
            }
            BuildAction::Compile(task) => {
                let command = compile_command(task);
                info!(test = %task.id, "{}", command);
                run_shell(dir, &command, &task.env, task.quiet)?;

                if let Some(ref suffix) = task.rename_suffix {
                    let produced = dir.join(format!("{}{}", task.target, suffix));
                    if produced.exists() {
                        debug!(from = %produced.display(), to = %task.target, "mv");
                        fs::rename(&produced, dir.join(&task.target)).with_context(|| {
                            format!("Failed to rename {}", produced.display())
                        })?;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Register a compile node for `test`. Returns its target and compiler path,
/// or `None` if the compiler isn't installed.
fn register(graph: &mut BuildGraph, test: &TestSpec) -> Option<(String, PathBuf)> {
    let Some(compiler) = resolve_executable(test.compiler_name()) else {
        debug!(test = %test.id, compiler = test.compiler_name(), "Compiler not found, disabling");
        return None;
    };

    let source = test.source.clone()?;
    let target = test.target_file()?;
    let template = test.compile.clone()?;

    let rename_suffix = match test.strategy {
        CompileStrategy::Rename { ref suffix } => Some(suffix.clone()),
        _ => None,
    };

    graph.add_node(
        target.clone(),
        // recompile if the compiler has been updated since the target was built
        vec![PathBuf::from(&source), compiler.clone()],
        BuildAction::Compile(BuildTask {
            id: test.id.clone(),
            compiler: compiler.clone(),
            source,
            target: target.clone(),
            template,
            env: test.env.clone(),
            quiet: test.quiet,
            rename_suffix,
        }),
    );

    Some((target, compiler))
}

/// Register a native stage fed by another test's bytecode target. Both
/// stages' compilers must be installed.
fn register_two_stage(
    graph: &mut BuildGraph,
    registry: &Registry,
    test: &TestSpec,
    bytecode: &str,
) -> Option<(String, PathBuf)> {
    let Some(compiler) = resolve_executable(test.compiler_name()) else {
        debug!(test = %test.id, compiler = test.compiler_name(), "Compiler not found, disabling");
        return None;
    };

    // the bytecode stage is built whether or not its own test is selected
    let stage = registry.get(bytecode)?;
    let stage_target = stage.target_file()?;
    if !graph.contains(&stage_target) {
        register(graph, stage)?;
    }

    let source = test.source.clone()?;
    let target = test.target_file()?;
    let template = test.compile.clone()?;

    let mut prerequisites = vec![PathBuf::from(&stage_target)];
    if source != stage_target {
        prerequisites.push(PathBuf::from(&source));
    }
    prerequisites.push(compiler.clone());

    graph.add_node(
        target.clone(),
        prerequisites,
        BuildAction::Compile(BuildTask {
            id: test.id.clone(),
            compiler: compiler.clone(),
            source,
            target: target.clone(),
            template,
            env: test.env.clone(),
            quiet: test.quiet,
            rename_suffix: None,
        }),
    );

    Some((target, compiler))
}

/// Substitute the shell-escaped compiler, source and target into the template
pub fn compile_command(task: &BuildTask) -> String {
    let compiler = shell_escape(&task.compiler.to_string_lossy());
    let source = shell_escape(&task.source);
    let target = shell_escape(&task.target);

    expand_template(
        &task.template,
        &[
            ("compiler", compiler.as_str()),
            ("source", source.as_str()),
            ("target", target.as_str()),
        ],
    )
}

/// Run a command line through `sh -c` in `dir`. The command's stdout goes to
/// stderr (or nowhere) so it never mixes with the results.
fn run_shell(dir: &Path, command: &str, env: &BTreeMap<String, String>, quiet: bool) -> Result<()> {
    let stdout = if quiet {
        Stdio::null()
    } else {
        Stdio::from(std::io::stderr())
    };

    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(dir)
        .envs(env)
        .stdout(stdout)
        .status()
        .map_err(|e| BuildError::SpawnFailed {
            command: command.to_string(),
            message: e.to_string(),
        })?;

    if !status.success() {
        return Err(BuildError::CommandFailed {
            command: command.to_string(),
            status: status.to_string(),
        }
        .into());
    }

    Ok(())
}
