//! Test catalog loading and --only/--omit selection

use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::errors::CatalogError;

/// How a compiled test's target is produced from its source
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CompileStrategy {
    /// Run the `compile` template once
    #[default]
    Template,
    /// Compile the target of another (bytecode) test into a native image.
    /// The bytecode test is built even if it isn't selected.
    TwoStage { bytecode: String },
    /// Run the `compile` template, then move `<target><suffix>` to `<target>`
    /// for compilers which insist on appending an extension
    Rename { suffix: String },
}

/// The `version` field: `false`, a template, or a list of templates
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum VersionSpec {
    Enabled(bool),
    Template(String),
    Templates(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(arg) => vec![arg],
        OneOrMany::Many(args) => args,
    })
}

/// A catalog entry describing one runtime's Hello, world! program
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestSpec {
    /// Test ID (the catalog key)
    #[serde(skip)]
    pub id: String,
    /// Display name
    pub name: String,
    /// Groups this test belongs to, e.g. "compiled", "jvm"
    #[serde(default)]
    pub groups: Vec<String>,
    /// Either a single native executable, or an interpreter followed by its arguments
    #[serde(deserialize_with = "one_or_many")]
    pub command: Vec<String>,
    /// Compiler name, if it differs from the test ID
    #[serde(default)]
    pub compiler: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    /// Compile command template (`%{compiler}`, `%{source}`, `%{target}`)
    #[serde(default)]
    pub compile: Option<String>,
    #[serde(default)]
    pub version: Option<VersionSpec>,
    /// Environment overrides for the compile step
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub strategy: CompileStrategy,
    /// Discard the compiler's stdout
    #[serde(default)]
    pub quiet: bool,
}

impl TestSpec {
    /// The name looked up on the PATH to find this test's compiler
    pub fn compiler_name(&self) -> &str {
        self.compiler.as_deref().unwrap_or(&self.id)
    }

    /// True if the command is a single (native) executable
    pub fn is_native(&self) -> bool {
        self.command.len() == 1
    }

    /// The file the compile step produces, relative to the build directory.
    ///
    /// Falls back to the native command, then to a JVM class file for
    /// capitalized sources, then to `<source>.out`.
    pub fn target_file(&self) -> Option<String> {
        if let Some(ref target) = self.target {
            return Some(target.clone());
        }

        let source = self.source.as_deref()?;

        if self.is_native() {
            Some(self.command[0].clone())
        } else if source.starts_with(|c: char| c.is_ascii_uppercase()) {
            let stem = Path::new(source)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| source.to_string());
            Some(format!("{}.class", stem))
        } else {
            Some(format!("{}.out", source))
        }
    }

    /// Templates used to print the compiler/interpreter version in verbose mode
    pub fn version_templates(&self, has_compiler: bool, has_interpreter: bool) -> Vec<String> {
        match &self.version {
            Some(VersionSpec::Enabled(false)) => Vec::new(),
            Some(VersionSpec::Template(template)) => vec![template.clone()],
            Some(VersionSpec::Templates(templates)) => templates.clone(),
            Some(VersionSpec::Enabled(true)) | None => {
                if has_compiler {
                    vec!["%{compiler} --version | head -n1".to_string()]
                } else if has_interpreter {
                    vec!["%{interpreter} --version | head -n1".to_string()]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

/// The catalog of tests and the groups they belong to
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tests: BTreeMap<String, TestSpec>,
    groups: BTreeMap<String, Vec<String>>,
}

impl Registry {
    /// Load and validate a YAML catalog from disk
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Unreadable(path.to_path_buf(), e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML catalog
    pub fn from_yaml(content: &str) -> Result<Self, CatalogError> {
        let mut tests: BTreeMap<String, TestSpec> =
            serde_yaml::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))?;

        for (id, test) in tests.iter_mut() {
            test.id = id.clone();
        }

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (id, test) in &tests {
            if test.compile.is_some() && test.source.is_none() {
                return Err(CatalogError::MissingSource(id.clone()));
            }

            if test.compile.is_none() && test.strategy != CompileStrategy::Template {
                return Err(CatalogError::StrategyWithoutCompile(id.clone()));
            }

            if let CompileStrategy::TwoStage { ref bytecode } = test.strategy
                && !tests.get(bytecode).is_some_and(|t| t.compile.is_some())
            {
                return Err(CatalogError::InvalidStage {
                    id: id.clone(),
                    stage: bytecode.clone(),
                });
            }

            for group in &test.groups {
                if tests.contains_key(group) {
                    return Err(CatalogError::GroupConflict {
                        id: id.clone(),
                        group: group.clone(),
                    });
                }
                groups.entry(group.clone()).or_default().push(id.clone());
            }
        }

        Ok(Self { tests, groups })
    }

    pub fn get(&self, id: &str) -> Option<&TestSpec> {
        self.tests.get(id)
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Resolve a test ID or group ID into the test IDs it names
    pub fn ids_for(&self, id: &str) -> Result<Vec<&str>, CatalogError> {
        if let Some((id, _)) = self.tests.get_key_value(id) {
            Ok(vec![id.as_str()])
        } else if let Some(members) = self.groups.get(id) {
            Ok(members.iter().map(String::as_str).collect())
        } else {
            Err(CatalogError::UnknownId(id.to_string()))
        }
    }

    /// The tests which satisfy the `only` and `omit` criteria, in ID order.
    ///
    /// An empty `only` selects every test; `omit` always wins.
    pub fn select(&self, only: &[String], omit: &[String]) -> Result<Vec<&TestSpec>, CatalogError> {
        let mut selected: BTreeSet<&str> = if only.is_empty() {
            self.tests.keys().map(String::as_str).collect()
        } else {
            let mut ids = BTreeSet::new();
            for id in only {
                ids.extend(self.ids_for(id)?);
            }
            ids
        };

        for id in omit {
            for omitted in self.ids_for(id)? {
                selected.remove(omitted);
            }
        }

        Ok(selected.into_iter().filter_map(|id| self.tests.get(id)).collect())
    }

    /// Each test ID with its sorted group names
    pub fn ids_to_groups(&self) -> Vec<(String, Vec<String>)> {
        self.tests
            .iter()
            .map(|(id, test)| {
                let mut groups = test.groups.clone();
                groups.sort();
                (id.clone(), groups)
            })
            .collect()
    }
}
