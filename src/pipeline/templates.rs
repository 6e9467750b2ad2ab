//! Argv templates for the external collaborators.
//!
//! A template is a program plus argument strings containing `{name}`
//! placeholders. Rendering substitutes values per argument; an argument that
//! is exactly a list placeholder (such as `{inputs}`) expands into one
//! argument per element. No shell is involved at any point.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::execution::CommandSpec;

use super::config::ConfigError;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("Invalid regex for placeholders"))
}

/// Program plus argument templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Names of every placeholder used by the template.
    pub fn placeholders(&self) -> Vec<String> {
        self.args
            .iter()
            .flat_map(|arg| placeholder_regex().captures_iter(arg))
            .map(|caps| caps[1].to_string())
            .collect()
    }

    /// Renders the template into a launchable command.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the template references a
    /// placeholder that `vars` does not provide.
    pub fn render(&self, vars: &TemplateVars) -> Result<CommandSpec, ConfigError> {
        let mut spec = CommandSpec::new(&self.program);

        for arg in &self.args {
            if let Some(items) = vars.list_for(arg) {
                spec = spec.with_args(items.iter().cloned());
                continue;
            }

            let mut missing = None;
            let rendered = placeholder_regex().replace_all(arg, |caps: &regex::Captures| {
                match vars.scalars.get(&caps[1]) {
                    Some(value) => value.clone(),
                    None => {
                        missing = Some(caps[1].to_string());
                        String::new()
                    }
                }
            });
            if let Some(name) = missing {
                return Err(ConfigError::InvalidValue {
                    key: format!("{} template", self.program),
                    message: format!("unknown placeholder '{{{}}}'", name),
                });
            }
            spec = spec.arg(rendered.into_owned());
        }

        Ok(spec)
    }
}

/// Values available to a template render.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    scalars: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a scalar placeholder.
    pub fn set(mut self, name: &str, value: impl ToString) -> Self {
        self.scalars.insert(name.to_string(), value.to_string());
        self
    }

    /// Sets a path placeholder.
    pub fn set_path(self, name: &str, path: &Path) -> Self {
        let value = path.display().to_string();
        self.set(name, value)
    }

    /// Sets a list placeholder, expanded into one argument per item.
    pub fn set_list<I, S>(mut self, name: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lists.insert(
            name.to_string(),
            items.into_iter().map(Into::into).collect(),
        );
        self
    }

    fn list_for(&self, arg: &str) -> Option<&Vec<String>> {
        let name = arg.strip_prefix('{')?.strip_suffix('}')?;
        self.lists.get(name)
    }
}

/// Read-only event-count query for ROOT artifacts; the path arrives as `argv[1]`.
const ROOT_COUNT_QUERY: &str = "import sys, ROOT; \
f = ROOT.TFile.Open(sys.argv[1]); \
print(int(f.Get('events').GetEntries()))";

/// Count template used when none is configured: the ROOT entry count of the
/// `events` tree.
pub fn root_count_template() -> CommandTemplate {
    CommandTemplate::new("python", ["-c", ROOT_COUNT_QUERY, "{input}"])
}

fn default_count() -> Option<CommandTemplate> {
    Some(root_count_template())
}

/// Templates for every external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTemplates {
    /// Full-dataset reduction: `{output}`, `{files}`, `{workers}`.
    pub stage1: CommandTemplate,
    /// Per-partition reduction: `{input}`, `{output}`, `{start}`, `{end}`.
    pub stage2: CommandTemplate,
    /// Merge utility: `{output}`, `{inputs}`.
    pub merge: CommandTemplate,
    /// Event-count query: `{input}`; prints the count on stdout. Defaults to
    /// the ROOT query; `count: null` falls back to reading Parquet footers.
    #[serde(default = "default_count")]
    pub count: Option<CommandTemplate>,
}

impl Default for JobTemplates {
    fn default() -> Self {
        Self {
            stage1: CommandTemplate::new(
                "fccanalysis",
                [
                    "run",
                    "stage1.py",
                    "--output",
                    "{output}",
                    "--files-list",
                    "{files}",
                    "--ncpus",
                    "{workers}",
                ],
            ),
            stage2: CommandTemplate::new(
                "python",
                ["stage2.py", "{input}", "{output}", "{start}", "{end}"],
            ),
            merge: CommandTemplate::new("hadd", ["-f", "{output}", "{inputs}"]),
            count: default_count(),
        }
    }
}

impl JobTemplates {
    /// Loads templates from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::InvalidValue {
            key: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Checks that every template names a program.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut named = vec![
            ("stage1", &self.stage1),
            ("stage2", &self.stage2),
            ("merge", &self.merge),
        ];
        if let Some(ref count) = self.count {
            named.push(("count", count));
        }
        for (name, template) in named {
            if template.program.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} template program cannot be empty",
                    name
                )));
            }
        }
        Ok(())
    }
}
