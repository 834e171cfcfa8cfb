//! Command specification handed to the launcher

use overseer_foundation::CategoryConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// An executable with its arguments, working directory and environment overlay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    /// Path or bare name resolved through `PATH`
    pub program: String,

    pub args: Vec<String>,

    /// Defaults to the supervisor's own working directory
    pub working_dir: Option<PathBuf>,

    /// Merged onto the inherited environment
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    /// `sh -c <script>`
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    /// Build from a configured category; `None` when it names no program
    pub fn from_category(category: &CategoryConfig) -> Option<Self> {
        let program = category.program.as_ref()?;
        Some(Self {
            program: program.clone(),
            args: category.args.clone(),
            working_dir: category.working_dir.clone(),
            env: category.env.clone(),
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Human-readable command line, for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_command() {
        let spec = CommandSpec::shell("echo A; exit 0");
        assert_eq!(spec.program, "sh");
        assert_eq!(spec.args, vec!["-c", "echo A; exit 0"]);
        assert_eq!(spec.display(), "sh -c echo A; exit 0");
    }

    #[test]
    fn test_from_category() {
        let category = CategoryConfig::new()
            .program("python3")
            .args(["train.py", "--epochs", "3"])
            .working_dir("/srv/jobs")
            .env("SEED", "42");

        let spec = CommandSpec::from_category(&category).unwrap();
        assert_eq!(spec.program, "python3");
        assert_eq!(spec.args.len(), 3);
        assert_eq!(spec.working_dir, Some(PathBuf::from("/srv/jobs")));
        assert_eq!(spec.env.get("SEED").map(String::as_str), Some("42"));

        assert!(CommandSpec::from_category(&CategoryConfig::new().grace_period_secs(3)).is_none());
    }
}
