//! Launch descriptions: flag maps and process specs.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};

/// Ordered `-key=value` flags.
///
/// Keys keep their first insertion position; setting a key again replaces
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonArgs {
    entries: Vec<(String, String)>,
}

impl DaemonArgs {
    /// An empty flag map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Sets `key` to `value`.
    pub fn set(&mut self, key: &str, value: impl fmt::Display) -> &mut Self {
        let value = value.to_string();
        match self.entries.iter_mut().find(|(existing, _)| existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_owned(), value)),
        }
        self
    }

    /// Value of `key`, if set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// Number of flags.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no flags are set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders every flag as `-key=value`, in insertion order.
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(key, value)| format!("-{key}={value}"))
            .collect()
    }
}

/// Everything needed to start one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    name: String,
    program: String,
    args: Vec<String>,
    flags: DaemonArgs,
    working_dir: Option<Utf8PathBuf>,
}

impl ProcessSpec {
    /// A spec for `program`, logged as `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            flags: DaemonArgs::new(),
            working_dir: None,
        }
    }

    /// Appends positional arguments placed before the flags.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replaces the flag map.
    #[must_use]
    pub fn flags(mut self, flags: DaemonArgs) -> Self {
        self.flags = flags;
        self
    }

    /// Runs the process in `dir`, which it then owns.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Process name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Directory the process runs in.
    #[must_use]
    pub fn directory(&self) -> Option<&Utf8Path> {
        self.working_dir.as_deref()
    }

    /// Flag map.
    #[must_use]
    pub const fn flag_map(&self) -> &DaemonArgs {
        &self.flags
    }

    /// Full argument vector: positional arguments, then rendered flags.
    #[must_use]
    pub fn command_line(&self) -> Vec<String> {
        let mut line = self.args.clone();
        line.extend(self.flags.render());
        line
    }
}
