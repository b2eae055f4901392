//! External tool execution.
//!
//! Every external collaborator (style compiler, post-processor, bundler,
//! template engine, image optimizer, minifier override) is a command that
//! reads its input on stdin and writes its result to stdout.
//!
//! # Placeholders
//!
//! | Placeholder | Replaced with                              |
//! |-------------|--------------------------------------------|
//! | `{path}`    | absolute path of the source being processed |
//! | `{kind}`    | asset kind (`css`, `js`, `html`, ...)      |
//! | `{targets}` | comma-separated `[build].targets`          |

use crate::log;
use regex::Regex;
use std::{
    collections::BTreeMap,
    ffi::OsString,
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
    sync::OnceLock,
    thread,
};
use thiserror::Error;

/// Errors raised while running an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool command is empty")]
    Empty,

    #[error("failed to start `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` failed with {status}\n{message}")]
    Failed {
        command: String,
        status: String,
        message: String,
    },

    #[error("no {tool} configured for `{}`", path.display())]
    Missing { tool: &'static str, path: PathBuf },
}

/// Shared environment for tool invocations within one task run.
#[derive(Debug, Clone, Default)]
pub struct ToolEnv {
    /// Working directory for every command.
    pub root: PathBuf,
    /// Variables exported to every command (e.g. `NODE_ENV`).
    pub vars: BTreeMap<String, String>,
    /// Value of the `{targets}` placeholder.
    pub targets: String,
}

/// Per-call placeholder values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Placeholders<'a> {
    pub path: Option<&'a Path>,
    pub kind: Option<&'a str>,
}

/// An external command, as configured: program followed by arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTool {
    argv: Vec<String>,
}

impl ExternalTool {
    pub fn new(argv: &[String]) -> Self {
        Self {
            argv: argv.to_vec(),
        }
    }

    /// Program name, used as log prefix.
    pub fn name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Run the tool with `input` on stdin and return its stdout.
    ///
    /// Stderr of a successful run is logged as warnings.
    pub fn run(
        &self,
        input: &[u8],
        vars: Placeholders<'_>,
        env: &ToolEnv,
    ) -> Result<Vec<u8>, ToolError> {
        let (name, mut command) = self.prepare(vars, env)?;
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| ToolError::Spawn {
            command: name.clone(),
            source,
        })?;

        // Feed stdin from a second thread so a tool that writes before it
        // finishes reading cannot fill the stdout pipe and block us both.
        let stdin = child.stdin.take();
        let writer = name.clone();
        let output = thread::scope(|scope| {
            scope.spawn(move || {
                if let Some(mut stdin) = stdin {
                    // A tool may exit without reading all of its input.
                    match stdin.write_all(input) {
                        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => {
                            log!(&writer; "failed to write input: {e}");
                        }
                        _ => {}
                    }
                }
            });
            child.wait_with_output()
        })
        .map_err(|source| ToolError::Spawn {
            command: name.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                command: name,
                status: output.status.to_string(),
                message: format_error(&output),
            });
        }

        log_warnings(&name, &output.stderr);
        Ok(output.stdout)
    }

    /// Build the `Command`, substituting placeholders.
    fn prepare(&self, vars: Placeholders<'_>, env: &ToolEnv) -> Result<(String, Command), ToolError> {
        let (program, args) = self.argv.split_first().ok_or(ToolError::Empty)?;

        let mut command = Command::new(program);
        command
            .args(args.iter().map(|arg| substitute(arg, vars, env)))
            .envs(&env.vars)
            .current_dir(&env.root);

        Ok((program.clone(), command))
    }
}

/// Replace placeholders in one argument.
fn substitute(arg: &str, vars: Placeholders<'_>, env: &ToolEnv) -> OsString {
    if !arg.contains('{') {
        return OsString::from(arg);
    }
    let path = vars
        .path
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    OsString::from(
        arg.replace("{path}", &path)
            .replace("{kind}", vars.kind.unwrap_or_default())
            .replace("{targets}", &env.targets),
    )
}

// ============================================================================
// Output Handling
// ============================================================================

fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(s, "")
}

/// Log non-empty stderr lines of a successful run.
fn log_warnings(name: &str, stderr: &[u8]) {
    let stderr = String::from_utf8_lossy(stderr);
    let lines: Vec<_> = stderr
        .lines()
        .map(strip_ansi)
        .filter(|line| !line.trim().is_empty())
        .collect();

    if !lines.is_empty() {
        log!(name; "{}", lines.join("\n"));
    }
}

/// Error details of a failed run: stderr, falling back to stdout.
fn format_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = strip_ansi(stderr.trim());
    if !stderr.is_empty() {
        return stderr.into_owned();
    }
    String::from_utf8_lossy(&output.stdout).trim().to_owned()
}

// ============================================================================
// Tests
// ============================================================================
