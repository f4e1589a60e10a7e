//! ABOUTME: Command specification for the long-running ffmpeg children
//! ABOUTME: Builds argument lists and spawns with piped stdio

use mc_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    io,
    path::PathBuf,
    process::{Child, Command, Stdio},
};
use tracing::debug;

/// Program looked up on PATH when none is configured
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// Program and arguments for one child process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
        }
    }

    /// Add command line arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    /// Add one flag with its value
    pub fn opt(self, flag: &str, value: impl AsRef<str>) -> Self {
        self.args([flag, value.as_ref()])
    }

    /// Spawn with the given stdio wiring.
    ///
    /// On Unix the child gets its own process group, so a terminal Ctrl-C
    /// reaches only the recorder. Children then stop through stdin EOF or
    /// an explicit kill, and the encoder can finish the segment trailer.
    pub fn spawn(&self, stdin: Stdio, stdout: Stdio, stderr: Stdio) -> Result<Child> {
        debug!(program = %self.program.display(), args = ?self.args, "Spawning process");
        let mut command = Command::new(&self.program);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command
            .args(&self.args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => Error::External(format!(
                    "{} not found; is it installed and on PATH?",
                    self.program.display()
                )),
                _ => Error::External(format!(
                    "Failed to spawn {}: {}",
                    self.program.display(),
                    e
                )),
            })
    }
}
