//! Build step run before reload broadcasts.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;

/// Build step error.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No program was given.
    #[error("build command is empty")]
    EmptyCommand,

    /// The program could not be started.
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and reported failure.
    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    /// Failure reported by a custom build step.
    #[error("{0}")]
    Other(String),
}

/// A rebuild run once at startup and before every change broadcast.
///
/// Implementors own whatever descriptor the build needs; the live reload
/// layer only awaits the result.
#[async_trait]
pub trait BuildStep: Send + Sync {
    async fn build(&self) -> Result<(), BuildError>;
}

/// Build step that runs an external program.
#[derive(Clone, Debug)]
pub struct CommandBuild {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandBuild {
    /// Create a build step from an argv list.
    pub fn new(argv: Vec<String>) -> Result<Self, BuildError> {
        let mut argv = argv.into_iter();
        let program = argv
            .next()
            .filter(|p| !p.is_empty())
            .ok_or(BuildError::EmptyCommand)?;
        Ok(Self {
            program,
            args: argv.collect(),
            cwd: None,
        })
    }

    /// Run the program in `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

#[async_trait]
impl BuildStep for CommandBuild {
    async fn build(&self) -> Result<(), BuildError> {
        let start = Instant::now();
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let output = command.output().await.map_err(|source| BuildError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(BuildError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        tracing::info!(
            program = %self.program,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Build finished"
        );
        Ok(())
    }
}
