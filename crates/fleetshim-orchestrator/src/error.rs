//! Orchestrator error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("count file {}: {reason}", path.display())]
    CountFile { path: PathBuf, reason: String },

    #[error("no replica count source answered")]
    NoSource,
}

impl OrchestratorError {
    /// Text worth showing an operator: the command's own stderr when it
    /// produced any, otherwise the error message.
    pub fn diagnostic(&self) -> String {
        match self {
            OrchestratorError::CommandFailed { stderr, .. } if !stderr.trim().is_empty() => {
                stderr.trim().to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_prefers_stderr() {
        let e = OrchestratorError::CommandFailed {
            command: "docker compose up".to_string(),
            status: 1,
            stderr: "  no such service: replica-db\n".to_string(),
        };
        assert_eq!(e.diagnostic(), "no such service: replica-db");
    }

    #[test]
    fn diagnostic_falls_back_to_message() {
        let e = OrchestratorError::CommandFailed {
            command: "docker ps".to_string(),
            status: 2,
            stderr: String::new(),
        };
        assert_eq!(e.diagnostic(), "`docker ps` exited with status 2: ");

        let e = OrchestratorError::Timeout {
            command: "docker ps".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(e.diagnostic().contains("timed out"));
    }
}
