// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use interop_metadata::MetricsExitCode;
use interop_runner::errors::PipelineError;
use std::error::Error;
use thiserror::Error;

/// Failures the CLI knows how to report, mapped to documented exit codes.
#[derive(Debug, Error)]
pub enum ExpectedError {
    /// Reading the runs file failed.
    #[error("failed to read runs file `{path}`")]
    RunsRead {
        /// Path of the runs file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// Parsing the runs file failed.
    #[error("failed to parse runs file `{path}`")]
    RunsParse {
        /// Path of the runs file.
        path: Utf8PathBuf,
        /// Underlying serde error.
        #[source]
        error: serde_json::Error,
    },

    /// The pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ExpectedError {
    /// The process exit code this failure maps to.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::RunsRead { .. } | Self::RunsParse { .. } => MetricsExitCode::RUNS_PARSE_FAILED,
            Self::Pipeline(PipelineError::Gate(_)) => MetricsExitCode::GATE_FAILED,
            Self::Pipeline(PipelineError::Cancelled) => MetricsExitCode::CANCELLED,
            Self::Pipeline(_) => MetricsExitCode::PUBLISH_FAILED,
        }
    }

    /// Writes this error and its cause chain to stderr.
    pub fn display_to_stderr(&self) {
        tracing::error!("{self}");
        let mut cause = self.source();
        while let Some(error) = cause {
            tracing::error!("  caused by: {error}");
            cause = error.source();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interop_runner::errors::GateError;

    #[test]
    fn exit_codes_match_failure_class() {
        let parse = ExpectedError::RunsParse {
            path: "runs.json".into(),
            error: serde_json::from_str::<i64>("x").unwrap_err(),
        };
        assert_eq!(
            parse.process_exit_code(),
            MetricsExitCode::RUNS_PARSE_FAILED
        );

        let gate = ExpectedError::Pipeline(PipelineError::Gate(GateError {
            error: interop_runner::errors::StoreError::new("store down"),
        }));
        assert_eq!(gate.process_exit_code(), MetricsExitCode::GATE_FAILED);

        let cancelled = ExpectedError::Pipeline(PipelineError::Cancelled);
        assert_eq!(cancelled.process_exit_code(), MetricsExitCode::CANCELLED);
    }
}
