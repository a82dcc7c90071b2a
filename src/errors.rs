//! Typed error hierarchy for the garden pipeline.
//!
//! - `PipelineError`: fatal, the task's run stops
//! - `AttemptFailure`: one rejected attempt, charged to the error budget
//! - `OracleError`: transport or auth failures talking to the completion service
//! - `QualityError`: quality gate failures that are not a verdict

use std::path::PathBuf;

use thiserror::Error;

use crate::util::tail_lines;

/// Fatal errors that abort a task's pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Oracle request failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("Error budget exhausted: {errors} failed attempts exceed the budget of {budget}")]
    BudgetExhausted { errors: u32, budget: u32 },

    #[error("Task directory {path} no longer exists")]
    TaskDirectoryMissing { path: PathBuf },

    #[error("Artifact store error: {0}")]
    Artifact(#[source] anyhow::Error),

    #[error("Progress store error: {0}")]
    Progress(#[source] anyhow::Error),

    #[error("Task {id} not found in the progress store")]
    UnknownTask { id: i64 },
}

/// A single failed attempt at a stage. Retried within the error budget.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptFailure {
    #[error("oracle returned no code")]
    EmptyOutput,

    #[error("oracle answered with a `{found}` block instead of `{expected}`")]
    ForeignFence { expected: String, found: String },

    #[error("verification command failed")]
    VerificationFailed { output: String },

    #[error("quality check rejected the artifact: {reason}")]
    QualityRejected { reason: String, suggestions: String },

    #[error("quality verdict unavailable after {attempts} unparseable responses")]
    VerdictUnavailable { attempts: u32 },
}

impl AttemptFailure {
    /// Diagnostic text folded back into the prompt context, at most
    /// `max_lines` lines. Command output keeps its tail.
    pub fn diagnostic(&self, max_lines: usize) -> String {
        match self {
            Self::VerificationFailed { output } => {
                let tail = tail_lines(output, max_lines);
                if tail.trim().is_empty() {
                    "the verification command failed without output".to_string()
                } else {
                    tail
                }
            }
            Self::QualityRejected {
                reason,
                suggestions,
            } => {
                // The reason line always survives; only suggestions are cut.
                let reason = reason.split_whitespace().collect::<Vec<_>>().join(" ");
                let kept: Vec<&str> = suggestions
                    .lines()
                    .take(max_lines.saturating_sub(1))
                    .collect();
                if kept.is_empty() {
                    format!("Reason: {}", reason)
                } else {
                    format!("Reason: {}\nSuggestions: {}", reason, kept.join("\n"))
                }
            }
            other => other.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyOutput => "empty_output",
            Self::ForeignFence { .. } => "foreign_fence",
            Self::VerificationFailed { .. } => "verification_failed",
            Self::QualityRejected { .. } => "quality_rejected",
            Self::VerdictUnavailable { .. } => "verdict_unavailable",
        }
    }
}

/// Errors talking to the completion service. Always fatal to the task.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("API key not found in environment variable {var}")]
    MissingApiKey { var: String },

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("completion service returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("malformed completion response: {0}")]
    Response(String),
}

/// Quality gate failures other than a "bad" verdict.
#[derive(Debug, Error)]
pub enum QualityError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("quality verdict unparseable after {attempts} attempts")]
    Unparseable { attempts: u32, last_output: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_budget_exhausted_carries_counts() {
        let err = PipelineError::BudgetExhausted {
            errors: 16,
            budget: 15,
        };
        match &err {
            PipelineError::BudgetExhausted { errors, budget } => {
                assert_eq!(*errors, 16);
                assert_eq!(*budget, 15);
            }
            _ => panic!("Expected BudgetExhausted"),
        }
        assert!(err.to_string().contains("15"));
    }

    #[test]
    fn pipeline_error_converts_from_oracle_error() {
        let err: PipelineError = OracleError::Status {
            code: 401,
            body: "bad key".into(),
        }
        .into();
        assert!(matches!(
            err,
            PipelineError::Oracle(OracleError::Status { code: 401, .. })
        ));
    }

    #[test]
    fn verification_diagnostic_keeps_only_trailing_lines() {
        let output: String = (0..100).map(|i| format!("line {}\n", i)).collect();
        let failure = AttemptFailure::VerificationFailed { output };
        let diagnostic = failure.diagnostic(5);
        assert_eq!(diagnostic.lines().count(), 5);
        assert!(diagnostic.starts_with("line 95"));
        assert!(diagnostic.ends_with("line 99"));
    }

    #[test]
    fn silent_verification_failure_still_has_diagnostic() {
        let failure = AttemptFailure::VerificationFailed {
            output: "  \n".into(),
        };
        assert!(failure.diagnostic(10).contains("without output"));
    }

    #[test]
    fn quality_rejection_diagnostic_includes_reason_and_suggestions() {
        let failure = AttemptFailure::QualityRejected {
            reason: "unimplemented method".into(),
            suggestions: "implement Echo".into(),
        };
        let diagnostic = failure.diagnostic(10);
        assert!(diagnostic.contains("unimplemented method"));
        assert!(diagnostic.contains("implement Echo"));
    }

    #[test]
    fn quality_rejection_keeps_reason_when_suggestions_overflow() {
        let suggestions: String = (0..40).map(|i| format!("suggestion {}\n", i)).collect();
        let failure = AttemptFailure::QualityRejected {
            reason: "handler returns a stub\nresponse".into(),
            suggestions,
        };
        let diagnostic = failure.diagnostic(5);
        assert_eq!(diagnostic.lines().count(), 5);
        assert!(diagnostic.starts_with("Reason: handler returns a stub response\n"));
        assert!(diagnostic.contains("Suggestions: suggestion 0"));
        assert!(diagnostic.ends_with("suggestion 3"));
    }

    #[test]
    fn quality_rejection_with_one_line_window_is_reason_only() {
        let failure = AttemptFailure::QualityRejected {
            reason: "stubbed".into(),
            suggestions: "implement Echo".into(),
        };
        assert_eq!(failure.diagnostic(1), "Reason: stubbed");
    }

    #[test]
    fn quality_error_wraps_oracle_error() {
        let err: QualityError = OracleError::Http("connection reset".into()).into();
        assert!(matches!(err, QualityError::Oracle(OracleError::Http(_))));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&PipelineError::BudgetExhausted {
            errors: 1,
            budget: 0,
        });
        assert_std_error(&AttemptFailure::EmptyOutput);
        assert_std_error(&OracleError::Response("x".into()));
        assert_std_error(&QualityError::Unparseable {
            attempts: 3,
            last_output: String::new(),
        });
    }
}
