//! Quality gate: a second oracle call that judges whether a candidate
//! artifact actually implements the task's intent.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::QualityError;
use crate::oracle::{CompletionRequest, OracleClient};
use crate::util::extract_json_object;

/// Structured verdict from the gate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QualityVerdict {
    pub quality: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub suggestions: String,
}

impl QualityVerdict {
    pub fn good() -> Self {
        Self {
            quality: "good".into(),
            reason: String::new(),
            suggestions: String::new(),
        }
    }

    pub fn bad(reason: impl Into<String>, suggestions: impl Into<String>) -> Self {
        Self {
            quality: "bad".into(),
            reason: reason.into(),
            suggestions: suggestions.into(),
        }
    }

    /// Anything but an explicit "good" counts as a rejection.
    pub fn is_good(&self) -> bool {
        self.quality.trim().eq_ignore_ascii_case("good")
    }
}

/// Parse the first JSON object in `text` as a verdict.
pub fn parse_verdict(text: &str) -> Option<QualityVerdict> {
    let json = extract_json_object(text)?;
    serde_json::from_str(&json).ok()
}

#[async_trait]
pub trait QualityGate: Send + Sync {
    /// Judge `candidate` against `intent`. `Err` means no verdict could be
    /// obtained; a "bad" verdict is still `Ok`.
    async fn assess(&self, candidate: &str, intent: &str) -> Result<QualityVerdict, QualityError>;
}

/// Gate backed by the same completion service as generation.
pub struct OracleQualityGate {
    oracle: Arc<dyn OracleClient>,
    max_tokens: u32,
    parse_retries: u32,
}

impl OracleQualityGate {
    pub fn new(oracle: Arc<dyn OracleClient>, max_tokens: u32, parse_retries: u32) -> Self {
        Self {
            oracle,
            max_tokens,
            parse_retries: parse_retries.max(1),
        }
    }
}

fn evaluation_prompt(candidate: &str, intent: &str) -> String {
    format!(
        r#"```
{candidate}
```

Judge how well the code above implements a service that {intent}. Answer with a single JSON object in one of these forms:

```
{{"quality": "good", "reason": "would pass a code review", "suggestions": "none"}}
{{"quality": "bad", "reason": "unimplemented method", "suggestions": "implement the method"}}
```

Answer "bad" when the code contains TODOs, stubs, or methods that return nil, true or a canned value without doing the work. Phrases like "we'll do this later" mean the quality is "bad".
```json
"#,
        candidate = candidate.trim_end(),
        intent = intent.trim()
    )
}

#[async_trait]
impl QualityGate for OracleQualityGate {
    async fn assess(&self, candidate: &str, intent: &str) -> Result<QualityVerdict, QualityError> {
        let prompt = evaluation_prompt(candidate, intent);
        let mut last_output = String::new();

        for attempt in 1..=self.parse_retries {
            let output = self
                .oracle
                .complete(CompletionRequest::new(prompt.clone(), self.max_tokens))
                .await?;
            match parse_verdict(&output) {
                Some(verdict) => {
                    debug!(attempt, quality = %verdict.quality, "quality verdict parsed");
                    return Ok(verdict);
                }
                None => {
                    warn!(attempt, "quality verdict unparseable, asking again");
                    last_output = output;
                }
            }
        }

        Err(QualityError::Unparseable {
            attempts: self.parse_retries,
            last_output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OracleError;
    use crate::testing::ScriptedOracle;

    #[test]
    fn test_parse_verdict_with_surrounding_text() {
        let verdict = parse_verdict(
            r#"{"quality": "bad", "reason": "stubbed handler", "suggestions": "implement Echo"}
```"#,
        )
        .unwrap();
        assert!(!verdict.is_good());
        assert_eq!(verdict.reason, "stubbed handler");
        assert_eq!(verdict.suggestions, "implement Echo");
    }

    #[test]
    fn test_parse_verdict_missing_optional_fields() {
        let verdict = parse_verdict(r#"{"quality": "good"}"#).unwrap();
        assert!(verdict.is_good());
        assert!(verdict.reason.is_empty());
    }

    #[test]
    fn test_parse_verdict_rejects_non_verdict_json() {
        assert!(parse_verdict(r#"{"score": 7}"#).is_none());
        assert!(parse_verdict("looks fine to me").is_none());
    }

    #[test]
    fn test_unknown_quality_is_not_good() {
        let verdict = QualityVerdict {
            quality: "mediocre".into(),
            reason: String::new(),
            suggestions: String::new(),
        };
        assert!(!verdict.is_good());
        assert!(QualityVerdict::good().is_good());
        assert!(!QualityVerdict::bad("x", "y").is_good());
    }

    #[test]
    fn test_evaluation_prompt_contains_code_and_intent() {
        let prompt = evaluation_prompt("package main\n", "echoes messages back");
        assert!(prompt.contains("package main"));
        assert!(prompt.contains("a service that echoes messages back"));
        assert!(prompt.ends_with("```json\n"));
    }

    #[tokio::test]
    async fn test_assess_retries_unparseable_output() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok("I think it is fine.".into()),
            Ok(r#"{"quality": "good", "reason": "complete", "suggestions": "none"}"#.into()),
        ]));
        let gate = OracleQualityGate::new(oracle.clone(), 256, 5);
        let verdict = gate.assess("package main", "echoes").await.unwrap();
        assert!(verdict.is_good());
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn test_assess_gives_up_after_parse_retries() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok("nope".into()),
            Ok("still no".into()),
            Ok("never".into()),
        ]));
        let gate = OracleQualityGate::new(oracle.clone(), 256, 3);
        match gate.assess("package main", "echoes").await {
            Err(QualityError::Unparseable {
                attempts,
                last_output,
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_output, "never");
            }
            other => panic!("expected Unparseable, got {:?}", other),
        }
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test]
    async fn test_assess_propagates_transport_error() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Err(OracleError::Http(
            "connection refused".into(),
        ))]));
        let gate = OracleQualityGate::new(oracle.clone(), 256, 5);
        assert!(matches!(
            gate.assess("package main", "echoes").await,
            Err(QualityError::Oracle(OracleError::Http(_)))
        ));
        assert_eq!(oracle.calls(), 1);
    }
}
