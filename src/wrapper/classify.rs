//! Classification of a finished attempt.

use super::runner::ProcessOutput;
use anyhow::{Context, Result};
use regex::RegexSet;

/// Phrases that indicate a usage-limit or rate-limit rejection.
pub const DEFAULT_QUOTA_PATTERNS: &[&str] = &[
    r"quota",
    r"rate.?limit",
    r"usage.?limit",
    r"too many requests",
    r"\b429\b",
    r"resource.?exhausted",
    r"insufficient.?quota",
];

/// Outcome of one attempt against one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded { output: String },
    QuotaExhausted { error: String },
    OtherFailure { error: String },
}

/// Case-insensitive quota-signal matcher built from configurable patterns.
#[derive(Debug, Clone)]
pub struct QuotaDetector {
    patterns: RegexSet,
    timeout_is_quota: bool,
}

impl QuotaDetector {
    pub fn new<S: AsRef<str>>(patterns: &[S], timeout_is_quota: bool) -> Result<Self> {
        let patterns = RegexSet::new(patterns.iter().map(|p| format!("(?i){}", p.as_ref())))
            .context("Invalid quota signal pattern")?;
        Ok(Self {
            patterns,
            timeout_is_quota,
        })
    }

    pub fn is_quota_signal(&self, text: &str) -> bool {
        self.patterns.is_match(text)
    }

    /// Exit success with non-empty stdout succeeds; any other result is a
    /// quota exhaustion if the combined output matches, else a plain failure.
    pub fn classify(&self, output: &ProcessOutput) -> AttemptOutcome {
        if output.succeeded() && !output.stdout.trim().is_empty() {
            return AttemptOutcome::Succeeded {
                output: output.stdout.trim_end().to_string(),
            };
        }

        let error = output.failure_summary();
        if output.timed_out {
            return if self.timeout_is_quota {
                AttemptOutcome::QuotaExhausted { error }
            } else {
                AttemptOutcome::OtherFailure { error }
            };
        }

        let combined = format!("{}\n{}", output.stdout, output.stderr);
        if self.is_quota_signal(&combined) {
            AttemptOutcome::QuotaExhausted { error }
        } else {
            AttemptOutcome::OtherFailure { error }
        }
    }
}

impl Default for QuotaDetector {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA_PATTERNS, false)
            .expect("default quota patterns are valid regexes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: Option<i32>, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            timed_out: false,
        }
    }

    #[test]
    fn test_success_requires_output() {
        let detector = QuotaDetector::default();
        assert_eq!(
            detector.classify(&output(Some(0), "hello\n", "")),
            AttemptOutcome::Succeeded {
                output: "hello".to_string()
            }
        );
        assert!(matches!(
            detector.classify(&output(Some(0), "  \n", "")),
            AttemptOutcome::OtherFailure { .. }
        ));
    }

    #[test]
    fn test_quota_signal_case_insensitive() {
        let detector = QuotaDetector::default();
        for stderr in [
            "Error: Quota exceeded for today",
            "RATE LIMIT reached",
            "HTTP 429 Too Many Requests",
            "status: RESOURCE_EXHAUSTED",
        ] {
            assert!(
                matches!(
                    detector.classify(&output(Some(1), "", stderr)),
                    AttemptOutcome::QuotaExhausted { .. }
                ),
                "{}",
                stderr
            );
        }
    }

    #[test]
    fn test_quota_signal_in_stdout() {
        let detector = QuotaDetector::default();
        assert!(matches!(
            detector.classify(&output(Some(1), "usage limit reached", "")),
            AttemptOutcome::QuotaExhausted { .. }
        ));
    }

    #[test]
    fn test_other_failure() {
        let detector = QuotaDetector::default();
        assert!(matches!(
            detector.classify(&output(Some(2), "", "syntax error near token")),
            AttemptOutcome::OtherFailure { .. }
        ));
        // 4290 is not a 429 status.
        assert!(matches!(
            detector.classify(&output(Some(1), "", "line 4290 failed")),
            AttemptOutcome::OtherFailure { .. }
        ));
    }

    #[test]
    fn test_timeout_classification_is_configurable() {
        let mut timed_out = output(None, "", "");
        timed_out.timed_out = true;

        assert!(matches!(
            QuotaDetector::default().classify(&timed_out),
            AttemptOutcome::OtherFailure { .. }
        ));
        assert!(matches!(
            QuotaDetector::new(DEFAULT_QUOTA_PATTERNS, true)
                .unwrap()
                .classify(&timed_out),
            AttemptOutcome::QuotaExhausted { .. }
        ));
    }

    #[test]
    fn test_custom_patterns() {
        let detector = QuotaDetector::new(&["credits? depleted"], false).unwrap();
        assert!(detector.is_quota_signal("All CREDITS DEPLETED"));
        assert!(!detector.is_quota_signal("quota exceeded"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(QuotaDetector::new(&["(unclosed"], false).is_err());
    }
}
