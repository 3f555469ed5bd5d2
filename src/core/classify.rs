//! Output classification
//!
//! Vendor tools do not report failure reliably through their exit codes, so the
//! captured output is matched line by line against an ordered list of
//! (pattern, severity) rules. The first rule matching a line decides its
//! severity; unmatched lines are not reported.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::defaults::DEFAULT_SEVERITY_RULES;
use crate::core::tool::{ToolResult, ToolStatus};
use crate::error::ConfigError;

/// Severity of an output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Matched but deliberately suppressed
    Ignore,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Whether a line of this severity fails the operation
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::Fatal)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Ignore => "ignore",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        write!(f, "{text}")
    }
}

/// A compiled (pattern, severity) rule
#[derive(Debug, Clone)]
pub struct SeverityRule {
    pattern: Regex,
    severity: Severity,
}

impl SeverityRule {
    /// Compile a rule
    pub fn new(pattern: &str, severity: Severity) -> Result<Self, ConfigError> {
        let pattern = Regex::new(pattern).map_err(|e| ConfigError::InvalidRule {
            pattern: pattern.to_string(),
            error: e.to_string(),
        })?;
        Ok(Self { pattern, severity })
    }

    /// Severity assigned by this rule
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Whether the rule matches a line
    pub fn matches(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }
}

/// Built-in rules understood by most simulators and synthesizers
pub fn default_rules() -> Result<Vec<SeverityRule>, ConfigError> {
    DEFAULT_SEVERITY_RULES
        .iter()
        .map(|(pattern, severity)| {
            let severity = severity.parse().map_err(|e| ConfigError::InvalidRule {
                pattern: (*pattern).to_string(),
                error: e,
            })?;
            SeverityRule::new(pattern, severity)
        })
        .collect()
}

/// Where a classified message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    Stdout,
    Stderr,
    /// Synthesised from the process status (timeout, cancellation, exit code)
    Status,
}

/// One classified line of tool output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedMessage {
    pub severity: Severity,
    pub source: MessageSource,
    pub line: String,
}

/// Overall decision for one tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    PassedWithWarnings,
    Failed,
}

impl Verdict {
    /// Whether the invocation counts as successful
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Result of classifying one [`ToolResult`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub messages: Vec<ClassifiedMessage>,
}

impl Classification {
    /// Messages at or above `severity`
    pub fn at_least(&self, severity: Severity) -> impl Iterator<Item = &ClassifiedMessage> {
        self.messages.iter().filter(move |m| m.severity >= severity)
    }
}

/// Ordered severity rules plus the exit-code policy of a backend
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<SeverityRule>,
    ignore_exit_code: bool,
}

impl Classifier {
    /// Classifier with exactly these rules
    pub fn new(rules: Vec<SeverityRule>) -> Self {
        Self {
            rules,
            ignore_exit_code: false,
        }
    }

    /// Classifier using [`default_rules`]
    pub fn standard() -> Result<Self, ConfigError> {
        Ok(Self::new(default_rules()?))
    }

    /// Decide from output text alone, ignoring non-zero exit codes
    #[must_use]
    pub fn ignore_exit_code(mut self, ignore: bool) -> Self {
        self.ignore_exit_code = ignore;
        self
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[SeverityRule] {
        &self.rules
    }

    /// Severity of a single line, `None` when no rule matches
    pub fn classify_line(&self, line: &str) -> Option<Severity> {
        self.rules
            .iter()
            .find(|rule| rule.matches(line))
            .map(SeverityRule::severity)
    }

    /// Classify a tool result
    pub fn classify(&self, result: &ToolResult) -> Classification {
        let mut messages = Vec::new();
        let streams = [
            (MessageSource::Stdout, result.stdout.as_str()),
            (MessageSource::Stderr, result.stderr.as_str()),
        ];
        for (source, text) in streams {
            for line in text.lines() {
                match self.classify_line(line) {
                    Some(Severity::Ignore) | None => {}
                    Some(severity) => messages.push(ClassifiedMessage {
                        severity,
                        source,
                        line: line.to_string(),
                    }),
                }
            }
        }

        let status_failure = match result.status {
            ToolStatus::TimedOut => Some(format!(
                "process timed out after {:.1}s",
                result.elapsed.as_secs_f64()
            )),
            ToolStatus::Cancelled => Some("process was cancelled".to_string()),
            ToolStatus::Exited(code) if code != 0 && !self.ignore_exit_code => {
                Some(format!("process exited with code {code}"))
            }
            ToolStatus::Exited(_) => None,
        };
        if let Some(line) = status_failure {
            messages.push(ClassifiedMessage {
                severity: Severity::Fatal,
                source: MessageSource::Status,
                line,
            });
        }

        let worst = messages.iter().map(|m| m.severity).max();
        let verdict = match worst {
            Some(s) if s.is_failure() => Verdict::Failed,
            Some(Severity::Warning) => Verdict::PassedWithWarnings,
            _ => Verdict::Passed,
        };

        Classification { verdict, messages }
    }
}
