//! Judge verdict types.
//!
//! A judge scores one payload and returns a [`JudgeVerdict`]: a 0–10 score,
//! its own pass/fail opinion, and a list of [`Issue`]s. Issues may arrive as
//! bare strings (treated as minor) or as `{severity, message}` objects.
//!
//! ## Example
//!
//! ```
//! use panel::review::findings::{Issue, IssueSeverity, JudgeVerdict};
//!
//! let verdict: JudgeVerdict = serde_json::from_str(
//!     r#"{"score": 6.5, "passed": false, "issues": [
//!         "Evidence is thin",
//!         {"severity": "critical", "message": "Scores exceed 10"}
//!     ]}"#,
//! )
//! .unwrap();
//!
//! assert_eq!(verdict.critical_count(), 1);
//! assert_eq!(verdict.issues[0], Issue::new(IssueSeverity::Minor, "Evidence is thin"));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a single judge issue.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Blocks approval regardless of score.
    Critical,
    Major,
    #[default]
    Minor,
}

impl IssueSeverity {
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical)
    }
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::Major => "major",
            Self::Minor => "minor",
        };
        f.write_str(s)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IssueRepr {
    Text(String),
    Full {
        #[serde(default)]
        severity: IssueSeverity,
        message: String,
    },
}

/// One problem the judge found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IssueRepr")]
pub struct Issue {
    pub severity: IssueSeverity,
    pub message: String,
}

impl From<IssueRepr> for Issue {
    fn from(repr: IssueRepr) -> Self {
        match repr {
            IssueRepr::Text(message) => Self::new(IssueSeverity::Minor, message),
            IssueRepr::Full { severity, message } => Self::new(severity, message),
        }
    }
}

impl Issue {
    pub fn new(severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Critical, message)
    }

    pub fn major(message: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Major, message)
    }

    pub fn minor(message: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Minor, message)
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.severity.is_critical() {
            write!(f, "[critical] {}", self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

/// Structured judge result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub score: f64,
    pub passed: bool,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl JudgeVerdict {
    pub fn new(score: f64, passed: bool) -> Self {
        Self {
            score,
            passed,
            issues: Vec::new(),
        }
    }

    pub fn with_issue(mut self, issue: Issue) -> Self {
        self.issues.push(issue);
        self
    }

    pub fn with_issues(mut self, issues: impl IntoIterator<Item = Issue>) -> Self {
        self.issues.extend(issues);
        self
    }

    pub fn critical_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity.is_critical()).count()
    }

    /// Issues rendered for feedback, in judge order.
    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}
