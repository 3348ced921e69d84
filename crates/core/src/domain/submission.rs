use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowKind(pub String);

impl WorkflowKind {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `<PREFIX>-<YYYYMMDD>-<NNN>`, e.g. `DGR-20250101-002`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

impl SubmissionId {
    pub fn compose(prefix: &str, day: NaiveDate, sequence: u32) -> Self {
        Self(format!("{prefix}-{}-{sequence:03}", day.format("%Y%m%d")))
    }

    /// Returns `(prefix, yyyymmdd, sequence)` for ids matching `^[A-Z]{2,4}-\d{8}-\d{3}$`.
    pub fn parts(&self) -> Option<(&str, &str, u32)> {
        let mut pieces = self.0.split('-');
        let (prefix, date, sequence) = (pieces.next()?, pieces.next()?, pieces.next()?);
        if pieces.next().is_some() {
            return None;
        }

        let well_formed = (2..=4).contains(&prefix.len())
            && prefix.bytes().all(|byte| byte.is_ascii_uppercase())
            && date.len() == 8
            && date.bytes().all(|byte| byte.is_ascii_digit())
            && sequence.len() == 3
            && sequence.bytes().all(|byte| byte.is_ascii_digit());
        if !well_formed {
            return None;
        }

        sequence.parse().ok().map(|sequence| (prefix, date, sequence))
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    /// Exact literal match; the status cell is free text in the sheet.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Pending" => Some(Self::Pending),
            "Approved" => Some(Self::Approved),
            "Rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn parse_terminal(raw: &str) -> Option<Self> {
        Self::parse(raw).filter(Self::is_terminal)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workflow record decoded from its table row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub workflow: WorkflowKind,
    pub timestamp: DateTime<FixedOffset>,
    pub submitter_email: String,
    pub fields: BTreeMap<String, String>,
    /// Raw status cell; reviewers may type anything into it.
    pub status_value: String,
    pub notified_status: Option<SubmissionStatus>,
    pub notes: String,
    /// Location value captured at submission time.
    pub location: String,
    pub business_unit: Option<String>,
}

impl Submission {
    pub fn status(&self) -> Option<SubmissionStatus> {
        SubmissionStatus::parse(self.status_value.trim())
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Terminal once the engine has acted on an approval or rejection.
    pub fn is_terminal(&self) -> bool {
        self.notified_status.is_some_and(|status| status.is_terminal())
    }
}
