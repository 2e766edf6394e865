use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LighthouseError;

pub const DECLARED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const REPORT_NAME_SUFFIX: &str = "_positives_with_locations.xlsx";

static REPORT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{6}_\d{4}_positives_with_locations\.xlsx$").unwrap());

/// A sample document as ingested by the lab. `source` distinguishes a
/// missing field (`None`) from an empty centre name (`Some("")`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub root_sample_id: String,
    #[serde(default)]
    pub source: Option<String>,
    pub plate_barcode: String,
    #[serde(default)]
    pub coordinate: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub date_tested: Option<String>,
    #[serde(default)]
    pub lab_id: Option<String>,
    #[serde(default)]
    pub cog_barcode: Option<String>,
    /// Store row the sample was read from.
    #[serde(skip)]
    pub row_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Centre {
    pub name: String,
    pub prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueInSequencing {
    Yes,
    No,
    Unknown,
}

impl ValueInSequencing {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueInSequencing::Yes => "Yes",
            ValueInSequencing::No => "No",
            ValueInSequencing::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ValueInSequencing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ValueInSequencing {
    type Err = LighthouseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Yes" => Ok(ValueInSequencing::Yes),
            "No" => Ok(ValueInSequencing::No),
            "Unknown" => Ok(ValueInSequencing::Unknown),
            other => Err(LighthouseError::InvalidPayload(format!(
                "unallowed value {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub root_sample_id: String,
    pub value_in_sequencing: ValueInSequencing,
    pub declared_at: NaiveDateTime,
}

pub fn parse_declared_at(value: &str) -> Result<NaiveDateTime, LighthouseError> {
    NaiveDateTime::parse_from_str(value.trim(), DECLARED_AT_FORMAT)
        .map_err(|err| LighthouseError::InvalidPayload(format!("declared_at {value}: {err}")))
}

/// Filename of a generated positives report, e.g.
/// `200716_1345_positives_with_locations.xlsx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ReportName(String);

impl ReportName {
    pub fn for_timestamp(now: DateTime<Utc>) -> Self {
        Self(format!("{}{REPORT_NAME_SUFFIX}", now.format("%y%m%d_%H%M")))
    }

    pub fn matches(value: &str) -> bool {
        REPORT_NAME_RE.is_match(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReportName {
    type Err = LighthouseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !Self::matches(trimmed) {
            return Err(LighthouseError::ReportNotFound(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn report_name_from_timestamp() {
        let now = Utc.with_ymd_and_hms(2020, 7, 16, 13, 45, 12).unwrap();
        let name = ReportName::for_timestamp(now);
        assert_eq!(name.as_str(), "200716_1345_positives_with_locations.xlsx");
        assert!(ReportName::matches(name.as_str()));
    }

    #[test]
    fn report_name_rejects_other_files() {
        assert!(!ReportName::matches("notes.txt"));
        assert!(!ReportName::matches("2007161_1345_positives_with_locations.xlsx"));
        assert!(!ReportName::matches("200716_1345_positives_with_locationsxxlsx"));
        let err = "../200716_1345_positives_with_locations.xlsx"
            .parse::<ReportName>()
            .unwrap_err();
        assert_matches!(err, LighthouseError::ReportNotFound(_));
    }

    #[test]
    fn value_in_sequencing_parses_allowed_values() {
        assert_eq!(
            "Unknown".parse::<ValueInSequencing>().unwrap(),
            ValueInSequencing::Unknown
        );
        let err = "wrong answer!!".parse::<ValueInSequencing>().unwrap_err();
        assert_eq!(err.to_string(), "invalid payload: unallowed value wrong answer!!");
    }

    #[test]
    fn declared_at_format() {
        let parsed = parse_declared_at("2013-04-04T10:29:13").unwrap();
        assert_eq!(parsed.format(DECLARED_AT_FORMAT).to_string(), "2013-04-04T10:29:13");
        assert!(parse_declared_at("wrong time mate!!").is_err());
    }
}
