use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::{Declaration, ValueInSequencing, parse_declared_at};
use crate::error::LighthouseError;
use crate::store::SampleStore;

const ROOT_SAMPLE_ID: &str = "root_sample_id";
const VALUE_IN_SEQUENCING: &str = "value_in_sequencing";
const DECLARED_AT: &str = "declared_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERR")]
    Err,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    #[serde(rename = "_status")]
    pub status: Status,
    #[serde(rename = "_issues", skip_serializing_if = "BTreeMap::is_empty")]
    pub issues: BTreeMap<&'static str, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    #[serde(rename = "_status")]
    pub status: Status,
    #[serde(rename = "_items")]
    pub items: Vec<ItemOutcome>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

#[derive(Default)]
struct ItemCheck {
    root_sample_id: Option<String>,
    value_in_sequencing: Option<ValueInSequencing>,
    declared_at: Option<chrono::NaiveDateTime>,
    issues: BTreeMap<&'static str, String>,
}

impl ItemCheck {
    fn declaration(&self) -> Option<Declaration> {
        if !self.issues.is_empty() {
            return None;
        }
        Some(Declaration {
            root_sample_id: self.root_sample_id.clone()?,
            value_in_sequencing: self.value_in_sequencing?,
            declared_at: self.declared_at?,
        })
    }
}

fn check_fields(item: &Value) -> ItemCheck {
    let mut check = ItemCheck::default();
    let Some(object) = item.as_object() else {
        check
            .issues
            .insert(ROOT_SAMPLE_ID, "must be of dict type".to_string());
        return check;
    };

    match object.get(ROOT_SAMPLE_ID) {
        None => {
            check.issues.insert(ROOT_SAMPLE_ID, "required field".to_string());
        }
        Some(Value::String(id)) => check.root_sample_id = Some(id.clone()),
        Some(_) => {
            check
                .issues
                .insert(ROOT_SAMPLE_ID, "must be of string type".to_string());
        }
    }

    match object.get(VALUE_IN_SEQUENCING) {
        None => {
            check
                .issues
                .insert(VALUE_IN_SEQUENCING, "required field".to_string());
        }
        Some(Value::String(value)) => match value.parse::<ValueInSequencing>() {
            Ok(parsed) => check.value_in_sequencing = Some(parsed),
            Err(_) => {
                check
                    .issues
                    .insert(VALUE_IN_SEQUENCING, format!("unallowed value {value}"));
            }
        },
        Some(other) => {
            check
                .issues
                .insert(VALUE_IN_SEQUENCING, format!("unallowed value {other}"));
        }
    }

    match object.get(DECLARED_AT) {
        None => {
            check.issues.insert(DECLARED_AT, "required field".to_string());
        }
        Some(value) => match value.as_str().map(parse_declared_at) {
            Some(Ok(parsed)) => check.declared_at = Some(parsed),
            _ => {
                check
                    .issues
                    .insert(DECLARED_AT, "must be of datetime type".to_string());
            }
        },
    }

    check
}

/// Validates a batch of declarations and stores it when every item is
/// valid. Returns the per-item outcome either way.
pub fn declare_samples(
    store: &dyn SampleStore,
    items: &[Value],
) -> Result<BatchOutcome, LighthouseError> {
    info!(count = items.len(), "validating sample declarations");
    let mut checks = items.iter().map(check_fields).collect::<Vec<_>>();

    let mut occurrences: HashMap<String, usize> = HashMap::new();
    for id in checks.iter().filter_map(|check| check.root_sample_id.as_ref()) {
        *occurrences.entry(id.clone()).or_default() += 1;
    }
    let ids = occurrences.keys().cloned().collect::<Vec<_>>();
    let existing = store.existing_root_sample_ids(&ids)?;

    for check in &mut checks {
        let Some(id) = check.root_sample_id.as_ref() else {
            continue;
        };
        if occurrences.get(id).copied().unwrap_or_default() > 1 {
            check
                .issues
                .insert(ROOT_SAMPLE_ID, "Sample is a duplicate".to_string());
        } else if !existing.contains(id) {
            check
                .issues
                .insert(ROOT_SAMPLE_ID, "Sample does not exist in database".to_string());
        }
    }

    let outcomes = checks
        .iter()
        .map(|check| ItemOutcome {
            status: if check.issues.is_empty() {
                Status::Ok
            } else {
                Status::Err
            },
            issues: check.issues.clone(),
        })
        .collect::<Vec<_>>();

    let valid = checks
        .iter()
        .filter_map(ItemCheck::declaration)
        .collect::<Vec<_>>();
    if valid.len() != checks.len() {
        debug!(
            invalid = checks.len() - valid.len(),
            "declaration batch rejected"
        );
        return Ok(BatchOutcome {
            status: Status::Err,
            items: outcomes,
        });
    }

    store.insert_declarations(&valid)?;
    info!(count = valid.len(), "stored sample declarations");
    Ok(BatchOutcome {
        status: Status::Ok,
        items: outcomes,
    })
}
