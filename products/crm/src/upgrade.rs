//! Load-time schema upgrade for stored negotiations.
//!
//! Records written before stages carried checklists have no `subStages` on
//! their first stage. Those records get the whole stage list replaced with
//! the canonical catalog. Completion state cannot exist in that shape, so
//! nothing is lost today; a future shape change must not reuse this
//! wholesale replacement without revisiting that.

use serde_json::Value;

use crate::{catalog::default_stages, error::CrmResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaVersion {
    /// Stages without checklists (or no stages at all).
    Legacy,
    /// Every stage carries a `subStages` list.
    SubStages,
}

pub const CURRENT_SCHEMA: SchemaVersion = SchemaVersion::SubStages;

/// Outcome of upgrading one raw record.
#[derive(Clone, Debug, PartialEq)]
pub enum Upgrade {
    Upgraded(Value),
    Unchanged(Value),
}

impl Upgrade {
    pub fn is_upgraded(&self) -> bool {
        matches!(self, Self::Upgraded(_))
    }

    pub fn into_inner(self) -> Value {
        match self {
            Self::Upgraded(value) | Self::Unchanged(value) => value,
        }
    }
}

/// Outcome of upgrading a whole collection. Callers persist `records` when
/// `upgraded > 0`.
#[derive(Clone, Debug, Default)]
pub struct UpgradeReport {
    pub records: Vec<Value>,
    pub upgraded: usize,
}

impl UpgradeReport {
    pub fn needs_write(&self) -> bool {
        self.upgraded > 0
    }
}

pub fn detect(record: &Value) -> SchemaVersion {
    let has_checklist = record
        .get("stages")
        .and_then(Value::as_array)
        .and_then(|stages| stages.first())
        .and_then(|stage| stage.get("subStages"))
        .is_some_and(Value::is_array);
    if has_checklist {
        SchemaVersion::SubStages
    } else {
        SchemaVersion::Legacy
    }
}

pub fn upgrade_record(mut record: Value) -> CrmResult<Upgrade> {
    if detect(&record) >= CURRENT_SCHEMA {
        return Ok(Upgrade::Unchanged(record));
    }
    let stages = serde_json::to_value(default_stages())?;
    match record.as_object_mut() {
        Some(fields) => {
            fields.insert("stages".to_string(), stages);
            Ok(Upgrade::Upgraded(record))
        }
        // Not an object; leave it for the decoder to reject.
        None => Ok(Upgrade::Unchanged(record)),
    }
}

pub fn upgrade_collection(records: Vec<Value>) -> CrmResult<UpgradeReport> {
    let mut report = UpgradeReport {
        records: Vec::with_capacity(records.len()),
        upgraded: 0,
    };
    for record in records {
        let outcome = upgrade_record(record)?;
        if outcome.is_upgraded() {
            report.upgraded += 1;
        }
        report.records.push(outcome.into_inner());
    }
    Ok(report)
}
