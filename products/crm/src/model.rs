use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    catalog,
    error::{CrmError, CrmResult},
};

/// One checklist item inside a [`Stage`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubStage {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
    pub order: u32,
}

/// One phase of the sales pipeline. `color` and `icon` are opaque display hints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: String,
    pub name: String,
    pub order: u32,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sub_stages: Vec<SubStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Stage {
    pub fn sub_stage(&self, sub_stage_id: &str) -> Option<&SubStage> {
        self.sub_stages.iter().find(|s| s.id == sub_stage_id)
    }

    pub fn completed_sub_stages(&self) -> usize {
        self.sub_stages.iter().filter(|s| s.completed).count()
    }
}

/// A deal tracked through the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Negotiation {
    pub id: String,
    pub client_id: String,
    pub current_stage: String,
    /// Negotiation-owned copy of the catalog carrying per-deal checklist state.
    pub stages: Vec<Stage>,
    pub start_date: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_close_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_close_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
    pub probability: u8,
    pub estimated_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<f64>,
    /// Moment the deal entered each visited stage.
    #[serde(default)]
    pub stage_dates: BTreeMap<String, DateTime<Utc>>,
}

impl Negotiation {
    pub fn stage(&self, stage_id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    pub fn entered_current_stage_at(&self) -> Option<DateTime<Utc>> {
        self.stage_dates.get(&self.current_stage).copied()
    }
}

/// Append-only audit record of a stage change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationHistoryEntry {
    pub id: String,
    pub negotiation_id: String,
    pub stage_id: String,
    /// Display name of the stage when the entry was written.
    pub stage_name: String,
    pub date: DateTime<Utc>,
    pub notes: String,
    pub user_id: String,
}

/// Caller-supplied fields for a new negotiation. Identity, timestamps,
/// stage copy and stage dates are assigned by the repository.
#[derive(Clone, Debug)]
pub struct NegotiationDraft {
    pub client_id: String,
    pub current_stage: String,
    pub start_date: DateTime<Utc>,
    pub expected_close_date: Option<DateTime<Utc>>,
    pub actual_close_date: Option<DateTime<Utc>>,
    pub notes: String,
    pub probability: u8,
    pub estimated_value: f64,
    pub actual_value: Option<f64>,
}

impl NegotiationDraft {
    /// Draft for `client_id` starting at the first catalog stage.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            current_stage: catalog::first_stage().id.clone(),
            start_date: Utc::now(),
            expected_close_date: None,
            actual_close_date: None,
            notes: String::new(),
            probability: 0,
            estimated_value: 0.0,
            actual_value: None,
        }
    }

    pub fn at_stage(mut self, stage_id: impl Into<String>) -> Self {
        self.current_stage = stage_id.into();
        self
    }

    pub fn with_value(mut self, estimated_value: f64) -> Self {
        self.estimated_value = estimated_value;
        self
    }

    pub fn with_probability(mut self, probability: u8) -> Self {
        self.probability = probability;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn expected_close(mut self, date: DateTime<Utc>) -> Self {
        self.expected_close_date = Some(date);
        self
    }

    pub(crate) fn validate(&self) -> CrmResult<()> {
        catalog::require_stage(&self.current_stage)?;
        validate_probability(self.probability)?;
        validate_amount("estimatedValue", self.estimated_value)?;
        if let Some(value) = self.actual_value {
            validate_amount("actualValue", value)?;
        }
        Ok(())
    }
}

/// The fields an update may change. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NegotiationPatch {
    pub client_id: Option<String>,
    pub current_stage: Option<String>,
    pub stages: Option<Vec<Stage>>,
    pub expected_close_date: Option<DateTime<Utc>>,
    pub actual_close_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub probability: Option<u8>,
    pub estimated_value: Option<f64>,
    pub actual_value: Option<f64>,
    pub stage_dates: Option<BTreeMap<String, DateTime<Utc>>>,
}

impl NegotiationPatch {
    pub fn move_to(stage_id: impl Into<String>) -> Self {
        Self {
            current_stage: Some(stage_id.into()),
            ..Self::default()
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub(crate) fn validate(&self) -> CrmResult<()> {
        if let Some(stage_id) = &self.current_stage {
            catalog::require_stage(stage_id)?;
        }
        if let Some(stages) = &self.stages {
            if stages.is_empty() {
                return Err(CrmError::invalid("stages must not be empty"));
            }
        }
        if let Some(probability) = self.probability {
            validate_probability(probability)?;
        }
        if let Some(value) = self.estimated_value {
            validate_amount("estimatedValue", value)?;
        }
        if let Some(value) = self.actual_value {
            validate_amount("actualValue", value)?;
        }
        Ok(())
    }

    /// Merge into `target`. Timestamps are the caller's concern.
    pub(crate) fn apply(self, target: &mut Negotiation) {
        if let Some(client_id) = self.client_id {
            target.client_id = client_id;
        }
        if let Some(stage) = self.current_stage {
            target.current_stage = stage;
        }
        if let Some(stages) = self.stages {
            target.stages = stages;
        }
        if let Some(date) = self.expected_close_date {
            target.expected_close_date = Some(date);
        }
        if let Some(date) = self.actual_close_date {
            target.actual_close_date = Some(date);
        }
        if let Some(notes) = self.notes {
            target.notes = notes;
        }
        if let Some(probability) = self.probability {
            target.probability = probability;
        }
        if let Some(value) = self.estimated_value {
            target.estimated_value = value;
        }
        if let Some(value) = self.actual_value {
            target.actual_value = Some(value);
        }
        if let Some(stage_dates) = self.stage_dates {
            target.stage_dates = stage_dates;
        }
    }
}

fn validate_probability(probability: u8) -> CrmResult<()> {
    if probability > 100 {
        return Err(CrmError::invalid(format!(
            "probability must be between 0 and 100, got {probability}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_amount(field: &str, value: f64) -> CrmResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(CrmError::invalid(format!(
            "{field} must be a non-negative amount"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_defaults_to_first_stage() {
        let draft = NegotiationDraft::new("client-1");
        assert_eq!(draft.current_stage, "contact");
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn draft_rejects_out_of_range_probability() {
        let draft = NegotiationDraft::new("client-1").with_probability(101);
        assert!(matches!(draft.validate(), Err(CrmError::InvalidInput(_))));
    }

    #[test]
    fn patch_rejects_unknown_stage_and_empty_stage_list() {
        let patch = NegotiationPatch::move_to("won");
        assert!(matches!(patch.validate(), Err(CrmError::UnknownStage(id)) if id == "won"));

        let patch = NegotiationPatch {
            stages: Some(Vec::new()),
            ..NegotiationPatch::default()
        };
        assert!(matches!(patch.validate(), Err(CrmError::InvalidInput(_))));
    }

    #[test]
    fn wire_shape_uses_camel_case_and_iso_dates() {
        let json = serde_json::json!({
            "id": "n1",
            "clientId": "c1",
            "currentStage": "contact",
            "stages": [],
            "startDate": "2024-03-01T10:00:00.000Z",
            "lastUpdate": "2024-03-02T10:00:00Z",
            "probability": 40,
            "estimatedValue": 1500,
            "stageDates": { "contact": "2024-03-01T10:00:00.000Z" }
        });
        let negotiation: Negotiation = serde_json::from_value(json).unwrap();
        assert_eq!(negotiation.client_id, "c1");
        assert_eq!(negotiation.estimated_value, 1500.0);
        assert!(negotiation.notes.is_empty());
        assert_eq!(
            negotiation.entered_current_stage_at(),
            Some(negotiation.start_date)
        );

        let back = serde_json::to_value(&negotiation).unwrap();
        assert_eq!(back["clientId"], "c1");
        assert!(back.get("actualValue").is_none());
    }
}
