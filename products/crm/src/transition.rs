//! Stage arithmetic over an ordered catalog.
//!
//! Nothing here touches storage. The repository asks for a patch, applies it
//! and records history using the helpers below.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    catalog::stage_name,
    error::{CrmError, CrmResult},
    model::{Negotiation, NegotiationHistoryEntry, NegotiationPatch, Stage},
};

/// A requested movement through the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageRequest {
    Next,
    Previous,
    /// Explicit override; no adjacency requirement.
    Jump(String),
    /// Rewrite the recorded entry date of a stage without moving.
    Redate {
        stage_id: String,
        date: DateTime<Utc>,
    },
}

fn locate<'a>(catalog: &'a [Stage], stage_id: &str) -> CrmResult<&'a Stage> {
    catalog
        .iter()
        .find(|stage| stage.id == stage_id)
        .ok_or_else(|| CrmError::UnknownStage(stage_id.to_string()))
}

/// Stage ranked immediately after `current_stage_id`, or `None` at the end.
pub fn next_stage<'a>(
    catalog: &'a [Stage],
    current_stage_id: &str,
) -> CrmResult<Option<&'a Stage>> {
    let current = locate(catalog, current_stage_id)?;
    Ok(catalog.iter().find(|stage| stage.order == current.order + 1))
}

/// Stage ranked immediately before `current_stage_id`, or `None` at the start.
pub fn previous_stage<'a>(
    catalog: &'a [Stage],
    current_stage_id: &str,
) -> CrmResult<Option<&'a Stage>> {
    let current = locate(catalog, current_stage_id)?;
    let Some(order) = current.order.checked_sub(1) else {
        return Ok(None);
    };
    Ok(catalog.iter().find(|stage| stage.order == order))
}

/// Caller notes, with blank text treated as absent.
pub fn caller_notes(notes: Option<String>) -> Option<String> {
    notes.filter(|text| !text.trim().is_empty())
}

/// History note used when a stage change arrives without caller notes.
pub fn stage_change_note(stage_name: &str) -> String {
    format!("Avanzó a etapa: {stage_name}")
}

/// Compute the patch that carries out `request`.
///
/// `Ok(None)` means the request is a no-op: advancing from the last stage or
/// stepping back from the first.
pub fn plan(
    catalog: &[Stage],
    negotiation: &Negotiation,
    request: &StageRequest,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> CrmResult<Option<NegotiationPatch>> {
    let mut stage_dates = negotiation.stage_dates.clone();
    let (target, note_prefix, move_stage) = match request {
        StageRequest::Next => match next_stage(catalog, &negotiation.current_stage)? {
            Some(stage) => (stage, "Avanzó automáticamente a", true),
            None => return Ok(None),
        },
        StageRequest::Previous => match previous_stage(catalog, &negotiation.current_stage)? {
            Some(stage) => (stage, "Retrocedió a", true),
            None => return Ok(None),
        },
        StageRequest::Jump(stage_id) => (locate(catalog, stage_id)?, "Movido a etapa", true),
        StageRequest::Redate { stage_id, date } => {
            let stage = locate(catalog, stage_id)?;
            stage_dates.insert(stage.id.clone(), *date);
            (stage, "Fecha establecida para etapa", false)
        }
    };

    if move_stage {
        stage_dates.insert(target.id.clone(), now);
    }

    let notes = caller_notes(notes).unwrap_or_else(|| {
        let name = stage_name(&target.id);
        format!("{note_prefix}: {name}")
    });
    Ok(Some(NegotiationPatch {
        current_stage: move_stage.then(|| target.id.clone()),
        stage_dates: Some(stage_dates),
        notes: Some(notes),
        ..NegotiationPatch::default()
    }))
}

pub fn history_entry(
    negotiation_id: &str,
    stage_id: &str,
    stage_name: &str,
    notes: String,
    user_id: &str,
    date: DateTime<Utc>,
) -> NegotiationHistoryEntry {
    NegotiationHistoryEntry {
        id: Uuid::new_v4().to_string(),
        negotiation_id: negotiation_id.to_string(),
        stage_id: stage_id.to_string(),
        stage_name: stage_name.to_string(),
        date,
        notes,
        user_id: user_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;

    use super::*;
    use crate::catalog::{catalog, default_stages};

    fn negotiation_at(stage_id: &str) -> Negotiation {
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
        Negotiation {
            id: "n-1".into(),
            client_id: "c-1".into(),
            current_stage: stage_id.into(),
            stages: default_stages(),
            start_date: start,
            last_update: start,
            expected_close_date: None,
            actual_close_date: None,
            notes: String::new(),
            probability: 50,
            estimated_value: 1000.0,
            actual_value: None,
            stage_dates: BTreeMap::from([(stage_id.to_string(), start)]),
        }
    }

    #[test]
    fn adjacency_follows_catalog_order() {
        let stages = catalog();
        assert_eq!(next_stage(stages, "contact").unwrap().unwrap().id, "proposal");
        assert_eq!(
            previous_stage(stages, "closing").unwrap().unwrap().id,
            "negotiation"
        );
        assert!(next_stage(stages, "post_implementation").unwrap().is_none());
        assert!(previous_stage(stages, "contact").unwrap().is_none());
    }

    #[test]
    fn unknown_current_stage_is_an_error() {
        let stages = catalog();
        assert!(matches!(
            next_stage(stages, "ghost"),
            Err(CrmError::UnknownStage(id)) if id == "ghost"
        ));
        assert!(previous_stage(stages, "ghost").is_err());
    }

    #[test]
    fn advancing_stamps_target_and_defaults_notes() {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap();
        let negotiation = negotiation_at("contact");
        let patch = plan(catalog(), &negotiation, &StageRequest::Next, None, now)
            .unwrap()
            .unwrap();
        assert_eq!(patch.current_stage.as_deref(), Some("proposal"));
        let dates = patch.stage_dates.unwrap();
        assert_eq!(dates["proposal"], now);
        assert_eq!(dates["contact"], negotiation.start_date);
        assert_eq!(
            patch.notes.as_deref(),
            Some("Avanzó automáticamente a: Propuesta Enviada")
        );
    }

    #[test]
    fn boundaries_are_no_ops() {
        let now = Utc::now();
        let last = negotiation_at("post_implementation");
        assert!(plan(catalog(), &last, &StageRequest::Next, None, now)
            .unwrap()
            .is_none());
        let first = negotiation_at("contact");
        assert!(plan(catalog(), &first, &StageRequest::Previous, None, now)
            .unwrap()
            .is_none());
    }

    #[test]
    fn redate_keeps_the_current_stage() {
        let date = Utc.with_ymd_and_hms(2023, 12, 24, 0, 0, 0).unwrap();
        let negotiation = negotiation_at("negotiation");
        let request = StageRequest::Redate {
            stage_id: "contact".into(),
            date,
        };
        let patch = plan(
            catalog(),
            &negotiation,
            &request,
            Some("backfilled".into()),
            Utc::now(),
        )
        .unwrap()
        .unwrap();
        assert!(patch.current_stage.is_none());
        assert_eq!(patch.stage_dates.unwrap()["contact"], date);
        assert_eq!(patch.notes.as_deref(), Some("backfilled"));
    }

    #[test]
    fn blank_caller_notes_fall_back_to_the_default() {
        let negotiation = negotiation_at("contact");
        let request = StageRequest::Jump("closing".into());
        for blank in ["", "   "] {
            let patch = plan(
                catalog(),
                &negotiation,
                &request,
                Some(blank.into()),
                Utc::now(),
            )
            .unwrap()
            .unwrap();
            assert_eq!(patch.notes.as_deref(), Some("Movido a etapa: Cierre"));
        }
    }

    #[test]
    fn jump_rejects_stages_outside_the_catalog() {
        let negotiation = negotiation_at("contact");
        let request = StageRequest::Jump("won".into());
        assert!(matches!(
            plan(catalog(), &negotiation, &request, None, Utc::now()),
            Err(CrmError::UnknownStage(_))
        ));
    }
}
