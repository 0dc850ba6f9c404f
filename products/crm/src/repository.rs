use chrono::{DateTime, Utc};
use platform_store::CollectionStore;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    catalog::{self, default_stages},
    error::{CrmError, CrmResult},
    model::{
        Negotiation, NegotiationDraft, NegotiationHistoryEntry, NegotiationPatch, Stage, SubStage,
    },
    stats::{PipelineStats, compute_stats},
    transition::{self, StageRequest},
    upgrade::upgrade_collection,
};

pub const NEGOTIATIONS_KEY: &str = "ceo-app-negotiations";
pub const HISTORY_KEY: &str = "ceo-app-negotiation-history";
pub const SYSTEM_USER_ID: &str = "ceo";

const STARTED_NOTE: &str = "Negociación iniciada";

#[derive(Clone, Debug)]
pub struct RepositoryConfig {
    pub negotiations_key: String,
    pub history_key: String,
    /// Recorded as `userId` on every history entry.
    pub user_id: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            negotiations_key: NEGOTIATIONS_KEY.to_string(),
            history_key: HISTORY_KEY.to_string(),
            user_id: SYSTEM_USER_ID.to_string(),
        }
    }
}

impl RepositoryConfig {
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }
}

/// Owns the negotiation collection and its history log.
///
/// Every mutation reads the whole collection, changes it in memory and
/// writes it back. There is a single logical caller; no locking is done.
#[derive(Clone, Debug)]
pub struct NegotiationRepository<S> {
    store: S,
    config: RepositoryConfig,
}

/// `lastUpdate` never moves backwards, even if the wall clock does.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}

impl<S: CollectionStore> NegotiationRepository<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, RepositoryConfig::default())
    }

    pub fn with_config(store: S, config: RepositoryConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// All negotiations in stored order, upgrading legacy records first.
    #[instrument(skip_all)]
    pub async fn list_all(&self) -> CrmResult<Vec<Negotiation>> {
        let key = &self.config.negotiations_key;
        let raw: Vec<Value> = self.store.load_collection(key).await.map_err(|err| {
            warn!(error = %err, key = %key, "failed to load negotiations");
            CrmError::from(err)
        })?;
        let report = upgrade_collection(raw)?;
        if report.needs_write() {
            info!(upgraded = report.upgraded, "upgraded legacy negotiation records");
            self.store
                .save_collection(key, &report.records)
                .await
                .map_err(|err| {
                    warn!(error = %err, "failed to persist upgraded negotiations");
                    CrmError::from(err)
                })?;
        }
        report
            .records
            .into_iter()
            .enumerate()
            .map(|(position, record)| {
                serde_json::from_value(record)
                    .map_err(|source| CrmError::CorruptRecord { position, source })
            })
            .collect()
    }

    pub async fn get_by_id(&self, id: &str) -> CrmResult<Option<Negotiation>> {
        Ok(self.list_all().await?.into_iter().find(|n| n.id == id))
    }

    pub async fn list_by_client(&self, client_id: &str) -> CrmResult<Vec<Negotiation>> {
        let mut negotiations = self.list_all().await?;
        negotiations.retain(|n| n.client_id == client_id);
        Ok(negotiations)
    }

    #[instrument(skip_all, fields(client_id = %draft.client_id, stage = %draft.current_stage))]
    pub async fn create(&self, draft: NegotiationDraft) -> CrmResult<Negotiation> {
        draft.validate()?;
        let mut negotiations = self.list_all().await?;
        let now = Utc::now();
        let negotiation = Negotiation {
            id: Uuid::new_v4().to_string(),
            client_id: draft.client_id,
            current_stage: draft.current_stage.clone(),
            stages: default_stages(),
            start_date: draft.start_date,
            last_update: now,
            expected_close_date: draft.expected_close_date,
            actual_close_date: draft.actual_close_date,
            notes: draft.notes,
            probability: draft.probability,
            estimated_value: draft.estimated_value,
            actual_value: draft.actual_value,
            stage_dates: [(draft.current_stage, now)].into_iter().collect(),
        };
        negotiations.push(negotiation.clone());
        self.save_negotiations(&negotiations).await?;

        let entry = transition::history_entry(
            &negotiation.id,
            &negotiation.current_stage,
            catalog::stage_name(&negotiation.current_stage),
            STARTED_NOTE.to_string(),
            &self.config.user_id,
            now,
        );
        self.append_history(entry).await?;
        info!(negotiation_id = %negotiation.id, "negotiation created");
        Ok(negotiation)
    }

    /// Merge `patch` into negotiation `id`. `Ok(None)` when `id` is unknown.
    ///
    /// A stage change records a history entry and stamps the entry date of
    /// the new stage unless the patch already supplies one.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        id: &str,
        patch: NegotiationPatch,
    ) -> CrmResult<Option<Negotiation>> {
        patch.validate()?;
        let mut negotiations = self.list_all().await?;
        let Some(index) = negotiations.iter().position(|n| n.id == id) else {
            debug!("negotiation not found");
            return Ok(None);
        };

        let previous_stage = negotiations[index].current_stage.clone();
        let caller_notes = transition::caller_notes(patch.notes.clone());
        let now = next_timestamp(negotiations[index].last_update);

        let updated = &mut negotiations[index];
        let patch_dates_target = patch
            .current_stage
            .as_ref()
            .zip(patch.stage_dates.as_ref())
            .is_some_and(|(stage, dates)| dates.contains_key(stage));
        patch.apply(updated);
        updated.last_update = now;

        let stage_changed = updated.current_stage != previous_stage;
        if stage_changed && !patch_dates_target {
            updated.stage_dates.insert(updated.current_stage.clone(), now);
        }
        let updated = updated.clone();
        self.save_negotiations(&negotiations).await?;

        if stage_changed {
            let stage_name = catalog::stage_name(&updated.current_stage);
            let notes = caller_notes.unwrap_or_else(|| transition::stage_change_note(stage_name));
            let entry = transition::history_entry(
                id,
                &updated.current_stage,
                stage_name,
                notes,
                &self.config.user_id,
                now,
            );
            self.append_history(entry).await?;
            info!(from = %previous_stage, to = %updated.current_stage, "stage changed");
        }
        Ok(Some(updated))
    }

    pub async fn advance_to_next_stage(
        &self,
        id: &str,
        notes: Option<String>,
    ) -> CrmResult<Option<Negotiation>> {
        self.transition(id, StageRequest::Next, notes).await
    }

    pub async fn go_to_previous_stage(
        &self,
        id: &str,
        notes: Option<String>,
    ) -> CrmResult<Option<Negotiation>> {
        self.transition(id, StageRequest::Previous, notes).await
    }

    pub async fn go_to_stage(
        &self,
        id: &str,
        stage_id: &str,
        notes: Option<String>,
    ) -> CrmResult<Option<Negotiation>> {
        self.transition(id, StageRequest::Jump(stage_id.to_string()), notes)
            .await
    }

    pub async fn set_stage_date(
        &self,
        id: &str,
        stage_id: &str,
        date: DateTime<Utc>,
        notes: Option<String>,
    ) -> CrmResult<Option<Negotiation>> {
        let request = StageRequest::Redate {
            stage_id: stage_id.to_string(),
            date,
        };
        self.transition(id, request, notes).await
    }

    #[instrument(skip(self, notes))]
    async fn transition(
        &self,
        id: &str,
        request: StageRequest,
        notes: Option<String>,
    ) -> CrmResult<Option<Negotiation>> {
        let Some(negotiation) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        let now = next_timestamp(negotiation.last_update);
        match transition::plan(catalog::catalog(), &negotiation, &request, notes, now)? {
            Some(patch) => self.update(id, patch).await,
            None => {
                debug!(stage = %negotiation.current_stage, "already at pipeline boundary");
                Ok(Some(negotiation))
            }
        }
    }

    /// One stage of a negotiation's own copy, with its checklist state.
    pub async fn get_stage(&self, id: &str, stage_id: &str) -> CrmResult<Option<Stage>> {
        Ok(self
            .get_by_id(id)
            .await?
            .and_then(|n| n.stages.into_iter().find(|s| s.id == stage_id)))
    }

    /// Replace the checklist of `stage_id`; every other stage is untouched.
    #[instrument(skip(self, sub_stages), fields(items = sub_stages.len()))]
    pub async fn update_sub_stages(
        &self,
        id: &str,
        stage_id: &str,
        sub_stages: Vec<SubStage>,
    ) -> CrmResult<Option<Negotiation>> {
        let Some(negotiation) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        let mut stages = negotiation.stages;
        let stage = stages
            .iter_mut()
            .find(|s| s.id == stage_id)
            .ok_or_else(|| CrmError::UnknownStage(stage_id.to_string()))?;
        stage.sub_stages = sub_stages;
        let patch = NegotiationPatch {
            stages: Some(stages),
            ..NegotiationPatch::default()
        };
        self.update(id, patch).await
    }

    /// Tick or untick one checklist item. Completing stamps `completedDate`;
    /// reopening clears it.
    pub async fn complete_sub_stage(
        &self,
        id: &str,
        stage_id: &str,
        sub_stage_id: &str,
        completed: bool,
        notes: Option<String>,
    ) -> CrmResult<Option<Negotiation>> {
        let Some(stage) = self.get_stage(id, stage_id).await? else {
            if self.get_by_id(id).await?.is_none() {
                return Ok(None);
            }
            return Err(CrmError::UnknownStage(stage_id.to_string()));
        };
        let mut sub_stages = stage.sub_stages;
        let item = sub_stages
            .iter_mut()
            .find(|s| s.id == sub_stage_id)
            .ok_or_else(|| {
                CrmError::invalid(format!(
                    "stage {stage_id} has no checklist item {sub_stage_id}"
                ))
            })?;
        item.completed = completed;
        item.completed_date = completed.then(Utc::now);
        if let Some(notes) = notes {
            item.notes = notes;
        }
        self.update_sub_stages(id, stage_id, sub_stages).await
    }

    /// History of one negotiation, newest first. Entries sharing a date keep
    /// their insertion order.
    pub async fn get_history(
        &self,
        negotiation_id: &str,
    ) -> CrmResult<Vec<NegotiationHistoryEntry>> {
        let mut entries = self.load_history().await?;
        entries.retain(|entry| entry.negotiation_id == negotiation_id);
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(entries)
    }

    pub async fn get_stats(&self) -> CrmResult<PipelineStats> {
        Ok(compute_stats(&self.list_all().await?))
    }

    async fn load_history(&self) -> CrmResult<Vec<NegotiationHistoryEntry>> {
        self.store
            .load_collection(&self.config.history_key)
            .await
            .map_err(|err| {
                warn!(error = %err, "failed to load negotiation history");
                err.into()
            })
    }

    async fn append_history(&self, entry: NegotiationHistoryEntry) -> CrmResult<()> {
        let mut history = self.load_history().await?;
        history.push(entry);
        self.store
            .save_collection(&self.config.history_key, &history)
            .await
            .map_err(|err| {
                warn!(error = %err, "failed to save negotiation history");
                err.into()
            })
    }

    async fn save_negotiations(&self, negotiations: &[Negotiation]) -> CrmResult<()> {
        self.store
            .save_collection(&self.config.negotiations_key, negotiations)
            .await
            .map_err(|err| {
                warn!(error = %err, "failed to save negotiations");
                err.into()
            })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use platform_store::MemoryStore;

    use super::*;

    #[test]
    fn timestamps_never_move_backwards() {
        let future = Utc::now() + Duration::hours(1);
        assert_eq!(next_timestamp(future), future);
        let past = Utc::now() - Duration::hours(1);
        assert!(next_timestamp(past) > past);
    }

    #[tokio::test]
    async fn clock_skew_does_not_rewind_last_update() {
        let repo = NegotiationRepository::new(MemoryStore::new());
        let created = repo
            .create(NegotiationDraft::new("client-1"))
            .await
            .unwrap();

        // Simulate a record written by a clock running ahead.
        let mut stored = repo.list_all().await.unwrap();
        let ahead = Utc::now() + Duration::days(1);
        stored[0].last_update = ahead;
        repo.save_negotiations(&stored).await.unwrap();

        let updated = repo
            .update(&created.id, NegotiationPatch::default().with_notes("touch"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.last_update, ahead);
    }

    #[tokio::test]
    async fn custom_user_is_recorded_on_history() {
        let config = RepositoryConfig::default().with_user("ana");
        let repo = NegotiationRepository::with_config(MemoryStore::new(), config);
        let created = repo
            .create(NegotiationDraft::new("client-1"))
            .await
            .unwrap();
        let history = repo.get_history(&created.id).await.unwrap();
        assert_eq!(history[0].user_id, "ana");
    }
}
