#![allow(dead_code)]

use platform_store::{CollectionStore, MemoryStore};
use products_crm::{
    Negotiation, NegotiationDraft, NegotiationRepository, repository::NEGOTIATIONS_KEY,
};
use serde_json::Value;

pub struct PipelineTestContext {
    pub store: MemoryStore,
    pub repo: NegotiationRepository<MemoryStore>,
}

impl PipelineTestContext {
    /// Fresh repository over an empty in-memory store.
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let repo = NegotiationRepository::new(store.clone());
        Self { store, repo }
    }

    /// Repository whose negotiation collection starts as `records`.
    pub async fn with_raw_negotiations(records: Vec<Value>) -> Self {
        let ctx = Self::new();
        ctx.store
            .save_collection(NEGOTIATIONS_KEY, &records)
            .await
            .unwrap();
        ctx
    }

    pub async fn create_at(&self, client_id: &str, stage_id: &str) -> Negotiation {
        self.repo
            .create(NegotiationDraft::new(client_id).at_stage(stage_id))
            .await
            .unwrap()
    }

    pub fn negotiation_writes(&self) -> usize {
        self.store.write_count(NEGOTIATIONS_KEY)
    }
}
