//! Monthly billing ledger per client.

use chrono::{DateTime, NaiveDate, Utc};
use platform_store::CollectionStore;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    error::{CrmError, CrmResult},
    model::validate_amount,
};

pub const BILLING_KEY: &str = "ceo-app-billing";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingStatus {
    Pending,
    Paid,
    Overdue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBilling {
    pub id: String,
    pub client_id: String,
    /// Billing period as `YYYY-MM`.
    pub month: String,
    pub amount_billed: f64,
    pub amount_paid: f64,
    #[serde(default)]
    pub last_payment_date: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub overdue_installments: u32,
    #[serde(default)]
    pub commitment_date: Option<DateTime<Utc>>,
    pub status: BillingStatus,
    #[serde(default)]
    pub notes: String,
}

impl MonthlyBilling {
    pub fn outstanding(&self) -> f64 {
        (self.amount_billed - self.amount_paid).max(0.0)
    }
}

#[derive(Clone, Debug)]
pub struct BillingDraft {
    pub client_id: String,
    pub month: String,
    pub amount_billed: f64,
    pub amount_paid: f64,
    pub due_date: DateTime<Utc>,
    pub commitment_date: Option<DateTime<Utc>>,
    pub status: BillingStatus,
    pub notes: String,
}

impl BillingDraft {
    pub fn new(
        client_id: impl Into<String>,
        month: impl Into<String>,
        amount_billed: f64,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            month: month.into(),
            amount_billed,
            amount_paid: 0.0,
            due_date,
            commitment_date: None,
            status: BillingStatus::Pending,
            notes: String::new(),
        }
    }
}

/// Ledger totals. `payment_percentage` is rounded and 0 when nothing was billed.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingSummary {
    pub total_billed: f64,
    pub total_paid: f64,
    pub total_pending: f64,
    pub payment_percentage: u32,
    pub overdue_count: usize,
    pub pending_count: usize,
}

pub fn summarize(records: &[MonthlyBilling]) -> BillingSummary {
    let mut summary = records
        .iter()
        .fold(BillingSummary::default(), |mut acc, record| {
            acc.total_billed += record.amount_billed;
            acc.total_paid += record.amount_paid;
            match record.status {
                BillingStatus::Overdue => acc.overdue_count += 1,
                BillingStatus::Pending => acc.pending_count += 1,
                BillingStatus::Paid => {}
            }
            acc
        });
    summary.total_pending = summary.total_billed - summary.total_paid;
    if summary.total_billed > 0.0 {
        summary.payment_percentage =
            (summary.total_paid / summary.total_billed * 100.0).round() as u32;
    }
    summary
}

fn validate_month(month: &str) -> CrmResult<()> {
    let valid = month.len() == 7
        && NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").is_ok();
    if !valid {
        return Err(CrmError::invalid(format!(
            "month must look like YYYY-MM, got {month:?}"
        )));
    }
    Ok(())
}

fn newest_month_first(records: &mut [MonthlyBilling]) {
    records.sort_by(|a, b| b.month.cmp(&a.month));
}

#[derive(Clone, Debug)]
pub struct BillingLedger<S> {
    store: S,
    key: String,
}

impl<S: CollectionStore> BillingLedger<S> {
    pub fn new(store: S) -> Self {
        Self::with_key(store, BILLING_KEY)
    }

    pub fn with_key(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub async fn list(&self) -> CrmResult<Vec<MonthlyBilling>> {
        self.store.load_collection(&self.key).await.map_err(|err| {
            warn!(error = %err, "failed to load billing");
            err.into()
        })
    }

    pub async fn by_client(&self, client_id: &str) -> CrmResult<Vec<MonthlyBilling>> {
        let mut records = self.list().await?;
        records.retain(|r| r.client_id == client_id);
        newest_month_first(&mut records);
        Ok(records)
    }

    pub async fn by_month(&self, month: &str) -> CrmResult<Vec<MonthlyBilling>> {
        let mut records = self.list().await?;
        records.retain(|r| r.month == month);
        Ok(records)
    }

    pub async fn with_status(&self, status: BillingStatus) -> CrmResult<Vec<MonthlyBilling>> {
        let mut records = self.list().await?;
        records.retain(|r| r.status == status);
        Ok(records)
    }

    #[instrument(skip_all, fields(client_id = %draft.client_id, month = %draft.month))]
    pub async fn add(&self, draft: BillingDraft) -> CrmResult<MonthlyBilling> {
        validate_month(&draft.month)?;
        validate_amount("amountBilled", draft.amount_billed)?;
        validate_amount("amountPaid", draft.amount_paid)?;
        let mut records = self.list().await?;
        let record = MonthlyBilling {
            id: Uuid::new_v4().to_string(),
            client_id: draft.client_id,
            month: draft.month,
            amount_billed: draft.amount_billed,
            amount_paid: draft.amount_paid,
            last_payment_date: None,
            due_date: draft.due_date,
            overdue_installments: 0,
            commitment_date: draft.commitment_date,
            status: draft.status,
            notes: draft.notes,
        };
        records.push(record.clone());
        self.save(&records).await?;
        Ok(record)
    }

    /// Replace the record with the same id. `Ok(None)` when it does not exist.
    pub async fn update(&self, record: MonthlyBilling) -> CrmResult<Option<MonthlyBilling>> {
        validate_month(&record.month)?;
        validate_amount("amountBilled", record.amount_billed)?;
        validate_amount("amountPaid", record.amount_paid)?;
        let mut records = self.list().await?;
        let Some(slot) = records.iter_mut().find(|r| r.id == record.id) else {
            return Ok(None);
        };
        *slot = record.clone();
        self.save(&records).await?;
        Ok(Some(record))
    }

    /// Returns whether a record was removed.
    pub async fn delete(&self, id: &str) -> CrmResult<bool> {
        let mut records = self.list().await?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.save(&records).await?;
        Ok(true)
    }

    /// Record a payment. The record becomes `paid` once the payment covers
    /// the billed amount, otherwise `pending`.
    #[instrument(skip(self))]
    pub async fn mark_as_paid(
        &self,
        id: &str,
        amount: f64,
        paid_at: DateTime<Utc>,
    ) -> CrmResult<Option<MonthlyBilling>> {
        validate_amount("amountPaid", amount)?;
        let mut records = self.list().await?;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        record.amount_paid = amount;
        record.last_payment_date = Some(paid_at);
        record.status = if amount >= record.amount_billed {
            BillingStatus::Paid
        } else {
            BillingStatus::Pending
        };
        let updated = record.clone();
        self.save(&records).await?;
        Ok(Some(updated))
    }

    pub async fn summary(&self) -> CrmResult<BillingSummary> {
        Ok(summarize(&self.list().await?))
    }

    async fn save(&self, records: &[MonthlyBilling]) -> CrmResult<()> {
        self.store
            .save_collection(&self.key, records)
            .await
            .map_err(|err| {
                warn!(error = %err, "failed to save billing");
                err.into()
            })
    }
}
