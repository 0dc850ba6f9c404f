mod config;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use platform_obs::{ObsConfig, init_tracing};
use platform_store::{CollectionStore, FileStore};
use products_crm::{
    BillingDraft, BillingLedger, Negotiation, NegotiationDraft, NegotiationRepository, catalog,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "pipeline-cli", version, about = "Sales pipeline tracker")]
struct Cli {
    /// Directory holding the JSON collections (overrides PIPELINE_DATA_DIR).
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stage catalog.
    Stages,
    /// Open a new negotiation.
    Create(CreateCommand),
    /// List negotiations in stored order.
    List {
        #[arg(long)]
        client: Option<String>,
    },
    /// Show one negotiation.
    Show { id: String },
    /// Move to the next stage.
    Advance {
        id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Move back to the previous stage.
    Back {
        id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Jump to any stage.
    Goto {
        id: String,
        stage: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Overwrite the recorded entry date of a stage.
    #[command(name = "set-date")]
    SetDate {
        id: String,
        stage: String,
        #[arg(value_parser = parse_date)]
        date: DateTime<Utc>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Tick (or with --undo, untick) a checklist item.
    Check {
        id: String,
        stage: String,
        sub_stage: String,
        #[arg(long)]
        undo: bool,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Stage-change history, newest first.
    History { id: String },
    /// Pipeline totals.
    Stats,
    #[command(subcommand)]
    Billing(BillingCommand),
}

#[derive(Args, Debug)]
struct CreateCommand {
    #[arg(long)]
    client: String,
    #[arg(long)]
    stage: Option<String>,
    #[arg(long, default_value_t = 0.0)]
    value: f64,
    #[arg(long, default_value_t = 0)]
    probability: u8,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long, value_parser = parse_date)]
    expected_close: Option<DateTime<Utc>>,
}

impl From<CreateCommand> for NegotiationDraft {
    fn from(value: CreateCommand) -> Self {
        let mut draft = NegotiationDraft::new(value.client)
            .with_value(value.value)
            .with_probability(value.probability);
        if let Some(stage) = value.stage {
            draft = draft.at_stage(stage);
        }
        if let Some(notes) = value.notes {
            draft = draft.with_notes(notes);
        }
        if let Some(date) = value.expected_close {
            draft = draft.expected_close(date);
        }
        draft
    }
}

#[derive(Subcommand, Debug)]
enum BillingCommand {
    /// List billing records, optionally filtered.
    List {
        #[arg(long)]
        client: Option<String>,
        #[arg(long)]
        month: Option<String>,
    },
    /// Record a monthly bill.
    Add {
        #[arg(long)]
        client: String,
        #[arg(long)]
        month: String,
        #[arg(long)]
        amount: f64,
        #[arg(long, value_parser = parse_date)]
        due: DateTime<Utc>,
    },
    /// Register a payment against a bill.
    Pay {
        id: String,
        #[arg(long)]
        amount: f64,
        #[arg(long, value_parser = parse_date)]
        date: Option<DateTime<Utc>>,
    },
    /// Ledger totals.
    Summary,
}

/// RFC 3339 timestamp or a plain `YYYY-MM-DD` (midnight UTC).
fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("expected YYYY-MM-DD or RFC 3339, got {raw:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(ObsConfig::default())?;
    let cli = Cli::parse();
    let config = AppConfig::load()?.with_data_dir(cli.data_dir);
    info!(data_dir = %config.data_dir.display(), "opening pipeline store");

    let store = FileStore::new(&config.data_dir);
    let repo = NegotiationRepository::with_config(store.clone(), config.repository());
    let ledger = BillingLedger::new(store);
    let output = execute(cli.command, &repo, &ledger).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn to_json(value: impl Serialize) -> Result<Value> {
    serde_json::to_value(value).context("failed to render output")
}

fn found(id: &str, negotiation: Option<Negotiation>) -> Result<Value> {
    let negotiation = negotiation.ok_or_else(|| anyhow!("negotiation {id} not found"))?;
    to_json(negotiation)
}

async fn execute<S: CollectionStore>(
    command: Command,
    repo: &NegotiationRepository<S>,
    ledger: &BillingLedger<S>,
) -> Result<Value> {
    match command {
        Command::Stages => to_json(catalog::catalog()),
        Command::Create(cmd) => to_json(repo.create(cmd.into()).await?),
        Command::List { client } => match client {
            Some(client) => to_json(repo.list_by_client(&client).await?),
            None => to_json(repo.list_all().await?),
        },
        Command::Show { id } => {
            let negotiation = repo.get_by_id(&id).await?;
            found(&id, negotiation)
        }
        Command::Advance { id, notes } => {
            let negotiation = repo.advance_to_next_stage(&id, notes).await?;
            found(&id, negotiation)
        }
        Command::Back { id, notes } => {
            let negotiation = repo.go_to_previous_stage(&id, notes).await?;
            found(&id, negotiation)
        }
        Command::Goto { id, stage, notes } => {
            let negotiation = repo.go_to_stage(&id, &stage, notes).await?;
            found(&id, negotiation)
        }
        Command::SetDate {
            id,
            stage,
            date,
            notes,
        } => {
            let negotiation = repo.set_stage_date(&id, &stage, date, notes).await?;
            found(&id, negotiation)
        }
        Command::Check {
            id,
            stage,
            sub_stage,
            undo,
            notes,
        } => {
            let negotiation = repo
                .complete_sub_stage(&id, &stage, &sub_stage, !undo, notes)
                .await?;
            found(&id, negotiation)
        }
        Command::History { id } => to_json(repo.get_history(&id).await?),
        Command::Stats => to_json(repo.get_stats().await?),
        Command::Billing(cmd) => execute_billing(cmd, ledger).await,
    }
}

async fn execute_billing<S: CollectionStore>(
    command: BillingCommand,
    ledger: &BillingLedger<S>,
) -> Result<Value> {
    match command {
        BillingCommand::List { client, month } => {
            let mut records = match &client {
                Some(client) => ledger.by_client(client).await?,
                None => ledger.list().await?,
            };
            if let Some(month) = month {
                records.retain(|r| r.month == month);
            }
            to_json(records)
        }
        BillingCommand::Add {
            client,
            month,
            amount,
            due,
        } => to_json(ledger.add(BillingDraft::new(client, month, amount, due)).await?),
        BillingCommand::Pay { id, amount, date } => {
            let paid_at = date.unwrap_or_else(Utc::now);
            let record = ledger
                .mark_as_paid(&id, amount, paid_at)
                .await?
                .ok_or_else(|| anyhow!("billing record {id} not found"))?;
            to_json(record)
        }
        BillingCommand::Summary => to_json(ledger.summary().await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        _dir: tempfile::TempDir,
        repo: NegotiationRepository<FileStore>,
        ledger: BillingLedger<FileStore>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = FileStore::new(dir.path());
            Self {
                repo: NegotiationRepository::new(store.clone()),
                ledger: BillingLedger::new(store),
                _dir: dir,
            }
        }

        async fn run(&self, args: &[&str]) -> Result<Value> {
            let argv = std::iter::once("pipeline-cli").chain(args.iter().copied());
            let cli = Cli::try_parse_from(argv)?;
            execute(cli.command, &self.repo, &self.ledger).await
        }
    }

    #[test]
    fn dates_accept_plain_days_and_rfc3339() {
        let day = parse_date("2024-03-15").unwrap();
        assert_eq!(day.to_rfc3339(), "2024-03-15T00:00:00+00:00");
        let stamp = parse_date("2024-03-15T10:30:00-04:00").unwrap();
        assert_eq!(stamp.to_rfc3339(), "2024-03-15T14:30:00+00:00");
        assert!(parse_date("15/03/2024").is_err());
    }

    #[tokio::test]
    async fn create_advance_and_history_round_trip_through_files() {
        let harness = Harness::new();
        let created = harness
            .run(&["create", "--client", "acme", "--value", "5000", "--probability", "60"])
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["currentStage"], "contact");

        let advanced = harness
            .run(&["advance", &id, "--notes", "propuesta enviada"])
            .await
            .unwrap();
        assert_eq!(advanced["currentStage"], "proposal");

        let history = harness.run(&["history", &id]).await.unwrap();
        let entries = history.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["notes"], "propuesta enviada");

        let stats = harness.run(&["stats"]).await.unwrap();
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["byStage"]["proposal"], 1);
        assert_eq!(stats["weightedValue"], 3000.0);
    }

    #[tokio::test]
    async fn missing_negotiation_is_an_error_message() {
        let harness = Harness::new();
        let err = harness.run(&["show", "ghost"]).await.unwrap_err();
        assert_eq!(err.to_string(), "negotiation ghost not found");
    }

    #[tokio::test]
    async fn billing_commands_share_the_store() {
        let harness = Harness::new();
        let added = harness
            .run(&[
                "billing", "add", "--client", "acme", "--month", "2024-01", "--amount", "400",
                "--due", "2024-01-31",
            ])
            .await
            .unwrap();
        let id = added["id"].as_str().unwrap().to_string();
        harness
            .run(&["billing", "pay", &id, "--amount", "100", "--date", "2024-02-01"])
            .await
            .unwrap();

        let summary = harness.run(&["billing", "summary"]).await.unwrap();
        assert_eq!(summary["totalBilled"], 400.0);
        assert_eq!(summary["paymentPercentage"], 25);

        let listed = harness
            .run(&["billing", "list", "--client", "acme", "--month", "2024-01"])
            .await
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[test]
    fn stages_output_lists_the_catalog() {
        let value = to_json(catalog::catalog()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 8);
        assert_eq!(value[0]["subStages"][0]["id"], "contact_1");
    }
}
