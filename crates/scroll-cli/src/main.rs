//! `scroll`: inspect and maintain a conversation-history store.
//!
//! Reads `scroll.toml` (or the path given with `--config`), opens the SQLite
//! store it names and runs one subcommand against it.
//!
//! # Usage
//!
//! ```
//! scroll ingest --thread <UUID> --protocol-version 5 --linked-device
//! scroll history <THREAD> --limit 50
//! scroll mark-read <ID>
//! scroll expire
//! ```

mod render;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use scroll_core::{
  capability::{Capabilities, ProtocolVersion},
  gate::{IncomingEnvelope, ProtocolGate},
  record::{Mutation, SortId},
  store::{HistoryQuery, HistoryStore, ThreadDirectory},
};
use scroll_store_sqlite::SqliteStore;
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "scroll", version, about = "Conversation history store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "scroll.toml")]
  config: PathBuf,

  /// Override the configured maximum supported protocol version.
  #[arg(long, value_name = "VERSION")]
  max_protocol_version: Option<u32>,

  /// Print JSON instead of text.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run an incoming message's envelope through the protocol gate.
  Ingest {
    #[arg(long)]
    thread:           Uuid,
    #[arg(long)]
    protocol_version: u32,
    /// The message was sent by one of this account's own devices.
    #[arg(long)]
    linked_device:    bool,
    #[arg(long)]
    sender:           Option<String>,
    /// Sender-claimed send time (RFC 3339); defaults to now.
    #[arg(long)]
    timestamp:        Option<DateTime<Utc>>,
  },
  /// List a thread's records in order.
  History {
    thread: Uuid,
    /// Only records after this sort id.
    #[arg(long)]
    after:  Option<u64>,
    #[arg(long)]
    limit:  Option<usize>,
  },
  /// Print one record.
  Show { id: Uuid },
  MarkRead { id: Uuid },
  /// Start a record's disappearing-message timer.
  StartExpiration { id: Uuid },
  CompleteViewOnce { id: Uuid },
  Delete { id: Uuid },
  /// Delete every record whose timer has run out.
  Expire,
  /// Print a thread's summary.
  Thread { thread: Uuid },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let mut settings = Settings::load(&cli.config).with_context(|| {
    format!("failed to read config from {}", cli.config.display())
  })?;
  if let Some(v) = cli.max_protocol_version {
    settings.capabilities = Capabilities::new(v);
  }

  let store_path = settings.resolved_store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_policy(settings.thread_policy.clone());

  tracing::debug!(
    store = %store_path.display(),
    max_protocol_version = %settings.capabilities.max_supported_protocol_version,
    "store opened"
  );

  run(cli.command, cli.json, &store, settings.capabilities).await
}

async fn run(
  command: Command,
  json: bool,
  store: &SqliteStore,
  capabilities: Capabilities,
) -> anyhow::Result<()> {
  match command {
    Command::Ingest {
      thread,
      protocol_version,
      linked_device,
      sender,
      timestamp,
    } => {
      let gate = ProtocolGate::new(capabilities);
      let envelope = IncomingEnvelope {
        protocol_version:      ProtocolVersion(protocol_version),
        is_from_linked_device: linked_device,
        sender_id:             sender,
        timestamp:             timestamp.unwrap_or_else(Utc::now),
        thread_id:             thread,
      };
      match gate.ingest(store, &envelope).await.context("ingest failed")? {
        Some(record) => {
          tracing::info!(
            record = %record.unique_id,
            protocol_version,
            "unsupported content recorded"
          );
          print_record(&record, json, &capabilities)?;
        }
        None => println!("protocol version {protocol_version} is supported"),
      }
    }

    Command::History { thread, after, limit } => {
      let query = HistoryQuery { thread_id: thread, after: after.map(SortId), limit };
      let records = store.list_thread(query).await?;
      if json {
        println!("{}", render::json(&records)?);
      } else {
        for record in &records {
          println!("{}", render::record_line(record, &capabilities));
        }
      }
    }

    Command::Show { id } => {
      let record = store
        .load(id)
        .await?
        .with_context(|| format!("no record with id {id}"))?;
      print_record(&record, json, &capabilities)?;
    }

    Command::MarkRead { id } => {
      let record = store.update(id, Mutation::MarkRead { at: Utc::now() }).await?;
      print_record(&record, json, &capabilities)?;
    }

    Command::StartExpiration { id } => {
      let record = store
        .update(id, Mutation::StartExpiration { started_at: Utc::now() })
        .await?;
      print_record(&record, json, &capabilities)?;
    }

    Command::CompleteViewOnce { id } => {
      let record = store.update(id, Mutation::CompleteViewOnce).await?;
      print_record(&record, json, &capabilities)?;
    }

    Command::Delete { id } => {
      store.delete(id).await?;
      println!("deleted {id}");
    }

    Command::Expire => {
      let deleted = store.delete_expired(Utc::now()).await?;
      if json {
        println!("{}", render::json(&deleted)?);
      } else {
        println!("{} expired record(s) deleted", deleted.len());
      }
    }

    Command::Thread { thread } => {
      let summary = store
        .summary(thread)
        .await?
        .with_context(|| format!("no thread with id {thread}"))?;
      if json {
        println!("{}", render::json(&summary)?);
      } else {
        for line in render::summary_lines(&summary) {
          println!("{line}");
        }
      }
    }
  }

  Ok(())
}

fn print_record(
  record: &scroll_core::record::Record,
  json: bool,
  capabilities: &Capabilities,
) -> anyhow::Result<()> {
  if json {
    println!("{}", render::json(record)?);
  } else {
    println!("{}", render::record_line(record, capabilities));
  }
  Ok(())
}
