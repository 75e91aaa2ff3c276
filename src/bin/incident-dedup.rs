//! incident-dedup CLI: operator interface to the claim store.

use std::io::Read as _;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use incident_dedup::config::Config;
use incident_dedup::coordinator::Coordinator;
use incident_dedup::db::Db;
use incident_dedup::event::ChatEnvelope;
use incident_dedup::model::{IncidentKey, LockRecord};
use incident_dedup::normalize::{Action, TicketMatcher};
use incident_dedup::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;

#[derive(Parser)]
#[command(name = "incident-dedup", about = "Exactly-once claims for incident actions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending schema migrations
    Migrate,
    /// Claim an action on a ticket and print the decision
    Claim {
        /// Ticket id, e.g. ISD-12345
        ticket: String,
        /// Action tag, e.g. create-channel or invite:U024BE7LH
        action: String,
        /// Event type recorded on the claim (defaults to the action name)
        #[arg(long)]
        event_type: Option<String>,
        /// Channel the action targets
        #[arg(long)]
        channel: Option<String>,
        /// User the action targets
        #[arg(long)]
        user: Option<String>,
    },
    /// Read a chat event JSON body from stdin and claim what it calls for
    Handle {
        /// Incident channel the claimed actions target, if already created
        #[arg(long)]
        incident_channel: Option<String>,
    },
    /// Mark a claimed incident key resolved
    Resolve {
        /// Incident key, e.g. ISD-12345:create-channel
        key: String,
    },
    /// Show the live claim for a key
    Show { key: String },
    /// Has the user already been invited to the channel?
    Invited { channel: String, user: String },
    /// List live claims of one event type
    List { event_type: String },
    /// Delete expired claims
    Reap,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "incident-dedup".to_string(),
        log_level: config.log_level.clone(),
        region: config.store_region.clone(),
    })?;

    let db = Arc::new(Db::connect_lazy(
        config.store_url.expose_secret(),
        config.retry.attempt_timeout,
    )?);

    // The pool connects lazily, so building the coordinator touches nothing.
    let coordinator = Coordinator::from_config(&config, db.clone())?;

    match cli.command {
        Command::Migrate => {
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        Command::Claim {
            ticket,
            action,
            event_type,
            channel,
            user,
        } => cmd_claim(&coordinator, ticket, action, event_type, channel, user).await,
        Command::Handle { incident_channel } => {
            cmd_handle(&coordinator, &config, incident_channel.as_deref()).await
        }
        Command::Resolve { key } => {
            let key: IncidentKey = key.parse()?;
            if coordinator.resolve(&key).await? {
                println!("Resolved: {key}");
            } else {
                println!("No live claim to resolve for {key}");
            }
            Ok(())
        }
        Command::Show { key } => {
            let key: IncidentKey = key.parse()?;
            match coordinator.lookup(&key).await? {
                Some(record) => print_record(&record),
                None => println!("No live claim for {key}"),
            }
            Ok(())
        }
        Command::Invited { channel, user } => {
            let invited = coordinator.already_invited(&channel, &user).await?;
            println!("{}", if invited { "yes" } else { "no" });
            Ok(())
        }
        Command::List { event_type } => cmd_list(&coordinator, &event_type).await,
        Command::Reap => {
            let store = incident_dedup::store::LockStore::new(
                db,
                Arc::new(incident_dedup::clock::SystemClock),
                config.dedup_window,
                config.retry,
            )?;
            let removed = store.reap_expired().await?;
            println!("Reaped {removed} expired claim(s).");
            Ok(())
        }
    }
}

async fn cmd_claim(
    coordinator: &Coordinator,
    ticket: String,
    action: String,
    event_type: Option<String>,
    channel: Option<String>,
    user: Option<String>,
) -> anyhow::Result<()> {
    let action: Action = action.parse()?;
    let key = IncidentKey::for_action(&ticket, &action.tag())?;

    let mut metadata = action.metadata(channel.as_deref());
    if let Some(event_type) = event_type {
        metadata.event_type = event_type;
    }
    if user.is_some() {
        metadata.user_id = user;
    }

    let decision = coordinator.claim_once(&key, &metadata).await?;
    println!("{key}: {decision}");
    Ok(())
}

async fn cmd_handle(
    coordinator: &Coordinator,
    config: &Config,
    incident_channel: Option<&str>,
) -> anyhow::Result<()> {
    let mut body = String::new();
    std::io::stdin().read_to_string(&mut body)?;

    match ChatEnvelope::from_json(&body)? {
        ChatEnvelope::UrlVerification { challenge } => {
            println!("{challenge}");
        }
        ChatEnvelope::EventCallback { event_id, event } => {
            let matcher = TicketMatcher::new(&config.ticket_pattern)?;
            let plan = matcher.plan(&event, incident_channel)?;
            if plan.is_empty() {
                println!("No ticket reference in event {}", event_id.as_deref().unwrap_or("-"));
                return Ok(());
            }
            for (key, metadata) in plan {
                let decision = coordinator.claim_once(&key, &metadata).await?;
                println!("{key}: {decision}");
            }
        }
        ChatEnvelope::Unsupported => {
            anyhow::bail!("unsupported event envelope");
        }
    }
    Ok(())
}

async fn cmd_list(coordinator: &Coordinator, event_type: &str) -> anyhow::Result<()> {
    let records = coordinator.claims_for_event_type(event_type).await?;

    if records.is_empty() {
        println!("No live claims of type {event_type}.");
        return Ok(());
    }

    println!(
        "{:<40}  {:<9}  {:<12}  {:<12}  CLAIMED",
        "KEY", "STATUS", "CHANNEL", "USER"
    );
    println!("{}", "-".repeat(100));

    for record in &records {
        println!(
            "{:<40}  {:<9}  {:<12}  {:<12}  {}",
            record.incident_key,
            record.status,
            record.channel_id.as_deref().unwrap_or("-"),
            record.user_id.as_deref().unwrap_or("-"),
            record.claimed_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} claim(s)", records.len());
    Ok(())
}

fn print_record(record: &LockRecord) {
    println!("Key:        {}", record.incident_key);
    println!("Status:     {}", record.status);
    println!("Owner:      {}", record.owner);
    println!("Event Type: {}", record.event_type);
    println!("Channel:    {}", record.channel_id.as_deref().unwrap_or("-"));
    println!("User:       {}", record.user_id.as_deref().unwrap_or("-"));
    println!("Claimed:    {}", record.claimed_at);
    println!("Expires:    {}", record.expiration_time);
}
