//! agenttrustd — thin CLI surface over the agenttrust library crates.
//!
//! Exposes the external-interface contract:
//! `init`, `record`, `claim`, `verify`, `query`, `evaluate`, `witness run`,
//! `digest`. No YAML pretty-printing, markdown rendering, or color output —
//! every subcommand prints plain JSON and those concerns stay external.

use std::path::PathBuf;
use std::sync::Arc;

use agenttrust_audit::{ClaimLog, ExecutionLog};
use agenttrust_digest::generate_digest;
use agenttrust_persist::{RecordStore, WITNESS_SUFFIX};
use agenttrust_proto::{ClaimPayload, ExecutionPayload, HashChainRecord, WitnessPayload};
use agenttrust_query::{parse_time_range, query, EntryFilter};
use agenttrust_rules::{default_catalog, evaluate_batch, RuleConfig};
use agenttrust_verdict::compute_trust_verdict;
use agenttrust_witness::{WitnessConfig, WitnessDaemon};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "agenttrustd")]
#[command(about = "Local trust & audit layer for autonomous AI agents")]
#[command(version)]
struct Cli {
    /// Workspace root holding the `.agenttrust` directory.
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ledger/claims/witness directories under the workspace.
    Init,

    /// Append an execution record. `--payload` is the JSON execution payload.
    Record {
        #[arg(long)]
        payload: String,
    },

    /// Append a claim record. `--payload` is the JSON claim payload.
    Claim {
        #[arg(long)]
        payload: String,
    },

    /// Verify the hash chain of the execution ledger (or claims, with `--claims`).
    Verify {
        #[arg(long)]
        claims: bool,
    },

    /// Query executions (or claims, with `--claims`) by time range, agent, session, and risk.
    Query {
        #[arg(long)]
        claims: bool,
        /// Relative time range, e.g. `2h`, `3d`, `1w`.
        #[arg(long)]
        range: Option<String>,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        min_risk: Option<u8>,
        #[arg(long)]
        max_risk: Option<u8>,
    },

    /// Run the rule engine and consistency matcher over the full ledger.
    Evaluate {
        /// One of `default`, `strict`, `minimal`.
        #[arg(long, default_value = "default")]
        preset: String,
    },

    /// Witness daemon operations.
    Witness {
        #[command(subcommand)]
        action: WitnessAction,
    },

    /// Assemble a digest for a date range, e.g. `--range 1d`.
    Digest {
        #[arg(long, default_value = "1d")]
        range: String,
    },
}

#[derive(Subcommand)]
enum WitnessAction {
    /// Start the witness daemon and run for `--seconds`, then stop and print stats.
    Run {
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}

fn witness_store(workspace: &std::path::Path) -> RecordStore {
    RecordStore::new(workspace.join(".agenttrust").join("witness"), WITNESS_SUFFIX)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("agenttrustd=info".parse()?))
        .init();

    match cli.command {
        Commands::Init => cmd_init(&cli.workspace)?,
        Commands::Record { payload } => cmd_record(&cli.workspace, &payload)?,
        Commands::Claim { payload } => cmd_claim(&cli.workspace, &payload)?,
        Commands::Verify { claims } => cmd_verify(&cli.workspace, claims)?,
        Commands::Query { claims, range, agent, session, min_risk, max_risk } => {
            cmd_query(&cli.workspace, claims, range, agent, session, min_risk, max_risk)?
        }
        Commands::Evaluate { preset } => cmd_evaluate(&cli.workspace, &preset)?,
        Commands::Witness { action: WitnessAction::Run { seconds } } => cmd_witness_run(&cli.workspace, seconds).await?,
        Commands::Digest { range } => cmd_digest(&cli.workspace, &range)?,
    }

    Ok(())
}

// ─── Init ──────────────────────────────────────────────────────────────────

fn cmd_init(workspace: &std::path::Path) -> anyhow::Result<()> {
    ExecutionLog::new(workspace).store().ensure_dir()?;
    ClaimLog::new(workspace).store().ensure_dir()?;
    witness_store(workspace).ensure_dir()?;
    info!(workspace = %workspace.display(), "initialized agenttrust workspace");
    println!("initialized {}/.agenttrust", workspace.display());
    Ok(())
}

// ─── Record / Claim ──────────────────────────────────────────────────────────

fn cmd_record(workspace: &std::path::Path, payload_json: &str) -> anyhow::Result<()> {
    let payload: ExecutionPayload = serde_json::from_str(payload_json)
        .map_err(|e| anyhow::anyhow!("invalid execution payload: {e}"))?;
    let log = ExecutionLog::new(workspace);
    match log.append(payload) {
        Ok(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "execution append failed");
            std::process::exit(1);
        }
    }
}

fn cmd_claim(workspace: &std::path::Path, payload_json: &str) -> anyhow::Result<()> {
    let payload: ClaimPayload = serde_json::from_str(payload_json)
        .map_err(|e| anyhow::anyhow!("invalid claim payload: {e}"))?;
    let log = ClaimLog::new(workspace);
    match log.append(payload) {
        Ok(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "claim append failed");
            std::process::exit(1);
        }
    }
}

// ─── Verify ──────────────────────────────────────────────────────────────────

fn cmd_verify(workspace: &std::path::Path, claims: bool) -> anyhow::Result<()> {
    let report = if claims {
        ClaimLog::new(workspace).verify_all()
    } else {
        ExecutionLog::new(workspace).verify_all()
    };

    let summary = serde_json::json!({
        "valid": report.valid,
        "filesChecked": report.files_checked,
        "totalEntries": report.total_entries,
        "errors": report.errors.iter().map(|e| serde_json::json!({
            "file": e.file.display().to_string(),
            "line": e.line,
            "kind": e.kind.as_str(),
            "detail": e.detail,
        })).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !report.valid {
        std::process::exit(1);
    }
    Ok(())
}

// ─── Query ───────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn cmd_query(
    workspace: &std::path::Path,
    claims: bool,
    range: Option<String>,
    agent: Option<String>,
    session: Option<String>,
    min_risk: Option<u8>,
    max_risk: Option<u8>,
) -> anyhow::Result<()> {
    let time_range = range.map(|r| parse_time_range(&r)).transpose()?;
    let filter = EntryFilter {
        time_range,
        agent,
        session,
        min_risk,
        max_risk,
        ..Default::default()
    };

    if claims {
        let log = ClaimLog::new(workspace);
        let results = query::<ClaimPayload>(log.store(), &filter);
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        let log = ExecutionLog::new(workspace);
        let results = query::<ExecutionPayload>(log.store(), &filter);
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}

// ─── Evaluate ────────────────────────────────────────────────────────────────

fn cmd_evaluate(workspace: &std::path::Path, preset: &str) -> anyhow::Result<()> {
    let config = match preset {
        "strict" => RuleConfig::strict_preset(),
        "minimal" => RuleConfig::minimal_preset(),
        _ => RuleConfig::default_preset(),
    };

    let execution_log = ExecutionLog::new(workspace);
    let claim_log = ClaimLog::new(workspace);
    let executions = query::<ExecutionPayload>(execution_log.store(), &EntryFilter::default());
    let claims = query::<ClaimPayload>(claim_log.store(), &EntryFilter::default());

    let rules = default_catalog();
    let batch = evaluate_batch(&executions, &claims, &rules, &config);

    let matches = agenttrust_consistency::match_claims_to_executions(&claims, &executions);
    let divergences = agenttrust_consistency::detect_divergences(&matches);
    let consistency = agenttrust_consistency::consistency_score(&divergences);

    let summary = serde_json::json!({
        "entriesEvaluated": batch.entries_evaluated,
        "totalMatches": batch.total_matches,
        "matches": batch.matches,
        "consistencyScore": consistency,
        "divergenceCount": divergences.len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if consistency < 70 {
        std::process::exit(1);
    }
    Ok(())
}

// ─── Witness ─────────────────────────────────────────────────────────────────

async fn cmd_witness_run(workspace: &std::path::Path, seconds: u64) -> anyhow::Result<()> {
    let workspace = workspace.to_path_buf();
    let store = Arc::new(witness_store(&workspace));
    store.ensure_dir()?;

    let sink_store = Arc::clone(&store);
    let sink: Arc<agenttrust_witness::Sink> = Arc::new(move |events| {
        for (source, event) in events {
            let prev_hash = sink_store.last_hash::<WitnessPayload>();
            let record: HashChainRecord<WitnessPayload> = HashChainRecord::new(
                WitnessPayload { source, event, correlated: false, correlated_entry_id: None },
                prev_hash,
            );
            if let Err(e) = sink_store.append(&record) {
                error!(error = %e, "witness append failed");
            }
        }
    });

    let daemon = Arc::new(WitnessDaemon::new(WitnessConfig::default(), sink));
    daemon.start();
    info!(seconds, "witness daemon running");
    tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;
    daemon.stop();

    let stats = daemon.get_stats();
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "eventsBySource": stats.events_by_source,
        "lastEventAt": stats.last_event_at,
    }))?);
    Ok(())
}

// ─── Digest ──────────────────────────────────────────────────────────────────

fn cmd_digest(workspace: &std::path::Path, range: &str) -> anyhow::Result<()> {
    let time_range = parse_time_range(range)?;
    let filter = EntryFilter { time_range: Some(time_range), ..Default::default() };

    let execution_log = ExecutionLog::new(workspace);
    let claim_log = ClaimLog::new(workspace);
    let executions = query::<ExecutionPayload>(execution_log.store(), &filter);
    let claims = query::<ClaimPayload>(claim_log.store(), &filter);

    let config = RuleConfig::default_preset();
    let rules = default_catalog();
    let batch = evaluate_batch(&executions, &claims, &rules, &config);

    let digest = generate_digest(&executions, &claims, time_range.from, time_range.to, &batch.matches);
    println!("{}", serde_json::to_string_pretty(&digest)?);

    let integrity = agenttrust_audit::integrity_score(&execution_log.verify_all());
    let verdict = compute_trust_verdict(integrity, digest.consistency_score, 100);
    info!(score = verdict.score, level = ?verdict.level, "trust verdict for digest window");

    Ok(())
}
