// Settleline CLI - headless reconciliation runs against the durable store

mod exit_codes;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use settleline_engine::config::EngineConfig;
use settleline_engine::model::{
    query_master, LifecycleStatus, MasterFilter, MasterRecord, MonthKey, OrderKey, PaymentType,
    RunDiff,
};
use settleline_engine::{anomaly, engine, report, ReconError};
use settleline_store::{load_batches, scan_directory, Store, StoreError};

use exit_codes::{
    EXIT_CONFIG_INVALID, EXIT_ERROR, EXIT_INGEST, EXIT_RUN_ANOMALIES, EXIT_RUN_REJECTS,
    EXIT_STORE, EXIT_SUCCESS, EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "sline")]
#[command(about = "Order reconciliation - orders vs returns vs marketplace settlements")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a data directory and run reconciliation
    #[command(after_help = "\
Examples:
  sline run data/
  sline run data/ --config close.toml --store state/settleline.db
  sline run data/ --json > result.json
  sline run data/ --dry-run")]
    Run {
        /// Directory with orders-MM-YYYY.csv / returns-MM-YYYY.csv /
        /// settlement-MM-YYYY.csv exports
        #[arg(default_value = "data")]
        data_dir: PathBuf,

        /// SQLite state file
        #[arg(long, default_value = "settleline.db")]
        store: PathBuf,

        /// TOML config; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output the full run result as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Write the JSON result to a file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Compute everything but commit nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the report for the stored master dataset
    Report {
        #[arg(long, default_value = "settleline.db")]
        store: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Output JSON instead of the text report
        #[arg(long)]
        json: bool,
    },

    /// List master records with optional filters
    #[command(after_help = "\
Examples:
  sline list --status completed_pending_settlement
  sline list --payment postpaid --from 01-2025 --to 03-2025")]
    List {
        #[arg(long, default_value = "settleline.db")]
        store: PathBuf,

        /// cancelled | returned | completed_settled | completed_pending_settlement
        #[arg(long)]
        status: Option<String>,

        /// prepaid | postpaid
        #[arg(long)]
        payment: Option<String>,

        /// MM-YYYY inclusive lower bound on the order month
        #[arg(long)]
        from: Option<String>,

        /// MM-YYYY inclusive upper bound on the order month
        #[arg(long)]
        to: Option<String>,
    },

    /// Re-scan the stored dataset for anomalies
    Anomalies {
        #[arg(long, default_value = "settleline.db")]
        store: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Validate a config file without running
    Validate {
        /// Path to the TOML config file
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            data_dir,
            store,
            config,
            json,
            output,
            dry_run,
        } => cmd_run(data_dir, store, config, json, output, dry_run),
        Commands::Report {
            store,
            config,
            json,
        } => cmd_report(store, config, json),
        Commands::List {
            store,
            status,
            payment,
            from,
            to,
        } => cmd_list(store, status, payment, from, to),
        Commands::Anomalies {
            store,
            config,
            json,
        } => cmd_anomalies(store, config, json),
        Commands::Validate { config } => cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("error: {}", e.message);
            if let Some(hint) = e.hint {
                eprintln!("hint:  {hint}");
            }
            ExitCode::from(e.code)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

// ============================================================================
// run
// ============================================================================

fn cmd_run(
    data_dir: PathBuf,
    store_path: PathBuf,
    config_path: Option<PathBuf>,
    json: bool,
    output: Option<PathBuf>,
    dry_run: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;

    let sets = scan_directory(&data_dir).map_err(CliError::ingest)?;
    if sets.is_empty() {
        return Err(CliError {
            code: EXIT_INGEST,
            message: format!("no batch files found in {}", data_dir.display()),
            hint: Some(
                "expected orders-MM-YYYY.csv, returns-MM-YYYY.csv, settlement-MM-YYYY.csv".into(),
            ),
        });
    }
    let (batches, ingest_rejects) = load_batches(&sets).map_err(CliError::ingest)?;

    let mut store = Store::open(&store_path).map_err(CliError::store)?;
    let previous_master = store.load_master().map_err(CliError::store)?;
    let previous_snapshot = store.load_snapshot().map_err(CliError::store)?;

    let mut result = engine::run(
        &config,
        previous_master,
        &batches,
        previous_snapshot.as_ref(),
    )
    .map_err(CliError::config)?;

    // Parse-level rejects join the engine's semantic ones.
    result.rejects.extend(ingest_rejects);
    result.report.rejected_records = result.rejects.len();

    if !dry_run {
        store
            .commit_run(&result.master, &result.snapshot)
            .map_err(CliError::store)?;
    }

    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| CliError::misc(format!("JSON serialization error: {e}")))?;
    if let Some(ref path) = output {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::misc(format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }
    if json {
        println!("{json_str}");
    } else {
        println!("{}", engine::report_text(&result));
    }

    let r = &result.report;
    eprintln!(
        "run '{}': {} orders - {} settled, {} pending, {} returned, {} cancelled",
        config.name, r.total_orders, r.completed_settled, r.completed_pending, r.returned,
        r.cancelled,
    );
    eprintln!(
        "records: {} accepted, {} rejected, {} anomalies{}",
        r.accepted_records,
        r.rejected_records,
        r.anomaly_count,
        if dry_run { " (dry run, nothing committed)" } else { "" },
    );
    eprintln!(
        "changes: {} status, {} newly settled, {} newly pending",
        r.status_changes, r.newly_settled, r.newly_pending,
    );

    if r.rejected_records > 0 {
        return Err(CliError {
            code: EXIT_RUN_REJECTS,
            message: format!("{} records rejected", r.rejected_records),
            hint: Some("see the rejects list in --json output".into()),
        });
    }
    if r.anomaly_count > 0 {
        return Err(CliError {
            code: EXIT_RUN_ANOMALIES,
            message: format!("{} anomalies flagged", r.anomaly_count),
            hint: Some("run `sline anomalies` for details".into()),
        });
    }
    Ok(())
}

// ============================================================================
// report
// ============================================================================

fn cmd_report(
    store_path: PathBuf,
    config_path: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let master = load_master_map(&store_path)?;

    let anomalies = anomaly::scan(&master, &[], config.tolerance.amount_paise);
    let built = report::build_report(&config, &master, &RunDiff::default(), &anomalies, &[]);

    if json {
        let json_str = serde_json::to_string_pretty(&built)
            .map_err(|e| CliError::misc(format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    } else {
        println!("{}", report::render_text(&built));
    }
    Ok(())
}

// ============================================================================
// list
// ============================================================================

fn cmd_list(
    store_path: PathBuf,
    status: Option<String>,
    payment: Option<String>,
    from: Option<String>,
    to: Option<String>,
) -> Result<(), CliError> {
    let filter = MasterFilter {
        key: None,
        from_month: parse_month_arg(from.as_deref(), "--from")?,
        to_month: parse_month_arg(to.as_deref(), "--to")?,
        status: match status.as_deref() {
            None => None,
            Some(s) => Some(LifecycleStatus::from_code(s).ok_or_else(|| {
                CliError::args(format!("unknown status '{s}'")).with_hint(
                    "one of: cancelled, returned, completed_settled, completed_pending_settlement",
                )
            })?),
        },
        payment_type: match payment.as_deref() {
            None => None,
            Some(p) => Some(PaymentType::parse(p).ok_or_else(|| {
                CliError::args(format!("unknown payment type '{p}'"))
                    .with_hint("one of: prepaid, postpaid")
            })?),
        },
    };

    let store = Store::open(&store_path).map_err(CliError::store)?;
    let records = store.load_master().map_err(CliError::store)?;
    let selected = query_master(&records, &filter);

    for record in &selected {
        let status = record
            .status
            .map(|s| s.code().to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{}\t{}\t{}\t{}\t{:.2}",
            record.key,
            record.month(),
            status,
            record.order.payment_type,
            record.order.final_amount_paise as f64 / 100.0,
        );
    }
    eprintln!("{} of {} records", selected.len(), records.len());
    Ok(())
}

fn parse_month_arg(arg: Option<&str>, flag: &str) -> Result<Option<MonthKey>, CliError> {
    match arg {
        None => Ok(None),
        Some(s) => MonthKey::parse(s).map(Some).ok_or_else(|| {
            CliError::args(format!("{flag}: expected MM-YYYY, got '{s}'"))
        }),
    }
}

// ============================================================================
// anomalies
// ============================================================================

fn cmd_anomalies(
    store_path: PathBuf,
    config_path: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let master = load_master_map(&store_path)?;
    let anomalies = anomaly::scan(&master, &[], config.tolerance.amount_paise);

    if json {
        let json_str = serde_json::to_string_pretty(&anomalies)
            .map_err(|e| CliError::misc(format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    } else {
        for a in &anomalies {
            println!("{}: {} ({})", a.key, a.code, a.details);
        }
    }
    eprintln!("{} anomalies over {} records", anomalies.len(), master.len());
    Ok(())
}

// ============================================================================
// validate
// ============================================================================

fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    eprintln!(
        "valid: '{}' (tolerance {} paise, settlement rate floor {:.1}%, return rate ceiling {:.1}%)",
        config.name,
        config.tolerance.amount_paise,
        config.thresholds.min_settlement_rate_pct,
        config.thresholds.max_return_rate_pct,
    );
    Ok(())
}

// ============================================================================
// shared helpers
// ============================================================================

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig, CliError> {
    match path {
        None => Ok(EngineConfig::default()),
        Some(path) => read_config(&path),
    }
}

fn read_config(path: &PathBuf) -> Result<EngineConfig, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        CliError::args(format!("cannot read config {}: {e}", path.display()))
    })?;
    EngineConfig::from_toml(&raw).map_err(CliError::config)
}

fn load_master_map(store_path: &PathBuf) -> Result<BTreeMap<OrderKey, MasterRecord>, CliError> {
    let store = Store::open(store_path).map_err(CliError::store)?;
    let records = store.load_master().map_err(CliError::store)?;
    Ok(records.into_iter().map(|r| (r.key.clone(), r)).collect())
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self {
            code: EXIT_USAGE,
            message: msg.into(),
            hint: None,
        }
    }

    pub fn misc(msg: impl Into<String>) -> Self {
        Self {
            code: EXIT_ERROR,
            message: msg.into(),
            hint: None,
        }
    }

    pub fn config(err: ReconError) -> Self {
        Self {
            code: EXIT_CONFIG_INVALID,
            message: err.to_string(),
            hint: None,
        }
    }

    pub fn store(err: StoreError) -> Self {
        Self {
            code: EXIT_STORE,
            message: err.to_string(),
            hint: None,
        }
    }

    pub fn ingest(err: StoreError) -> Self {
        Self {
            code: EXIT_INGEST,
            message: err.to_string(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
