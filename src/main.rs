use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use swap_orchestrator::{
    arguments,
    config::{self, Config},
    ledger::SimulatedLedger,
    logger::{self, LogTag},
    notifications::notifier_from_config,
    paths,
    store::{StrategyStore, SwapDatabase, TaskRegistry, TaskStatusSource},
    volume::{
        default_factory, AttemptStatus, DeleteScope, DeltaQuery, DeltaSortKey, Direction,
        EngineDeps, EngineSettings, HistoryFilter, RunOutcome, RunReport, RunRequest,
        StrategyPreset, SweepRequest, SwapEngine, TaskStatus,
    },
};

/// Swap orchestration against the simulated ledger
///
/// Logger flags (`--debug-<tag>`, `--verbose`, `--quiet`) are accepted
/// anywhere on the command line.
#[derive(Parser)]
#[command(name = "swap-orchestrator", version, about)]
struct Cli {
    /// Config file, defaults to the data directory's config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    owner: String,
    #[arg(long)]
    strategy: String,
    /// Repeat for each wallet
    #[arg(long = "wallet", required = true)]
    wallets: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a stored strategy until its threshold is consumed
    Run(RunArgs),
    /// Run a stored strategy bound to a task
    Track {
        #[command(flatten)]
        run: RunArgs,
        /// Existing task id; a new task is created when omitted
        #[arg(long)]
        task: Option<String>,
        #[arg(long, default_value = "cli")]
        job: String,
    },
    /// Swap every wallet's full input balance
    Sweep {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        pool: String,
        /// a2b or b2a
        #[arg(long)]
        direction: Direction,
        #[arg(long)]
        slippage: Option<f64>,
        #[arg(long)]
        decimals_a: u8,
        #[arg(long)]
        decimals_b: u8,
        #[arg(long = "wallet", required = true)]
        wallets: Vec<String>,
    },
    /// Request cancellation of the owner's active run
    Cancel {
        #[arg(long)]
        owner: String,
    },
    /// Show whether the owner has an active run and its last summary
    State {
        #[arg(long)]
        owner: String,
    },
    /// List or clean up swap history
    History {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        status: Option<AttemptStatus>,
        #[arg(long)]
        wallet: Option<String>,
        #[arg(long)]
        pool: Option<String>,
        /// Delete failed ad-hoc records instead of listing
        #[arg(long)]
        delete_failed: bool,
    },
    /// Per-wallet deltas of a task
    Deltas {
        #[arg(long)]
        task: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        size: u32,
        /// created_at, wallet, token_a_change, token_b_change or gas_used
        #[arg(long, default_value = "created_at")]
        sort: DeltaSortKey,
        #[arg(long)]
        desc: bool,
    },
    /// Manage strategy presets
    Strategy {
        #[command(subcommand)]
        action: StrategyCommand,
    },
    /// Manage tracked tasks
    Task {
        #[command(subcommand)]
        action: TaskCommand,
    },
}

#[derive(Subcommand)]
enum StrategyCommand {
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        pool: String,
        #[arg(long)]
        direction: Direction,
        #[arg(long)]
        lower: f64,
        #[arg(long)]
        upper: f64,
        #[arg(long)]
        decimals_a: u8,
        #[arg(long)]
        decimals_b: u8,
        #[arg(long)]
        slippage: Option<f64>,
        /// Human units of the input token, e.g. 250.5
        #[arg(long)]
        threshold: String,
    },
    List,
    Remove {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum TaskCommand {
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
    },
    Status {
        #[arg(long)]
        task: String,
        /// Set the status instead of showing it
        #[arg(long)]
        set: Option<TaskStatus>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = paths::ensure_all_directories() {
        eprintln!("Failed to create required directories: {}", e);
        std::process::exit(1);
    }
    logger::init();

    let cli = Cli::parse_from(arguments::cli_args());
    let code = match execute(cli).await {
        Ok(()) => 0,
        Err(e) => {
            logger::error(LogTag::System, &format!("{:#}", e));
            1
        }
    };
    logger::flush();
    std::process::exit(code);
}

async fn execute(cli: Cli) -> Result<()> {
    match &cli.config {
        Some(path) => config::load_config_from_path(path),
        None => config::load_config(),
    }
    .map_err(|e| anyhow!(e))?;
    let cfg = config::get_config_clone();

    let db = Arc::new(SwapDatabase::from_config(&cfg.database).context("opening swap database")?);
    logger::debug(
        LogTag::Database,
        &format!("Using database {}", db.path().display()),
    );

    match cli.command {
        Commands::Run(args) => {
            let engine = build_engine(&cfg, db)?;
            match engine.run_adhoc(run_request(args)).await? {
                RunOutcome::Completed(report) => print_report(&report),
                RunOutcome::Rejected(reason) => bail!("run rejected: {}", reason),
            }
        }
        Commands::Track { run, task, job } => {
            let task_id = match task {
                Some(id) => id,
                None => db.create_task(&run.owner, &job).await?.task_id,
            };
            let engine = build_engine(&cfg, db.clone())?;
            let report = engine.run_tracked(run_request(run), &task_id, &job).await;
            if db.status(&task_id).await? == TaskStatus::Active {
                db.set_task_status(&task_id, TaskStatus::Completed).await?;
            }
            println!("{} {}", "Task:".bold(), task_id);
            print_report(&report);
        }
        Commands::Sweep {
            owner,
            pool,
            direction,
            slippage,
            decimals_a,
            decimals_b,
            wallets,
        } => {
            let engine = build_engine(&cfg, db)?;
            let request = SweepRequest {
                owner,
                pool_address: pool,
                direction,
                slippage: slippage.unwrap_or(cfg.engine.default_slippage),
                wallets,
                decimals_a,
                decimals_b,
            };
            match engine.run_sweep(request).await? {
                RunOutcome::Completed(report) => print_report(&report),
                RunOutcome::Rejected(reason) => bail!("sweep rejected: {}", reason),
            }
        }
        Commands::Cancel { owner } => {
            build_engine(&cfg, db)?.cancel(&owner).await?;
            println!("Cancel requested for {}", owner.to_lowercase());
        }
        Commands::State { owner } => {
            let state = build_engine(&cfg, db)?.run_state(&owner).await?;
            let active = if state.active {
                "active".green()
            } else {
                "idle".yellow()
            };
            println!("{} {}", "State:".bold(), active);
            println!("{} {}", "Last:".bold(), state.last_summary);
        }
        Commands::History {
            owner,
            status,
            wallet,
            pool,
            delete_failed,
        } => {
            let engine = build_engine(&cfg, db)?;
            if delete_failed {
                let scope = match pool {
                    Some(pool) => DeleteScope::Pool(pool),
                    None => DeleteScope::AllPools,
                };
                let removed = engine.delete_failed_history(&owner, &scope).await?;
                println!("Deleted {} failed records", removed);
                return Ok(());
            }
            let filter = HistoryFilter {
                status,
                wallet: wallet.map(|w| w.to_lowercase()),
                pool_address: pool,
                ..HistoryFilter::for_owner(&owner)
            };
            for record in engine.query_history(&filter).await? {
                let status = match record.status {
                    AttemptStatus::Success => "success".green(),
                    AttemptStatus::Failure => "failure".red(),
                };
                println!(
                    "{} {} {} {} in={} out={} gas={} tx={}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    status,
                    record.wallet,
                    record.direction,
                    record.amount_in,
                    record.amount_out,
                    record.gas_net,
                    record.tx_reference.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Deltas {
            task,
            page,
            size,
            sort,
            desc,
        } => {
            let engine = build_engine(&cfg, db)?;
            let query = DeltaQuery {
                page,
                size,
                sort,
                descending: desc,
                ..DeltaQuery::new(&task)
            };
            let result = engine.task_deltas(&query).await?;
            println!(
                "{} page {} of {} rows (size {})",
                "Deltas:".bold(),
                result.page,
                result.total,
                result.size
            );
            for row in result.items {
                println!(
                    "{} a={} b={} gas={}",
                    row.wallet, row.token_a_change, row.token_b_change, row.gas_used
                );
            }
        }
        Commands::Strategy { action } => strategy_command(&cfg, db.as_ref(), action).await?,
        Commands::Task { action } => match action {
            TaskCommand::Create { owner, name } => {
                let task = db.create_task(&owner, &name).await?;
                println!("{}", task.task_id);
            }
            TaskCommand::Status { task, set } => {
                if let Some(status) = set {
                    db.set_task_status(&task, status).await?;
                }
                let record = db
                    .get_task(&task)
                    .await?
                    .ok_or_else(|| anyhow!("task {} not found", task))?;
                println!("{} {} ({})", record.task_id, record.status, record.name);
            }
        },
    }
    Ok(())
}

fn build_engine(cfg: &Config, db: Arc<SwapDatabase>) -> Result<Arc<SwapEngine>> {
    let ledger = Arc::new(SimulatedLedger::new(cfg.simulation.clone()));
    let notifier = Arc::from(notifier_from_config(&cfg.notifier)?);
    let deps = EngineDeps::from_store(db, ledger, notifier);
    Ok(Arc::new(SwapEngine::new(
        deps,
        EngineSettings::from_config(cfg),
        default_factory(cfg.simulation.seed),
    )))
}

fn run_request(args: RunArgs) -> RunRequest {
    RunRequest {
        owner: args.owner,
        strategy_id: args.strategy,
        wallets: args.wallets,
    }
}

async fn strategy_command(cfg: &Config, db: &SwapDatabase, action: StrategyCommand) -> Result<()> {
    match action {
        StrategyCommand::Add {
            id,
            name,
            pool,
            direction,
            lower,
            upper,
            decimals_a,
            decimals_b,
            slippage,
            threshold,
        } => {
            let preset = StrategyPreset {
                id,
                name,
                pool_address: pool,
                direction,
                lower_bound: lower,
                upper_bound: upper,
                decimals_a,
                decimals_b,
                slippage: slippage.unwrap_or(cfg.engine.default_slippage),
                stop_threshold: threshold,
            };
            // Resolving once surfaces bad bounds or thresholds before storing
            preset.to_run_config("validation", &["validation".to_string()], 1, None)?;
            db.upsert_strategy(&preset).await?;
            println!("Saved strategy {}", preset.id);
        }
        StrategyCommand::List => {
            for preset in db.list_strategies().await? {
                println!(
                    "{} {} pool={} {} [{}, {}] threshold={}",
                    preset.id.bold(),
                    preset.name,
                    preset.pool_address,
                    preset.direction,
                    preset.lower_bound,
                    preset.upper_bound,
                    preset.stop_threshold
                );
            }
        }
        StrategyCommand::Remove { id } => {
            if db.delete_strategy(&id).await? {
                println!("Removed strategy {}", id);
            } else {
                bail!("strategy {} not found", id);
            }
        }
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let headline = if report.stop_reason.is_failure() {
        report.summary.red()
    } else {
        report.summary.green()
    };
    println!("{} {}", "Result:".bold(), headline);
    println!(
        "{} {:?}, consumed {}, remaining {}, gas {}",
        "Stop:".bold(),
        report.stop_reason,
        report.consumed,
        report.remaining,
        report.gas_used
    );
    if let Some(error) = &report.error {
        println!("{} {}", "Error:".bold(), error.red());
    }
}
