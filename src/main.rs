//! Sprint Scheduler
//!
//! Runs one scheduler shard against a shared SQLite store, or drives the
//! sprint commands from the terminal.

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use sprint_scheduler::cli::{Cli, Command, ExecArgs};
use sprint_scheduler::commands::CommandHandler;
use sprint_scheduler::config::Config;
use sprint_scheduler::db::{Database, now_secs};
use sprint_scheduler::logging::{LogOutput, init_tracing};
use sprint_scheduler::notifier::{Interaction, Invocation, LogNotifier, Notifier, StdoutNotifier};
use sprint_scheduler::scheduler::TaskScheduler;
use sprint_scheduler::sprint::SprintLifecycle;
use sprint_scheduler::types::{GuildId, UserId};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

/// Terminal stand-in for the chat layer: questions are answered on stdin and
/// every user counts as present.
struct StdinInteraction;

#[async_trait]
impl Interaction for StdinInteraction {
    async fn confirm(&self, _invocation: &Invocation, prompt: &str) -> bool {
        println!("{} [y/N]", prompt);
        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(e) => {
                warn!(error = %e, "failed to read confirmation");
                false
            }
        }
    }

    async fn members_present(&self, _guild: GuildId, users: &[UserId]) -> Vec<UserId> {
        users.to_vec()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&LogOutput::parse(&cli.log), cli.verbose)?;

    let mut config = Config::discover(cli.config.as_deref().map(Path::new))?;
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.into();
    }
    config.ensure_db_dir()?;

    let db = Arc::new(Database::open(&config.server.db_path)?);
    info!(
        db = %config.server.db_path.display(),
        shard = config.server.shard_id,
        "database opened"
    );

    match cli.command {
        Some(Command::Sweep) => {
            let scheduler = build_scheduler(db, &config, Arc::new(LogNotifier));
            let released = scheduler.sweep(now_secs())?;
            println!("released {} stale claims", released);
        }
        Some(Command::Tasks) => {
            let tasks = db.list_tasks()?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        Some(Command::Exec(args)) => {
            run_exec(db, &config, args).await?;
        }
        Some(Command::Serve) | None => {
            run_server(db, &config).await?;
        }
    }

    Ok(())
}

fn build_scheduler(db: Arc<Database>, config: &Config, notifier: Arc<dyn Notifier>) -> TaskScheduler {
    let lifecycle = SprintLifecycle::new(Arc::clone(&db), notifier, config.sprint.clone());
    TaskScheduler::new(
        db,
        lifecycle,
        config.scheduler.clone(),
        config.server.shard_id,
    )
}

async fn run_server(db: Arc<Database>, config: &Config) -> Result<()> {
    let scheduler = Arc::new(build_scheduler(db, config, Arc::new(LogNotifier)));
    scheduler.bootstrap(now_secs())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("interrupt received");
    let _ = shutdown_tx.send(true);
    handle.await?;
    Ok(())
}

async fn run_exec(db: Arc<Database>, config: &Config, args: ExecArgs) -> Result<()> {
    let lifecycle = SprintLifecycle::new(db, Arc::new(StdoutNotifier), config.sprint.clone());
    let handler = CommandHandler::new(lifecycle, Arc::new(StdinInteraction));
    let invocation = Invocation {
        guild: args.guild,
        channel: args.channel,
        user: args.user,
        can_manage_messages: args.manager,
    };
    // The failure has already been printed as the reply.
    if let Err(e) = handler.dispatch(&invocation, args.args.as_slice(), now_secs()).await {
        std::process::exit(if e.code.is_internal() { 2 } else { 1 });
    }
    Ok(())
}
