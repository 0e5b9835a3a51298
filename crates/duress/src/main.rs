use std::sync::Arc;

use clap::{Parser, Subcommand};

use duress_core::{
    actions::account::AccountOp,
    config::Config,
    location::StaticLocation,
    notifications::NotificationCenter,
    ports::StaticSessions,
    runner::ActionRunner,
    store::JsonFileStore,
    utils::truncate_text,
};
use duress_telegram::{Bot, TelegramSession};

#[derive(Parser)]
#[command(author, version, about = "Run the configured panic actions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute every configured action and wait for decoy confirmations
    Trigger,
    /// Print the configured actions without touching the remote service
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    duress_core::logging::init("duress")?;
    let cli = Cli::parse();

    let cfg = Config::load()?;
    let notifications = Arc::new(NotificationCenter::new());
    let store = Arc::new(JsonFileStore::new(cfg.actions_file.clone()));

    match cli.command.unwrap_or(Commands::Trigger) {
        Commands::Trigger => {
            let session = TelegramSession::new(
                Bot::new(cfg.bot_token()?),
                cfg.account_id,
                notifications.clone(),
                cfg.recent_messages,
            );
            let sessions = StaticSessions::new().with(Arc::new(session));
            let mut runner = ActionRunner::load(Arc::new(sessions), notifications, store)?
                .with_location(Arc::new(StaticLocation(cfg.location)))
                .with_confirmation_timeout(cfg.confirmation_timeout);

            let report = runner.trigger().await;
            if !runner.wait_for_confirmations(cfg.confirmation_timeout).await {
                tracing::warn!(
                    outstanding = runner.outstanding().await,
                    "some decoy messages were not confirmed in time"
                );
            }
            println!(
                "ran {} action(s) for {} account(s), skipped {}",
                report.actions_run, report.accounts_run, report.accounts_skipped
            );
        }
        Commands::Show => {
            let runner =
                ActionRunner::load(Arc::new(StaticSessions::new()), notifications, store)?;
            show(&runner, &cfg);
        }
    }

    Ok(())
}

fn show(runner: &ActionRunner, cfg: &Config) {
    println!("actions file: {}", cfg.actions_file.display());
    if runner.accounts().is_empty() {
        println!("no actions configured");
        return;
    }
    for bundle in runner.accounts() {
        println!("account {}:", bundle.account_id);
        println!("  chats to remove: {}", bundle.chats_to_remove().len());
        println!("  decoy messages: {}", bundle.decoy_messages().len());
        for entry in bundle.decoy_messages() {
            println!(
                "    -> {}: {}{}",
                entry.target_id,
                truncate_text(&entry.text, 40),
                if entry.append_geolocation { " (+location)" } else { "" }
            );
        }
        for op in AccountOp::ALL {
            if bundle.is_enabled(op) {
                println!("  {}", op.as_str());
            }
        }
    }
}
