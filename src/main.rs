use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use watch_bot::application::errors::{BotError, ConfigError};
use watch_bot::application::messaging::{
    LoggingMiddleware, MessageDispatcher, MessageParser, RateLimitMiddleware,
};
use watch_bot::application::services::{ChangePoller, CommandService, PollScheduler, TrackerCommands};
use watch_bot::domain::traits::{Bot, TargetStore, UpdateSource};
use watch_bot::infrastructure::adapters::{ConsoleAdapter, TelegramAdapter};
use watch_bot::infrastructure::config::{AdapterChoice, Config, TelegramConfig};
use watch_bot::infrastructure::database::{Database, SqliteTargetStore};
use watch_bot::infrastructure::source::DynamicSource;
use watch_bot::infrastructure::storage::MemoryStore;

#[derive(Parser)]
#[command(name = "watch-bot")]
#[command(about = "Tracks account dynamics and notifies subscribed chats", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Bot token (overrides config)
    #[arg(short, long)]
    token: Option<String>,

    /// Keep state in memory instead of the database file
    #[arg(long)]
    memory: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot and the poller
    Run,
    /// Run a single poll tick and exit
    PollOnce,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => run_bot(&cli).await,
        Commands::PollOnce => poll_once(&cli).await,
        Commands::Version => {
            println!("watch-bot v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig => init_config(),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(path: &str, token_override: Option<String>) -> Result<Config, ConfigError> {
    let mut config = if Path::new(path).exists() {
        Config::load(path)?.with_env()
    } else {
        tracing::info!("{} not found, using defaults", path);
        Config::load_env()
    };

    if let Some(token) = token_override {
        config.adapters.telegram = Some(TelegramConfig {
            enabled: true,
            token: Some(token),
        });
    }

    config.validate()?;
    Ok(config)
}

async fn build_store(config: &Config, memory: bool) -> Result<Arc<dyn TargetStore>, BotError> {
    let store: Arc<dyn TargetStore> = if memory {
        tracing::warn!("Using in-memory store, state is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        let db = Database::open(&config.storage.data_dir, &config.storage.db_file)?;
        tracing::info!("Database at {}", db.path().display());
        Arc::new(SqliteTargetStore::new(db))
    };
    store.init().await?;
    Ok(store)
}

fn build_source(config: &Config) -> Result<Arc<dyn UpdateSource>, BotError> {
    Ok(Arc::new(DynamicSource::new(&config.source, config.fetch_timeout())?))
}

fn build_dispatcher(
    config: &Config,
    store: Arc<dyn TargetStore>,
    source: Arc<dyn UpdateSource>,
) -> MessageDispatcher {
    let mut commands = CommandService::new(&config.bot.prefix);
    commands.register_defaults();
    TrackerCommands::new(store, source).register(&mut commands);

    let limit = &config.security.rate_limit;
    MessageDispatcher::new(commands)
        .with_middleware(LoggingMiddleware)
        .with_middleware(RateLimitMiddleware::new(limit.max_requests, limit.window_seconds))
}

fn start_poller(
    config: &Config,
    store: Arc<dyn TargetStore>,
    source: Arc<dyn UpdateSource>,
    bot: Arc<dyn Bot>,
) -> Option<Arc<PollScheduler>> {
    if !config.poller.enabled {
        tracing::info!("Poller disabled");
        return None;
    }
    let poller = Arc::new(ChangePoller::new(store, source, bot, config.fetch_timeout()));
    let scheduler = PollScheduler::new(poller, config.poll_interval());
    scheduler.start();
    Some(scheduler)
}

async fn run_bot(cli: &Cli) -> Result<(), BotError> {
    let config = load_config(&cli.config, cli.token.clone())?;
    tracing::info!("Starting {}", config.bot.name);

    let store = build_store(&config, cli.memory).await?;
    let source = build_source(&config)?;
    let dispatcher = build_dispatcher(&config, store.clone(), source.clone());

    match config.adapter()? {
        AdapterChoice::Telegram(token) => {
            let mut bot = TelegramAdapter::new(token);
            bot.fetch_bot_info().await?;
            let bot = Arc::new(bot);
            let scheduler = start_poller(&config, store, source, bot.clone());

            tokio::select! {
                _ = run_telegram_bot(&bot, &dispatcher) => {}
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
            }
            if let Some(scheduler) = scheduler {
                scheduler.stop();
            }
        }
        AdapterChoice::Console => {
            let bot = Arc::new(ConsoleAdapter::new());
            let scheduler = start_poller(&config, store, source, bot.clone());

            tokio::select! {
                _ = run_console_bot(&bot, &dispatcher) => {}
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
            }
            if let Some(scheduler) = scheduler {
                scheduler.stop();
            }
        }
    }
    Ok(())
}

async fn run_telegram_bot(bot: &TelegramAdapter, dispatcher: &MessageDispatcher) {
    if let Err(e) = bot.start().await {
        tracing::error!("Failed to start bot: {}", e);
        return;
    }

    let info = bot.bot_info();
    tracing::info!("Bot started: @{}", info.username);
    let mention = format!("@{}", info.username);

    let mut offset: i64 = 0;
    let timeout_seconds = 30;

    loop {
        match bot.get_updates(offset, timeout_seconds).await {
            Ok(updates) => {
                if let Some(next) = TelegramAdapter::get_next_offset(&updates) {
                    offset = next;
                }
                for update in &updates {
                    let Some(mut message) = update.message.as_ref().and_then(|m| m.to_domain())
                    else {
                        continue;
                    };
                    // Group members may address the bot by mention
                    message.text = message.text.replace(&mention, "").trim().to_string();

                    if let Some(reply) = dispatcher.dispatch(&message).await {
                        if let Err(e) = bot.send_message(&message.channel, &reply).await {
                            tracing::warn!("Failed to reply to {}: {}", message.channel, e);
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Failed to get updates: {}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

async fn run_console_bot(bot: &ConsoleAdapter, dispatcher: &MessageDispatcher) {
    if let Err(e) = bot.start().await {
        tracing::error!("Failed to start bot: {}", e);
        return;
    }
    println!("Type a command (help for a list). Prefix a line with @group:<id> to act as a group.");

    let parser = MessageParser::new(bot.channel(), "console");
    while let Some(line) = bot.read_line().await {
        if line.is_empty() {
            continue;
        }
        let message = parser.parse(&line, None);
        if let Some(reply) = dispatcher.dispatch(&message).await {
            if let Err(e) = bot.send_message(&message.channel, &reply).await {
                tracing::warn!("Failed to reply: {}", e);
            }
        }
    }
    tracing::info!("End of input");
}

async fn poll_once(cli: &Cli) -> Result<(), BotError> {
    let config = load_config(&cli.config, cli.token.clone())?;
    let store = build_store(&config, cli.memory).await?;
    let source = build_source(&config)?;

    let bot: Arc<dyn Bot> = match config.adapter()? {
        AdapterChoice::Telegram(token) => Arc::new(TelegramAdapter::new(token)),
        AdapterChoice::Console => Arc::new(ConsoleAdapter::new()),
    };

    let poller = ChangePoller::new(store, source, bot, config.fetch_timeout());
    let report = poller
        .run_tick()
        .await
        .ok_or_else(|| BotError::Internal("poll tick skipped".to_string()))?;

    println!(
        "checked {}, baselined {}, updated {}, unchanged {}, fetch failures {}, storage failures {}, delivered {}, delivery failures {}",
        report.checked,
        report.baselined,
        report.updated,
        report.unchanged,
        report.fetch_failed,
        report.storage_failed,
        report.delivered,
        report.delivery_failed,
    );
    Ok(())
}

fn init_config() -> Result<(), BotError> {
    let yaml = Config::default().to_yaml()?;
    println!("{}", yaml);
    println!("\nSave this to config.yaml and adjust as needed.");
    Ok(())
}
