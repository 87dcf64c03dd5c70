use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use aistudio::api::ApiClient;
use aistudio::banner::{BannerInfo, print_banner};
use aistudio::callbacks::{CallbackRegistry, CallbackSpec, LOG_CALLBACK, LogCallback};
use aistudio::config::{
    Config, KEY_API_TOKEN, KEY_PASSWORD, KEY_SIGNING_SECRET, KNOWN_KEYS, Settings,
};
use aistudio::consts::default_db_path;
use aistudio::events::{Event, EventBus};
use aistudio::files::DirectoryFileSource;
use aistudio::spinner::Spinner;
use aistudio::storage::Storage;
use aistudio::storage::sqlite::SqliteStorage;
use aistudio::tasks::{ChatOptions, TaskResponse, TaskService};
use aistudio::webhook::{WebhookHandler, server};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);
const SECRET_KEYS: &[&str] = &[KEY_API_TOKEN, KEY_PASSWORD, KEY_SIGNING_SECRET];

#[derive(Parser)]
#[command(
    name = "aistudio",
    version,
    about = "Run AI Studio agents and receive their results."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database for config and task storage [default: ~/.aistudio/aistudio.db]
    #[arg(short, long, global = true)]
    db: Option<PathBuf>,

    /// Directory that file references are resolved against
    #[arg(long, global = true, default_value = ".")]
    files_dir: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for AI Studio webhooks
    Serve {
        /// Address to bind the webhook listener to
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        listen: String,
    },
    /// Start a task for an agent
    Execute {
        /// Project code the agent belongs to
        #[arg(short, long)]
        project: String,

        /// Agent code
        #[arg(short, long)]
        agent: String,

        /// Task input as name=value; values that parse as JSON are sent as JSON
        #[arg(short, long = "input", value_parser = parse_input)]
        inputs: Vec<(String, Value)>,

        #[command(flatten)]
        callback: CallbackArgs,

        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Send a chat message to an existing task
    Chat {
        task_id: String,

        /// Message to send
        #[arg(short, long)]
        message: String,

        /// File to attach (repeatable)
        #[arg(short, long = "file")]
        files: Vec<String>,

        /// Code of a model to use for this turn
        #[arg(long)]
        model: Option<String>,

        #[command(flatten)]
        callback: CallbackArgs,

        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Wait for a task's result (requires `serve` running on the same database)
    Wait {
        task_id: String,

        /// Seconds to wait before giving up
        #[arg(short, long, default_value_t = 300)]
        timeout: u64,
    },
    /// Read and write stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
struct CallbackArgs {
    /// Name of the handler to run when the task is ready
    #[arg(long)]
    callback: Option<String>,

    /// Handler to run instead when the task fails
    #[arg(long, requires = "callback")]
    on_error: Option<String>,

    /// JSON passed to the handler
    #[arg(long, requires = "callback", value_parser = parse_json)]
    callback_data: Option<Value>,
}

impl CallbackArgs {
    fn spec(&self) -> Option<CallbackSpec> {
        let handler = self.callback.as_ref()?;
        let mut spec = CallbackSpec::new(handler);
        if let Some(on_error) = &self.on_error {
            spec = spec.on_error(on_error);
        }
        if let Some(data) = &self.callback_data {
            spec = spec.with_data(data.clone());
        }
        Some(spec)
    }
}

#[derive(clap::Args)]
struct WaitArgs {
    /// Block until the result arrives (requires `serve` running on the same database)
    #[arg(short, long)]
    wait: bool,

    /// Seconds to wait before giving up
    #[arg(short, long, default_value_t = 300)]
    timeout: u64,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Store a value
    Set { key: String, value: String },
    /// Print a value
    Get { key: String },
    /// Remove a value
    Unset { key: String },
    /// Print every stored value (secrets masked)
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set RUST_LOG=debug for request-level output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.clone().unwrap_or_else(default_db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db = db_path
        .to_str()
        .context("database path is not valid UTF-8")?
        .to_string();
    let config = Config::open(&db).context("failed to open config database")?;

    match cli.command {
        Command::Config { action } => handle_config(&config, action),
        Command::Serve { listen } => handle_serve(&config, &db_path, &listen).await,
        Command::Execute {
            project,
            agent,
            inputs,
            callback,
            wait,
        } => {
            let tasks = task_service(&config, &db, &cli.files_dir)?;
            let inputs: Map<String, Value> = inputs.into_iter().collect();
            let task_id = tasks
                .execute(&project, &agent, &inputs, callback.spec().as_ref())
                .await?;
            finish(&tasks, &task_id, &wait).await
        }
        Command::Chat {
            task_id,
            message,
            files,
            model,
            callback,
            wait,
        } => {
            let tasks = task_service(&config, &db, &cli.files_dir)?;
            let files: Vec<Value> = files.into_iter().map(Value::String).collect();
            let options = ChatOptions { model };
            let task_id = tasks
                .chat(&task_id, &files, &message, &options, callback.spec().as_ref())
                .await?;
            finish(&tasks, &task_id, &wait).await
        }
        Command::Wait { task_id, timeout } => {
            let tasks = task_service(&config, &db, &cli.files_dir)?;
            let response = wait_with_spinner(&tasks, &task_id, timeout).await?;
            print_response(&response)
        }
    }
}

fn task_service(config: &Config, db: &str, files_dir: &Path) -> anyhow::Result<TaskService> {
    let settings = Settings::load(config)?;
    let api = Arc::new(ApiClient::new(&settings)?);
    let storage: Arc<dyn Storage> =
        Arc::new(SqliteStorage::open(db).context("failed to open task storage")?);
    let files = Arc::new(DirectoryFileSource::new(files_dir));
    Ok(TaskService::new(api, storage, files))
}

async fn finish(tasks: &TaskService, task_id: &str, wait: &WaitArgs) -> anyhow::Result<()> {
    if !wait.wait {
        println!("{task_id}");
        return Ok(());
    }
    let response = wait_with_spinner(tasks, task_id, wait.timeout).await?;
    print_response(&response)
}

async fn wait_with_spinner(
    tasks: &TaskService,
    task_id: &str,
    timeout: u64,
) -> anyhow::Result<TaskResponse> {
    let spinner = Spinner::start(&format!("waiting for task {task_id}"));
    let result = tasks
        .wait_to_be_ready(task_id, Some(Duration::from_secs(timeout)))
        .await;
    spinner.stop().await;
    Ok(result?)
}

fn print_response(response: &TaskResponse) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    if response.is_error() {
        bail!("task {} failed", response.task_id);
    }
    Ok(())
}

async fn handle_serve(config: &Config, db_path: &Path, listen: &str) -> anyhow::Result<()> {
    let settings = Settings::load(config)?;
    let db = db_path.to_str().context("database path is not valid UTF-8")?;
    let storage = Arc::new(SqliteStorage::open(db).context("failed to open task storage")?);

    let callbacks = Arc::new(CallbackRegistry::new());
    callbacks
        .register(LOG_CALLBACK, Arc::new(LogCallback))
        .await;

    let events = Arc::new(EventBus::default());
    spawn_event_logger(&events);
    spawn_purger(storage.clone());

    let handler = Arc::new(WebhookHandler::new(
        settings.clone(),
        storage,
        callbacks.clone(),
        events,
    ));
    let router = server::router(handler, &settings.webhook_path);

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind to {listen}"))?;

    print_banner(&BannerInfo {
        base_url: &settings.base_url,
        auth_method: settings.auth.label(),
        listen,
        webhook_path: &settings.webhook_path,
        signature_check: settings.check_webhooks_signature,
        callbacks: &callbacks.names().await,
        db: db_path,
    });

    server::serve(listener, router).await?;
    Ok(())
}

fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match &event {
                    Event::Webhook(webhook) => info!(
                        event = event.name(),
                        task_id = webhook.task_id().unwrap_or("-"),
                        callback_executed = webhook.callback_executed,
                        "event emitted"
                    ),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_purger(storage: Arc<SqliteStorage>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match storage.purge_expired() {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "purged expired storage entries"),
                Err(e) => warn!(error = %e, "failed to purge expired storage entries"),
            }
        }
    });
}

fn handle_config(config: &Config, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            if !KNOWN_KEYS.iter().any(|(k, _)| *k == key) {
                eprintln!("warning: `{key}` is not a setting aistudio reads");
            }
            config.set(&key, &value)?;
            println!("✓ {key} saved");
        }
        ConfigAction::Get { key } => match config.get(&key)? {
            Some(value) => println!("{value}"),
            None => bail!("`{key}` is not set"),
        },
        ConfigAction::Unset { key } => {
            config.remove(&key)?;
            println!("✓ {key} removed");
        }
        ConfigAction::List => {
            for (key, value) in config.entries()? {
                println!("{key} = {}", masked(&key, &value));
            }
        }
    }
    Ok(())
}

fn masked<'a>(key: &str, value: &'a str) -> &'a str {
    if SECRET_KEYS.contains(&key) {
        "********"
    } else {
        value
    }
}

fn parse_input(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{raw}`"))?;
    if name.is_empty() {
        return Err(format!("input name is empty in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}
