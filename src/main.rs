use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use dirrecon::backend::Generation;
use dirrecon::config::Config;
use dirrecon::handle;
use dirrecon::models::{
    Application, CredentialHolder, CredentialKind, KeyCredential, PasswordCredential,
    ServicePrincipal, User,
};
use dirrecon::reconcile::input::{CertificateEncoding, CertificateInput, CertificateType, PasswordInput};
use dirrecon::reconcile::lookup::{self, ApplicationQuery, ServicePrincipalQuery, UserQuery};
use dirrecon::reconcile::{CredentialState, Diagnostic, ReadOutcome};
use dirrecon::ClientContext;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Reconcile directory objects and credentials
#[derive(Parser, Debug)]
#[command(name = "dirrecon", version = dirrecon::VERSION, about, long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/dirrecon/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Tenant ID
    #[arg(short, long, global = true)]
    tenant: Option<String>,

    /// Backend API generation
    #[arg(short, long, global = true, value_enum)]
    generation: Option<Generation>,

    /// Log level for debugging
    #[arg(long, global = true, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Seconds to wait for a created object to become visible
    #[arg(long, global = true)]
    create_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode, decode and migrate credential handles (offline)
    #[command(subcommand)]
    Handle(HandleCommand),
    /// Password credentials on an application or service principal
    #[command(subcommand)]
    Password(PasswordCommand),
    /// Certificate credentials on an application or service principal
    #[command(subcommand)]
    Certificate(CertificateCommand),
    /// Users
    #[command(subcommand)]
    User(UserCommand),
    /// Look up exactly one object
    #[command(subcommand)]
    Lookup(LookupCommand),
}

#[derive(Subcommand, Debug)]
enum HandleCommand {
    Encode {
        #[arg(long)]
        parent_id: String,
        #[arg(long, value_parser = parse_kind)]
        kind: CredentialKind,
        #[arg(long)]
        key_id: String,
    },
    Decode {
        handle: String,
    },
    /// Rewrite a legacy `{parentId}/{keyId}` handle
    Migrate {
        handle: String,
        #[arg(long, value_parser = parse_kind)]
        kind: CredentialKind,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ParentType {
    Application,
    ServicePrincipal,
}

#[derive(Subcommand, Debug)]
enum PasswordCommand {
    Create {
        /// Object ID of the parent
        #[arg(long)]
        parent_id: String,
        #[arg(long, value_enum, default_value = "application")]
        parent_type: ParentType,
        #[command(flatten)]
        input: PasswordArgs,
    },
    Read {
        handle: String,
        #[arg(long, value_enum, default_value = "application")]
        parent_type: ParentType,
    },
    Delete {
        handle: String,
        #[arg(long, value_enum, default_value = "application")]
        parent_type: ParentType,
    },
}

#[derive(Subcommand, Debug)]
enum CertificateCommand {
    Create {
        /// Object ID of the parent
        #[arg(long)]
        parent_id: String,
        #[arg(long, value_enum, default_value = "application")]
        parent_type: ParentType,
        #[command(flatten)]
        input: CertificateArgs,
    },
    Read {
        handle: String,
        #[arg(long, value_enum, default_value = "application")]
        parent_type: ParentType,
    },
    Delete {
        handle: String,
        #[arg(long, value_enum, default_value = "application")]
        parent_type: ParentType,
    },
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("end").required(true).args(["end_date", "end_date_relative"])))]
struct PasswordArgs {
    #[arg(long)]
    key_id: Option<String>,
    #[arg(long)]
    display_name: Option<String>,
    #[arg(long)]
    value: String,
    #[arg(long)]
    start_date: Option<String>,
    #[arg(long)]
    end_date: Option<String>,
    /// e.g. 240h, 1h30m or 1.5h
    #[arg(long)]
    end_date_relative: Option<String>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("end").required(true).args(["end_date", "end_date_relative"])))]
struct CertificateArgs {
    #[arg(long)]
    key_id: Option<String>,
    #[arg(long)]
    display_name: Option<String>,
    /// Certificate data, or @path to read it from a file
    #[arg(long)]
    value: String,
    #[arg(long, value_enum, default_value = "pem")]
    encoding: CertificateEncoding,
    #[arg(long = "type", value_enum, default_value = "AsymmetricX509Cert")]
    key_type: CertificateType,
    #[arg(long)]
    start_date: Option<String>,
    #[arg(long)]
    end_date: Option<String>,
    #[arg(long)]
    end_date_relative: Option<String>,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Read { object_id: String },
    Delete { object_id: String },
}

#[derive(Subcommand, Debug)]
enum LookupCommand {
    Application(ObjectSelector),
    ServicePrincipal(ObjectSelector),
    User(UserSelector),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("by").required(true).args(["object_id", "application_id", "display_name"])))]
struct ObjectSelector {
    #[arg(long)]
    object_id: Option<String>,
    #[arg(long)]
    application_id: Option<String>,
    #[arg(long)]
    display_name: Option<String>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("by").required(true).args(["object_id", "user_principal_name", "mail_nickname"])))]
struct UserSelector {
    #[arg(long)]
    object_id: Option<String>,
    #[arg(long)]
    user_principal_name: Option<String>,
    #[arg(long)]
    mail_nickname: Option<String>,
}

fn parse_kind(s: &str) -> std::result::Result<CredentialKind, String> {
    s.parse()
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.as_str().to_ascii_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("dirrecon {} started with log level: {:?}", dirrecon::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("dirrecon").join("dirrecon.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".dirrecon").join("dirrecon.log");
    }
    PathBuf::from("dirrecon.log")
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => Config::load()?,
    };

    if let Some(tenant) = &cli.tenant {
        config.tenant_id = Some(tenant.clone());
    }
    if let Some(generation) = cli.generation {
        config.generation = generation;
    }
    if let Some(secs) = cli.create_timeout {
        config.create_timeout_secs = secs;
    }
    Ok(config)
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Keep the attribute path when handing a diagnostic to anyhow.
fn report(diagnostic: Diagnostic) -> anyhow::Error {
    match diagnostic.attribute_path.clone() {
        Some(path) => anyhow::Error::new(diagnostic).context(format!("attribute {path:?}")),
        None => anyhow::Error::new(diagnostic),
    }
}

fn print_state<C: Serialize>(state: &CredentialState<C>) -> Result<()> {
    print(&json!({
        "id": state.handle,
        "parent_id": state.parent_id,
        "credential": state.credential,
    }))
}

fn run_handle(command: HandleCommand) -> Result<()> {
    match command {
        HandleCommand::Encode {
            parent_id,
            kind,
            key_id,
        } => println!("{}", handle::encode(&parent_id, kind, &key_id)?),
        HandleCommand::Decode { handle: h } => {
            let decoded = match handle::probe(&h) {
                handle::HandleShape::Legacy => {
                    let legacy = handle::decode_legacy(&h)?;
                    json!({"shape": "legacy", "parent_id": legacy.parent_id, "key_id": legacy.key})
                }
                _ => {
                    let current = handle::decode_current(&h)?;
                    json!({
                        "shape": "current",
                        "parent_id": current.parent_id,
                        "kind": current.kind.as_str(),
                        "key_id": current.key,
                    })
                }
            };
            print(&decoded)?;
        }
        HandleCommand::Migrate { handle: h, kind } => println!("{}", handle::migrate(&h, kind)?),
    }
    Ok(())
}

async fn run_password<P: CredentialHolder>(
    ctx: &ClientContext,
    command: PasswordCommand,
    cancel: &CancellationToken,
) -> Result<()> {
    let reconciler = ctx.passwords::<P>();
    match command {
        PasswordCommand::Create {
            parent_id, input, ..
        } => {
            let credential: PasswordCredential = PasswordInput {
                key_id: input.key_id,
                display_name: input.display_name,
                value: input.value,
                start_date: input.start_date,
                end_date: input.end_date,
                end_date_relative: input.end_date_relative,
            }
            .build()?;
            let state = reconciler
                .create(&parent_id, credential, cancel)
                .await
                .map_err(report)?;
            print_state(&state)
        }
        PasswordCommand::Read { handle, .. } => {
            match reconciler.read(&handle, cancel).await.map_err(report)? {
                ReadOutcome::Present(state) => print_state(&state),
                ReadOutcome::Absent => print(&json!(null)),
            }
        }
        PasswordCommand::Delete { handle, .. } => {
            reconciler.delete(&handle, cancel).await.map_err(report)
        }
    }
}

async fn run_certificate<P: CredentialHolder>(
    ctx: &ClientContext,
    command: CertificateCommand,
    cancel: &CancellationToken,
) -> Result<()> {
    let reconciler = ctx.certificates::<P>();
    match command {
        CertificateCommand::Create {
            parent_id, input, ..
        } => {
            let value = match input.value.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read certificate from {path}"))?,
                None => input.value,
            };
            let credential: KeyCredential = CertificateInput {
                key_id: input.key_id,
                display_name: input.display_name,
                value,
                encoding: input.encoding,
                key_type: input.key_type,
                start_date: input.start_date,
                end_date: input.end_date,
                end_date_relative: input.end_date_relative,
            }
            .build()?;
            let state = reconciler
                .create(&parent_id, credential, cancel)
                .await
                .map_err(report)?;
            print_state(&state)
        }
        CertificateCommand::Read { handle, .. } => {
            match reconciler.read(&handle, cancel).await.map_err(report)? {
                ReadOutcome::Present(state) => print_state(&state),
                ReadOutcome::Absent => print(&json!(null)),
            }
        }
        CertificateCommand::Delete { handle, .. } => {
            reconciler.delete(&handle, cancel).await.map_err(report)
        }
    }
}

impl PasswordCommand {
    fn parent_type(&self) -> ParentType {
        match self {
            PasswordCommand::Create { parent_type, .. }
            | PasswordCommand::Read { parent_type, .. }
            | PasswordCommand::Delete { parent_type, .. } => *parent_type,
        }
    }
}

impl CertificateCommand {
    fn parent_type(&self) -> ParentType {
        match self {
            CertificateCommand::Create { parent_type, .. }
            | CertificateCommand::Read { parent_type, .. }
            | CertificateCommand::Delete { parent_type, .. } => *parent_type,
        }
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    // Handle commands are offline and need neither config nor credentials
    if let Command::Handle(command) = cli.command {
        return run_handle(command);
    }

    let config = load_config(&cli)?;
    let ctx = ClientContext::from_config(&config).context("Failed to set up the directory client")?;

    match cli.command {
        Command::Handle(command) => run_handle(command),
        Command::Password(command) => match command.parent_type() {
            ParentType::Application => run_password::<Application>(&ctx, command, &cancel).await,
            ParentType::ServicePrincipal => {
                run_password::<ServicePrincipal>(&ctx, command, &cancel).await
            }
        },
        Command::Certificate(command) => match command.parent_type() {
            ParentType::Application => {
                run_certificate::<Application>(&ctx, command, &cancel).await
            }
            ParentType::ServicePrincipal => {
                run_certificate::<ServicePrincipal>(&ctx, command, &cancel).await
            }
        },
        Command::User(UserCommand::Read { object_id }) => {
            match ctx.objects::<User>().read(&object_id, &cancel).await.map_err(report)? {
                ReadOutcome::Present(user) => print(&user),
                ReadOutcome::Absent => print(&json!(null)),
            }
        }
        Command::User(UserCommand::Delete { object_id }) => ctx
            .objects::<User>()
            .delete(&object_id, &cancel)
            .await
            .map_err(report),
        Command::Lookup(LookupCommand::Application(by)) => {
            let query = match (by.object_id, by.application_id, by.display_name) {
                (Some(id), _, _) => ApplicationQuery::ObjectId(id),
                (_, Some(app_id), _) => ApplicationQuery::ApplicationId(app_id),
                (_, _, Some(name)) => ApplicationQuery::DisplayName(name),
                _ => anyhow::bail!("one of --object-id, --application-id or --display-name is required"),
            };
            let app = lookup::application(&ctx.directory, &query, &cancel)
                .await
                .map_err(report)?;
            print(&app)
        }
        Command::Lookup(LookupCommand::ServicePrincipal(by)) => {
            let query = match (by.object_id, by.application_id, by.display_name) {
                (Some(id), _, _) => ServicePrincipalQuery::ObjectId(id),
                (_, Some(app_id), _) => ServicePrincipalQuery::ApplicationId(app_id),
                (_, _, Some(name)) => ServicePrincipalQuery::DisplayName(name),
                _ => anyhow::bail!("one of --object-id, --application-id or --display-name is required"),
            };
            let sp = lookup::service_principal(&ctx.directory, &query, &cancel)
                .await
                .map_err(report)?;
            print(&sp)
        }
        Command::Lookup(LookupCommand::User(by)) => {
            let query = match (by.object_id, by.user_principal_name, by.mail_nickname) {
                (Some(id), _, _) => UserQuery::ObjectId(id),
                (_, Some(upn), _) => UserQuery::UserPrincipalName(upn),
                (_, _, Some(nickname)) => UserQuery::MailNickname(nickname),
                _ => anyhow::bail!(
                    "one of --object-id, --user-principal-name or --mail-nickname is required"
                ),
            };
            let user = lookup::user(&ctx.directory, &query, &cancel)
                .await
                .map_err(report)?;
            print(&user)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = setup_logging(cli.log_level)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    let result = run(cli, cancel).await;
    if let Err(err) = &result {
        tracing::error!("{:#}", err);
    }
    result
}
