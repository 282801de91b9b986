use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use unlock_core::config::UnlockSettings;
use unlock_core::credential::DeviceCredential;
use unlock_core::keystore::{KeyringKeyVault, SoftwareKeyStore};
use unlock_core::paths::{auth_state_path, blobs_path, data_dir, settings_path};
use unlock_core::request::WireCode;
use unlock_core::{
    ActionOrchestrator, EncryptedBlobStore, FileBlobs, OperationRequest, SecureKeyManager,
    WireRequest, WireResponse,
};

mod console_prompt;

use crate::console_prompt::{prompt_new_passcode, prompt_secret_value, ConsolePrompt};

#[derive(Parser, Debug)]
#[command(name = "unlock-cli")]
#[command(author, version, about = "Darklock authenticated secret vault", long_about = None)]
struct Cli {
    /// Override the data directory (also UNLOCK_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set the device passcode and write default settings
    Init {
        #[arg(long)]
        app_label: Option<String>,
        /// Replace an existing passcode
        #[arg(long)]
        force: bool,
    },
    /// Report which authenticators are usable
    Available,
    /// Prompt for authentication without touching any secret
    Challenge(RequestArgs),
    /// Store a secret (prompts for the value when omitted)
    Set {
        #[command(flatten)]
        request: RequestArgs,
        #[arg(long)]
        value: Option<String>,
    },
    /// Print a stored secret
    Get(RequestArgs),
    /// Report whether a secret exists
    Has(RequestArgs),
    /// Delete a secret and its key
    Delete(RequestArgs),
    /// Run a JSON request read from a file or stdin
    Exec {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Close every authentication window
    Lock,
    /// Simulate a biometric enrollment change
    RotateEnrollment,
}

#[derive(Args, Debug, Default)]
struct RequestArgs {
    #[arg(long, short)]
    name: Option<String>,
    /// sync | backup | oneDevice | activeSystemLock | oneBiometric
    #[arg(long)]
    scope: Option<String>,
    /// lockWithDevice | lockAfterUse | lockAfterUseBiometricOnly
    #[arg(long)]
    lock_behavior: Option<String>,
    /// start | continue
    #[arg(long)]
    batch: Option<String>,
    /// Fail instead of prompting
    #[arg(long)]
    non_interactive: bool,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    subtitle: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

impl RequestArgs {
    fn into_wire(self, operation_kind: &str, settings: &UnlockSettings) -> WireRequest {
        WireRequest {
            operation_kind: WireCode::from(operation_kind),
            secret_name: self.name,
            scope: Some(
                self.scope
                    .map(WireCode::Name)
                    .unwrap_or_else(|| settings.default_scope.as_wire_str().into()),
            ),
            lock_behavior: Some(
                self.lock_behavior
                    .map(WireCode::Name)
                    .unwrap_or_else(|| settings.default_lock_behavior.as_wire_str().into()),
            ),
            auto_lock_seconds: Some(settings.auto_lock_secs),
            interaction_not_allowed: Some(self.non_interactive),
            batch: self.batch,
            title: self.title,
            subtitle: self.subtitle,
            description: self.description,
            ..WireRequest::default()
        }
    }
}

struct Runtime {
    settings: UnlockSettings,
    store: Arc<SoftwareKeyStore<KeyringKeyVault>>,
    orchestrator: ActionOrchestrator,
}

impl Runtime {
    fn open(data: &Path) -> Result<Self> {
        std::fs::create_dir_all(data)?;
        let settings = UnlockSettings::load(&settings_path(data))?;
        let store = Arc::new(
            SoftwareKeyStore::with_state_file(KeyringKeyVault::default(), auth_state_path(data))
                .context("load authentication state")?,
        );
        let prompt = ConsolePrompt::new(settings.credential.clone(), settings.max_passcode_attempts);
        let orchestrator = ActionOrchestrator::new(
            SecureKeyManager::new(store.clone()),
            EncryptedBlobStore::new(Arc::new(FileBlobs::new(blobs_path(data)))),
            Arc::new(prompt),
            Arc::new(settings.capabilities),
        );
        Ok(Self {
            settings,
            store,
            orchestrator,
        })
    }

    /// Runs one wire request and prints the wire response on stdout.
    fn exec(&self, wire: WireRequest) -> Result<()> {
        let result = OperationRequest::from_wire(wire, self.settings.app_label.as_deref())
            .and_then(|request| self.orchestrator.execute(&request));
        let response = WireResponse::from_result(&result);
        println!("{}", serde_json::to_string(&response)?);
        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(anyhow!("operation failed ({}): {e}", e.code())),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unlock_cli=info,unlock_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let data = match cli.data_dir {
        Some(dir) => dir,
        None => data_dir()?,
    };
    match cli.command {
        Commands::Init { app_label, force } => init_command(&data, app_label, force),
        Commands::Available => {
            let runtime = Runtime::open(&data)?;
            let wire = RequestArgs::default().into_wire("isAvailable", &runtime.settings);
            runtime.exec(wire)
        }
        Commands::Challenge(args) => run_with(&data, args, "challenge"),
        Commands::Set { request, value } => {
            let runtime = Runtime::open(&data)?;
            let value = match value {
                Some(value) => Some(value),
                None => prompt_secret_value()?.map(|v| v.to_string()),
            };
            let mut wire = request.into_wire("setSecret", &runtime.settings);
            wire.secret_value = value;
            runtime.exec(wire)
        }
        Commands::Get(args) => run_with(&data, args, "getSecret"),
        Commands::Has(args) => run_with(&data, args, "hasSecret"),
        Commands::Delete(args) => run_with(&data, args, "deleteSecret"),
        Commands::Exec { file } => exec_command(&data, file),
        Commands::Lock => {
            Runtime::open(&data)?.store.lock();
            println!("Authentication windows closed");
            Ok(())
        }
        Commands::RotateEnrollment => {
            let runtime = Runtime::open(&data)?;
            runtime.store.change_enrollment();
            println!(
                "Enrollment epoch now {}",
                runtime.store.state().enrollment_epoch
            );
            Ok(())
        }
    }
}

fn run_with(data: &Path, args: RequestArgs, operation_kind: &str) -> Result<()> {
    let runtime = Runtime::open(data)?;
    let wire = args.into_wire(operation_kind, &runtime.settings);
    runtime.exec(wire)
}

fn exec_command(data: &Path, file: Option<PathBuf>) -> Result<()> {
    let raw = match file {
        Some(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?
        }
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let wire: WireRequest =
        serde_json::from_str(&raw).map_err(|e| anyhow!("request parse: {e}"))?;
    Runtime::open(data)?.exec(wire)
}

fn init_command(data: &Path, app_label: Option<String>, force: bool) -> Result<()> {
    std::fs::create_dir_all(data)?;
    let path = settings_path(data);
    let mut settings = UnlockSettings::load(&path)?;
    if settings.credential.is_some() && !force {
        return Err(anyhow!(
            "device passcode already set at {}; pass --force to replace it",
            path.display()
        ));
    }
    let passcode = prompt_new_passcode()?;
    settings.credential = Some(DeviceCredential::create(&passcode)?);
    if app_label.is_some() {
        settings.app_label = app_label;
    }
    settings.save(&path)?;
    info!(path = %path.display(), "settings written");
    println!("Device passcode set");
    Ok(())
}
