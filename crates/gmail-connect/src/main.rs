use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gmail_connect::{
    ConnectConfig, ConnectionController, CredentialProvider, FileSessionStore,
    GoogleCredentialProvider, HttpRegistrationClient, LifecycleState, ProviderError,
};

#[derive(Parser)]
#[command(name = "gmail-connect")]
#[command(about = "Connect or disconnect a Gmail account for the backend")]
#[command(
    long_about = "Links a Google account to the backend server.\n\n\
    'connect' opens the Google consent flow, hands the token to the backend and \
    records the connection locally once the backend has acknowledged it. \
    'disconnect' forgets the local connection and revokes the token."
)]
struct Cli {
    /// Backend server URL.
    #[arg(short, long, env = "BACKEND_URL")]
    backend_url: Option<String>,

    /// Path of the persisted session record.
    #[arg(short, long, env = "SESSION_STORE_PATH")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize a Gmail account and register it with the backend
    Connect,
    /// Forget the connected account and revoke its token
    Disconnect,
    /// Show the current connection state
    Status {
        /// Print machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Check whether a cached Google token is usable without prompting
    Token,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "gmail_connect=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ConnectConfig::from_env().context("Invalid configuration")?;
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }
    if let Some(path) = cli.store {
        config.session_store_path = path;
    }

    let provider = Arc::new(GoogleCredentialProvider::new(config.provider.clone())?);
    let registration =
        HttpRegistrationClient::with_timeout(&config.backend_url, config.backend_timeout)?;

    let controller = ConnectionController::restore(
        provider.clone(),
        Arc::new(registration),
        Arc::new(FileSessionStore::new(&config.session_store_path)),
        config.retry.clone(),
    )
    .await
    .with_context(|| {
        format!(
            "Failed to read session store {}",
            config.session_store_path.display()
        )
    })?;

    match cli.command {
        Commands::Connect => {
            let progress = spawn_progress(&controller);
            let result = controller.connect().await;
            progress.abort();

            if let Err(e) = &result {
                if e.is_user_recoverable() {
                    eprintln!("Connecting did not complete; run 'gmail-connect connect' to try again.");
                }
            }
            let account = result.context("Could not connect Gmail")?;
            println!("Connected Gmail account: {}", account);
        }
        Commands::Disconnect => {
            let progress = spawn_progress(&controller);
            let result = controller.disconnect().await;
            progress.abort();

            let account = result.context("Could not disconnect Gmail")?;
            println!("Disconnected Gmail account: {}", account);
        }
        Commands::Status { json } => {
            let session = controller.session().await?;
            if json {
                let status = serde_json::json!({
                    "state": controller.state(),
                    "isConnected": session.is_connected,
                    "userEmail": session.user_email,
                });
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                match (controller.state(), session.user_email) {
                    (LifecycleState::Connected, Some(email)) => println!("Connected as {}", email),
                    (state, _) => println!("{}", state),
                }
            }
        }
        Commands::Token => check_cached_token(provider.as_ref()).await?,
    }

    Ok(())
}

/// Print each lifecycle transition as it happens.
fn spawn_progress(controller: &ConnectionController) -> tokio::task::JoinHandle<()> {
    let mut rx = controller.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = *rx.borrow_and_update();
            if state.is_idle() {
                continue;
            }
            let line = match state {
                LifecycleState::Acquiring => "Waiting for Google authorization...",
                LifecycleState::Registering => "Registering token with the backend...",
                LifecycleState::Handshaking => "Finalizing connection...",
                _ => "Disconnecting...",
            };
            println!("{}", line);
        }
    })
}

async fn check_cached_token(provider: &dyn CredentialProvider) -> anyhow::Result<()> {
    match provider.acquire(false).await {
        Ok(credential) => {
            let email = provider.resolve_identity(&credential).await?;
            println!("Cached token available for {}", email);
            Ok(())
        }
        Err(ProviderError::AuthUnavailable(reason)) | Err(ProviderError::AuthDenied(reason)) => {
            println!("No usable cached token: {}", reason);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
