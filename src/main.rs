// src/main.rs

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::process::Command;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use kari_keymat::sys::private_fs::prepare_base_dir;
use kari_keymat::{
    DockerCliLogin, EnvVars, KeyMaterialDescriptor, KeymatConfig, MaterializationContext,
    RegistryLogin,
};

/// Runs a container-runtime client with ephemeral key material in its
/// environment, and removes that material when the client exits.
#[derive(Parser, Debug)]
#[command(name = "kari-keymat", version, about)]
struct Cli {
    /// JSON descriptor naming the daemon and registries to authenticate against.
    #[arg(long)]
    descriptor: PathBuf,

    /// Overrides KARI_KEYMAT_DIR for this invocation.
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Program and arguments to launch, after `--`.
    #[arg(last = true, required = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // ==============================================================================
    // 1. Configuration & Environment
    // ==============================================================================

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = KeymatConfig::load();
    let base_dir = cli.base_dir.clone().unwrap_or_else(|| config.base_dir.clone());
    prepare_base_dir(&base_dir)?;

    // ==============================================================================
    // 2. Compose & Materialize
    // ==============================================================================

    let raw = Zeroizing::new(tokio::fs::read_to_string(&cli.descriptor).await?);
    let descriptor = KeyMaterialDescriptor::from_json(&raw)?;

    let login: Arc<dyn RegistryLogin> = Arc::new(DockerCliLogin::new(&config.docker_bin));
    let mut factory = descriptor.into_factory(&config.home_docker_config(), login)?;
    factory.bind(&MaterializationContext::new(&base_dir))?;

    // Materialize blocks on file I/O and `docker login`.
    let mut material = tokio::task::spawn_blocking(move || factory.materialize()).await??;

    // ==============================================================================
    // 3. Launch, then always release
    // ==============================================================================

    info!("⚙️ kari-keymat launching {}", cli.command[0]);
    let outcome = run(&cli.command, material.env()).await;

    let released = tokio::task::spawn_blocking(move || material.release()).await?;
    if let Err(e) = &released {
        error!(error = %e, "secret residue may remain on disk");
    }

    let status = outcome?;
    released?;

    Ok(match status.code() {
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::FAILURE,
    })
}

async fn run(command: &[String], env: &EnvVars) -> io::Result<std::process::ExitStatus> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no command given"))?;

    let mut child = Command::new(program)
        .args(args)
        .envs(env)
        .kill_on_drop(true)
        .spawn()?;

    let finished = tokio::select! {
        status = child.wait() => Some(status?),
        _ = tokio::signal::ctrl_c() => None,
    };

    match finished {
        Some(status) => Ok(status),
        None => {
            warn!("interrupted, terminating {}", program);
            child.kill().await?;
            child.wait().await
        }
    }
}
