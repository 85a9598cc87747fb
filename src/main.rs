use clap::Parser;
use sidecar::cli::{Cli, Commands};
use sidecar::error::SidecarError;
use sidecar::{commands, config, infra};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Resolve the workspace root: explicit flag, else the git repo root
    // containing cwd.
    let workspace_root = match cli.workspace {
        Some(root) => Some(root),
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| infra::git::find_repo_root(&cwd).ok()),
    };

    let _guard = init_tracing(workspace_root.as_deref());

    preflight_checks()?;

    info!(command = ?cli.command, workspace = ?workspace_root, "sidecar started");

    let root = workspace_root.ok_or(SidecarError::NotGitRepo)?;
    let cfg = config::load_config(Some(&root))?;

    match cli.command {
        None | Some(Commands::Dashboard) => {
            commands::dashboard::execute(&root, cfg).await?;
        }
        Some(Commands::List) => {
            commands::list::execute(&root, &cfg).await?;
        }
        Some(Commands::New {
            name,
            branch,
            base,
            agent,
            task,
        }) => {
            commands::new::execute(&root, &cfg, name, branch, base, agent, task).await?;
        }
        Some(Commands::Delete { name }) => {
            commands::delete::execute(&root, name).await?;
        }
        Some(Commands::Start {
            name,
            agent,
            prompt,
            skip_permissions,
        }) => {
            commands::start::execute(&root, &cfg, name, agent, prompt, skip_permissions).await?;
        }
        Some(Commands::Stop { name }) => {
            commands::stop::execute(&cfg, name).await?;
        }
        Some(Commands::Attach { name }) => {
            commands::attach::execute(&cfg, name)?;
        }
        Some(Commands::Doctor) => {
            commands::doctor::execute(&root, &cfg).await?;
        }
        Some(Commands::Cleanup { force }) => {
            commands::cleanup::execute(&root, &cfg, force).await?;
        }
    }

    Ok(())
}

fn preflight_checks() -> Result<(), SidecarError> {
    if !infra::tmux::TmuxController::is_available() {
        return Err(SidecarError::TmuxNotInstalled);
    }
    if which::which("git").is_err() {
        return Err(SidecarError::GitNotInstalled);
    }
    // gh and td are optional; features backed by them degrade gracefully.
    Ok(())
}

/// Initialize tracing with a file appender. Returns a guard that must be
/// held for the lifetime of the program (dropping it flushes the writer).
/// Nothing logs to the terminal; a TUI host owns stdout.
fn init_tracing(
    workspace_root: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, EnvFilter};

    let log_dir = workspace_root.map(|r| r.join(".sidecar"))?;
    if !log_dir.exists() && std::fs::create_dir_all(&log_dir).is_err() {
        return None;
    }

    let file_appender = tracing_appender::rolling::never(&log_dir, "sidecar.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    Some(guard)
}
