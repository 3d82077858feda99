use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chainlog_core::{
    ChainlogError, ChainlogRoots, SessionStore, SessionUri, project_directories,
    render_listing_markdown, render_session_markdown, render_subagent_list_markdown,
    render_subagent_markdown, resolve_session_path, to_raw_json,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CHAINLOG_LOG";

#[derive(Debug, Parser)]
#[command(name = "chainlog", version, about = "List and read conversation session logs")]
struct Cli {
    /// Session URI like chainlog://<session_id> or chainlog://<session_id>/<agent_id>
    /// Without a URI, every session is listed
    uri: Option<String>,

    /// Output raw JSON instead of markdown
    #[arg(long)]
    raw: bool,

    /// List sessions, or the subagents of chainlog://<session_id>
    #[arg(long)]
    list: bool,

    /// Project directory to read instead of every directory under the projects root
    #[arg(long = "dir", value_name = "DIR")]
    dirs: Vec<PathBuf>,

    /// Append parse statistics and skipped lines to session output
    #[arg(long)]
    diagnostics: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match run(cli, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if err.is_cancelled() {
                ExitCode::from(130)
            } else {
                ExitCode::from(1)
            }
        }
    }
}

async fn run(cli: Cli, cancel: &CancellationToken) -> chainlog_core::Result<()> {
    let uri = cli.uri.as_deref().map(SessionUri::parse).transpose()?;
    let store = SessionStore::new();

    let Some(uri) = uri else {
        return list_sessions(&store, &cli, cancel).await;
    };

    if cli.list && uri.agent_id.is_some() {
        return Err(ChainlogError::InvalidMode(
            "--list cannot be used with chainlog://<session_id>/<agent_id>".to_string(),
        ));
    }

    let path = locate_session(&uri, &cli.dirs)?;

    if uri.agent_id.is_some() {
        let subagent = store.load_subagent(&uri, &path, cancel).await?;
        if cli.raw {
            println!("{}", to_raw_json(&subagent)?);
        } else {
            print!("{}", render_subagent_markdown(&uri, &subagent));
        }
        return Ok(());
    }

    let load = store.load_session(&uri, &path, cancel).await?;

    if cli.list {
        let subagents = load
            .primary()
            .map(|session| session.subagents.as_slice())
            .unwrap_or_default();
        if cli.raw {
            println!("{}", to_raw_json(subagents)?);
        } else {
            print!("{}", render_subagent_list_markdown(&uri, subagents));
        }
        return Ok(());
    }

    if cli.raw {
        println!("{}", to_raw_json(load.as_ref())?);
    } else {
        print!("{}", render_session_markdown(&uri, &load, cli.diagnostics));
    }

    Ok(())
}

async fn list_sessions(
    store: &SessionStore,
    cli: &Cli,
    cancel: &CancellationToken,
) -> chainlog_core::Result<()> {
    let dirs = if cli.dirs.is_empty() {
        let roots = ChainlogRoots::from_env_or_home()?;
        project_directories(&roots.projects_root)
    } else {
        cli.dirs.clone()
    };

    let listings = store.list_sessions(&dirs, cancel).await?;
    if cli.raw {
        println!("{}", to_raw_json(&listings)?);
    } else {
        print!("{}", render_listing_markdown(&listings));
    }

    Ok(())
}

fn locate_session(uri: &SessionUri, dirs: &[PathBuf]) -> chainlog_core::Result<PathBuf> {
    if !dirs.is_empty() {
        return dirs
            .iter()
            .map(|dir| dir.join(format!("{}.jsonl", uri.session_id)))
            .find(|path| Path::is_file(path))
            .ok_or_else(|| ChainlogError::SessionNotFound {
                session_id: uri.session_id.clone(),
                searched_roots: dirs.to_vec(),
            });
    }

    let roots = ChainlogRoots::from_env_or_home()?;
    let resolved = resolve_session_path(&roots.projects_root, &uri.session_id)?;
    for warning in &resolved.warnings {
        warn!(session_id = %uri.session_id, "{warning}");
    }
    Ok(resolved.path)
}
