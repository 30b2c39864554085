use std::io;
use std::sync::Arc;
use std::time::Duration;

use boardsync::error::{ConfigError, ErrorCode};
use boardsync::{
    ApiError, ConnectivityMode, DrawableObject, HttpApi, LocalUser, Notice, NullTransport, Session,
    SessionError, SessionIo, Shape, Snapshot, SyncConfig, Transport, WhiteboardApi, WsTransport,
};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("backend error: {0}")]
    Api(#[from] ApiError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("an object {0} already exists")]
    Duplicate(String),
    #[error("no object with id {0}")]
    NotFound(String),
    #[error("refusing to clear without --yes")]
    ClearNotConfirmed,
    #[error("backend unreachable; change was kept locally only")]
    Offline,
}

#[derive(Parser, Debug)]
#[command(name = "boardsync", about = "Whiteboard sync client")]
struct Cli {
    /// Overrides `BOARDSYNC_API_URL`.
    #[arg(long)]
    api_url: Option<String>,

    /// Overrides `BOARDSYNC_WS_URL`.
    #[arg(long)]
    ws_url: Option<String>,

    #[arg(long, env = "BOARDSYNC_USER_ID", default_value = "cli")]
    user_id: String,

    #[arg(long, env = "BOARDSYNC_USER_NAME", default_value = "CLI")]
    user_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check backend health.
    Ping,
    /// Print the project's whiteboard objects as JSON lines.
    Show(ProjectArgs),
    /// Follow the whiteboard over the realtime transport, printing changes.
    Watch(ProjectArgs),
    /// Draw one object.
    Draw(DrawCommand),
    /// Delete one object.
    Delete {
        #[command(flatten)]
        project: ProjectArgs,
        object_id: String,
    },
    /// Delete every object.
    Clear {
        #[command(flatten)]
        project: ProjectArgs,
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct ProjectArgs {
    #[arg(long, env = "BOARDSYNC_PROJECT")]
    project: String,
}

#[derive(Args, Debug)]
struct DrawCommand {
    #[command(flatten)]
    project: ProjectArgs,

    #[arg(long, default_value_t = 0.0)]
    x: f64,

    #[arg(long, default_value_t = 0.0)]
    y: f64,

    #[arg(long, default_value = "#000000")]
    stroke: String,

    #[arg(long, default_value = "transparent")]
    fill: String,

    #[command(subcommand)]
    shape: DrawShape,
}

#[derive(Subcommand, Debug)]
enum DrawShape {
    Rect {
        #[arg(long, default_value_t = 100.0)]
        width: f64,
        #[arg(long, default_value_t = 80.0)]
        height: f64,
    },
    Circle {
        #[arg(long, default_value_t = 40.0)]
        radius: f64,
    },
    Text {
        text: String,
        #[arg(long, default_value_t = 16.0)]
        font_size: f64,
    },
    Sticky {
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();
    let mut config = SyncConfig::from_env()?;
    if let Some(url) = cli.api_url {
        config.api_url = url.trim_end_matches('/').to_owned();
    }
    if let Some(url) = cli.ws_url {
        config.ws_url = url;
    }
    let api: Arc<dyn WhiteboardApi> = Arc::new(HttpApi::from_config(&config)?);
    let user = LocalUser::new(cli.user_id, cli.user_name);

    match cli.command {
        Command::Ping => run_ping(api.as_ref()).await,
        Command::Show(args) => run_show(&config, api, &args.project, user).await,
        Command::Watch(args) => run_watch(&config, api, &args.project, user).await,
        Command::Draw(draw) => run_draw(&config, api, draw, user).await,
        Command::Delete { project, object_id } => run_delete(&config, api, &project.project, &object_id, user).await,
        Command::Clear { project, yes } => run_clear(&config, api, &project.project, yes, user).await,
    }
}

async fn run_ping(api: &dyn WhiteboardApi) -> Result<(), CliError> {
    api.health().await?;
    println!("ok");
    Ok(())
}

async fn run_show(config: &SyncConfig, api: Arc<dyn WhiteboardApi>, project: &str, user: LocalUser) -> Result<(), CliError> {
    let session = open_session(config, api, project, user).await;
    let snapshot = session.handle.snapshot().await?;
    print_header(&snapshot);
    for object in &snapshot.objects {
        print_json(&serde_json::to_value(object)?)?;
    }
    session.close().await;
    Ok(())
}

async fn run_watch(config: &SyncConfig, api: Arc<dyn WhiteboardApi>, project: &str, user: LocalUser) -> Result<(), CliError> {
    let (transport, inbound) = match WsTransport::connect(&config.ws_url).await {
        Ok((transport, inbound)) => (Arc::new(transport) as Arc<dyn Transport>, Some(inbound)),
        Err(e) => {
            warn!(error = %e, code = e.error_code(), "realtime transport unavailable, showing local state only");
            (Arc::new(NullTransport) as Arc<dyn Transport>, None)
        }
    };
    let io = SessionIo { api, transport, inbound };
    let mut session = Session::open(config, io, project, user).await;
    let mut snapshots = session.handle.subscribe();
    print_header(&snapshots.borrow_and_update());

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                eprintln!(
                    "revision {} objects {} collaborators {} pending {} mode {:?}",
                    snapshot.revision,
                    snapshot.objects.len(),
                    snapshot.collaborators.len(),
                    snapshot.pending.len(),
                    snapshot.mode,
                );
            }
            Some(notice) = session.notices.recv() => print_notice(&notice),
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    session.close().await;
    Ok(())
}

async fn run_draw(config: &SyncConfig, api: Arc<dyn WhiteboardApi>, draw: DrawCommand, user: LocalUser) -> Result<(), CliError> {
    let shape = match draw.shape {
        DrawShape::Rect { width, height } => Shape::Rectangle {
            x: draw.x,
            y: draw.y,
            width,
            height,
            stroke: draw.stroke,
            stroke_width: 2.0,
            fill: draw.fill,
        },
        DrawShape::Circle { radius } => Shape::Circle {
            x: draw.x,
            y: draw.y,
            radius,
            stroke: draw.stroke,
            stroke_width: 2.0,
            fill: draw.fill,
        },
        DrawShape::Text { text, font_size } => Shape::Text {
            x: draw.x,
            y: draw.y,
            text,
            font_size,
            font_family: "Arial".into(),
            fill: draw.stroke,
        },
        DrawShape::Sticky { text } => Shape::StickyNote {
            x: draw.x,
            y: draw.y,
            width: 150.0,
            height: 150.0,
            text,
            fill: "#FFEB3B".into(),
            stroke: "#F57F17".into(),
        },
    };

    let session = open_session(config, api, &draw.project.project, user).await;
    let result = match session.handle.create_object(DrawableObject::new(String::new(), shape)).await? {
        Some(id) => finish(&session, Ok(id)).await,
        None => Err(CliError::Duplicate("with the generated id".into())),
    };
    if let Ok(id) = &result {
        println!("{id}");
    }
    session.close().await;
    result.map(|_| ())
}

async fn run_delete(
    config: &SyncConfig,
    api: Arc<dyn WhiteboardApi>,
    project: &str,
    object_id: &str,
    user: LocalUser,
) -> Result<(), CliError> {
    let session = open_session(config, api, project, user).await;
    let removed = session.handle.delete_object(object_id).await?;
    let result = if removed { finish(&session, Ok(())).await } else { Err(CliError::NotFound(object_id.to_owned())) };
    session.close().await;
    result
}

async fn run_clear(
    config: &SyncConfig,
    api: Arc<dyn WhiteboardApi>,
    project: &str,
    yes: bool,
    user: LocalUser,
) -> Result<(), CliError> {
    if !yes {
        return Err(CliError::ClearNotConfirmed);
    }
    let session = open_session(config, api, project, user).await;
    let removed = session.handle.clear_all(true).await?;
    let result = finish(&session, Ok(removed)).await;
    if let Ok(removed) = &result {
        println!("removed {removed}");
    }
    session.close().await;
    result.map(|_| ())
}

async fn open_session(
    config: &SyncConfig,
    api: Arc<dyn WhiteboardApi>,
    project: &str,
    user: LocalUser,
) -> Session {
    let io = SessionIo { api, transport: Arc::new(NullTransport), inbound: None };
    Session::open(config, io, project, user).await
}

/// Wait for backend writes to settle and turn offline or failed writes into
/// an error, since a one-shot command has nowhere else to report them.
async fn finish<T>(session: &Session, outcome: Result<T, CliError>) -> Result<T, CliError> {
    let value = outcome?;
    tokio::time::timeout(Duration::from_secs(30), session.handle.settled())
        .await
        .map_err(|_| CliError::Offline)??;
    let snapshot = session.handle.snapshot().await?;
    if snapshot.offline_only || snapshot.mode == ConnectivityMode::Offline {
        return Err(CliError::Offline);
    }
    Ok(value)
}

fn print_header(snapshot: &Snapshot) {
    eprintln!(
        "whiteboard {} ({} objects, {:?}{})",
        snapshot.whiteboard_id,
        snapshot.objects.len(),
        snapshot.mode,
        if snapshot.offline_only { ", offline only" } else { "" },
    );
}

fn print_notice(notice: &Notice) {
    match notice {
        Notice::Error { code, message } => eprintln!("error [{code}]: {message}"),
        Notice::Repaired { recovered, dropped } => {
            eprintln!("repaired whiteboard: {recovered} recovered, {dropped} duplicates dropped");
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
