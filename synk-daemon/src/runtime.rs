use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use synk_core::types::local_now;

use crate::error::{io_err, DaemonError};
use crate::log_rotation::rotate_service_log;
use crate::manager::{SavedRun, ScheduleRequest, TaskManager};
use crate::paths::{logs_dir, service_log_path, socket_path, tasks_path, SHUTDOWN_GRACE};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Start the service and block the current thread until it exits.
///
/// Rotates and opens the service log, installs the subscriber, then drives
/// [`run`] on a multi-thread runtime. In-flight copies get
/// [`SHUTDOWN_GRACE`] to reach a file boundary after the server stops.
pub fn start_blocking(data_dir: &Path) -> Result<(), DaemonError> {
    ensure_runtime_dirs(data_dir)?;
    let rotation = rotate_service_log(data_dir);
    init_tracing(&service_log_path(data_dir))?;
    match rotation {
        Ok(true) => tracing::info!("service log rotated"),
        Ok(false) => {}
        Err(err) => tracing::warn!(error = %err, "service log rotation failed"),
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let result = runtime.block_on(run(data_dir.to_path_buf()));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    tracing::info!("service shutdown complete");
    result
}

/// Run the service: startup recovery, then the socket server and signal
/// handler until one of them requests shutdown.
pub async fn run(data_dir: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&data_dir)?;
    tracing::info!(data_dir = %data_dir.display(), "starting synk sync service");

    let manager = TaskManager::open(&data_dir);
    let recovered = manager.recover().await?;
    tracing::info!(units = recovered.len(), "startup recovery complete");

    let started_at = local_now();
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let data_dir = data_dir.clone();
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let result =
                socket_server_task(data_dir, manager, shutdown.clone(), shutdown_rx, started_at)
                    .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let result = signal_task(shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);

    manager.shutdown();
    tracing::info!(active = manager.active_ids().len(), "stopping sync service");

    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn signal_task(mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())
        .map_err(|err| DaemonError::Protocol(format!("SIGTERM handler failed: {err}")))?;

    tokio::select! {
        _ = shutdown_rx.recv() => Ok(()),
        _ = terminate.recv() => {
            tracing::info!("received SIGTERM, shutting down");
            Ok(())
        }
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                tracing::info!("received ctrl-c, shutting down");
                Ok(())
            }
            Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
        },
    }
}

async fn socket_server_task(
    data_dir: PathBuf,
    manager: Arc<TaskManager>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at: NaiveDateTime,
) -> Result<(), DaemonError> {
    let socket = socket_path(&data_dir);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening for requests");

    let ctx = Arc::new(ServerContext {
        data_dir,
        manager,
        shutdown_tx,
        started_at,
    });

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, ctx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

struct ServerContext {
    data_dir: PathBuf,
    manager: Arc<TaskManager>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: NaiveDateTime,
}

async fn handle_socket_client(
    stream: UnixStream,
    ctx: Arc<ServerContext>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stop = request.cmd == "stop";
        let response = match handle_request(&ctx, request).await {
            Ok(data) => DaemonResponse::ok(data),
            Err(err) => DaemonResponse::error(err.to_string()),
        };
        write_response(&mut writer, &response).await?;
        if stop {
            let _ = ctx.shutdown_tx.send(());
            break;
        }
    }

    Ok(())
}

async fn handle_request(ctx: &ServerContext, request: DaemonRequest) -> Result<Value, DaemonError> {
    let manager = &ctx.manager;
    match request.cmd.as_str() {
        "status" => Ok(build_status_payload(ctx).await?),
        "run" => {
            let (source, destination) = request.paths()?;
            let run = manager.run_now(source, destination, request.save).await?;
            Ok(json!({ "started": true, "template": run.template }))
        }
        "schedule" => {
            let (source, destination) = request.paths()?;
            let when = request
                .at
                .ok_or_else(|| DaemonError::Protocol("'schedule' needs 'at'".to_string()))?;
            let task = manager
                .schedule(ScheduleRequest {
                    source,
                    destination,
                    when,
                    repeat: request.repeat,
                    save: request.save,
                })
                .await?;
            Ok(json!(task))
        }
        "run_saved" => {
            let id = request.task_id()?;
            let outcome = match manager.run_saved(&id).await? {
                SavedRun::Immediate(_) => "running",
                SavedRun::Dispatched(_) => "dispatched",
                SavedRun::AlreadyActive => "already_active",
            };
            Ok(json!({ "id": id, "outcome": outcome }))
        }
        "list" => Ok(json!(manager.list().await?)),
        "remove" => {
            let id = request.task_id()?;
            let removed = manager.remove(&id).await?;
            if removed {
                tracing::info!(task = %id, "task removed");
            }
            Ok(json!({ "id": id, "removed": removed }))
        }
        "stop" => Ok(json!({ "stopping": true })),
        other => Err(DaemonError::Protocol(format!("unknown command '{other}'"))),
    }
}

async fn build_status_payload(ctx: &ServerContext) -> Result<Value, DaemonError> {
    let tasks = ctx.manager.list().await?;
    let templates = tasks.iter().filter(|t| t.is_template).count();
    let active = ctx.manager.active_ids();

    Ok(json!({
        "running": true,
        "pid": std::process::id(),
        "started_at": ctx.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        "scheduled": tasks.len() - templates,
        "templates": templates,
        "active": active,
        "last_runs": ctx.manager.recent_runs(),
        "data_dir": ctx.data_dir.display().to_string(),
        "tasks_file": tasks_path(&ctx.data_dir).display().to_string(),
        "socket": socket_path(&ctx.data_dir).display().to_string(),
        "log": service_log_path(&ctx.data_dir).display().to_string(),
    }))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(data_dir: &Path) -> Result<(), DaemonError> {
    let logs = logs_dir(data_dir);
    if !logs.exists() {
        fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Log to stdout and append to the service log. Library crates log through
/// the `log` facade, which the subscriber bridges.
fn init_tracing(log_file: &Path) -> Result<(), DaemonError> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| io_err(log_file, e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stdout.and(Mutex::new(file)))
        .try_init();
    Ok(())
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
