// SPDX-License-Identifier: MIT

//! `scaorchd`: the background process behind the `scaorch` CLI and REST
//! surfaces. Not meant to be invoked directly by end users.

use fs2::FileExt;
use scaorch_daemon::{server, worker, DaemonPaths, Runtime};
use std::io::Write;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("scaorchd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("scaorchd {}", env!("CARGO_PKG_VERSION"));
                println!("Background process behind the scaorch CLI. Not meant to be run directly.");
                return Ok(());
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                std::process::exit(1);
            }
        }
    }

    let paths = DaemonPaths::load()?;
    paths.ensure_dirs()?;

    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&paths.lock_path)?;
    if lock_file.try_lock_exclusive().is_err() {
        eprintln!("scaorchd is already running (lock held at {})", paths.lock_path.display());
        std::process::exit(1);
    }
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    let _log_guard = setup_logging(&paths)?;
    info!("starting scaorchd");

    let env_map = scaorch_daemon::env::config_env_map();
    let config = scaorch_core::Config::from_env_map(&env_map)?;
    let backend_is_queue = config.r#async;

    let (runtime, queue_receiver) = Runtime::build(config, &paths)?;
    let runtime = std::sync::Arc::new(runtime);

    let _ = std::fs::remove_file(&paths.socket_path);
    let listener = tokio::net::UnixListener::bind(&paths.socket_path)?;
    info!(socket = %paths.socket_path.display(), "listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let server_task = tokio::spawn(server::serve(listener, runtime.clone(), shutdown_rx));

    if backend_is_queue {
        if let Some(receiver) = queue_receiver {
            tokio::spawn(worker::run(receiver, runtime.clone()));
        }
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    let _ = shutdown_tx.send(true);
    let _ = server_task.await;

    let _ = std::fs::remove_file(&paths.socket_path);
    let _ = std::fs::remove_file(&paths.lock_path);
    info!("scaorchd stopped");
    Ok(())
}

fn setup_logging(
    paths: &DaemonPaths,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = paths.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = paths
        .log_path
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no log directory"))?;
    let file_name = paths
        .log_path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no log file name"))?;
    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
