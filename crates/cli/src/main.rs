use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::flag;

use streamd::Config;
use streamd::server::Server;

#[derive(Parser)]
#[command(name = "streamd", about = "Concurrent RTSP/RTP/RTCP streaming server")]
struct Args {
    /// Path to the server's INI configuration file.
    config: PathBuf,

    /// Run in the foreground (default).
    #[arg(long, conflicts_with = "fork")]
    nofork: bool,

    /// Daemonise: fork to the background and detach from the controlling terminal.
    #[arg(long)]
    fork: bool,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config {}: {e}", args.config.display());
            process::exit(1);
        }
    };
    let pidfile = config.daemon_pidfile.clone();

    if args.fork {
        let mut daemonize = daemonize::Daemonize::new();
        if let Some(pidfile) = &pidfile {
            daemonize = daemonize.pid_file(pidfile);
        }
        if let Err(e) = daemonize.start() {
            eprintln!("failed to daemonise: {e}");
            process::exit(1);
        }
    }

    let mut server = Server::new(config);
    if let Err(e) = server.start() {
        tracing::error!(error = %e, "failed to start server");
        process::exit(1);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, shutdown.clone()).expect("register SIGTERM handler");
    flag::register(SIGINT, shutdown.clone()).expect("register SIGINT handler");

    // SIGHUP re-reads the config file so operators can validate a new one
    // without restarting; applying it to the running `Runtime` would need
    // its `Config` behind a swappable handle, which this server does not
    // yet have (see DESIGN.md).
    let reload = Arc::new(AtomicBool::new(false));
    flag::register(SIGHUP, reload.clone()).expect("register SIGHUP handler");

    tracing::info!(config = %args.config.display(), "server started");

    while !shutdown.load(Ordering::SeqCst) {
        if reload.swap(false, Ordering::SeqCst) {
            match Config::load(&args.config) {
                Ok(_) => tracing::info!("SIGHUP: config file re-read and validated"),
                Err(e) => tracing::warn!(error = %e, "SIGHUP: config file is invalid, keeping running config"),
            }
        }
        std::thread::sleep(Duration::from_millis(250));
    }

    tracing::info!("shutdown signal received");
    server.stop();
}
