//! `ribcage-server` — bind a broker and run it until SIGINT.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use ribcage::server::Server;
use ribcage::session::DEFAULT_GRACE;

/// Single-host publish/subscribe message broker.
#[derive(Parser, Debug)]
#[command(name = "ribcage-server", version, about)]
struct Args {
    /// Interface to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 7878)]
    port: u16,

    /// Reconnect grace window, in seconds.
    #[arg(long, default_value_t = DEFAULT_GRACE.as_secs())]
    grace_secs: u64,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.host, args.port);

    // `signal_hook::flag::register` sets its flag to `true` on receipt, so it
    // tracks "stop requested" rather than the server's own "keep running" —
    // a small bridge thread translates one into the other.
    let stop_requested = Arc::new(AtomicBool::new(false));
    if let Err(err) =
        signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&stop_requested))
    {
        log::error!("[server] failed to register SIGINT handler: {err}");
        return ExitCode::FAILURE;
    }
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        thread::spawn(move || {
            while !stop_requested.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(100));
            }
            log::info!("[server] SIGINT received, shutting down");
            running.store(false, Ordering::Relaxed);
        });
    }

    let grace = Duration::from_secs(args.grace_secs);
    let server = match Server::bind_with_grace(&bind_addr, grace, running) {
        Ok(server) => server,
        Err(err) => {
            log::error!("[server] failed to bind {bind_addr}: {err}");
            return ExitCode::FAILURE;
        }
    };

    server.run();
    ExitCode::SUCCESS
}
