//! `ribcage-client` — interactive command-line client.
//!
//! Commands, one per line on stdin:
//!
//! ```text
//! list
//! create <name>
//! delete <name>
//! sub <name>
//! unsub <name>
//! pub <name> <ttl_secs> <text...>
//! exit
//! ```

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ribcage::client::{Client, Event};

/// Interactive client for a ribcage broker.
#[derive(Parser, Debug)]
#[command(name = "ribcage-client", version, about)]
struct Args {
    /// Broker address to connect to.
    #[arg(long, default_value = "127.0.0.1:7878")]
    addr: String,

    /// Client id to log in with.
    #[arg(long)]
    id: String,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let client = match Client::connect(&args.addr, &args.id) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            eprintln!("login failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    let printer = {
        let client = Arc::clone(&client);
        std::thread::spawn(move || print_events(&client))
    };

    println!("connected as {}; type 'help' for commands", args.id);
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        if let Err(msg) = run_command(&client, line) {
            eprintln!("{msg}");
        }
        if !client.is_connected() {
            println!("disconnected from broker");
            break;
        }
    }

    drop(client);
    let _ = printer.join();
    ExitCode::SUCCESS
}

fn run_command(client: &Client, line: &str) -> Result<(), String> {
    let mut parts = line.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match cmd {
        "help" => {
            println!("list | create <name> | delete <name> | sub <name> | unsub <name> | pub <name> <ttl> <text> | exit");
            Ok(())
        }
        "list" => {
            println!("(catalog arrives as an event; watch the event stream)");
            Ok(())
        }
        "create" => client.create_queue(rest).map_err(|e| e.to_string()),
        "delete" => client.delete_queue(rest).map_err(|e| e.to_string()),
        "sub" => client.subscribe(rest).map_err(|e| e.to_string()),
        "unsub" => client.unsubscribe(rest).map_err(|e| e.to_string()),
        "pub" => {
            let mut fields = rest.splitn(3, ' ');
            let name = fields.next().unwrap_or("");
            let ttl: u32 = fields
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| "usage: pub <name> <ttl_secs> <text>".to_string())?;
            let text = fields.next().unwrap_or("");
            client
                .publish(name, ttl, text.as_bytes())
                .map_err(|e| e.to_string())
        }
        other => Err(format!("unknown command: {other}")),
    }
}

fn print_events(client: &Client) {
    let stdout = io::stdout();
    while client.is_connected() {
        if let Some(event) = client.poll_event(Duration::from_millis(300)) {
            let mut out = stdout.lock();
            match event {
                Event::QueueList(names) => {
                    let _ = writeln!(out, "queues: {}", names.join(", "));
                }
                Event::Message { source, text } => {
                    let _ = writeln!(
                        out,
                        "[{source}] {}",
                        String::from_utf8_lossy(&text)
                    );
                }
                Event::BatchMessages { source, items } => {
                    for text in items {
                        let _ = writeln!(
                            out,
                            "[{source}] (retained) {}",
                            String::from_utf8_lossy(&text)
                        );
                    }
                }
                Event::StatusUpdate(status) => {
                    let _ = writeln!(out, "ok: {status}");
                }
                Event::Error(reason) => {
                    let _ = writeln!(out, "error: {reason}");
                }
                Event::QueueDeleted(name) => {
                    let _ = writeln!(out, "queue deleted: {name}");
                }
                Event::Disconnected(reason) => {
                    let _ = writeln!(out, "disconnected: {reason}");
                    return;
                }
            }
        }
    }
}
