use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use peerchat::terminal::{self, Command};
use peerchat::{Node, NodeConfig};

/// A peer-to-peer chat node: listens for peers, connects to peers, and broadcasts what you
/// type to all of them.
#[derive(Parser, Debug)]
#[command(name = "peerchat", version)]
struct Args {
    /// Port to listen on for incoming peers.
    port: u16,
    /// Name shown to peers on every message you send.
    username: String,
    /// Interface to listen on.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,
    /// How long a `connect` may take before it is abandoned.
    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Chat output goes to stdout; keep logs on stderr and quiet unless asked.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = NodeConfig::new(args.port, args.username)
        .with_listen_addr(SocketAddr::new(args.bind, args.port))
        .with_connect_timeout(Duration::from_millis(args.connect_timeout_ms));

    let (node, mut events) = match Node::start(config).await {
        Ok(started) => started,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "[{}] Listening on port {}",
        node.username(),
        node.local_addr().port()
    );
    println!("{}", terminal::HELP);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", terminal::render_event(&event));
        }
    });

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match input.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "failed to read stdin");
                break;
            }
        };
        match Command::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => {
                if let Some(output) = terminal::execute(&node, command) {
                    println!("{}", output);
                }
            }
            Ok(None) => {}
            Err(err) => println!("{}", err),
        }
    }

    println!("Shutting down...");
    node.shutdown().await;
    // The node holds the only event sender; dropping it lets the printer drain and finish.
    drop(node);
    let _ = printer.await;
    println!("Bye.");
    ExitCode::SUCCESS
}
