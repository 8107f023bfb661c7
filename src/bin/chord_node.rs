//! `chord-node`: runs one ring member over TCP and reads commands from stdin.
//!
//! ```text
//! chord-node --listen 127.0.0.1:8081
//! chord-node --listen 127.0.0.1:8082 --seed 127.0.0.1:8081
//! chord-node --listen 0.0.0.0:8083 --advertise 10.0.0.7:8083 --seed 10.0.0.2:8081
//! ```

use anyhow::Context;
use chordring::config::Config;
use chordring::core::{Identity, IrrevocableContext};
use chordring::discovery::{bootstrap, Discovery, PingDiscovery, StaticDiscovery};
use chordring::logging::{init_logging, LogLevel};
use chordring::network::tcp::TcpNetwork;
use chordring::network::Network;
use chordring::node::{spawn_maintenance, ChordNode, Node};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "chord-node", about = "A member of a Chord distributed hash table")]
struct Cli {
    /// YAML configuration file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, as host:port.
    #[arg(long)]
    listen: Option<String>,

    /// Address other members reach this node at, as host:port.
    #[arg(long)]
    advertise: Option<String>,

    /// Member to join through; may be repeated.
    #[arg(long = "seed")]
    seeds: Vec<String>,

    /// Ping seeds before trying to join through them.
    #[arg(long)]
    ping_seeds: bool,

    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(advertise) = self.advertise {
            config.advertise = Some(advertise);
        }
        if !self.seeds.is_empty() {
            config.seeds = self.seeds;
        }
        config.ping_seeds |= self.ping_seeds;
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;
    let _guard = init_logging(config.log_level, config.log_dir.as_deref())?;

    let span = tracing::span!(tracing::Level::INFO, "chord_node_main");
    let ctx = IrrevocableContext::new(&span, "chord-node");

    let ring = config.ring()?;
    let bound = TcpNetwork::bind(&span, config.listen_address()?).await?;
    let advertised = config.advertise_address(bound.local_address())?;
    let net = bound.advertise(advertised);
    let identity = Identity::from_address(&ring, net.local_address());
    let node = ChordNode::new(
        &span,
        identity,
        ring,
        config.node_options()?,
        Box::new(net.clone()),
    )?;

    let server = {
        let net = net.clone();
        let ctx = ctx.child("server");
        tokio::spawn(async move {
            if let Err(e) = net.serve(ctx.clone()).await {
                ctx.throw_irrecoverable(e);
            }
        })
    };

    let seeds = config.seed_addresses()?;
    let discovery: Box<dyn Discovery> = if config.ping_seeds {
        Box::new(PingDiscovery::new(
            &span,
            net.clone_box(),
            seeds,
            config.node_options()?.rpc_timeout,
        ))
    } else {
        Box::new(StaticDiscovery::new(net.local_address(), seeds))
    };
    let joining = node.clone();
    tokio::task::spawn_blocking(move || bootstrap(&joining, discovery.as_ref()))
        .await
        .context("bootstrap task failed")??;

    let maintenance = spawn_maintenance(&ctx.child("maintenance"), &node, config.maintenance());
    println!(
        "{} is up; commands: put <key> <value>, get <key>, find <id>, describe, quit",
        identity
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else { break };
                let worker = node.clone();
                let keep_going = tokio::task::spawn_blocking(move || run_command(&worker, &line))
                    .await
                    .context("command task failed")?;
                if !keep_going {
                    break;
                }
            }
        }
    }

    ctx.cancel();
    for handle in maintenance {
        let _ = handle.await;
    }
    let _ = server.await;
    tracing::info!("{} stopped", identity);
    Ok(())
}

/// Runs one stdin command and prints its outcome. Returns false when the node should stop.
fn run_command(node: &ChordNode, line: &str) -> bool {
    let mut words = line.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (None, _, _) => {}
        (Some("quit" | "exit"), None, None) => return false,
        (Some("describe"), None, None) => println!("{}", node.describe()),
        (Some("put"), Some(key), Some(_)) => {
            // the value is the rest of the line, spaces included
            let value = line.trim_start()[3..].trim_start()[key.len()..].trim();
            match node.insert(key, value) {
                Ok(()) => println!("stored {:?}", key),
                Err(e) => println!("put failed: {}", e),
            }
        }
        (Some("get"), Some(key), None) => match node.lookup(key) {
            Ok(Some(value)) => println!("{}", value),
            Ok(None) => println!("{:?} not found", key),
            Err(e) => println!("get failed: {}", e),
        },
        (Some("find"), Some(id), None) => match id.parse::<u64>() {
            Ok(raw) => match node.find_successor(node.ring().identifier(raw)) {
                Ok(owner) => println!("{}", owner),
                Err(e) => println!("find failed: {}", e),
            },
            Err(e) => println!("invalid identifier {:?}: {}", id, e),
        },
        _ => println!("unknown command {:?}", line.trim()),
    }
    true
}
