use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tileshard_server::{Action, GameServer, MemoryStore, NullScript, ServerConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Server bind IPv4 address.
    #[clap(long)]
    ip: Option<String>,

    /// Game TCP port.
    #[clap(long, default_value = "7777")]
    port: u16,

    /// Debug dashboard HTTP port; 0 disables the dashboard.
    #[clap(long, default_value = "8081")]
    dashboard_port: u16,

    /// Map size in tiles (square).
    #[clap(long, default_value = "100")]
    map_size: i16,
}

impl Args {
    fn config(&self) -> Result<ServerConfig> {
        let ip = match &self.ip {
            Some(addr) => Ipv4Addr::from_str(addr)?,
            None => Ipv4Addr::UNSPECIFIED,
        };
        Ok(ServerConfig {
            addr: SocketAddr::V4(SocketAddrV4::new(ip, self.port)),
            dashboard_addr: (self.dashboard_port != 0)
                .then(|| SocketAddr::V4(SocketAddrV4::new(ip, self.dashboard_port))),
            map_width: self.map_size,
            map_height: self.map_size,
        })
    }
}

async fn start_server(config: &ServerConfig) -> Result<GameServer> {
    let server = GameServer::start(
        config.clone(),
        Box::new(NullScript),
        Arc::new(MemoryStore::default()),
    )
    .await?;
    log::info!("Server started");
    Ok(server)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp_micros()
        .init();
    let args = Args::parse();
    let config = args.config()?;

    // Auto-start on launch, then hand control to the console.
    let mut server = Some(start_server(&config).await?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        match words.next().unwrap_or("") {
            "" => {}
            "start" => {
                if server.is_some() {
                    log::warn!("Server already running");
                } else {
                    server = Some(start_server(&config).await?);
                }
            }
            "stop" | "q" => match server.take() {
                Some(running) => {
                    running.shutdown().await;
                    log::info!("Server stopped");
                }
                None => log::warn!("Server not running"),
            },
            "restart" => {
                if let Some(running) = server.take() {
                    running.shutdown().await;
                }
                server = Some(start_server(&config).await?);
            }
            "r" => match &server {
                Some(running) => running.reload_scripts(),
                None => log::warn!("Server not running"),
            },
            "stats" => match &server {
                Some(running) => {
                    println!("{}", running.bandwidth_stats());
                    println!("{}", running.stats_json());
                }
                None => log::warn!("Server not running"),
            },
            "status" => {
                log::info!(
                    "Server is {}",
                    if server.is_some() { "running" } else { "stopped" },
                );
            }
            "bots" => match &server {
                Some(running) => {
                    let count = words.next().and_then(|w| w.parse().ok()).unwrap_or(100);
                    let clustered = words.next() != Some("spread");
                    running.actions().push(Action::SpawnBots { count, clustered });
                }
                None => log::warn!("Server not running"),
            },
            "nobots" => match &server {
                Some(running) => running.actions().push(Action::RemoveBots),
                None => log::warn!("Server not running"),
            },
            "exit" | "quit" => break,
            "help" => {
                println!(
                    "Commands: start, stop, restart, r (reload scripts), stats, status, \
                     bots [n] [spread], nobots, exit",
                );
            }
            other => println!("Unknown command '{other}' (try 'help')"),
        }
    }

    if let Some(running) = server.take() {
        running.shutdown().await;
    }
    Ok(())
}
