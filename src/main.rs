//! CLI for the topic relay
//!
//! Subcommands:
//! - `server`: run the relay
//! - `client`: join a topic, print what arrives and send stdin lines

use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tracing::{error, info};
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use topic_relay::config::{DEFAULT_CONFIG_PATH, load_config_from};
use topic_relay::utils::logging;
use topic_relay::{RelayError, RelayServer, Settings};

#[derive(Parser)]
#[command(name = "topic-relay", about = "Topic-scoped WebSocket relay")]
struct Cli {
    /// Config file, with or without extension
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the relay server
    Server {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Connect to a topic and exchange messages from stdin
    Client {
        /// Relay URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080/")]
        url: String,
        #[arg(long)]
        topic: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match load_config_from(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.log.level);

    let result = match cli.command {
        Command::Server { host, port } => run_server(settings, host, port).await,
        Command::Client { url, topic } => run_client(&url, &topic).await,
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run_server(
    mut settings: Settings,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), RelayError> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    let server = RelayServer::bind(settings).await?;
    let shutdown = server.shutdown_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received. Closing connections.");
        }
        shutdown.cancel();
    });

    server.run().await
}

async fn run_client(url: &str, topic: &str) -> Result<(), RelayError> {
    let mut url = Url::parse(url)?;
    url.query_pairs_mut().append_pair("topic", topic);

    let (ws_stream, _response) = connect_async(url.as_str()).await?;
    println!("Connected to relay");
    let (mut sink, mut stream) = ws_stream.split();

    let receiver = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => println!("Received message: {text}"),
                Ok(WsMessage::Close(frame)) => {
                    println!("Connection closed: {frame:?}");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    println!("Connection lost: {e}");
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if receiver.is_finished() {
            break;
        }
        sink.send(WsMessage::text(line)).await?;
    }

    let _ = sink.close().await;
    let _ = receiver.await;
    Ok(())
}
