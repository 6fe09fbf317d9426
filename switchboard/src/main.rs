//! Switchboard CLI
//!
//! # Usage
//!
//! ```bash
//! # Serve the HTTP API
//! switchboard serve
//!
//! # Ask one question
//! switchboard ask "what alerts are firing?"
//!
//! # Show what each capability server offers
//! switchboard tools
//!
//! # Chart data for a PromQL range query
//! switchboard graph 'rate(http_requests_total{job="api"}[5m])' --step 5m
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use mcp_sdk::client::Credential;
use switchboard::config::SwitchboardConfig;
use switchboard::orchestration::Query;
use switchboard::runtime::Runtime;
use switchboard::server::start_server;
use switchboard::tools::{GraphProxy, GraphRequest};

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Switchboard - routes cluster questions to read-only capability servers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Override the configured host
        #[arg(long)]
        host: Option<String>,

        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask a single question
    Ask {
        /// The question
        text: String,

        /// Conversation to continue
        #[arg(long)]
        conversation: Option<String>,

        /// Bearer token forwarded to capability servers
        #[arg(long, env = "OPENSHIFT_USER_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// List the tool set each capability server advertises
    Tools,

    /// Run a range query and print the chart envelope
    Graph {
        /// PromQL expression
        query: String,

        /// What the chart shows
        #[arg(short, long, default_value = "")]
        description: String,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        #[arg(long)]
        step: Option<String>,

        /// Bearer token forwarded to the metrics server
        #[arg(long, env = "OPENSHIFT_USER_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = SwitchboardConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let runtime = Runtime::start(config).await?;
            start_server(runtime).await?;
        }

        Commands::Ask {
            text,
            conversation,
            token,
        } => {
            let runtime = Runtime::start(config).await?;
            let conversation = conversation.unwrap_or_else(|| Uuid::new_v4().to_string());
            let query = Query::new(text, conversation).with_token(token);

            let cancel = CancellationToken::new();
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel();
                    }
                }
            });

            let response = runtime.orchestrator.handle_turn(query, cancel).await?;
            println!("{}", response.text);
        }

        Commands::Tools => {
            let invoker = Runtime::invoker()?;
            let (registry, report) = Runtime::discover(&config, invoker.as_ref()).await;

            for (name, result) in &report.entries {
                let endpoint = registry.get(name).map(|d| d.tool_endpoint.as_str()).unwrap_or_default();
                match result {
                    Ok(tool_set) => {
                        println!("{} ({}) v{}", name, endpoint, tool_set.version);
                        for operation in &tool_set.operations {
                            println!("  {}", operation);
                        }
                    }
                    Err(failure) => println!("{} ({}) unreachable: {}", name, endpoint, failure),
                }
            }
        }

        Commands::Graph {
            query,
            description,
            start,
            end,
            step,
            token,
        } => {
            let invoker = Runtime::invoker()?;
            let (registry, _) = Runtime::discover(&config, invoker.as_ref()).await;
            let descriptor = registry
                .get("metrics")
                .context("The metrics capability is not enabled")?;

            let proxy = GraphProxy::for_capability(invoker.clone(), descriptor);
            let request = GraphRequest {
                query,
                description,
                start,
                end,
                step,
            };
            let envelope = proxy.graph(&request, token.map(Credential::bearer)).await;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("switchboard=debug,mcp_sdk=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("switchboard=info,mcp_sdk=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
