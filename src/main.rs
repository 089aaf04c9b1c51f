//! Edge Gateway - CLI Application
//!
//! Runs the gateway server and offers offline tooling around its
//! configuration:
//! - Validate a configuration and print the compiled rule table
//! - Check how a single request path would be dispatched
//! - Generate a sample configuration

use clap::{Parser, Subcommand};
use edge_gateway::{config::GatewayConfig, server, Dispatch, Gateway};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Edge Gateway - gates a reserved API namespace in front of a web application
#[derive(Parser)]
#[command(name = "edge-gateway")]
#[command(version, about = "Edge request router and API gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Start {
        /// Configuration file path
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Validate the configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Show how a request path would be dispatched
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "config.toml")]
        config: String,
        /// Request path, optionally with a query string
        path: String,
    },
    /// Generate a sample configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "config.toml")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config } => start_server(&config).await?,
        Commands::Validate { config } => validate_config(&config)?,
        Commands::Check { config, path } => check_path(&config, &path)?,
        Commands::Init { output } => generate_sample_config(&output)?,
    }

    Ok(())
}

/// Start the gateway server
async fn start_server(config_path: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = GatewayConfig::from_file(config_path)?;
    tracing::info!("Loaded configuration from {}", config_path);

    server::run(config).await
}

/// Validate configuration file
fn validate_config(config_path: &str) -> anyhow::Result<()> {
    let gateway = match GatewayConfig::from_file(config_path)
        .and_then(|config| Ok((Gateway::from_config(&config)?, config)))
    {
        Ok((gateway, config)) => {
            println!("✓ Configuration is valid!");
            println!();
            println!("Server: {}:{}", config.server.host, config.server.port);
            gateway
        }
        Err(e) => {
            eprintln!("✗ Configuration is invalid:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("Mode: {}", gateway.mode());
    println!("Reserved prefix: {}", gateway.prefix());
    println!();
    println!("Local paths:");
    for path in gateway.table().local_paths() {
        println!("  ✓ {}", path);
    }
    println!();
    println!("Prefix rules:");
    for rule in gateway.table().rules() {
        println!("  {}/* ({})", rule.prefix, rule.policy);
    }
    println!();
    println!("Rewrites:");
    for rule in gateway.rewrites().rules() {
        println!("  {} → {}", rule.source(), rule.destination());
    }
    Ok(())
}

/// Print the dispatch decision for one path
fn check_path(config_path: &str, path_and_query: &str) -> anyhow::Result<()> {
    let config = GatewayConfig::from_file(config_path)?;
    let gateway = Gateway::from_config(&config)?;

    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };

    match gateway.dispatch(path, query) {
        Dispatch::PassThrough => println!("pass-through: outside {}", gateway.prefix()),
        Dispatch::Local => println!("local: served by the in-process handler"),
        Dispatch::Reject(reason) => println!(
            "blocked ({}): {} {}",
            reason,
            edge_gateway::gateway::REJECTION_STATUS.as_u16(),
            edge_gateway::gateway::REJECTION_BODY
        ),
        Dispatch::Forward(target) => println!("forward: {}", target),
    }
    Ok(())
}

/// Generate sample configuration file
fn generate_sample_config(output_path: &str) -> anyhow::Result<()> {
    let sample_config = r#"# Edge Gateway Configuration

[server]
host = "0.0.0.0"
port = 8080
timeout = 30
# Public origin of this gateway, used to refuse upstreams that loop back
origin = "http://localhost:8080"

[metrics]
enabled = true
path = "/metrics"

[health]
enabled = true
path = "/health"

[gateway]
prefix = "/api"
mode = "reject"  # Options: reject, proxy
upstream_origin = "https://backend.example"
local_paths = [
    "/api/celsius-to-fahrenheit",
    "/api/fahrenheit-to-celsius",
    "/api/nba",
    "/api/nfl",
    "/api/weather",
    "/api/leads",
    "/api/player-telemetry",
    "/api/diagnostics",
    "/api/uuid",
]

# Identifier family: /api/uuid/<id>
[[gateway.prefix_rules]]
prefix = "/api/uuid"
policy = "allow_subtree"  # Options: allow_subtree, deny_subtree

# Optional explicit rewrites; without them everything under the prefix is
# forwarded to upstream_origin in proxy mode
# [[rewrites]]
# source = "/api/:path*"
# destination = "https://backend.example/api/:path*"
"#;

    std::fs::write(output_path, sample_config)?;
    println!("Sample configuration written to {}", output_path);
    Ok(())
}
