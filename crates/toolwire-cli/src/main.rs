mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use toolwire_mcp::{DiscoveryReport, McpDiscoveryManager, ServerOutcome};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "toolwire", about = "Toolwire: MCP server discovery")]
struct Cli {
    /// Path to config file (defaults to ./toolwire.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log server stderr and wire-level details
    #[arg(long)]
    debug: bool,

    /// Extra stdio server to run, given as one shell-style command line
    #[arg(long = "command", value_name = "COMMAND")]
    ad_hoc_command: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover all configured servers and list what they expose
    Discover,
    /// Discover, then send one JSON-RPC request to a connected server
    Request {
        /// Server name as configured
        server: String,
        /// JSON-RPC method, e.g. `tools/list`
        method: String,
        /// Request params as a JSON document
        #[arg(long)]
        params: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .json()
        .init();

    let config = config::load(cli.config.as_deref()).await?;
    let params: Option<serde_json::Value> = match &cli.command {
        Commands::Request {
            params: Some(raw), ..
        } => Some(
            serde_json::from_str(raw)
                .map_err(|e| anyhow::anyhow!("--params is not valid JSON: {e}"))?,
        ),
        _ => None,
    };

    let manager = McpDiscoveryManager::new(config.manager_options(cli.debug));
    info!(servers = config.mcp_servers.len(), "Loaded MCP server configuration");
    let report = manager
        .discover_all(&config.mcp_servers, cli.ad_hoc_command.as_deref())
        .await?;

    let result = match cli.command {
        Commands::Discover => {
            print_discovery(&manager, &report);
            Ok(())
        }
        Commands::Request { server, method, .. } => {
            match manager
                .request::<serde_json::Value>(&server, &method, params)
                .await
            {
                Ok(value) => {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                    Ok(())
                }
                Err(e) => Err(anyhow::Error::new(e)),
            }
        }
    };

    manager.shutdown().await;
    result
}

fn print_discovery(manager: &McpDiscoveryManager, report: &DiscoveryReport) {
    if report.outcomes.is_empty() {
        println!("No MCP servers configured.");
        println!("Add servers to toolwire.toml under [mcp_servers.<name>] or pass --command");
        return;
    }

    println!("MCP servers:");
    for status in manager.server_statuses() {
        let detail = match report.outcome(&status.name) {
            Some(ServerOutcome::Connected { tools, prompts }) => {
                format!("{tools} tool(s), {prompts} prompt(s)")
            }
            Some(ServerOutcome::Reclaimed) => "no enabled tools or prompts".to_string(),
            Some(ServerOutcome::Failed { error }) => error.clone(),
            Some(ServerOutcome::Cancelled) => "cancelled".to_string(),
            None => String::new(),
        };
        println!("  {} [{}] {}", status.name, status.state, detail);
    }

    let tools = manager.tool_registry().all();
    if !tools.is_empty() {
        println!("\nTools:");
        for tool in &tools {
            let trust = if tool.is_trusted() { " (trusted)" } else { "" };
            println!("  {}{}: {}", tool.name(), trust, tool.description());
        }
    }

    let prompts = manager.prompt_registry().all();
    if !prompts.is_empty() {
        println!("\nPrompts:");
        for prompt in &prompts {
            let params: Vec<String> = prompt
                .parameters
                .iter()
                .map(|p| {
                    if p.required {
                        p.name.clone()
                    } else {
                        format!("{}?", p.name)
                    }
                })
                .collect();
            println!(
                "  {}({}) from {}: {}",
                prompt.name,
                params.join(", "),
                prompt.server_name,
                prompt.description
            );
        }
    }

    println!(
        "\nTotal: {} connected, {} tool(s), {} prompt(s)",
        report.connected().count(),
        tools.len(),
        prompts.len()
    );
}
