use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use quorum_lite::config::{parse_cluster_nodes, NodeConfig};
use quorum_lite::node::Node;
use quorum_lite::raft::{NodeRole, NodeStatus, RuntimeStatus};
use quorum_lite::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "quorum-lite")]
#[command(version)]
#[command(about = "Leader election for a static cluster of nodes")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a quorum-lite server node
    Server(ServerArgs),

    /// Inspect or control a running node
    Node {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: NodeCommands,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Node ID (unique identifier for this node)
    #[arg(long, env = "NODE_ID")]
    node_id: String,

    /// Port to listen on for HTTP
    #[arg(long, env = "SERVER_PORT", default_value = "8000")]
    port: u16,

    /// Interface to bind
    #[arg(long, env = "BIND_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Address peers use to reach this node (default: localhost:<port>)
    #[arg(long, env = "ADVERTISE_ADDR")]
    advertise_addr: Option<String>,

    /// All cluster member addresses, this node included (comma-separated host:port)
    /// Example: "localhost:8000,localhost:8001,localhost:8002"
    #[arg(long, env = "CLUSTER_NODES")]
    cluster_nodes: String,

    /// Lower bound of the randomized election timeout
    #[arg(long, env = "ELECTION_TIMEOUT_MIN_MS", default_value = "150")]
    election_timeout_min_ms: u64,

    /// Upper bound of the randomized election timeout
    #[arg(long, env = "ELECTION_TIMEOUT_MAX_MS", default_value = "300")]
    election_timeout_max_ms: u64,

    /// Monitor period; the leader sends heartbeats this often
    #[arg(long, env = "HEARTBEAT_INTERVAL_MS", default_value = "50")]
    heartbeat_interval_ms: u64,

    /// Timeout for a single call to a peer
    #[arg(long, env = "RPC_TIMEOUT_MS", default_value = "200")]
    rpc_timeout_ms: u64,

    /// How often an initialized node looks for a leader until it finds one
    #[arg(long, env = "READINESS_INTERVAL_MS", default_value = "5000")]
    readiness_interval_ms: u64,

    /// Period of the status stream
    #[arg(long, env = "STATUS_STREAM_INTERVAL_MS", default_value = "500")]
    status_stream_interval_ms: u64,

    /// Persist node state as JSON files in this directory (in-memory if unset)
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Initialize the node right after startup
    #[arg(long, env = "AUTO_INITIALIZE")]
    auto_initialize: bool,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Node address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:8000")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum NodeCommands {
    /// Show the node's own status
    Status,
    /// Show the status of every cluster member as seen by the node
    Cluster,
    /// Show election deadline and heartbeat diagnostics
    Runtime,
    /// Stop the node (it reports DOWN and stops participating)
    Stop,
    /// Resume a stopped node
    Resume,
    /// Create the node's state and look for a leader
    Initialize,
    /// Make the node campaign for leadership now
    StartElection,
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listen_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let advertise_addr = args
        .advertise_addr
        .unwrap_or_else(|| format!("localhost:{}", args.port));

    let config = NodeConfig {
        node_id: args.node_id,
        listen_addr,
        advertise_addr,
        cluster_nodes: parse_cluster_nodes(&args.cluster_nodes),
        election_timeout_min_ms: args.election_timeout_min_ms,
        election_timeout_max_ms: args.election_timeout_max_ms,
        heartbeat_interval_ms: args.heartbeat_interval_ms,
        rpc_timeout_ms: args.rpc_timeout_ms,
        readiness_interval_ms: args.readiness_interval_ms,
        status_stream_interval_ms: args.status_stream_interval_ms,
        data_dir: args.data_dir,
        auto_initialize: args.auto_initialize,
    };

    tracing::info!(
        node_id = %config.node_id,
        listen_addr = %config.listen_addr,
        advertise_addr = %config.advertise_addr,
        cluster_nodes = ?config.cluster_nodes,
        election_timeout_ms = ?(config.election_timeout_min_ms..=config.election_timeout_max_ms),
        heartbeat_interval_ms = config.heartbeat_interval_ms,
        data_dir = ?config.data_dir,
        auto_initialize = config.auto_initialize,
        "Starting quorum-lite node"
    );

    let shutdown = install_shutdown_handler()?;
    let node = Node::new(config).await?;
    node.run(shutdown).await?;

    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

fn endpoint(addr: &str, path: &str) -> String {
    let base = if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", addr.trim_end_matches('/'))
    };
    format!("{}/raft/{}", base, path)
}

async fn checked(
    resp: reqwest::Response,
) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(format!("{}: {}", status, body).into())
}

fn status_header() -> String {
    format!(
        "{:<12} {:<25} {:<14} {:<6} VOTED FOR",
        "ID", "ADDRESS", "ROLE", "TERM"
    )
}

fn status_row(s: &NodeStatus) -> String {
    let icon = match s.role {
        NodeRole::Leader => "[*]",
        NodeRole::Down => "[-]",
        _ => "[+]",
    };
    // Display impls ignore width, so pad the rendered role
    let role = format!("{} {}", icon, s.role);
    format!(
        "{:<12} {:<25} {:<14} {:<6} {}",
        s.node_id,
        s.address,
        role,
        s.current_term,
        s.voted_for.as_deref().unwrap_or("-")
    )
}

fn print_status_table(statuses: &[NodeStatus]) {
    println!("{}", status_header());
    println!("{}", "-".repeat(70));
    for s in statuses {
        println!("{}", status_row(s));
    }
}

async fn handle_status(
    http: &reqwest::Client,
    client: &ClientArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let resp = checked(http.get(endpoint(&client.addr, "status")).send().await?).await?;
    let status: NodeStatus = resp.json().await?;

    match client.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Table => {
            println!("Node Status");
            println!("{}", "=".repeat(40));
            println!("ID:        {}", status.node_id);
            println!("Address:   {}", status.address);
            println!("Role:      {}", status.role);
            println!("Term:      {}", status.current_term);
            println!(
                "Voted for: {}",
                status.voted_for.as_deref().unwrap_or("-")
            );
            println!("Stopped:   {}", status.stopped);
        }
    }
    Ok(())
}

async fn handle_cluster(
    http: &reqwest::Client,
    client: &ClientArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let resp = checked(http.get(endpoint(&client.addr, "cluster")).send().await?).await?;
    let statuses: Vec<NodeStatus> = resp.json().await?;

    match client.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
        OutputFormat::Table => {
            let leader = statuses.iter().find(|s| s.role == NodeRole::Leader);
            println!("Cluster Status");
            println!("{}", "=".repeat(40));
            match leader {
                Some(l) => println!("Leader: {} (term {})", l.node_id, l.current_term),
                None => println!("Leader: none"),
            }
            println!();
            print_status_table(&statuses);
        }
    }
    Ok(())
}

async fn handle_runtime(
    http: &reqwest::Client,
    client: &ClientArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let resp = checked(http.get(endpoint(&client.addr, "runtime")).send().await?).await?;

    match client.output {
        OutputFormat::Json => {
            let value: serde_json::Value = resp.json().await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Table => {
            let runtime: RuntimeStatus = resp.json().await?;
            println!("Runtime");
            println!("{}", "=".repeat(40));
            println!("ID:                   {}", runtime.node_id);
            println!("Election in progress: {}", runtime.election_in_progress);
            println!(
                "Election deadline:    {} ms",
                runtime.election_deadline_in_ms
            );
            match runtime.last_heartbeat_at {
                Some(at) => println!("Last heartbeat:       {}", at.to_rfc3339()),
                None => println!("Last heartbeat:       never"),
            }
        }
    }
    Ok(())
}

async fn handle_action(
    http: &reqwest::Client,
    client: &ClientArgs,
    command: NodeCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let (request, done) = match command {
        NodeCommands::Stop => (http.get(endpoint(&client.addr, "stop")), None),
        NodeCommands::Resume => (http.get(endpoint(&client.addr, "resume")), None),
        NodeCommands::Initialize => (
            http.post(endpoint(&client.addr, "initialize")),
            Some("Node initialized."),
        ),
        NodeCommands::StartElection => (
            http.post(endpoint(&client.addr, "start-election")),
            Some("Election started."),
        ),
        _ => return Err("not an action command".into()),
    };

    let resp = checked(request.send().await?).await?;
    let message = match done {
        Some(message) => message.to_string(),
        None => resp.text().await?,
    };

    match client.output {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "message": message }))?
        ),
        OutputFormat::Table => println!("{}", message),
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Node { client, command } => {
            let http = reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()?;

            match command {
                NodeCommands::Status => handle_status(&http, &client).await?,
                NodeCommands::Cluster => handle_cluster(&http, &client).await?,
                NodeCommands::Runtime => handle_runtime(&http, &client).await?,
                action => handle_action(&http, &client, action).await?,
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_lite::raft::NodeState;

    #[test]
    fn status_table_columns_line_up() {
        let header = status_header();
        let term_col = header.find("TERM").unwrap();
        let voted_col = header.find("VOTED FOR").unwrap();

        for role in [NodeRole::Leader, NodeRole::Candidate, NodeRole::Follower, NodeRole::Down] {
            let mut state = NodeState::new("node1");
            state.role = role;
            state.current_term = 7;
            state.voted_for = Some("node2".to_string());
            let row = status_row(&NodeStatus::from_state(&state, "localhost:8000"));

            assert_eq!(row.find(" 7 ").map(|i| i + 1), Some(term_col), "row: {}", row);
            assert_eq!(row.find("node2"), Some(voted_col), "row: {}", row);
        }
    }
}
