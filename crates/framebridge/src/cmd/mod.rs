use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Subcommand};
use framebridge_transport::Endpoint;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod bridge;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Attach named endpoints to one router and forward frames between them.
    Bridge(BridgeArgs),
    /// Accept one connection and print every frame it sends.
    Listen(ListenArgs),
    /// Send a single frame.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Bridge(args) => bridge::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// How a bridge node obtains its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeMode {
    /// Connect out to the endpoint.
    Connect,
    /// Bind the endpoint and accept one connection.
    Listen,
}

impl NodeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeMode::Connect => "connect",
            NodeMode::Listen => "listen",
        }
    }
}

/// `NAME=ENDPOINT`, where the endpoint may carry a `listen:` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTarget {
    pub name: String,
    pub endpoint: Endpoint,
    pub mode: NodeMode,
}

impl NodeTarget {
    pub fn new(name: &str, endpoint: &str) -> Result<Self, String> {
        let name = name.trim();
        if name.is_empty() {
            return Err("node name must not be empty".to_string());
        }
        let endpoint = endpoint.trim();
        let (mode, endpoint) = match endpoint.strip_prefix("listen:") {
            Some(rest) => (NodeMode::Listen, rest),
            None => (NodeMode::Connect, endpoint),
        };
        let endpoint = Endpoint::from_str(endpoint).map_err(|err| err.to_string())?;
        Ok(Self {
            name: name.to_string(),
            endpoint,
            mode,
        })
    }
}

impl FromStr for NodeTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, endpoint) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=ENDPOINT, got '{s}'"))?;
        Self::new(name, endpoint)
    }
}

#[derive(Args, Debug)]
pub struct BridgeArgs {
    /// Node to attach, as NAME=ENDPOINT (repeatable). Prefix the endpoint
    /// with `listen:` to accept a connection instead of connecting.
    #[arg(long = "node", value_name = "NAME=ENDPOINT")]
    pub nodes: Vec<NodeTarget>,
    /// JSON bridge configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Maximum frame payload in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
    /// How long shutdown waits for each reader (e.g. 2s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub join_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Endpoint to bind (unix:<path>, tcp:<host:port>, or a socket path).
    pub endpoint: Endpoint,
    /// Node name attached to printed frames.
    #[arg(long, default_value = "remote")]
    pub name: String,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Maximum frame payload in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Endpoint to connect to.
    pub endpoint: Endpoint,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one reply frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Node name attached to the printed reply.
    #[arg(long, default_value = "remote")]
    pub name: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms`, or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<std::time::Duration> {
    use crate::exit::CliError;

    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };
    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        std::time::Duration::from_millis(value)
    } else {
        std::time::Duration::from_secs(value)
    })
}
