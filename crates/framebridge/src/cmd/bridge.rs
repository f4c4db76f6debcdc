use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use framebridge_frame::FrameConfig;
use framebridge_node::{EventNode, EventRouter, RouterConfig, StreamNode};
use framebridge_transport::{Acceptor, ByteStream};
use serde::Deserialize;
use tracing::{info, warn};

use crate::cmd::listen::{accept_until_interrupted, install_ctrlc_handler};
use crate::cmd::{parse_duration, BridgeArgs, NodeMode, NodeTarget};
use crate::exit::{
    io_error, node_error, transport_error, CliError, CliResult, DATA_INVALID, SUCCESS, TIMEOUT,
};
use crate::output::{print_nodes, NodeSummary, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bridge topology read from `--config`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
    pub max_payload_size: Option<usize>,
    pub join_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeEntry {
    pub name: String,
    pub endpoint: String,
}

impl BridgeConfig {
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        serde_json::from_str(&text).map_err(|err| {
            CliError::new(
                DATA_INVALID,
                format!("invalid bridge config {}: {err}", path.display()),
            )
        })
    }
}

/// Effective settings after merging the config file with flags.
#[derive(Debug)]
struct Plan {
    nodes: Vec<NodeTarget>,
    frame: FrameConfig,
    router: RouterConfig,
}

fn plan(args: BridgeArgs, file: BridgeConfig) -> CliResult<Plan> {
    let mut nodes = Vec::with_capacity(file.nodes.len() + args.nodes.len());
    for entry in &file.nodes {
        let target = NodeTarget::new(&entry.name, &entry.endpoint).map_err(|err| {
            CliError::new(DATA_INVALID, format!("config node '{}': {err}", entry.name))
        })?;
        nodes.push(target);
    }
    nodes.extend(args.nodes);

    if nodes.is_empty() {
        return Err(CliError::usage(
            "no nodes to bridge; pass --node NAME=ENDPOINT or --config FILE",
        ));
    }
    let mut seen = BTreeSet::new();
    for target in &nodes {
        if !seen.insert(target.name.as_str()) {
            return Err(CliError::usage(format!("duplicate node name '{}'", target.name)));
        }
    }

    let mut frame = FrameConfig::default();
    if let Some(max) = args.max_payload.or(file.max_payload_size) {
        frame.max_payload_size = max;
    }

    let mut router = RouterConfig::default();
    if let Some(raw) = &args.join_timeout {
        router.join_timeout = parse_duration(raw)?;
    } else if let Some(ms) = file.join_timeout_ms {
        router.join_timeout = Duration::from_millis(ms);
    }

    Ok(Plan {
        nodes,
        frame,
        router,
    })
}

pub fn run(args: BridgeArgs, format: OutputFormat) -> CliResult<i32> {
    let file = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    let plan = plan(args, file)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    // Bind every listening endpoint before accepting, so peers may connect in any order.
    let mut acceptors: Vec<Option<Acceptor>> = Vec::with_capacity(plan.nodes.len());
    for target in &plan.nodes {
        let acceptor = match target.mode {
            NodeMode::Listen => Some(
                target.endpoint
                    .bind()
                    .map_err(|err| transport_error(&format!("bind {}", target.name), err))?,
            ),
            NodeMode::Connect => None,
        };
        acceptors.push(acceptor);
    }

    let router = EventRouter::with_config(plan.router.clone())
        .map_err(|err| node_error("router start failed", err))?;
    let mut summary = Vec::with_capacity(plan.nodes.len());

    for (target, acceptor) in plan.nodes.iter().zip(acceptors) {
        let Some(stream) = open(target, acceptor, &running)? else {
            info!("interrupted while waiting for connections");
            return Ok(SUCCESS);
        };
        let node = StreamNode::from_byte_stream(target.name.as_str(), stream, plan.frame.clone())
            .map_err(|err| node_error(&format!("node {}", target.name), err))?;
        router
            .attach(Arc::new(node))
            .map_err(|err| node_error(&format!("attach {}", target.name), err))?;
        summary.push(NodeSummary {
            name: target.name.clone(),
            endpoint: target.endpoint.to_string(),
            mode: target.mode.as_str(),
        });
    }
    print_nodes(&summary, format);

    while running.load(Ordering::SeqCst) {
        if router.registry().snapshot().iter().all(|node| node.is_closed()) {
            info!("every node disconnected");
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    let stuck = router.shutdown();
    if !stuck.is_empty() {
        warn!(nodes = ?stuck, "readers still running at exit");
        return Err(CliError::new(
            TIMEOUT,
            format!("readers did not stop: {}", stuck.join(", ")),
        ));
    }
    Ok(SUCCESS)
}

/// Open the node's connection. `None` means Ctrl-C arrived while accepting.
fn open(
    target: &NodeTarget,
    acceptor: Option<Acceptor>,
    running: &AtomicBool,
) -> CliResult<Option<ByteStream>> {
    match acceptor {
        Some(acceptor) => {
            info!(node = %target.name, endpoint = %target.endpoint, "waiting for connection");
            accept_until_interrupted(&acceptor, running)
                .map_err(|err| transport_error(&format!("accept {}", target.name), err))
        }
        None => target
            .endpoint
            .connect()
            .map(Some)
            .map_err(|err| transport_error(&format!("connect {}", target.name), err)),
    }
}
