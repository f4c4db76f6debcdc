use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use framebridge_frame::FrameConfig;
use framebridge_node::{EventNode, StreamNode};
use framebridge_transport::{Acceptor, ByteStream};
use tracing::{info, warn};

use crate::cmd::ListenArgs;
use crate::exit::{node_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_broadcast, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let acceptor = args
        .endpoint
        .bind()
        .map_err(|err| transport_error("bind failed", err))?;
    info!(endpoint = %args.endpoint, "waiting for connection");
    let Some(stream) = accept_until_interrupted(&acceptor, &running)
        .map_err(|err| transport_error("accept failed", err))?
    else {
        info!("interrupted while waiting for a connection");
        return Ok(SUCCESS);
    };

    let mut config = FrameConfig::default();
    if let Some(max) = args.max_payload {
        config.max_payload_size = max;
    }
    let node = StreamNode::from_byte_stream(args.name.as_str(), stream, config)
        .map_err(|err| node_error("node setup failed", err))?;

    let (tx, rx) = mpsc::channel();
    node.listen(Box::new(move |event| {
        let _ = tx.send(event);
    }))
    .map_err(|err| node_error("listen failed", err))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let event = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            // The callback, and with it the sender, is gone once the reader exits.
            Err(RecvTimeoutError::Disconnected) => break,
        };

        print_broadcast(&event, format);
        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    if node.join(JOIN_TIMEOUT) {
        warn!(node = %args.name, "reader still running at exit");
    }
    Ok(SUCCESS)
}

/// Wait for one connection on `acceptor` until Ctrl-C clears `running`.
pub(crate) fn accept_until_interrupted(
    acceptor: &Acceptor,
    running: &AtomicBool,
) -> framebridge_transport::Result<Option<ByteStream>> {
    acceptor.accept_while(|| running.load(Ordering::SeqCst), POLL_INTERVAL)
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
