use std::fs;

use framebridge_frame::{Frame, FrameConfig, FrameError, FrameStream, FramedStream};
use framebridge_node::FrameBroadcast;
use tracing::{debug, warn};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{frame_error, io_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_broadcast, OutputFormat};

/// Garbage frames skipped while waiting for a reply.
const MAX_SKIPPED_FRAMES: usize = 16;

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let socket = args
        .endpoint
        .connect()
        .map_err(|err| transport_error("connect failed", err))?;
    let config = FrameConfig {
        read_timeout: args.wait.then_some(wait_timeout),
        write_timeout: Some(wait_timeout),
        ..FrameConfig::default()
    };
    let stream =
        FramedStream::with_config(socket, config).map_err(|err| frame_error("connect failed", err))?;

    stream
        .write(&Frame::new(payload))
        .map_err(|err| frame_error("send failed", err))?;
    debug!(endpoint = %args.endpoint, "frame sent");

    if args.wait {
        let frame = wait_for_response(&stream).map_err(|err| frame_error("receive failed", err))?;
        print_broadcast(&FrameBroadcast::new(args.name.as_str(), frame), format);
    }

    if let Err(err) = stream.close() {
        debug!(error = %err, "close failed");
    }
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

/// Read one reply, skipping a bounded number of undecodable frames.
fn wait_for_response<S: FrameStream + ?Sized>(stream: &S) -> Result<Frame, FrameError> {
    let mut skipped = 0usize;
    loop {
        match stream.read() {
            Err(FrameError::InvalidMagic) if skipped < MAX_SKIPPED_FRAMES => {
                skipped += 1;
                warn!(skipped, "skipping undecodable bytes in reply");
            }
            other => return other,
        }
    }
}
