//! Two in-memory devices bridged through one router.
//!
//! Run with:
//!   cargo run --example loopback-bridge

use std::sync::Arc;

use framebridge::frame::{Frame, FrameStream, LoopbackStream};
use framebridge::node::{EventRouter, FrameBroadcast, StreamNode};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let router = EventRouter::new()?;

    // Each pair is (node side, device side).
    let (sensor_node, sensor) = LoopbackStream::pair();
    let (logger_node, logger) = LoopbackStream::pair();
    router.attach(Arc::new(StreamNode::new("sensor", sensor_node)))?;
    router.attach(Arc::new(StreamNode::new("logger", logger_node)))?;

    for reading in ["t=21.5", "t=21.7", "t=21.6"] {
        sensor.write(&Frame::new(reading))?;
    }
    for _ in 0..3 {
        let frame = logger.read()?;
        eprintln!("logger got {}", String::from_utf8_lossy(frame.payload()));
    }

    // Addressed delivery: only "sensor" receives this one.
    router.dispatch_to(FrameBroadcast::new("sensor", Frame::new("calibrate")))?;
    let frame = sensor.read()?;
    eprintln!("sensor got {}", String::from_utf8_lossy(frame.payload()));

    let stuck = router.shutdown();
    eprintln!("shut down, {} reader(s) still running", stuck.len());
    Ok(())
}
