use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framebridge_node::FrameBroadcast;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct BroadcastOutput<'a> {
    node: &'a str,
    payload_size: usize,
    encoding: &'static str,
    payload: String,
    timestamp: String,
}

impl<'a> BroadcastOutput<'a> {
    fn new(event: &'a FrameBroadcast) -> Self {
        let payload = event.frame().payload();
        let (encoding, preview) = payload_preview(payload);
        Self {
            node: event.device_name(),
            payload_size: payload.len(),
            encoding,
            payload: preview,
            timestamp: now_unix_seconds(),
        }
    }
}

/// One JSON object per line.
pub fn broadcast_json(event: &FrameBroadcast) -> String {
    serde_json::to_string(&BroadcastOutput::new(event)).unwrap_or_else(|_| "{}".to_string())
}

pub fn print_broadcast(event: &FrameBroadcast, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", broadcast_json(event)),
        OutputFormat::Table => {
            let out = BroadcastOutput::new(event);
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NODE", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    out.node.to_string(),
                    out.payload_size.to_string(),
                    out.payload,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let out = BroadcastOutput::new(event);
            println!(
                "node={} size={} payload={}",
                out.node, out.payload_size, out.payload
            );
        }
        OutputFormat::Raw => print_raw(event.frame().payload()),
    }
}

#[derive(Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub endpoint: String,
    pub mode: &'static str,
}

/// Printed once by `bridge` after every node is attached.
pub fn print_nodes(nodes: &[NodeSummary], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for node in nodes {
                println!(
                    "{}",
                    serde_json::to_string(node).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NODE", "ENDPOINT", "MODE"]);
            for node in nodes {
                table.add_row(vec![node.name.as_str(), node.endpoint.as_str(), node.mode]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for node in nodes {
                println!("node={} endpoint={} mode={}", node.name, node.endpoint, node.mode);
            }
        }
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> (&'static str, String) {
    match std::str::from_utf8(payload) {
        Ok(text) => ("utf8", text.to_string()),
        Err(_) => ("binary", format!("<binary {} bytes>", payload.len())),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use framebridge_frame::Frame;

    use super::*;

    #[test]
    fn json_line_names_the_node() {
        let event = FrameBroadcast::new("dev1", Frame::new("hello"));
        let value: serde_json::Value = serde_json::from_str(&broadcast_json(&event)).unwrap();

        assert_eq!(value["node"], "dev1");
        assert_eq!(value["payload"], "hello");
        assert_eq!(value["payload_size"], 5);
        assert_eq!(value["encoding"], "utf8");
    }

    #[test]
    fn binary_payload_is_summarized() {
        let event = FrameBroadcast::new("dev1", Frame::new(vec![0xff, 0x00, 0xfe]));
        let value: serde_json::Value = serde_json::from_str(&broadcast_json(&event)).unwrap();

        assert_eq!(value["encoding"], "binary");
        assert_eq!(value["payload"], "<binary 3 bytes>");
    }
}
