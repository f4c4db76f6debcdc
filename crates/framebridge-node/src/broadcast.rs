use framebridge_frame::Frame;

/// A frame attributed to one node.
///
/// For inbound traffic `device_name` is the node the frame was read from;
/// for addressed outbound traffic it names the destination node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBroadcast {
    device_name: String,
    frame: Frame,
}

impl FrameBroadcast {
    pub fn new(device_name: impl Into<String>, frame: Frame) -> Self {
        Self {
            device_name: device_name.into(),
            frame,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }
}
