/// Microvolts per bit for every simulated channel.
pub const BIT_VOLTS: f32 = 0.195;

pub const CHANNEL_IDENTIFIER: &str = "source";
pub const SYNC_LINE_IDENTIFIER: &str = "probe.sync";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    Electrode,
    AnalogInput,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncLineKind {
    Ttl,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamDescriptor {
    pub name: String,
    pub description: String,
    pub id: String,
    pub sample_rate_hz: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelDescriptor {
    pub kind: ChannelKind,
    pub name: String,
    pub description: String,
    pub identifier: String,
    /// bits -> microvolts
    pub scale_factor: f32,
    pub stream_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncLineDescriptor {
    pub kind: SyncLineKind,
    pub name: String,
    pub description: String,
    pub identifier: String,
    pub stream_id: String,
}
