use log::*;
use std::sync::Arc;

use super::descriptor::*;
use super::Topology;
use crate::buffer::{RingBuffer, DEFAULT_CAPACITY};
use crate::config::{Configuration, PROBE_LETTERS};
use crate::source::{BandKind, ClockControl, SignalGenerator, SourceSpec};

/// Populates a [`Topology`] from a [`Configuration`].
///
/// Order is fixed: for every probe its AP stream then its LFP stream, then
/// every aux device. Each stream gets its channels, one sync line, and a
/// generator bound to a fresh ring buffer.
pub struct ChannelTopologyBuilder<'a> {
    topology: &'a mut Topology,
    buffer_capacity: usize,
}

struct StreamPlan<'p> {
    band: BandKind,
    name: String,
    description: &'p str,
    id: String,
    channels: usize,
    channel_kind: ChannelKind,
    channel_description: &'p str,
    sync_name: &'p str,
    sync_description: String,
}

impl<'a> ChannelTopologyBuilder<'a> {
    pub fn new(topology: &'a mut Topology) -> ChannelTopologyBuilder<'a> {
        ChannelTopologyBuilder {
            topology,
            buffer_capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> ChannelTopologyBuilder<'a> {
        self.buffer_capacity = capacity;
        self
    }

    pub fn build(mut self, config: &Configuration) {
        self.topology.clear();

        for probe in 0..config.num_probes() {
            self.add_probe(probe, config.channels_per_probe());
        }
        for device in 0..config.num_aux_devices() {
            self.add_aux_device(device, config.channels_per_aux_device());
        }

        info!(
            "built topology: {} streams, {} channels, {} sync lines",
            self.topology.streams.len(),
            self.topology.channels.len(),
            self.topology.sync_lines.len()
        );
    }

    fn add_probe(&mut self, index: usize, channels: usize) {
        let letter = PROBE_LETTERS[index];

        self.add_stream(StreamPlan {
            band: BandKind::Ap,
            name: format!("Probe-{}-AP", letter),
            description: "Neural data sampled @ 30kHz",
            id: format!("SP{}_AP", index),
            channels,
            channel_kind: ChannelKind::Electrode,
            channel_description: "AP voltage from electrode",
            sync_name: "AP Sync Line",
            sync_description: format!(
                "Synchronization signal from the AP band of simulated probe {}",
                index
            ),
        });

        self.add_stream(StreamPlan {
            band: BandKind::Lfp,
            name: format!("Probe-{}-LFP", letter),
            description: "Neural data sampled @ 2.5kHz",
            id: format!("SP{}_LFP", index),
            channels,
            channel_kind: ChannelKind::Electrode,
            channel_description: "LFP voltage from electrode",
            sync_name: "LFP Sync Line",
            sync_description: format!(
                "Synchronization signal from the LFP band of simulated probe {}",
                index
            ),
        });
    }

    fn add_aux_device(&mut self, index: usize, channels: usize) {
        self.add_stream(StreamPlan {
            band: BandKind::AuxiliaryInput,
            name: format!("Dev{}", index),
            description: "NIDAQ @ 30 kHz",
            id: format!("NI{}", index),
            channels,
            channel_kind: ChannelKind::AnalogInput,
            channel_description: "ADC voltage from channel",
            sync_name: "NIDAQ Sync Line",
            sync_description: format!("Synchronization signal from the NIDAQ {}", index),
        });
    }

    fn add_stream(&mut self, plan: StreamPlan<'_>) {
        let seed = self.topology.sources.len() as u64;
        let spec = SourceSpec::new(plan.name.clone(), plan.channels, plan.band);
        trace!("adding stream {} ({})", plan.name, plan.id);

        self.topology.streams.push(StreamDescriptor {
            name: plan.name,
            description: plan.description.to_string(),
            id: plan.id.clone(),
            sample_rate_hz: spec.sample_rate_hz,
        });

        for channel in 1..=plan.channels {
            self.topology.channels.push(ChannelDescriptor {
                kind: plan.channel_kind,
                name: format!("CH{}", channel),
                description: format!("{} {}", plan.channel_description, channel),
                identifier: CHANNEL_IDENTIFIER.to_string(),
                scale_factor: BIT_VOLTS,
                stream_id: plan.id.clone(),
            });
        }

        self.topology.sync_lines.push(SyncLineDescriptor {
            kind: SyncLineKind::Ttl,
            name: plan.sync_name.to_string(),
            description: plan.sync_description,
            identifier: SYNC_LINE_IDENTIFIER.to_string(),
            stream_id: plan.id,
        });

        let buffer = Arc::new(RingBuffer::new(plan.channels, self.buffer_capacity));
        self.topology.sources.push(SignalGenerator::new(
            spec,
            buffer,
            Arc::new(ClockControl::new()),
            seed,
        ));
    }
}
