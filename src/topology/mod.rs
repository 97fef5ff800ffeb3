pub mod builder;
pub mod descriptor;

use std::sync::Arc;

pub use builder::ChannelTopologyBuilder;
pub use descriptor::*;

use crate::buffer::RingBuffer;
use crate::config::Configuration;
use crate::source::{GeneratorState, SignalGenerator};

/// Everything one configuration produces, in builder order.
///
/// Owns the generators and, through them, the ring buffers. External code only
/// gets shared views; rebuilding needs `&mut`, so nobody can observe a
/// half-built topology.
#[derive(Default)]
pub struct Topology {
    streams: Vec<StreamDescriptor>,
    channels: Vec<ChannelDescriptor>,
    sync_lines: Vec<SyncLineDescriptor>,
    sources: Vec<SignalGenerator>,
}

impl Topology {
    pub fn build(config: &Configuration) -> Topology {
        let mut topology = Topology::default();
        ChannelTopologyBuilder::new(&mut topology).build(config);
        topology
    }

    /// Drops every entity. Generators still running are stopped and joined.
    pub fn clear(&mut self) {
        self.sources.clear();
        self.sync_lines.clear();
        self.channels.clear();
        self.streams.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    pub fn sync_lines(&self) -> &[SyncLineDescriptor] {
        &self.sync_lines
    }

    pub fn sources(&self) -> &[SignalGenerator] {
        &self.sources
    }

    pub(crate) fn sources_mut(&mut self) -> &mut [SignalGenerator] {
        &mut self.sources
    }

    pub fn buffer(&self, index: usize) -> Option<&Arc<RingBuffer>> {
        self.sources.get(index).map(SignalGenerator::buffer)
    }

    pub fn channels_of<'a>(
        &'a self,
        stream_id: &'a str,
    ) -> impl Iterator<Item = &'a ChannelDescriptor> + 'a {
        self.channels.iter().filter(move |c| c.stream_id == stream_id)
    }

    /// Swaps every generator that has already run for a fresh one on the same
    /// buffer and clock.
    pub(crate) fn rearm(&mut self) {
        for source in self.sources.iter_mut() {
            if source.state() == GeneratorState::Stopped {
                *source = source.successor();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BandKind;

    fn config(probes: i64, per_probe: i64, aux: i64, per_aux: i64) -> Configuration {
        Configuration::new(probes, per_probe, aux, per_aux).unwrap()
    }

    #[test]
    fn two_probes_in_order() {
        let topology = Topology::build(&config(2, 3, 0, 0));

        let names: Vec<&str> = topology.streams().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Probe-A-AP", "Probe-A-LFP", "Probe-B-AP", "Probe-B-LFP"]);

        let ids: Vec<&str> = topology.streams().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["SP0_AP", "SP0_LFP", "SP1_AP", "SP1_LFP"]);

        let rates: Vec<f64> = topology.streams().iter().map(|s| s.sample_rate_hz).collect();
        assert_eq!(rates, vec![30000.0, 2500.0, 30000.0, 2500.0]);

        assert_eq!(topology.channels().len(), 12);
        assert_eq!(topology.sync_lines().len(), 4);
        for stream in topology.streams() {
            let channels: Vec<_> = topology.channels_of(&stream.id).collect();
            assert_eq!(channels.len(), 3);
            assert!(channels.iter().all(|c| c.kind == ChannelKind::Electrode));
            assert_eq!(
                topology.sync_lines().iter().filter(|l| l.stream_id == stream.id).count(),
                1
            );
        }

        assert_eq!(topology.sync_lines()[1].name, "LFP Sync Line");
        assert_eq!(topology.channels()[3].description, "LFP voltage from electrode 1");
    }

    #[test]
    fn aux_device() {
        let topology = Topology::build(&config(0, 0, 1, 8));

        assert_eq!(topology.streams().len(), 1);
        let stream = &topology.streams()[0];
        assert_eq!(stream.name, "Dev0");
        assert_eq!(stream.id, "NI0");
        assert_eq!(stream.sample_rate_hz, 30000.0);

        let channels: Vec<_> = topology.channels_of("NI0").collect();
        assert_eq!(channels.len(), 8);
        assert!(channels.iter().all(|c| c.kind == ChannelKind::AnalogInput));
        assert_eq!(channels[7].name, "CH8");
        assert_eq!(channels[7].scale_factor, BIT_VOLTS);

        assert_eq!(topology.sync_lines().len(), 1);
        assert_eq!(topology.sync_lines()[0].kind, SyncLineKind::Ttl);
        assert_eq!(topology.sync_lines()[0].identifier, SYNC_LINE_IDENTIFIER);
    }

    #[test]
    fn aux_devices_follow_probes() {
        let topology = Topology::build(&config(1, 2, 2, 4));
        let bands: Vec<BandKind> = topology.sources().iter().map(|s| s.spec().band).collect();
        assert_eq!(
            bands,
            vec![BandKind::Ap, BandKind::Lfp, BandKind::AuxiliaryInput, BandKind::AuxiliaryInput]
        );
        assert_eq!(topology.streams()[3].name, "Dev1");
    }

    #[test]
    fn sources_bound_one_to_one() {
        let topology = Topology::build(&config(1, 5, 1, 2));

        assert_eq!(topology.sources().len(), topology.streams().len());
        for (source, stream) in topology.sources().iter().zip(topology.streams()) {
            assert_eq!(source.name(), stream.name);
            assert_eq!(source.spec().sample_rate_hz, stream.sample_rate_hz);
            assert_eq!(source.buffer().channel_count(), source.spec().channel_count);
            assert_eq!(source.state(), GeneratorState::Idle);
        }
        assert!(!Arc::ptr_eq(topology.buffer(0).unwrap(), topology.buffer(1).unwrap()));
        assert!(topology.buffer(3).is_none());
    }

    #[test]
    fn rebuild_is_deterministic() {
        let cfg = config(3, 4, 2, 6);
        let a = Topology::build(&cfg);
        let b = Topology::build(&cfg);

        assert_eq!(a.streams(), b.streams());
        assert_eq!(a.channels(), b.channels());
        assert_eq!(a.sync_lines(), b.sync_lines());
    }

    #[test]
    fn rebuild_replaces_everything() {
        let mut topology = Topology::build(&config(4, 16, 1, 8));
        ChannelTopologyBuilder::new(&mut topology).build(&config(1, 2, 0, 0));

        assert_eq!(topology.streams().len(), 2);
        assert_eq!(topology.channels().len(), 4);
        assert_eq!(topology.sync_lines().len(), 2);
        assert_eq!(topology.sources().len(), 2);
        assert_eq!(topology.streams()[0].name, "Probe-A-AP");
    }

    #[test]
    fn empty_configuration() {
        let topology = Topology::build(&config(0, 0, 0, 0));
        assert!(topology.is_empty());
        assert!(topology.sources().is_empty());
    }

    #[test]
    fn custom_buffer_capacity() {
        let mut topology = Topology::default();
        ChannelTopologyBuilder::new(&mut topology)
            .buffer_capacity(128)
            .build(&config(1, 1, 0, 0));
        assert_eq!(topology.buffer(0).unwrap().capacity(), 128);
    }
}
