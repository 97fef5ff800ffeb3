use log::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::buffer::RingBuffer;
use crate::config::Configuration;
use crate::error::SimError;
use crate::source::{Launcher, SignalGenerator, ThreadLauncher};
use crate::topology::{
    ChannelDescriptor, ChannelTopologyBuilder, StreamDescriptor, SyncLineDescriptor, Topology,
};

/// Runs every source of a topology as one unit.
///
/// Teardown is `stop()`, then `await_termination()`, then (optionally) a
/// reconfiguration. Reconfiguring while any generator thread is alive is
/// refused.
pub struct AcquisitionController {
    config: Configuration,
    topology: Topology,
    launcher: Box<dyn Launcher>,
}

impl AcquisitionController {
    pub fn new(config: Configuration) -> AcquisitionController {
        AcquisitionController::with_launcher(config, Box::new(ThreadLauncher))
    }

    pub fn with_launcher(
        config: Configuration,
        launcher: Box<dyn Launcher>,
    ) -> AcquisitionController {
        AcquisitionController {
            config,
            topology: Topology::build(&config),
            launcher,
        }
    }

    /// A simulated source is always present.
    pub fn found_input_source(&self) -> bool {
        true
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        self.topology.streams()
    }

    pub fn channels(&self) -> &[ChannelDescriptor] {
        self.topology.channels()
    }

    pub fn sync_lines(&self) -> &[SyncLineDescriptor] {
        self.topology.sync_lines()
    }

    pub fn sources(&self) -> &[SignalGenerator] {
        self.topology.sources()
    }

    pub fn buffer(&self, index: usize) -> Option<&Arc<RingBuffer>> {
        self.topology.buffer(index)
    }

    /// True while any generator thread may still write.
    pub fn is_running(&self) -> bool {
        self.topology
            .sources()
            .iter()
            .any(|source| !source.state().is_quiescent())
    }

    /// Clears every buffer and starts every generator in topology order.
    ///
    /// If a generator fails to launch, the ones already started are stopped
    /// and joined before the error is returned, leaving everything stopped.
    pub fn start(&mut self) -> Result<(), SimError> {
        if self.is_running() {
            return Err(SimError::AcquisitionActive);
        }

        self.topology.rearm();
        for source in self.topology.sources() {
            source.buffer().clear();
        }

        let launcher = &mut *self.launcher;
        let sources = self.topology.sources_mut();
        for index in 0..sources.len() {
            if let Err(err) = sources[index].start(launcher) {
                error!("{}; rolling back {} started source(s)", err, index);
                rollback(&mut sources[..index]);
                return Err(err);
            }
        }

        info!("acquisition started with {} source(s)", sources.len());
        Ok(())
    }

    /// Signals every generator to exit and returns without waiting.
    pub fn stop(&self) {
        for source in self.topology.sources() {
            source.request_stop();
        }
        info!("acquisition stop requested");
    }

    /// Waits up to `timeout` for every generator thread to exit, then reaps
    /// them.
    pub fn await_termination(&mut self, timeout: Duration) -> Result<(), SimError> {
        let deadline = Instant::now() + timeout;

        let pending = self
            .topology
            .sources()
            .iter()
            .filter(|source| {
                let remaining = deadline.saturating_duration_since(Instant::now());
                !source.wait_terminated(remaining)
            })
            .count();
        if pending > 0 {
            warn!("{} generator(s) still running after {:?}", pending, timeout);
            return Err(SimError::TerminationTimeout { pending });
        }

        let mut result = Ok(());
        for source in self.topology.sources_mut() {
            if let Err(err) = source.join() {
                result = Err(err);
            }
        }
        debug!("all generators terminated");
        result
    }

    /// Rebuilds the topology for `config`. Fails if any generator is still
    /// alive.
    pub fn reconfigure(&mut self, config: Configuration) -> Result<(), SimError> {
        if self.is_running() {
            warn!("refusing to rebuild topology while acquisition is active");
            return Err(SimError::AcquisitionActive);
        }

        self.config = config;
        ChannelTopologyBuilder::new(&mut self.topology).build(&self.config);
        Ok(())
    }

    pub fn set_num_probes(&mut self, probes: i64) -> Result<(), SimError> {
        let config = self.config.with_num_probes(probes)?;
        self.reconfigure(config)
    }

    pub fn set_channels_per_probe(&mut self, channels: i64) -> Result<(), SimError> {
        let config = self.config.with_channels_per_probe(channels)?;
        self.reconfigure(config)
    }

    pub fn set_num_aux_devices(&mut self, devices: i64) -> Result<(), SimError> {
        let config = self.config.with_num_aux_devices(devices)?;
        self.reconfigure(config)
    }

    pub fn set_channels_per_aux_device(&mut self, channels: i64) -> Result<(), SimError> {
        let config = self.config.with_channels_per_aux_device(channels)?;
        self.reconfigure(config)
    }

    /// Retunes every source whose sync clock is enabled.
    pub fn update_clock_frequency(&self, frequency_hz: u32, tolerance_hz: f32) {
        info!(
            "update clock frequency: {} Hz, tolerance {} Hz",
            frequency_hz, tolerance_hz
        );
        for source in self.topology.sources() {
            if source.clock_enabled() {
                source.update_clock_frequency(frequency_hz, tolerance_hz);
            }
        }
    }

    /// # Panics
    ///
    /// If `source_index` does not name a source.
    pub fn update_clock_enable(&self, source_index: usize, enabled: bool) {
        let sources = self.topology.sources();
        assert!(
            source_index < sources.len(),
            "clock enable for source {} but only {} sources exist",
            source_index,
            sources.len()
        );

        debug!(
            "sync clock for {} {}",
            sources[source_index].name(),
            if enabled { "enabled" } else { "disabled" }
        );
        sources[source_index].update_clock_enable(enabled);
    }
}

fn rollback(started: &mut [SignalGenerator]) {
    for source in started.iter() {
        source.request_stop();
    }
    for source in started.iter_mut() {
        if let Err(err) = source.join() {
            warn!("while rolling back: {}", err);
        }
    }
}
