use std::convert::TryFrom;

use crate::error::SimError;

/// Probes are lettered A..P.
pub const PROBE_LETTERS: [char; 16] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P',
];
pub const MAX_PROBES: usize = PROBE_LETTERS.len();

pub const DEFAULT_PROBES: usize = 1;
pub const DEFAULT_CHANNELS_PER_PROBE: usize = 384;
pub const DEFAULT_AUX_DEVICES: usize = 1;
pub const DEFAULT_CHANNELS_PER_AUX: usize = 8;

/// Validated description of the simulated hardware.
///
/// The only way to obtain one is through [`Configuration::new`] or the
/// `with_*` setters, all of which validate, so a `Configuration` in hand is
/// always buildable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Configuration {
    num_probes: usize,
    channels_per_probe: usize,
    num_aux_devices: usize,
    channels_per_aux_device: usize,
}

impl Configuration {
    pub fn new(
        num_probes: i64,
        channels_per_probe: i64,
        num_aux_devices: i64,
        channels_per_aux_device: i64,
    ) -> Result<Configuration, SimError> {
        let num_probes = count("num_probes", num_probes)?;
        if num_probes > MAX_PROBES {
            return Err(SimError::TooManyProbes {
                requested: num_probes,
            });
        }

        Ok(Configuration {
            num_probes,
            channels_per_probe: count("channels_per_probe", channels_per_probe)?,
            num_aux_devices: count("num_aux_devices", num_aux_devices)?,
            channels_per_aux_device: count("channels_per_aux_device", channels_per_aux_device)?,
        })
    }

    pub fn with_num_probes(self, probes: i64) -> Result<Configuration, SimError> {
        Configuration::new(
            probes,
            self.channels_per_probe as i64,
            self.num_aux_devices as i64,
            self.channels_per_aux_device as i64,
        )
    }

    pub fn with_channels_per_probe(self, channels: i64) -> Result<Configuration, SimError> {
        Configuration::new(
            self.num_probes as i64,
            channels,
            self.num_aux_devices as i64,
            self.channels_per_aux_device as i64,
        )
    }

    pub fn with_num_aux_devices(self, devices: i64) -> Result<Configuration, SimError> {
        Configuration::new(
            self.num_probes as i64,
            self.channels_per_probe as i64,
            devices,
            self.channels_per_aux_device as i64,
        )
    }

    pub fn with_channels_per_aux_device(self, channels: i64) -> Result<Configuration, SimError> {
        Configuration::new(
            self.num_probes as i64,
            self.channels_per_probe as i64,
            self.num_aux_devices as i64,
            channels,
        )
    }

    pub fn num_probes(&self) -> usize {
        self.num_probes
    }

    pub fn channels_per_probe(&self) -> usize {
        self.channels_per_probe
    }

    pub fn num_aux_devices(&self) -> usize {
        self.num_aux_devices
    }

    pub fn channels_per_aux_device(&self) -> usize {
        self.channels_per_aux_device
    }

    /// Number of streams (and sources) the topology builder will emit.
    pub fn stream_count(&self) -> usize {
        2 * self.num_probes + self.num_aux_devices
    }
}

impl Default for Configuration {
    fn default() -> Configuration {
        Configuration {
            num_probes: DEFAULT_PROBES,
            channels_per_probe: DEFAULT_CHANNELS_PER_PROBE,
            num_aux_devices: DEFAULT_AUX_DEVICES,
            channels_per_aux_device: DEFAULT_CHANNELS_PER_AUX,
        }
    }
}

fn count(field: &'static str, value: i64) -> Result<usize, SimError> {
    usize::try_from(value).map_err(|_| SimError::NegativeCount { field, value })
}
