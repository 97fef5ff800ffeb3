pub mod cancel;
pub mod clock;
pub mod generator;
pub mod synth;

use std::io;
use std::thread;

pub use cancel::{CancellationToken, Termination};
pub use clock::{ClockControl, DEFAULT_CLOCK_FREQ_HZ};
pub use generator::SignalGenerator;

pub const AP_SAMPLE_RATE_HZ: f64 = 30000.0;
pub const LFP_SAMPLE_RATE_HZ: f64 = 2500.0;
pub const AUX_SAMPLE_RATE_HZ: f64 = 30000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BandKind {
    Ap,
    Lfp,
    AuxiliaryInput,
}

impl BandKind {
    pub fn sample_rate_hz(self) -> f64 {
        match self {
            BandKind::Ap => AP_SAMPLE_RATE_HZ,
            BandKind::Lfp => LFP_SAMPLE_RATE_HZ,
            BandKind::AuxiliaryInput => AUX_SAMPLE_RATE_HZ,
        }
    }
}

/// What a generator produces: the tagged variant its loop dispatches on.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceSpec {
    pub name: String,
    pub channel_count: usize,
    pub sample_rate_hz: f64,
    pub band: BandKind,
}

impl SourceSpec {
    pub fn new(name: impl Into<String>, channel_count: usize, band: BandKind) -> SourceSpec {
        SourceSpec {
            name: name.into(),
            channel_count,
            sample_rate_hz: band.sample_rate_hz(),
            band,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorState {
    Idle,
    Running,
    StopRequested,
    Stopped,
}

impl GeneratorState {
    pub(crate) fn from_u8(v: u8) -> GeneratorState {
        match v {
            0 => GeneratorState::Idle,
            1 => GeneratorState::Running,
            2 => GeneratorState::StopRequested,
            _ => GeneratorState::Stopped,
        }
    }

    /// No thread is (or will be) writing.
    pub fn is_quiescent(self) -> bool {
        match self {
            GeneratorState::Idle | GeneratorState::Stopped => true,
            _ => false,
        }
    }
}

/// Spawns generator threads. The controller goes through this seam so a host
/// can pin, prioritise or refuse threads.
pub trait Launcher {
    fn launch(
        &mut self,
        name: &str,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> io::Result<thread::JoinHandle<()>>;
}

/// Plain named OS threads.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadLauncher;

impl Launcher for ThreadLauncher {
    fn launch(
        &mut self,
        name: &str,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new().name(name.to_string()).spawn(body)
    }
}
