//! Simulated acquisition hardware: neural probes (AP + LFP bands) and
//! analog-input devices, each generating samples on its own thread into a
//! ring buffer that a host pipeline drains.

pub mod buffer;
pub mod config;
pub mod controller;
pub mod error;
pub mod source;
pub mod topology;

pub use buffer::{RingBuffer, SampleBlock};
pub use config::Configuration;
pub use controller::AcquisitionController;
pub use error::SimError;
pub use source::{BandKind, GeneratorState, Launcher, SignalGenerator, ThreadLauncher};
pub use topology::{ChannelTopologyBuilder, Topology};
