use failure::Fail;
use std::io;

#[derive(Debug, Fail)]
pub enum SimError {
    #[fail(display = "requested {} probes, at most 16 are supported", requested)]
    TooManyProbes { requested: usize },

    #[fail(display = "{} must not be negative (got {})", field, value)]
    NegativeCount { field: &'static str, value: i64 },

    #[fail(display = "failed to launch generator thread for {}: {}", stream, error)]
    StartFailure {
        stream: String,
        #[cause]
        error: io::Error,
    },

    #[fail(display = "generator for {} is not idle", stream)]
    NotIdle { stream: String },

    #[fail(display = "acquisition is active")]
    AcquisitionActive,

    #[fail(display = "{} generator thread(s) still running", pending)]
    TerminationTimeout { pending: usize },

    #[fail(display = "generator thread for {} panicked", stream)]
    GeneratorPanicked { stream: String },
}

impl SimError {
    pub fn is_configuration_error(&self) -> bool {
        match self {
            SimError::TooManyProbes { .. } | SimError::NegativeCount { .. } => true,
            _ => false,
        }
    }
}
