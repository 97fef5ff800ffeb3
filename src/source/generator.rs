use crossbeam_channel::Sender;
use log::*;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::cancel::{CancellationToken, Termination};
use super::clock::{ClockControl, SyncClock};
use super::{synth, GeneratorState, Launcher, SourceSpec};
use crate::buffer::{RingBuffer, SampleBlock};
use crate::error::SimError;

/// Wall-clock span covered by one block.
pub const BLOCK_PERIOD: Duration = Duration::from_millis(10);

const LAG_WARNING: Duration = Duration::from_secs(1);

/// One simulated source: a spec, the ring buffer it fills and the thread that
/// fills it.
///
/// A generator runs at most once. After it has stopped, [`successor`] builds
/// a fresh idle generator bound to the same buffer and clock.
///
/// [`successor`]: SignalGenerator::successor
pub struct SignalGenerator {
    spec: SourceSpec,
    seed: u64,
    buffer: Arc<RingBuffer>,
    clock: Arc<ClockControl>,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    termination: Option<Termination>,
}

impl SignalGenerator {
    pub fn new(
        spec: SourceSpec,
        buffer: Arc<RingBuffer>,
        clock: Arc<ClockControl>,
        seed: u64,
    ) -> SignalGenerator {
        assert_eq!(
            spec.channel_count,
            buffer.channel_count(),
            "{} bound to a buffer of the wrong width",
            spec.name
        );

        SignalGenerator {
            spec,
            seed,
            buffer,
            clock,
            state: Arc::new(AtomicU8::new(GeneratorState::Idle as u8)),
            cancel: CancellationToken::new(),
            handle: None,
            termination: None,
        }
    }

    pub fn successor(&self) -> SignalGenerator {
        SignalGenerator::new(
            self.spec.clone(),
            self.buffer.clone(),
            self.clock.clone(),
            self.seed,
        )
    }

    pub fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn buffer(&self) -> &Arc<RingBuffer> {
        &self.buffer
    }

    pub fn state(&self) -> GeneratorState {
        GeneratorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn start(&mut self, launcher: &mut dyn Launcher) -> Result<(), SimError> {
        if self
            .state
            .compare_exchange(
                GeneratorState::Idle as u8,
                GeneratorState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(SimError::NotIdle {
                stream: self.spec.name.clone(),
            });
        }

        let (alive, termination) = Termination::pair();
        let exit = ExitGuard {
            state: self.state.clone(),
            _alive: alive,
        };
        let spec = self.spec.clone();
        let buffer = self.buffer.clone();
        let clock = SyncClock::new(self.clock.clone(), spec.sample_rate_hz, self.seed);
        let cancel = self.cancel.clone();

        let body = Box::new(move || {
            let _exit = exit;
            generate(&spec, &buffer, clock, &cancel);
        });

        match launcher.launch(&self.spec.name, body) {
            Ok(handle) => {
                debug!(
                    "started {} ({} channels @ {} Hz)",
                    self.spec.name, self.spec.channel_count, self.spec.sample_rate_hz
                );
                self.handle = Some(handle);
                self.termination = Some(termination);
                Ok(())
            }
            Err(error) => {
                // the body never ran
                self.state.store(GeneratorState::Stopped as u8, Ordering::Release);
                Err(SimError::StartFailure {
                    stream: self.spec.name.clone(),
                    error,
                })
            }
        }
    }

    /// Asks the loop to exit after its current block. Does not wait.
    pub fn request_stop(&self) {
        if self
            .state
            .compare_exchange(
                GeneratorState::Running as u8,
                GeneratorState::StopRequested as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            trace!("stop requested for {}", self.spec.name);
            self.cancel.cancel();
        }
    }

    /// True once the generator thread has exited (or was never started).
    pub fn wait_terminated(&self, timeout: Duration) -> bool {
        match &self.termination {
            Some(termination) => termination.wait(timeout),
            None => true,
        }
    }

    /// Reaps the thread. Blocks until it exits, so request a stop first.
    pub fn join(&mut self) -> Result<(), SimError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| {
                error!("generator thread for {} panicked", self.spec.name);
                SimError::GeneratorPanicked {
                    stream: self.spec.name.clone(),
                }
            }),
            None => Ok(()),
        }
    }

    pub fn clock_enabled(&self) -> bool {
        self.clock.is_enabled()
    }

    pub fn update_clock_enable(&self, enabled: bool) {
        self.clock.set_enabled(enabled);
    }

    pub fn update_clock_frequency(&self, frequency_hz: u32, tolerance_hz: f32) {
        self.clock.set_frequency(frequency_hz, tolerance_hz);
    }

    pub fn clock(&self) -> &Arc<ClockControl> {
        &self.clock
    }
}

impl Drop for SignalGenerator {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.request_stop();
            if self.join().is_err() {
                warn!("{} generator ended by panic", self.spec.name);
            }
        }
    }
}

/// Marks the generator stopped and fires the termination signal when the
/// thread body ends, including by panic.
struct ExitGuard {
    state: Arc<AtomicU8>,
    _alive: Sender<()>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.state.store(GeneratorState::Stopped as u8, Ordering::Release);
    }
}

fn generate(
    spec: &SourceSpec,
    buffer: &RingBuffer,
    mut clock: SyncClock,
    cancel: &CancellationToken,
) {
    let rate = spec.sample_rate_hz;
    let period = 1.0 / rate;
    let block_len = ((rate * BLOCK_PERIOD.as_secs_f64()).round() as usize).max(1);
    let mut block = SampleBlock::new(spec.channel_count, block_len);

    let started = Instant::now();
    let mut next: i64 = 0;
    let mut lagging = false;

    while !cancel.is_cancelled() {
        clock.refresh();

        for index in 0..block_len {
            let sample_number = next + index as i64;
            for (channel, value) in block.frame_mut(index).iter_mut().enumerate() {
                *value = synth::sample(spec.band, channel, sample_number, rate);
            }
            let event_code = clock.advance(sample_number);
            block.set_meta(index, sample_number, sample_number as f64 * period, event_code);
        }
        block.set_len(block_len);

        buffer.write(&block);
        next += block_len as i64;

        let due = started + Duration::from_secs_f64(next as f64 * period);
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
            lagging = false;
        } else if now - due > LAG_WARNING && !lagging {
            warn!("{} is running {:?} behind real time", spec.name, now - due);
            lagging = true;
        }
    }

    debug!("{} stopped after {} samples", spec.name, next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{BandKind, ThreadLauncher};
    use std::io;

    fn generator(band: BandKind, channels: usize) -> SignalGenerator {
        let spec = SourceSpec::new("test", channels, band);
        SignalGenerator::new(
            spec,
            Arc::new(RingBuffer::new(channels, 4800)),
            Arc::new(ClockControl::new()),
            0,
        )
    }

    struct Refuse;

    impl Launcher for Refuse {
        fn launch(
            &mut self,
            _name: &str,
            _body: Box<dyn FnOnce() + Send + 'static>,
        ) -> io::Result<JoinHandle<()>> {
            Err(io::Error::new(io::ErrorKind::Other, "refused"))
        }
    }

    #[test]
    fn lifecycle() {
        let mut gen = generator(BandKind::Lfp, 2);
        assert_eq!(gen.state(), GeneratorState::Idle);

        gen.start(&mut ThreadLauncher).unwrap();
        assert_eq!(gen.state(), GeneratorState::Running);

        gen.request_stop();
        assert!(gen.wait_terminated(Duration::from_secs(2)));
        assert_eq!(gen.state(), GeneratorState::Stopped);
        gen.join().unwrap();

        match gen.start(&mut ThreadLauncher) {
            Err(SimError::NotIdle { .. }) => {}
            other => panic!("unexpected {:?}", other),
        }

        let next = gen.successor();
        assert_eq!(next.state(), GeneratorState::Idle);
        assert!(Arc::ptr_eq(next.buffer(), gen.buffer()));
    }

    #[test]
    fn stop_on_idle_is_a_no_op() {
        let mut gen = generator(BandKind::Ap, 1);
        gen.request_stop();
        assert_eq!(gen.state(), GeneratorState::Idle);
        assert!(gen.wait_terminated(Duration::from_millis(1)));

        gen.start(&mut ThreadLauncher).unwrap();
        assert_eq!(gen.state(), GeneratorState::Running);
    }

    #[test]
    fn launch_failure_leaves_generator_stopped() {
        let mut gen = generator(BandKind::AuxiliaryInput, 3);
        match gen.start(&mut Refuse) {
            Err(SimError::StartFailure { stream, .. }) => assert_eq!(stream, "test"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(gen.state(), GeneratorState::Stopped);
        assert!(gen.wait_terminated(Duration::from_millis(1)));
    }

    #[test]
    fn writes_consecutive_sample_numbers() {
        let mut gen = generator(BandKind::Lfp, 4);
        gen.start(&mut ThreadLauncher).unwrap();
        thread::sleep(Duration::from_millis(60));
        gen.request_stop();
        assert!(gen.wait_terminated(Duration::from_secs(2)));

        let mut out = SampleBlock::new(4, 4800);
        let n = gen.buffer().read(&mut out);
        assert!(n >= 25, "only {} samples", n);
        for (expected, sn) in out.sample_numbers().iter().enumerate() {
            assert_eq!(*sn, expected as i64);
        }
    }

    #[test]
    fn drop_joins_running_thread() {
        let mut gen = generator(BandKind::Ap, 1);
        gen.start(&mut ThreadLauncher).unwrap();
        let buffer = gen.buffer().clone();
        drop(gen);

        let written = buffer.total_written();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(buffer.total_written(), written);
    }
}
