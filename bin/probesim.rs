use failure::*;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;
use tokio::{signal, task, time};
use tokio_stream::{wrappers::IntervalStream, StreamExt};

use probesim::buffer::SYNC_LINE_BIT;
use probesim::{AcquisitionController, Configuration, RingBuffer, SampleBlock};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const DRAIN_BLOCK: usize = 4096;

#[derive(StructOpt)]
#[structopt(name = "probesim", about = "simulated neural probe / nidaq acquisition source")]
struct Cli {
    #[structopt(long, default_value = "1")]
    probes: i64,
    #[structopt(long, default_value = "384")]
    channels_per_probe: i64,
    #[structopt(long, default_value = "1")]
    aux_devices: i64,
    #[structopt(long, default_value = "8")]
    channels_per_aux: i64,
    /// Seconds to run; runs until Ctrl-C when omitted
    #[structopt(short, long)]
    duration: Option<f64>,
    #[structopt(long, default_value = "1")]
    clock_freq: u32,
    #[structopt(long, default_value = "0")]
    clock_tolerance: f32,
    /// Source index whose sync clock is switched off (repeatable)
    #[structopt(long)]
    disable_clock: Vec<usize>,
    /// Milliseconds between buffer drains
    #[structopt(long, default_value = "100")]
    report_interval: u64,
}

impl Cli {
    fn run_time(&self) -> Result<Option<Duration>, Error> {
        match self.duration {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(|_| format_err!("invalid duration {}, expected seconds >= 0", secs)),
            None => Ok(None),
        }
    }

    fn report_period(&self) -> Result<Duration, Error> {
        if self.report_interval == 0 {
            return Err(format_err!("report interval must be at least 1 ms"));
        }
        Ok(Duration::from_millis(self.report_interval))
    }
}

/// Host-side consumer: the single reader of every ring buffer.
struct Drain {
    streams: Vec<StreamStats>,
}

struct StreamStats {
    name: String,
    buffer: Arc<RingBuffer>,
    block: SampleBlock,
    samples: u64,
    last_sample: Option<i64>,
    gaps: u64,
    edges: u64,
    line: u64,
    overruns: u64,
}

impl Drain {
    fn new(controller: &AcquisitionController) -> Drain {
        let streams = controller
            .sources()
            .iter()
            .map(|source| StreamStats {
                name: source.name().to_string(),
                buffer: source.buffer().clone(),
                block: SampleBlock::new(source.buffer().channel_count(), DRAIN_BLOCK),
                samples: 0,
                last_sample: None,
                gaps: 0,
                edges: 0,
                line: 0,
                overruns: 0,
            })
            .collect();
        Drain { streams }
    }

    fn poll(&mut self) {
        for s in self.streams.iter_mut() {
            while s.buffer.read(&mut s.block) > 0 {
                for (sn, code) in s.block.sample_numbers().iter().zip(s.block.event_codes()) {
                    if let Some(last) = s.last_sample {
                        if *sn != last + 1 {
                            s.gaps += 1;
                        }
                    }
                    s.last_sample = Some(*sn);

                    let line = code & SYNC_LINE_BIT;
                    if line != s.line {
                        s.edges += 1;
                        s.line = line;
                    }
                }
                s.samples += s.block.len() as u64;
            }

            let overruns = s.buffer.overruns();
            if overruns > s.overruns {
                debug!("{}: {} samples lost to overrun", s.name, overruns - s.overruns);
                s.overruns = overruns;
            }
        }
    }

    fn report(&self) {
        for s in &self.streams {
            info!(
                "{}: {} samples, {} sync edges, {} gaps, {} overruns",
                s.name, s.samples, s.edges, s.gaps, s.overruns
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();
    let args = Cli::from_args();
    let run_time = args.run_time()?;
    let report_period = args.report_period()?;

    let config = Configuration::new(
        args.probes,
        args.channels_per_probe,
        args.aux_devices,
        args.channels_per_aux,
    )?;
    let mut controller = AcquisitionController::new(config);

    for stream in controller.streams() {
        info!(
            "{} [{}] {} channels @ {} Hz",
            stream.name,
            stream.id,
            controller.topology().channels_of(&stream.id).count(),
            stream.sample_rate_hz
        );
    }

    for index in &args.disable_clock {
        if *index >= controller.sources().len() {
            return Err(format_err!("no source at index {}", index));
        }
        controller.update_clock_enable(*index, false);
    }
    controller.update_clock_frequency(args.clock_freq, args.clock_tolerance);

    controller.start()?;

    let mut drain = Drain::new(&controller);
    let mut ticks = IntervalStream::new(time::interval(report_period));

    let deadline = async {
        match run_time {
            Some(span) => time::sleep(span).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(_) = ticks.next() => drain.poll(),
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            _ = &mut deadline => break,
        }
    }

    controller.stop();
    task::block_in_place(|| controller.await_termination(SHUTDOWN_GRACE))?;

    drain.poll();
    drain.report();

    trace!("probesim finished");
    Ok(())
}
