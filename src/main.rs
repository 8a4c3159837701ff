use std::{
    io::{self, BufRead},
    sync::Arc,
    thread,
    time::Duration,
};

use clap::Parser;
use crossbeam_channel::{bounded, tick, Receiver, Sender, TryRecvError};
use iq_density::{
    args::{convert_filter, Args},
    capture::{FileSource, ToneSource},
    exfil::{save_density, CaptureWriter},
    histogram::Histogram,
    monitoring::{FrameSink, LogSink},
    params::{mhz_to_hz, RuntimeParams, EXPOSURE_STEP},
    pipeline::{Pipeline, PipelineConfig},
    Error, Result,
};
use tracing::{error, info, warn};

/// User input, one per stdin line
#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    TogglePause,
    Exposure(f32),
    Retune { steps: i32, coarse: bool },
    Capture,
    Snapshot,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let cmd = match line.trim() {
        "p" => Command::TogglePause,
        "+" | "=" => Command::Exposure(EXPOSURE_STEP),
        "-" => Command::Exposure(-EXPOSURE_STEP),
        ">" => Command::Retune {
            steps: 1,
            coarse: false,
        },
        "<" => Command::Retune {
            steps: -1,
            coarse: false,
        },
        ">>" => Command::Retune {
            steps: 1,
            coarse: true,
        },
        "<<" => Command::Retune {
            steps: -1,
            coarse: true,
        },
        "c" => Command::Capture,
        "s" => Command::Snapshot,
        "q" => Command::Quit,
        _ => return None,
    };
    Some(cmd)
}

fn read_commands(sender: Sender<Command>) {
    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => return,
        };
        match parse_command(&line) {
            Some(cmd) => {
                if sender.send(cmd).is_err() {
                    return;
                }
            }
            None => eprintln!("Commands: p, +, -, <, >, <<, >>, c, s, q"),
        }
    }
}

/// Apply a command, returning false once we should quit
fn handle_command(
    cmd: Command,
    pipeline: &Pipeline,
    frame: &Histogram,
    args: &Args,
) -> Result<bool> {
    match cmd {
        Command::TogglePause => {
            pipeline.toggle_pause();
        }
        Command::Exposure(delta) => {
            pipeline.adjust_exposure(delta);
        }
        // A refused frequency leaves the current one in place, only a faulted
        // receiver ends the session
        Command::Retune { steps, coarse } => match pipeline.retune(steps, coarse) {
            Ok(mhz) => info!("Retune requested: {mhz:.1} MHz"),
            Err(Error::InvalidArgument(msg)) => warn!("Retune refused: {msg}"),
            Err(e) => return Err(e),
        },
        Command::Capture => {
            info!("Capturing {} blocks", args.capture_blocks);
            pipeline.request_capture(args.capture_blocks);
        }
        Command::Snapshot => {
            if let Err(e) = save_density(frame, &args.output_dir) {
                error!("Snapshot failed: {e}");
            }
        }
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

fn frame_loop(pipeline: &mut Pipeline, commands: Receiver<Command>, args: &Args) -> Result<()> {
    let ticker = tick(Duration::from_secs_f64(1.0 / f64::from(args.fps)));
    let mut frame = Histogram::new();
    let mut sink = LogSink::new();
    let mut writer = CaptureWriter::new(&args.output_dir, args.capture_blocks);
    loop {
        // Wait for the next display refresh
        let _ = ticker.recv();
        // A faulted pipeline refuses the snapshot, nothing gets presented
        let generation = pipeline.snapshot(&mut frame)?;
        sink.present(generation, &frame)?;
        while let Some(block) = pipeline.pop_captured() {
            if let Err(e) = writer.push(&block) {
                error!("Capture failed: {e}");
            }
        }
        loop {
            match commands.try_recv() {
                Ok(cmd) => {
                    if !handle_command(cmd, pipeline, &frame, args)? {
                        writer.flush()?;
                        return Ok(());
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }
}

fn run(args: Args) -> Result<()> {
    mhz_to_hz(args.frequency)?;
    let params = Arc::new(RuntimeParams::new(args.frequency, args.intensity));
    let mut pipeline = Pipeline::new(
        PipelineConfig {
            block_length: args.block_length,
            capture_capacity: args.capacity,
        },
        params,
    )?;
    match &args.input {
        Some(path) => pipeline.start(FileSource::open(path, args.block_length)?)?,
        None => pipeline.start(ToneSource::new(args.tone, args.frequency).paced(true))?,
    }

    // Setup input handling
    let (sender, receiver) = bounded(16);
    let ctrlc_sender = sender.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_sender.try_send(Command::Quit);
    })
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    thread::spawn(move || read_commands(sender));

    let res = frame_loop(&mut pipeline, receiver, &args);
    // Teardown waits for the producer either way
    let stopped = pipeline.stop();
    res.and(stopped)
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();
    info!("Starting iq_density");
    if let Err(e) = run(args) {
        error!("{e}");
        std::process::exit(1);
    }
}
