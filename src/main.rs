//! Binary entry point: parse flags, wire the engine together, run the
//! duplex streams, and narrate engine events on stderr.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};

use repeaterbox::announce::{
    AnnounceConfig, Announcer, CommandSynthesizer, SilenceSynthesizer, Synthesizer,
};
use repeaterbox::commands::{AnnouncementTexts, CommandTable};
use repeaterbox::config::{AppConfig, DEFAULT_ANNOUNCE_QUEUE_DEPTH, DEFAULT_EVENT_CAPACITY};
use repeaterbox::events::{EngineEvent, EventBus};
use repeaterbox::pipeline::Pipeline;
use repeaterbox::relay::{self, RelayController};
use repeaterbox::repeater::spawn_id_ticker;
use repeaterbox::stream::{self, DuplexConfig};
use repeaterbox::telemetry;

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    telemetry::init_tracing(&config);

    if config.list_serial_ports {
        for port in relay::list_ports()? {
            println!("{port}");
        }
        return Ok(());
    }
    if config.list_audio_devices {
        let (inputs, outputs) = stream::list_devices()?;
        println!("Input devices:");
        for name in inputs {
            println!("  {name}");
        }
        println!("Output devices:");
        for name in outputs {
            println!("  {name}");
        }
        return Ok(());
    }

    let settings = config.settings();
    let commands = match &config.command_table {
        Some(path) => CommandTable::from_json_file(path)?,
        None => CommandTable::defaults(),
    };

    let (events, event_rx) = EventBus::new(DEFAULT_EVENT_CAPACITY);

    let synthesizer: Box<dyn Synthesizer> = match &config.synth_command {
        Some(command) => Box::new(CommandSynthesizer::new(command, config.synth_rate)?),
        None => Box::new(SilenceSynthesizer {
            sample_rate: config.synth_rate,
        }),
    };
    let announcer = Announcer::start(
        synthesizer,
        AnnounceConfig {
            engine_rate: settings.sample_rate,
            pre_delay_secs: settings.ptt_pre_delay_secs,
            queue_depth: DEFAULT_ANNOUNCE_QUEUE_DEPTH,
        },
        events.clone(),
    );

    let relay = match &config.relay_port {
        Some(port) => {
            RelayController::connect(port, config.relay_baud, config.relay_protocol, events.clone())?
        }
        None => {
            tracing::info!("no relay port configured, PTT state is tracked only");
            RelayController::disconnected(config.relay_protocol, events.clone())
        }
    };

    let mut texts = AnnouncementTexts::new(settings.callsign.clone());
    texts.weather_text = settings.weather_text.clone();
    texts.custom_messages = settings.custom_messages.clone();

    let (pipeline, control_tx) = Pipeline::new(settings.clone(), commands, announcer, relay, events);
    let vox_mirror = pipeline.vox_mirror();

    let _id_ticker = settings.auto_id_enabled.then(|| {
        spawn_id_ticker(
            settings.id_interval_secs,
            texts,
            vox_mirror,
            control_tx.clone(),
        )
    });

    let (in_tx, in_rx, out_tx, out_rx) = stream::frame_channels();
    let stop = Arc::new(AtomicBool::new(false));
    {
        // Ctrl-C must unwind through the pipeline thread so the relay is
        // unkeyed before the process exits.
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .context("failed to install Ctrl-C handler")?;
    }
    let worker = stream::spawn_pipeline_thread(pipeline, in_rx, out_tx, stop.clone());

    let streams = stream::start_duplex(
        &DuplexConfig {
            sample_rate: settings.sample_rate,
            chunk_size: settings.chunk_size,
            input_device: config.input_device.as_deref(),
            output_device: config.output_device.as_deref(),
        },
        in_tx,
        out_rx,
    )?;

    eprintln!(
        "{} running in {} mode, Ctrl-C to stop",
        settings.callsign,
        settings.mode.label()
    );

    run_event_loop(&event_rx, &stop);

    stop.store(true, Ordering::Relaxed);
    drop(streams);
    let _ = worker.join();
    tracing::info!("shutdown complete");
    Ok(())
}

/// Narrate engine events until the stop flag rises or the bus disconnects.
fn run_event_loop(event_rx: &Receiver<EngineEvent>, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        match event_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => report_event(&event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn report_event(event: &EngineEvent) {
    match event {
        EngineEvent::VoxChanged { active } => {
            eprintln!("vox {}", if *active { "open" } else { "closed" });
        }
        EngineEvent::PttChanged { keyed } => {
            eprintln!("ptt {}", if *keyed { "keyed" } else { "unkeyed" });
        }
        EngineEvent::PhaseChanged { from, to } => {
            eprintln!("phase {from:?} -> {to:?}");
        }
        EngineEvent::DtmfDigit { digit } => eprintln!("dtmf '{digit}'"),
        EngineEvent::CommandAccepted { code, action } => {
            eprintln!("command {code} -> {action}");
        }
        EngineEvent::CommandUnknown { code } => eprintln!("unknown command {code}"),
        EngineEvent::AnnouncementQueued { text } => eprintln!("queued: {text}"),
        EngineEvent::AnnouncementStarted => eprintln!("announcement started"),
        EngineEvent::AnnouncementFinished => eprintln!("announcement finished"),
        EngineEvent::SynthesisFailed { text, reason } => {
            eprintln!("synthesis failed for '{text}': {reason}");
        }
        EngineEvent::TransmitTimeout { limit_secs } => {
            eprintln!("transmit timeout after {limit_secs} s");
        }
        EngineEvent::RecordingStopped { samples } => {
            eprintln!("recording stopped at {samples} samples");
        }
        EngineEvent::RelayError { reason } => eprintln!("relay error: {reason}"),
    }
}
