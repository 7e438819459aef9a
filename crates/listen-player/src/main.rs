//! Listening-test player - loops a trial's stimuli and switches between them
//!
//! This is the terminal front end. It:
//! 1. Resolves and decodes the trial folder into the stimulus store
//! 2. Starts the audio backend, which owns the playback engine
//! 3. Reads transport commands from stdin until `quit`
//!
//! ## Usage
//!
//! ```text
//! listen-player [--config <file>] <trial-dir>
//! listen-player --list-devices [trial-dir]
//! listen-player --init-config [--config <file>]
//! ```

mod audio;
mod config;
mod transport;
mod trial;
mod video;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{bail, Context};
use listen_core::config::{load_config, save_config};
use listen_core::engine::VideoSync;
use listen_core::stimulus::{read_header, StimulusStore};

use audio::{AudioSystemResult, TrialNeeds};
use config::PlayerConfig;
use transport::Outcome;
use video::ClockVideo;

/// Poll interval for render-thread events while waiting on stdin
const EVENT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    list_devices: bool,
    init_config: bool,
    trial_dir: Option<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a file path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--list-devices" => parsed.list_devices = true,
            "--init-config" => parsed.init_config = true,
            flag if flag.starts_with("--") => bail!("Unknown flag {}", flag),
            _ if parsed.trial_dir.is_some() => bail!("Only one trial directory may be given"),
            _ => parsed.trial_dir = Some(PathBuf::from(&arg)),
        }
    }
    Ok(parsed)
}

/// What a trial asks of a device, from the first stimulus header
fn trial_needs(dir: &Path, config: &PlayerConfig) -> anyhow::Result<TrialNeeds> {
    let trial = trial::resolve_trial(dir, config.expected_stimuli)?;
    let first = trial
        .stimuli
        .first()
        .with_context(|| format!("No stimuli in {}", dir.display()))?;
    let info = read_header(first)?;
    let channels = info
        .channels
        .with_context(|| format!("{} does not declare a channel count", first.display()))?;
    let sample_rate = config
        .audio
        .sample_rate
        .or(info.sample_rate)
        .with_context(|| format!("{} does not declare a sample rate", first.display()))?;
    Ok(TrialNeeds {
        channels,
        sample_rate,
    })
}

fn main() -> anyhow::Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);

    if args.init_config {
        save_config(&PlayerConfig::default(), &config_path)?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    let config: PlayerConfig = load_config(&config_path);

    if args.list_devices {
        let needs = match &args.trial_dir {
            Some(dir) => Some(trial_needs(dir, &config)?),
            None => None,
        };
        for device in audio::get_output_devices(needs)? {
            println!("{}", device);
        }
        return Ok(());
    }

    let Some(trial_dir) = args.trial_dir else {
        bail!("Usage: listen-player [--config <file>] <trial-dir> | --list-devices [trial-dir] | --init-config");
    };

    let trial = trial::resolve_trial(&trial_dir, config.expected_stimuli)?;

    let mut store = StimulusStore::new();
    let (channels, frames) = store.load(&trial.stimuli)?;
    let stimuli = store
        .stimuli()
        .context("Stimulus store is empty after loading")?;
    log::info!(
        "Loaded {} stimuli ({} channels, {} frames)",
        store.len(),
        channels,
        frames
    );

    let video = trial
        .video
        .as_deref()
        .map(|path| Box::new(ClockVideo::open(path)) as Box<dyn VideoSync>);

    let AudioSystemResult {
        handle,
        control,
        mut events,
    } = audio::start_audio_system(&config.audio, stimuli, &config.engine, video)?;
    control.set_loop_enabled(config.loop_playback);
    let sample_rate = handle.sample_rate();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                     Listening Test Player                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!(
        "{} stimuli, {}Hz, {} frames (~{:.1}ms output latency)",
        control.stimulus_count(),
        sample_rate,
        handle.buffer_size(),
        handle.latency_ms()
    );
    println!("{}", transport::HELP);

    // stdin blocks, so lines come in from a reader thread
    let (line_tx, line_rx) = mpsc::channel::<String>();
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    loop {
        events.log_pending();

        let line = match line_rx.recv_timeout(EVENT_POLL) {
            Ok(line) => line,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            // EOF on stdin
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };

        let command = match transport::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match transport::execute(command, &control, sample_rate) {
            Ok(Outcome::Continue) => {}
            Ok(Outcome::Print(text)) => println!("{}", text),
            Ok(Outcome::Quit) => break,
            Err(e) => println!("{}", e),
        }
    }

    handle.stop();
    events.log_pending();
    if control.anomaly_count() > 0 {
        log::warn!("{} blocks were rendered as silence", control.anomaly_count());
    }
    store.release_all();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["--config", "/tmp/c.yaml", "trial1"]).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("/tmp/c.yaml")));
        assert_eq!(parsed.trial_dir, Some(PathBuf::from("trial1")));
        assert!(!parsed.list_devices);

        assert!(args(&["--list-devices"]).unwrap().list_devices);
        let listing = args(&["--list-devices", "trial2"]).unwrap();
        assert!(listing.list_devices);
        assert_eq!(listing.trial_dir, Some(PathBuf::from("trial2")));
        assert_eq!(args(&[]).unwrap(), Args::default());
    }

    #[test]
    fn test_trial_needs_from_first_header() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.wav", "b.wav"] {
            let spec = hound::WavSpec {
                channels: 2,
                sample_rate: 44100,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::create(dir.path().join(name), spec).unwrap();
            for _ in 0..60 {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let mut config = PlayerConfig::default();
        let needs = trial_needs(dir.path(), &config).unwrap();
        assert_eq!(
            needs,
            TrialNeeds {
                channels: 2,
                sample_rate: 44100
            }
        );

        config.audio.sample_rate = Some(48000);
        assert_eq!(trial_needs(dir.path(), &config).unwrap().sample_rate, 48000);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(args(&["--config"]).is_err());
        assert!(args(&["--bogus"]).is_err());
        assert!(args(&["a", "b"]).is_err());
    }
}
