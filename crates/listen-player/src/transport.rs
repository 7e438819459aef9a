//! Terminal transport commands
//!
//! One command per line on stdin:
//!
//! | Input                  | Effect                                  |
//! |------------------------|-----------------------------------------|
//! | `1` .. `N`             | select stimulus N (1-based)             |
//! | `0`, `off`             | deselect (fade to silence)              |
//! | `p`, `pause`           | pause                                   |
//! | `r`, `resume`, `play`  | resume                                  |
//! | `seek <fraction>`      | jump to a fraction of the stimulus      |
//! | `frame <n>`            | jump to frame n                         |
//! | `loop on` / `loop off` | enable or disable looping               |
//! | `loop <a> <b>`         | loop region as fractions                |
//! | `status`, `s`          | print the transport state               |
//! | `help`, `h`, `?`       | print this table                        |
//! | `q`, `quit`, `exit`    | stop playback and exit                  |

use listen_core::engine::EngineControl;
use listen_core::EngineError;
use thiserror::Error;

pub const HELP: &str = "\
  1..N          select stimulus
  0 | off       deselect
  p | pause     pause
  r | resume    resume
  seek <0..1>   jump to fraction
  frame <n>     jump to frame
  loop on|off   toggle looping
  loop <a> <b>  loop region (fractions)
  status        show state
  q | quit      exit";

/// A parsed transport command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// 0-based stimulus index, -1 deselects
    Select(i32),
    Pause,
    Resume,
    Seek(f64),
    SeekFrame(u64),
    LoopEnabled(bool),
    LoopRegion(f64, f64),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Unknown command '{0}' (type 'help')")]
    Unknown(String),

    #[error("'{command}' needs {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),
}

fn number<T: std::str::FromStr>(
    word: Option<&str>,
    command: &'static str,
    expected: &'static str,
) -> Result<T, ParseError> {
    let word = word.ok_or(ParseError::MissingArgument { command, expected })?;
    word.parse()
        .map_err(|_| ParseError::InvalidNumber(word.to_string()))
}

/// Parse one input line; blank lines yield `None`
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };

    let command = match head.to_ascii_lowercase().as_str() {
        "0" | "off" => Command::Select(-1),
        "p" | "pause" => Command::Pause,
        "r" | "resume" | "play" => Command::Resume,
        "s" | "status" => Command::Status,
        "h" | "help" | "?" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        "seek" => Command::Seek(number(words.next(), "seek", "a fraction between 0 and 1")?),
        "frame" => Command::SeekFrame(number(words.next(), "frame", "a frame number")?),
        "loop" => match words.next() {
            Some("on") => Command::LoopEnabled(true),
            Some("off") => Command::LoopEnabled(false),
            start => {
                let expected = "'on', 'off' or two fractions";
                let start = number(start, "loop", expected)?;
                let end = number(words.next(), "loop", expected)?;
                Command::LoopRegion(start, end)
            }
        },
        other => match other.parse::<i32>() {
            Ok(n) if n >= 0 => Command::Select(n - 1),
            Ok(_) => return Err(ParseError::InvalidNumber(head.to_string())),
            Err(_) => return Err(ParseError::Unknown(head.to_string())),
        },
    };

    Ok(Some(command))
}

/// What the transport loop should do after a command
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Continue,
    Print(String),
    Quit,
}

/// Apply a command to the engine
pub fn execute(
    command: Command,
    control: &EngineControl,
    sample_rate: u32,
) -> Result<Outcome, EngineError> {
    match command {
        Command::Select(index) => control.select_stimulus(index)?,
        Command::Pause => control.pause(),
        Command::Resume => control.resume(),
        Command::Seek(fraction) => control.seek_fraction(fraction)?,
        Command::SeekFrame(frame) => control.seek(frame)?,
        Command::LoopEnabled(enabled) => control.set_loop_enabled(enabled),
        Command::LoopRegion(start, end) => control.set_loop_bounds_fraction(start, end)?,
        Command::Status => return Ok(Outcome::Print(format_status(control, sample_rate))),
        Command::Help => return Ok(Outcome::Print(HELP.to_string())),
        Command::Quit => return Ok(Outcome::Quit),
    }
    Ok(Outcome::Continue)
}

/// Format seconds as `MM:SS.mmm`
pub fn format_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    format!("{:02}:{:02}.{:03}", total_ms / 60_000, (total_ms / 1000) % 60, total_ms % 1000)
}

/// One-line transport summary
pub fn format_status(control: &EngineControl, sample_rate: u32) -> String {
    let rate = f64::from(sample_rate.max(1));
    let secs = |frames: u64| frames as f64 / rate;

    let stimulus = match control.current_stimulus() {
        i if i < 0 => "-".to_string(),
        i => (i + 1).to_string(),
    };
    let (start, end) = control.loop_bounds();

    format!(
        "stimulus {}/{} | {} / {} ({:.1}%) | loop {}..{} {} | {}",
        stimulus,
        control.stimulus_count(),
        format_time(control.current_time_secs(sample_rate)),
        format_time(secs(control.total_frames())),
        control.position_fraction() * 100.0,
        format_time(secs(start)),
        format_time(secs(end)),
        if control.is_loop_enabled() { "on" } else { "off" },
        if control.is_paused() { "paused" } else { "playing" },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use listen_core::config::EngineConfig;
    use listen_core::engine::PlaybackEngine;
    use listen_core::stimulus::{Stimulus, StimulusSet};
    use std::sync::Arc;

    fn control() -> EngineControl {
        let stimuli = (0..3)
            .map(|i| Stimulus::new(format!("{}.wav", i), 1000, vec![vec![0.0; 1000]]))
            .collect();
        let set = Arc::new(StimulusSet::new(stimuli).unwrap());
        let (_engine, control, _events) = PlaybackEngine::new(set, &EngineConfig::default(), 1000);
        control
    }

    #[test]
    fn test_parse_select() {
        assert_eq!(parse("1"), Ok(Some(Command::Select(0))));
        assert_eq!(parse(" 3 "), Ok(Some(Command::Select(2))));
        assert_eq!(parse("0"), Ok(Some(Command::Select(-1))));
        assert_eq!(parse("OFF"), Ok(Some(Command::Select(-1))));
    }

    #[test]
    fn test_parse_transport() {
        assert_eq!(parse(""), Ok(None));
        assert_eq!(parse("p"), Ok(Some(Command::Pause)));
        assert_eq!(parse("play"), Ok(Some(Command::Resume)));
        assert_eq!(parse("seek 0.25"), Ok(Some(Command::Seek(0.25))));
        assert_eq!(parse("frame 480"), Ok(Some(Command::SeekFrame(480))));
        assert_eq!(parse("loop off"), Ok(Some(Command::LoopEnabled(false))));
        assert_eq!(parse("loop 0.1 0.5"), Ok(Some(Command::LoopRegion(0.1, 0.5))));
        assert_eq!(parse("quit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("jump"), Err(ParseError::Unknown("jump".to_string())));
        assert!(matches!(parse("seek"), Err(ParseError::MissingArgument { .. })));
        assert_eq!(parse("frame x"), Err(ParseError::InvalidNumber("x".to_string())));
        assert_eq!(parse("-2"), Err(ParseError::InvalidNumber("-2".to_string())));
        assert!(matches!(parse("loop 0.2"), Err(ParseError::MissingArgument { .. })));
    }

    #[test]
    fn test_execute_updates_control() {
        let ctl = control();

        assert_eq!(execute(Command::Select(1), &ctl, 1000), Ok(Outcome::Continue));
        assert_eq!(ctl.requested_stimulus(), 1);

        execute(Command::Resume, &ctl, 1000).unwrap();
        assert!(!ctl.is_paused());

        execute(Command::LoopRegion(0.25, 0.75), &ctl, 1000).unwrap();
        assert_eq!(ctl.loop_bounds(), (250, 750));

        execute(Command::LoopEnabled(false), &ctl, 1000).unwrap();
        assert!(!ctl.is_loop_enabled());

        assert_eq!(execute(Command::Quit, &ctl, 1000), Ok(Outcome::Quit));
    }

    #[test]
    fn test_execute_rejects_invalid() {
        let ctl = control();
        assert!(execute(Command::Select(3), &ctl, 1000).is_err());
        assert!(execute(Command::Seek(1.5), &ctl, 1000).is_err());
        assert!(execute(Command::SeekFrame(1000), &ctl, 1000).is_err());
        assert!(execute(Command::LoopRegion(0.6, 0.4), &ctl, 1000).is_err());
    }

    #[test]
    fn test_status_line() {
        let ctl = control();
        let Outcome::Print(line) = execute(Command::Status, &ctl, 1000).unwrap() else {
            panic!("status should print");
        };
        assert!(line.starts_with("stimulus -/3"));
        assert!(line.contains("00:01.000"));
        assert!(line.ends_with("paused"));
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "00:00.000");
        assert_eq!(format_time(61.5), "01:01.500");
    }
}
