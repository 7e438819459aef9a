//! Trial folder resolution
//!
//! A trial is a directory holding the stimulus files (WAV or FLAC) and at
//! most one optional video. Stimuli are ordered by file name, so the keys
//! `1..N` map onto the sorted listing.

use std::path::{Path, PathBuf};

use thiserror::Error;

const AUDIO_EXTENSIONS: &[&str] = &["wav", "flac"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

#[derive(Debug, Error)]
pub enum TrialError {
    #[error("Unable to find stimuli directory {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("No stimuli files were found in {}", .0.display())]
    NoStimuli(PathBuf),

    #[error("Found {found} stimuli in directory \"{}\"; expected {expected}", .dir.display())]
    StimulusCount {
        dir: PathBuf,
        found: usize,
        expected: usize,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Files making up one trial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trial {
    pub dir: PathBuf,
    /// Stimulus files, sorted by name
    pub stimuli: Vec<PathBuf>,
    /// Companion video, if the folder has one
    pub video: Option<PathBuf>,
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// List a trial folder
///
/// When `expected` is set, the number of stimuli must match it exactly.
pub fn resolve_trial(dir: &Path, expected: Option<usize>) -> Result<Trial, TrialError> {
    if !dir.is_dir() {
        return Err(TrialError::NotADirectory(dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(dir).map_err(|source| TrialError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut stimuli = Vec::new();
    let mut videos = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| TrialError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if has_extension(&path, AUDIO_EXTENSIONS) {
            stimuli.push(path);
        } else if has_extension(&path, VIDEO_EXTENSIONS) {
            videos.push(path);
        }
    }

    if stimuli.is_empty() {
        return Err(TrialError::NoStimuli(dir.to_path_buf()));
    }
    if let Some(expected) = expected {
        if stimuli.len() != expected {
            return Err(TrialError::StimulusCount {
                dir: dir.to_path_buf(),
                found: stimuli.len(),
                expected,
            });
        }
    }

    stimuli.sort();
    videos.sort();
    if videos.len() > 1 {
        log::warn!(
            "{} videos in {}; using {}",
            videos.len(),
            dir.display(),
            videos[0].display()
        );
    }

    log::info!("Trial {}: {} stimuli", dir.display(), stimuli.len());

    Ok(Trial {
        dir: dir.to_path_buf(),
        stimuli,
        video: videos.into_iter().next(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = resolve_trial(&missing, None).unwrap_err();
        assert!(matches!(err, TrialError::NotADirectory(_)));
        assert!(err.to_string().starts_with("Unable to find stimuli directory"));
    }

    #[test]
    fn test_sorted_audio_and_video() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "c.wav");
        touch(dir.path(), "a.FLAC");
        touch(dir.path(), "b.wav");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "clip.MP4");
        fs::create_dir(dir.path().join("sub.wav")).unwrap();

        let trial = resolve_trial(dir.path(), None).unwrap();
        let names: Vec<_> = trial
            .stimuli
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.FLAC", "b.wav", "c.wav"]);
        assert_eq!(trial.video, Some(dir.path().join("clip.MP4")));
    }

    #[test]
    fn test_no_stimuli() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "clip.mov");
        let err = resolve_trial(dir.path(), None).unwrap_err();
        assert!(matches!(err, TrialError::NoStimuli(_)));
    }

    #[test]
    fn test_expected_count() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "1.wav");
        touch(dir.path(), "2.wav");

        assert!(resolve_trial(dir.path(), Some(2)).is_ok());
        match resolve_trial(dir.path(), Some(3)) {
            Err(TrialError::StimulusCount { found, expected, .. }) => {
                assert_eq!((found, expected), (2, 3));
            }
            other => panic!("expected StimulusCount, got {:?}", other),
        }
    }
}
