//! Fire-and-forget audio playback through the platform's command-line player.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

/// Program and arguments used to play an MP3 file.
///
/// `afplay` ships with macOS; everywhere else ffplay (part of FFmpeg) is used.
pub fn player_command(path: &Path) -> (&'static str, Vec<String>) {
    let file = path.to_string_lossy().into_owned();
    if cfg!(target_os = "macos") {
        ("afplay", vec![file])
    } else {
        (
            "ffplay",
            vec![
                "-nodisp".to_string(),
                "-autoexit".to_string(),
                "-loglevel".to_string(),
                "quiet".to_string(),
                file,
            ],
        )
    }
}

/// Play `path` on a detached thread. Failures are logged, never returned.
pub fn play_audio(path: PathBuf) {
    let spawned = thread::Builder::new()
        .name("audio-playback".to_string())
        .spawn(move || {
            let (program, args) = player_command(&path);
            let result = Command::new(program)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();

            match result {
                Ok(status) if status.success() => log::debug!("Played {}", path.display()),
                Ok(status) => {
                    log::error!("Error playing audio: {} exited with {}", program, status)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::error!("Error playing audio: '{}' not found on PATH", program)
                }
                Err(e) => log::error!("Error playing audio: {}", e),
            }
        });

    if let Err(e) = spawned {
        log::error!("Failed to start playback thread: {}", e);
    }
}
