//! Speech output: turns a finished sentence into audible speech.
//!
//! Speaking is fire-and-forget.  The composer never waits for playback and
//! never sees a synthesis error; failures are logged here.

use std::process::{Command, Stdio};

use crate::config::SpeechConfig;

/// Something that can say a sentence aloud.
pub trait SpeechOutput: Send + Sync {
    fn speak(&self, text: &str);
}

/// Spawns an external TTS program with the sentence as its last argument.
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
}

impl CommandSpeech {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn command(&self, text: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl SpeechOutput for CommandSpeech {
    fn speak(&self, text: &str) {
        match self.command(text).spawn() {
            Ok(mut child) => {
                log::debug!("speech: {} speaking {text:?}", self.program);
                // reap off-thread, playback must not block the composer
                std::thread::spawn(move || match child.wait() {
                    Ok(status) if !status.success() => {
                        log::warn!("speech: synthesizer exited with {status}");
                    }
                    Err(e) => log::warn!("speech: failed to wait for synthesizer: {e}"),
                    Ok(_) => {}
                });
            }
            Err(e) => log::warn!("speech: failed to run {}: {e}", self.program),
        }
    }
}

/// Logs the sentence instead of speaking it.
#[derive(Debug, Default)]
pub struct SilentSpeech;

impl SpeechOutput for SilentSpeech {
    fn speak(&self, text: &str) {
        log::info!("speech (silent): {text}");
    }
}

/// Build the speech output described by `config`.
pub fn from_config(config: &SpeechConfig) -> Box<dyn SpeechOutput> {
    if config.enabled && !config.command.trim().is_empty() {
        Box::new(CommandSpeech::new(config.command.trim(), config.args.clone()))
    } else {
        log::info!("speech: disabled, sentences will only be logged");
        Box::new(SilentSpeech)
    }
}
