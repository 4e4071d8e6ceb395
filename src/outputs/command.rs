use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::kernel::error::SpeechError;
use crate::kernel::event::Severity;
use crate::kernel::speech::output::{SpeechEngine, SpeechFuture};

/// External TTS program, one child process per utterance.
///
/// The child is spawned with `kill_on_drop`, so dropping the future returned
/// by `speak` kills playback.
#[derive(Debug, Clone)]
pub struct CommandSpeechEngine {
    program: String,
    args: Vec<String>,
}

impl CommandSpeechEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    /// Extra arguments placed before the utterance text.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// First of `espeak` / `say` found on `PATH`.
    pub fn detect() -> Option<Self> {
        ["espeak", "say"]
            .into_iter()
            .map(Self::new)
            .find(|engine| engine.is_available())
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl SpeechEngine for CommandSpeechEngine {
    fn speak<'a>(&'a self, text: &'a str, priority: Severity) -> SpeechFuture<'a> {
        Box::pin(async move {
            let mut child = Command::new(&self.program)
                .args(&self.args)
                .arg(text)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => SpeechError::Unavailable(self.program.clone()),
                    _ => SpeechError::Engine(format!("{}: {}", self.program, e)),
                })?;
            debug!("Spawned {} for {:?} utterance", self.program, priority);

            let status = child
                .wait()
                .await
                .map_err(|e| SpeechError::Engine(format!("{}: {}", self.program, e)))?;
            if status.success() {
                Ok(())
            } else {
                Err(SpeechError::Engine(format!("{} exited with {}", self.program, status)))
            }
        })
    }

    fn is_available(&self) -> bool {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file();
        }
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
            .unwrap_or(false)
    }
}
