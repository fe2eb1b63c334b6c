//! Best-effort text-to-speech sink.
//!
//! Speech never fails the caller: a missing `say` binary or a non-macOS host
//! degrades to printing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How spoken text is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SpeechMode {
    /// macOS `say`, spawned without waiting.
    MacSay,
    /// Print to stdout.
    #[default]
    Print,
    /// Discard.
    Off,
}

impl From<&str> for SpeechMode {
    /// Unknown names fall back to [`SpeechMode::Print`].
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "mac_say" | "say" => Self::MacSay,
            "none" | "off" | "disabled" => Self::Off,
            _ => Self::Print,
        }
    }
}

impl From<String> for SpeechMode {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<SpeechMode> for String {
    fn from(value: SpeechMode) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SpeechMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MacSay => "mac_say",
            Self::Print => "print",
            Self::Off => "none",
        })
    }
}

/// Renders text according to a [`SpeechMode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Speaker {
    mode: SpeechMode,
}

impl Speaker {
    /// Creates a speaker.
    #[must_use]
    pub const fn new(mode: SpeechMode) -> Self {
        Self { mode }
    }

    /// Speaks `text`. Returns immediately; `say` runs in the background.
    pub fn speak(&self, text: &str) {
        match self.mode {
            SpeechMode::Off => {}
            SpeechMode::MacSay if cfg!(target_os = "macos") => {
                if let Err(err) = tokio::process::Command::new("say").arg(text).spawn() {
                    tracing::warn!(error = %err, "failed to spawn say, printing instead");
                    print_line(text);
                }
            }
            SpeechMode::MacSay | SpeechMode::Print => print_line(text),
        }
    }
}

#[allow(clippy::print_stdout)] // stdout is the sink in print mode
fn print_line(text: &str) {
    println!("[executor:speak] {text}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names() {
        assert_eq!(SpeechMode::from("say"), SpeechMode::MacSay);
        assert_eq!(SpeechMode::from(" MAC_SAY "), SpeechMode::MacSay);
        assert_eq!(SpeechMode::from("disabled"), SpeechMode::Off);
        assert_eq!(SpeechMode::from("off"), SpeechMode::Off);
        assert_eq!(SpeechMode::from("print"), SpeechMode::Print);
        assert_eq!(SpeechMode::from("espeak"), SpeechMode::Print);
    }

    #[test]
    fn test_mode_toml_round_trip() {
        #[derive(Deserialize)]
        struct Wrapper {
            tts: SpeechMode,
        }
        let parsed: Wrapper = toml::from_str(r#"tts = "none""#).unwrap();
        assert_eq!(parsed.tts, SpeechMode::Off);
        assert_eq!(String::from(SpeechMode::Off), "none");
    }
}
