//! Voice-driven filter commands.
//!
//! Transcription and language understanding happen in an external service.
//! The session here tracks status and applies the filter changes that
//! service returns.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filters::{FilterChange, FilterError, PanelFilters};
use crate::services::{EventClass, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceStatus {
    Idle,
    Listening,
    Parsing,
    Applying,
    Done,
    Error,
}

impl fmt::Display for VoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VoiceStatus::Idle => "idle",
            VoiceStatus::Listening => "listening",
            VoiceStatus::Parsing => "parsing",
            VoiceStatus::Applying => "applying",
            VoiceStatus::Done => "done",
            VoiceStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VoiceError {
    #[error("Cannot {action} while {status}")]
    InvalidState { action: &'static str, status: VoiceStatus },
    #[error("Empty transcript")]
    EmptyTranscript,
    #[error("Interpreter failed: {0}")]
    Interpreter(#[from] ServiceError),
    #[error("Could not apply filter change: {0}")]
    Filter(#[from] FilterError),
}

/// External speech/NLU service turning a transcript into filter changes
pub trait TranscriptInterpreter {
    fn interpret(
        &self,
        transcript: &str,
        current: &PanelFilters,
    ) -> Result<Vec<FilterChange>, ServiceError>;
}

/// One panel's voice command lifecycle
#[derive(Debug, Clone)]
pub struct VoiceCommandSession {
    status: VoiceStatus,
    class: EventClass,
    last_error: Option<String>,
}

impl VoiceCommandSession {
    pub fn new(class: EventClass) -> Self {
        Self {
            status: VoiceStatus::Idle,
            class,
            last_error: None,
        }
    }

    pub fn status(&self) -> VoiceStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Begin capturing speech. Allowed from idle, done or error.
    pub fn start_listening(&mut self) -> Result<(), VoiceError> {
        match self.status {
            VoiceStatus::Idle | VoiceStatus::Done | VoiceStatus::Error => {
                self.status = VoiceStatus::Listening;
                self.last_error = None;
                Ok(())
            }
            status => Err(VoiceError::InvalidState {
                action: "start listening",
                status,
            }),
        }
    }

    pub fn cancel(&mut self) {
        self.status = VoiceStatus::Idle;
    }

    fn fail(&mut self, err: VoiceError) -> VoiceError {
        log::warn!("Voice command failed: {}", err);
        self.status = VoiceStatus::Error;
        self.last_error = Some(err.to_string());
        err
    }

    /// Interpret `transcript` and apply the resulting changes to `current`.
    ///
    /// On success the session ends in `Done` and the new filters are
    /// returned; `current` is left untouched either way.
    pub fn submit_transcript<I: TranscriptInterpreter + ?Sized>(
        &mut self,
        transcript: &str,
        current: &PanelFilters,
        interpreter: &I,
    ) -> Result<PanelFilters, VoiceError> {
        if self.status != VoiceStatus::Listening {
            return Err(VoiceError::InvalidState {
                action: "submit a transcript",
                status: self.status,
            });
        }

        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(self.fail(VoiceError::EmptyTranscript));
        }

        self.status = VoiceStatus::Parsing;
        let changes = match interpreter.interpret(transcript, current) {
            Ok(changes) => changes,
            Err(e) => return Err(self.fail(e.into())),
        };
        log::debug!("Transcript {:?} produced {} filter change(s)", transcript, changes.len());

        self.status = VoiceStatus::Applying;
        match current.apply_all(&changes, self.class) {
            Ok(filters) => {
                self.status = VoiceStatus::Done;
                Ok(filters)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }
}
