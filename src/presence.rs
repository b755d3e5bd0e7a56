use crate::orchestrator::ExchangePhase;
use serde::Serialize;
use std::fmt;

/// Avatar state shown next to the assistant.
///
/// Always derived from the current [`ExchangePhase`]; nothing stores it.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Idle,
    Thinking,
    Streaming,
}

impl From<ExchangePhase> for Presence {
    fn from(phase: ExchangePhase) -> Self {
        match phase {
            ExchangePhase::Idle | ExchangePhase::Failed => Presence::Idle,
            ExchangePhase::Submitting | ExchangePhase::AwaitingResponse => Presence::Thinking,
            ExchangePhase::Reconciling => Presence::Streaming,
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Presence::Idle => "idle",
            Presence::Thinking => "thinking",
            Presence::Streaming => "streaming",
        };
        f.write_str(label)
    }
}
