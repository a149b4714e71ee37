use std::fmt;

use serde::Serialize;

/// A named service exposed by the capability service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Speech to text over a persistent socket.
    Transcribe,
    Translate,
    Summarize,
    Chat,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Transcribe,
        Capability::Translate,
        Capability::Summarize,
        Capability::Chat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Translate => "translate",
            Self::Summarize => "summarize",
            Self::Chat => "chat",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}
