//! The two transcription backends KlipNote routes between (spec §4.3).

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    Belle2,
    WhisperX,
}

impl Model {
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Belle2 => "belle2",
            Model::WhisperX => "whisperx",
        }
    }

    /// Name of the broker queue this model's worker pool drains.
    pub fn queue_name(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
