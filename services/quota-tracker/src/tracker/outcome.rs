use serde::{Deserialize, Serialize};

/// Result of a `record_upload` call. A ceiling rejection is a normal outcome,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub success: bool,
    pub remaining: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordOutcome {
    pub fn recorded(remaining: u32) -> Self {
        Self {
            success: true,
            remaining,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            remaining: 0,
            error: Some(error.into()),
        }
    }

    /// Message shown to the submitter after a successful upload.
    pub fn message(&self) -> Option<String> {
        self.success.then(|| remaining_message(self.remaining))
    }
}

pub fn remaining_message(remaining: u32) -> String {
    match remaining {
        0 => "Video uploaded successfully! This was your last allowed upload.".to_string(),
        1 => "Video uploaded successfully! You have 1 upload remaining.".to_string(),
        n => format!("Video uploaded successfully! You have {n} uploads remaining."),
    }
}
