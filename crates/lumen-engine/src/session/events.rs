use serde::Serialize;

use crate::client::PromptActionKind;

/// Journal rows written by [`super::SessionController`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        configured: bool,
        history_len: usize,
    },
    HistoryCorruptDiscarded,
    HistoryEntriesDiscarded {
        count: usize,
    },
    GenerationStarted {
        prompt: String,
        number_of_images: u32,
        aspect_ratio: &'static str,
    },
    GenerationCompleted {
        entry_id: String,
        image_count: usize,
    },
    GenerationFailed {
        message: String,
    },
    PromptActionStarted {
        kind: PromptActionKind,
    },
    PromptActionCompleted {
        kind: PromptActionKind,
        prompt_replaced: bool,
    },
    PromptActionFailed {
        kind: PromptActionKind,
    },
    HistorySelected {
        entry_id: String,
    },
    HistoryDeleted {
        entry_id: String,
        selection_changed: bool,
    },
    HistoryCleared {
        entries: usize,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. } => "session_started",
            SessionEvent::HistoryCorruptDiscarded => "history_corrupt_discarded",
            SessionEvent::HistoryEntriesDiscarded { .. } => "history_entries_discarded",
            SessionEvent::GenerationStarted { .. } => "generation_started",
            SessionEvent::GenerationCompleted { .. } => "generation_completed",
            SessionEvent::GenerationFailed { .. } => "generation_failed",
            SessionEvent::PromptActionStarted { .. } => "prompt_action_started",
            SessionEvent::PromptActionCompleted { .. } => "prompt_action_completed",
            SessionEvent::PromptActionFailed { .. } => "prompt_action_failed",
            SessionEvent::HistorySelected { .. } => "history_selected",
            SessionEvent::HistoryDeleted { .. } => "history_deleted",
            SessionEvent::HistoryCleared { .. } => "history_cleared",
        }
    }
}
