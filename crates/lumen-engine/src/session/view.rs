use lumen_contracts::history::{format_time_ago, ImagePayload};

use super::{Phase, SessionController};

pub const GENERATE_LABEL: &str = "Generate";
pub const GENERATING_LABEL: &str = "Generating...";

/// What the main image area shows. Loading wins over an error, and an error
/// wins over the selected entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gallery {
    Loading { placeholders: u32 },
    Error(String),
    Images {
        entry_id: String,
        images: Vec<ImagePayload>,
    },
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub id: String,
    pub title: String,
    pub age: String,
    pub selected: bool,
    pub image_count: usize,
    pub has_thumbnail: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptActionsView {
    pub improve_enabled: bool,
    pub random_enabled: bool,
    pub describe_enabled: bool,
}

/// Render-ready projection of the session. Rebuilt from scratch on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub phase: Phase,
    pub gallery: Gallery,
    pub options_enabled: bool,
    pub generate_enabled: bool,
    pub generate_label: &'static str,
    pub prompt_actions: PromptActionsView,
    pub history: Vec<HistoryRow>,
    pub clear_history_enabled: bool,
}

impl SessionView {
    pub(super) fn build(session: &SessionController, now_ms: i64) -> Self {
        let idle = session.in_flight.is_none() && session.pending_prompt_action.is_none();
        let interactive = session.configured && idle;
        let options = &session.options;

        let gallery = if let Some(in_flight) = &session.in_flight {
            Gallery::Loading {
                placeholders: in_flight.number_of_images(),
            }
        } else if let Some(message) = &session.error {
            Gallery::Error(message.clone())
        } else if let Some(entry) = session.history.selected() {
            Gallery::Images {
                entry_id: entry.id().to_string(),
                images: entry.images().to_vec(),
            }
        } else {
            Gallery::Empty
        };

        let selected_id = session.history.selected_id();
        let history = session
            .history
            .entries()
            .iter()
            .map(|entry| HistoryRow {
                id: entry.id().to_string(),
                title: entry.title().to_string(),
                age: format_time_ago(entry.timestamp(), now_ms),
                selected: selected_id == Some(entry.id()),
                image_count: entry.images().len(),
                has_thumbnail: !entry.images().is_empty(),
            })
            .collect();

        Self {
            phase: session.phase(),
            gallery,
            options_enabled: interactive,
            generate_enabled: interactive && options.has_prompt(),
            generate_label: if session.in_flight.is_some() {
                GENERATING_LABEL
            } else {
                GENERATE_LABEL
            },
            prompt_actions: PromptActionsView {
                improve_enabled: interactive && options.has_prompt(),
                random_enabled: interactive,
                describe_enabled: interactive && options.reference_image().is_some(),
            },
            history,
            clear_history_enabled: idle && !session.history.is_empty(),
        }
    }
}
