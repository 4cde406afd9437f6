//! Generation session controller.
//!
//! All state lives in one [`SessionController`]; every change goes through
//! [`SessionController::update`]. Remote work is described by the returned
//! [`Effect`] and fed back as a completion [`Action`], so the reducer itself
//! never touches the network. [`SessionController::submit`] and
//! [`SessionController::run_prompt_action`] run that loop against a
//! [`GenerationClient`].

mod events;
mod view;

use lumen_contracts::events::SessionJournal;
use lumen_contracts::history::{HistoryStore, ImagePayload};
use lumen_contracts::options::{GenerationOptions, OptionUpdate, OptionsError, ReferenceImage};
use thiserror::Error;

use crate::client::{ClientError, GenerationClient, PromptActionKind};

pub use events::SessionEvent;
pub use view::{Gallery, HistoryRow, PromptActionsView, SessionView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    GeneratingImages,
    RunningPromptAction(PromptActionKind),
    ErrorDisplayed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetOption(OptionUpdate),
    Submit,
    ImagesGenerated {
        images: Vec<ImagePayload>,
        timestamp_ms: i64,
    },
    GenerationFailed {
        message: String,
    },
    StartPromptAction(PromptActionKind),
    PromptActionCompleted {
        kind: PromptActionKind,
        text: String,
    },
    PromptActionFailed {
        kind: PromptActionKind,
        message: String,
    },
    SelectHistory(String),
    /// Copies an entry's options into the live options, leaving the
    /// selection alone.
    RestoreOptions(String),
    DeleteHistory(String),
    ClearHistory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptRequest {
    Improve(String),
    Random,
    Describe(ReferenceImage),
}

impl PromptRequest {
    pub fn kind(&self) -> PromptActionKind {
        match self {
            PromptRequest::Improve(_) => PromptActionKind::Improve,
            PromptRequest::Random => PromptActionKind::Random,
            PromptRequest::Describe(_) => PromptActionKind::Describe,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    GenerateImages(GenerationOptions),
    RunPromptAction(PromptRequest),
    /// Transient message; does not replace the gallery.
    Notify(String),
}

/// View regions that need a redraw after an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub settings: bool,
    pub gallery: bool,
    pub history: bool,
    pub generate_button: bool,
    pub prompt_actions: bool,
}

impl Changes {
    pub fn any(&self) -> bool {
        self.settings || self.gallery || self.history || self.generate_button || self.prompt_actions
    }

    fn merge(self, other: Changes) -> Changes {
        Changes {
            settings: self.settings || other.settings,
            gallery: self.gallery || other.gallery,
            history: self.history || other.history,
            generate_button: self.generate_button || other.generate_button,
            prompt_actions: self.prompt_actions || other.prompt_actions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub effect: Effect,
    pub changes: Changes,
}

/// Why the controller refused an action. A refused action changes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("API key is not configured")]
    NotConfigured,
    #[error("an image generation is already in progress")]
    GenerationInProgress,
    #[error("a prompt action is already in progress")]
    PromptActionInProgress,
    #[error("prompt is empty")]
    BlankPrompt,
    #[error("no reference image is set")]
    MissingReferenceImage,
    #[error("no history entry with id '{0}'")]
    UnknownHistoryEntry(String),
    #[error(transparent)]
    InvalidOption(#[from] OptionsError),
    #[error("no matching request is in flight")]
    NotInFlight,
}

pub struct SessionController {
    options: GenerationOptions,
    history: HistoryStore,
    in_flight: Option<GenerationOptions>,
    pending_prompt_action: Option<PromptActionKind>,
    error: Option<String>,
    configured: bool,
    journal: Option<SessionJournal>,
}

/// Pre-update copy of everything the view derives from.
struct Snapshot {
    options: GenerationOptions,
    revision: u64,
    selected_id: Option<String>,
    loading: bool,
    pending: Option<PromptActionKind>,
    error: Option<String>,
}

impl SessionController {
    /// Starts a session over a loaded history. The newest entry, if any, is
    /// selected and its options become the live options.
    pub fn new(history: HistoryStore, configured: bool, journal: Option<SessionJournal>) -> Self {
        let mut controller = Self {
            options: GenerationOptions::default(),
            history,
            in_flight: None,
            pending_prompt_action: None,
            error: None,
            configured,
            journal,
        };
        if !configured {
            log::warn!("API key is not configured; generation is disabled");
        }
        controller.record(SessionEvent::SessionStarted {
            configured,
            history_len: controller.history.len(),
        });
        if controller.history.recovered_from_corruption() {
            controller.record(SessionEvent::HistoryCorruptDiscarded);
        }
        let discarded = controller.history.discarded_entries();
        if discarded > 0 {
            controller.record(SessionEvent::HistoryEntriesDiscarded { count: discarded });
        }
        if let Some(front_id) = controller.history.front().map(|entry| entry.id().to_string()) {
            if let Some(entry) = controller.history.select(&front_id) {
                controller.options = entry.options().clone();
            }
        }
        controller
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn pending_prompt_action(&self) -> Option<PromptActionKind> {
        self.pending_prompt_action
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn phase(&self) -> Phase {
        if self.in_flight.is_some() {
            Phase::GeneratingImages
        } else if let Some(kind) = self.pending_prompt_action {
            Phase::RunningPromptAction(kind)
        } else if self.error.is_some() {
            Phase::ErrorDisplayed
        } else {
            Phase::Idle
        }
    }

    pub fn view(&self, now_ms: i64) -> SessionView {
        SessionView::build(self, now_ms)
    }

    pub fn update(&mut self, action: Action) -> Result<Update, Rejection> {
        let before = self.snapshot();
        let effect = match action {
            Action::SetOption(update) => self.set_option(update)?,
            Action::Submit => self.begin_generation()?,
            Action::ImagesGenerated {
                images,
                timestamp_ms,
            } => self.finish_generation(images, timestamp_ms)?,
            Action::GenerationFailed { message } => self.fail_generation(message)?,
            Action::StartPromptAction(kind) => self.begin_prompt_action(kind)?,
            Action::PromptActionCompleted { kind, text } => {
                self.finish_prompt_action(kind, text)?
            }
            Action::PromptActionFailed { kind, message } => {
                self.fail_prompt_action(kind, message)?
            }
            Action::SelectHistory(id) => self.select_history(&id)?,
            Action::RestoreOptions(id) => self.restore_options(&id)?,
            Action::DeleteHistory(id) => self.delete_history(&id)?,
            Action::ClearHistory => self.clear_history()?,
        };
        Ok(Update {
            effect,
            changes: self.diff(&before),
        })
    }

    /// Runs a full generation round trip. The returned update covers both
    /// the start and the completion.
    pub fn submit(&mut self, client: &GenerationClient) -> Result<Update, Rejection> {
        let started = self.update(Action::Submit)?;
        let Effect::GenerateImages(options) = started.effect else {
            return Ok(started);
        };
        let completion = match client.generate_images(&options) {
            Ok(images) => Action::ImagesGenerated {
                images,
                timestamp_ms: now_millis(),
            },
            Err(err) => Action::GenerationFailed {
                message: err.to_string(),
            },
        };
        let finished = self.update(completion)?;
        Ok(Update {
            effect: finished.effect,
            changes: started.changes.merge(finished.changes),
        })
    }

    pub fn run_prompt_action(
        &mut self,
        kind: PromptActionKind,
        client: &GenerationClient,
    ) -> Result<Update, Rejection> {
        let started = self.update(Action::StartPromptAction(kind))?;
        let Effect::RunPromptAction(request) = started.effect else {
            return Ok(started);
        };
        let result = match &request {
            PromptRequest::Improve(prompt) => client.improve_prompt(prompt),
            PromptRequest::Random => client.random_prompt(),
            PromptRequest::Describe(image) => {
                client.describe_image(&image.base64, &image.mime_type)
            }
        };
        let completion = match result {
            Ok(text) => Action::PromptActionCompleted { kind, text },
            Err(err) => Action::PromptActionFailed {
                kind,
                message: err.to_string(),
            },
        };
        let finished = self.update(completion)?;
        Ok(Update {
            effect: finished.effect,
            changes: started.changes.merge(finished.changes),
        })
    }

    fn ensure_idle(&self) -> Result<(), Rejection> {
        if self.in_flight.is_some() {
            return Err(Rejection::GenerationInProgress);
        }
        if self.pending_prompt_action.is_some() {
            return Err(Rejection::PromptActionInProgress);
        }
        Ok(())
    }

    fn ensure_interactive(&self) -> Result<(), Rejection> {
        if !self.configured {
            return Err(Rejection::NotConfigured);
        }
        self.ensure_idle()
    }

    fn set_option(&mut self, update: OptionUpdate) -> Result<Effect, Rejection> {
        self.ensure_interactive()?;
        self.options.apply(update)?;
        Ok(Effect::None)
    }

    fn begin_generation(&mut self) -> Result<Effect, Rejection> {
        self.ensure_interactive()?;
        if !self.options.has_prompt() {
            return Err(Rejection::BlankPrompt);
        }
        let snapshot = self.options.clone();
        self.in_flight = Some(snapshot.clone());
        self.error = None;
        self.record(SessionEvent::GenerationStarted {
            prompt: snapshot.styled_prompt(),
            number_of_images: snapshot.number_of_images(),
            aspect_ratio: snapshot.aspect_ratio().as_str(),
        });
        Ok(Effect::GenerateImages(snapshot))
    }

    fn finish_generation(
        &mut self,
        images: Vec<ImagePayload>,
        timestamp_ms: i64,
    ) -> Result<Effect, Rejection> {
        if images.is_empty() {
            return self.fail_generation(ClientError::GenerationFailed.to_string());
        }
        let snapshot = self.in_flight.take().ok_or(Rejection::NotInFlight)?;
        let image_count = images.len();
        let entry = self.history.next_entry(&snapshot, images, timestamp_ms);
        let entry_id = entry.id().to_string();
        if let Err(err) = self.history.append(entry) {
            log::warn!("{err:#}");
        }
        self.history.select(&entry_id);
        self.error = None;
        self.record(SessionEvent::GenerationCompleted {
            entry_id,
            image_count,
        });
        Ok(Effect::None)
    }

    fn fail_generation(&mut self, message: String) -> Result<Effect, Rejection> {
        self.in_flight.take().ok_or(Rejection::NotInFlight)?;
        self.record(SessionEvent::GenerationFailed {
            message: message.clone(),
        });
        self.error = Some(message);
        Ok(Effect::None)
    }

    fn begin_prompt_action(&mut self, kind: PromptActionKind) -> Result<Effect, Rejection> {
        self.ensure_interactive()?;
        let request = match kind {
            PromptActionKind::Improve => {
                if !self.options.has_prompt() {
                    return Err(Rejection::BlankPrompt);
                }
                PromptRequest::Improve(self.options.prompt().to_string())
            }
            PromptActionKind::Random => PromptRequest::Random,
            PromptActionKind::Describe => match self.options.reference_image() {
                Some(image) => PromptRequest::Describe(image.clone()),
                None => return Err(Rejection::MissingReferenceImage),
            },
        };
        self.pending_prompt_action = Some(kind);
        self.error = None;
        self.record(SessionEvent::PromptActionStarted { kind });
        Ok(Effect::RunPromptAction(request))
    }

    fn finish_prompt_action(
        &mut self,
        kind: PromptActionKind,
        text: String,
    ) -> Result<Effect, Rejection> {
        self.take_pending(kind)?;
        let replaced = !text.is_empty();
        if replaced {
            self.options.apply(OptionUpdate::Prompt(text))?;
        }
        self.record(SessionEvent::PromptActionCompleted {
            kind,
            prompt_replaced: replaced,
        });
        Ok(Effect::None)
    }

    fn fail_prompt_action(
        &mut self,
        kind: PromptActionKind,
        message: String,
    ) -> Result<Effect, Rejection> {
        self.take_pending(kind)?;
        self.record(SessionEvent::PromptActionFailed { kind });
        Ok(Effect::Notify(message))
    }

    fn take_pending(&mut self, kind: PromptActionKind) -> Result<(), Rejection> {
        if self.pending_prompt_action != Some(kind) {
            return Err(Rejection::NotInFlight);
        }
        self.pending_prompt_action = None;
        Ok(())
    }

    fn select_history(&mut self, id: &str) -> Result<Effect, Rejection> {
        self.ensure_idle()?;
        let entry = self
            .history
            .select(id)
            .ok_or_else(|| Rejection::UnknownHistoryEntry(id.to_string()))?;
        self.options = entry.options().clone();
        self.error = None;
        self.record(SessionEvent::HistorySelected {
            entry_id: id.to_string(),
        });
        Ok(Effect::None)
    }

    fn restore_options(&mut self, id: &str) -> Result<Effect, Rejection> {
        self.ensure_idle()?;
        let entry = self
            .history
            .get(id)
            .ok_or_else(|| Rejection::UnknownHistoryEntry(id.to_string()))?;
        self.options = entry.options().clone();
        Ok(Effect::None)
    }

    fn delete_history(&mut self, id: &str) -> Result<Effect, Rejection> {
        self.ensure_idle()?;
        if self.history.get(id).is_none() {
            return Ok(Effect::None);
        }
        let was_selected = self.history.selected_id() == Some(id);
        let selection_changed = match self.history.delete(id) {
            Ok(outcome) => outcome.selection_changed,
            Err(err) => {
                log::warn!("{err:#}");
                was_selected
            }
        };
        if selection_changed {
            self.options = self
                .history
                .selected()
                .map(|entry| entry.options().clone())
                .unwrap_or_default();
        }
        self.record(SessionEvent::HistoryDeleted {
            entry_id: id.to_string(),
            selection_changed,
        });
        Ok(Effect::None)
    }

    fn clear_history(&mut self) -> Result<Effect, Rejection> {
        self.ensure_idle()?;
        let cleared = self.history.len();
        if let Err(err) = self.history.clear() {
            log::warn!("{err:#}");
        }
        self.error = None;
        self.options.clear_content();
        self.record(SessionEvent::HistoryCleared { entries: cleared });
        Ok(Effect::None)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            options: self.options.clone(),
            revision: self.history.revision(),
            selected_id: self.history.selected_id().map(str::to_string),
            loading: self.is_loading(),
            pending: self.pending_prompt_action,
            error: self.error.clone(),
        }
    }

    fn diff(&self, before: &Snapshot) -> Changes {
        let options_changed = before.options != self.options;
        let selection_changed = before.selected_id.as_deref() != self.history.selected_id();
        let loading_changed = before.loading != self.is_loading();
        let pending_changed = before.pending != self.pending_prompt_action;
        let prompt_presence_changed = before.options.has_prompt() != self.options.has_prompt();
        let reference_changed = before.options.reference_image().is_some()
            != self.options.reference_image().is_some();
        Changes {
            settings: options_changed,
            gallery: selection_changed || loading_changed || before.error != self.error,
            history: selection_changed || before.revision != self.history.revision(),
            generate_button: loading_changed || pending_changed || prompt_presence_changed,
            prompt_actions: loading_changed
                || pending_changed
                || prompt_presence_changed
                || reference_changed,
        }
    }

    fn record(&self, event: SessionEvent) {
        let Some(journal) = &self.journal else {
            return;
        };
        if let Err(err) = journal.record(&event) {
            log::warn!("failed to record {} event: {err:#}", event.name());
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
