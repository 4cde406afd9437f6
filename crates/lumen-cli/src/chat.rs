use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use lumen_contracts::chat::{parse_intent, ChatAction, ChatIntent, CHAT_HELP_COMMANDS};
use lumen_contracts::history::export_entry;
use lumen_contracts::options::{
    random_seed, AspectRatio, OptionUpdate, ReferenceImage, StylePreset,
};
use lumen_contracts::storage::{dismiss_notice, notice_dismissed, KeyValueStorage};
use lumen_engine::{
    now_millis, Action, Effect, GenerationClient, PromptActionKind, Rejection, SessionController,
    Update,
};

use crate::render::{gallery_line, history_lines, options_lines, MISSING_KEY_TEXT, NOTICE_TEXT};

/// Controller, client and the raw storage handle used for the notice flag.
pub struct Session {
    pub controller: SessionController,
    pub client: GenerationClient,
    pub storage: Box<dyn KeyValueStorage>,
}

impl Session {
    pub fn new(
        controller: SessionController,
        client: GenerationClient,
        storage: Box<dyn KeyValueStorage>,
    ) -> Self {
        Self {
            controller,
            client,
            storage,
        }
    }

    pub fn banner_lines(&self) -> Vec<&'static str> {
        let mut lines = Vec::new();
        if !self.controller.is_configured() {
            lines.push(MISSING_KEY_TEXT);
        }
        if !notice_dismissed(self.storage.as_ref()) {
            lines.push(NOTICE_TEXT);
        }
        lines
    }
}

pub fn run_chat(session: &mut Session) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in session.banner_lines() {
        writeln!(stdout, "{line}")?;
    }
    writeln!(stdout, "Lumen chat started. Type /help for commands.")?;
    if let Some(entry) = session.controller.history().selected() {
        writeln!(stdout, "Restored {} ({})", entry.id(), entry.title())?;
    }

    let mut line = String::new();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        line.clear();
        let read = match stdin.lock().read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        handle_intent(session, &intent, &mut stdout)?;
    }
    Ok(())
}

pub fn handle_intent(session: &mut Session, intent: &ChatIntent, out: &mut dyn Write) -> Result<()> {
    let arg = intent.arg.as_str();
    match intent.action {
        ChatAction::Noop => {}
        ChatAction::Help => {
            writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?;
            writeln!(out, "Plain text sets the prompt and generates.")?;
        }
        ChatAction::Generate => {
            if set_option(session, OptionUpdate::Prompt(arg.to_string()), out)? {
                generate(session, out)?;
            }
        }
        ChatAction::GenerateCurrent => generate(session, out)?,
        ChatAction::SetPrompt => {
            if set_option(session, OptionUpdate::Prompt(arg.to_string()), out)? {
                writeln!(out, "Prompt set.")?;
            }
        }
        ChatAction::SetAspect => match arg.parse::<AspectRatio>() {
            Ok(ratio) => {
                if set_option(session, OptionUpdate::AspectRatio(ratio), out)? {
                    writeln!(out, "Aspect ratio: {ratio}")?;
                }
            }
            Err(err) => writeln!(out, "{err}")?,
        },
        ChatAction::SetCount => match arg.trim().parse::<u32>() {
            Ok(count) => {
                if set_option(session, OptionUpdate::NumberOfImages(count), out)? {
                    writeln!(out, "Number of images: {count}")?;
                }
            }
            Err(_) => writeln!(out, "/count requires a number between 1 and 4")?,
        },
        ChatAction::SetStyle => match arg.parse::<StylePreset>() {
            Ok(style) => {
                if set_option(session, OptionUpdate::StylePreset(style), out)? {
                    writeln!(out, "Style: {style}")?;
                }
            }
            Err(err) => writeln!(
                out,
                "{err}. Available: {}",
                StylePreset::names().join(", ")
            )?,
        },
        ChatAction::SetNegative => {
            if set_option(session, OptionUpdate::NegativePrompt(arg.to_string()), out)? {
                writeln!(out, "Negative prompt set.")?;
            }
        }
        ChatAction::SetSeed => {
            let seed = match arg.trim() {
                "random" => random_seed(),
                "clear" => String::new(),
                other => other.to_string(),
            };
            if set_option(session, OptionUpdate::Seed(seed), out)? {
                let current = session.controller.options().seed().unwrap_or("-");
                writeln!(out, "Seed: {current}")?;
            }
        }
        ChatAction::SetReference => {
            if arg.is_empty() {
                writeln!(out, "/ref requires an image path or data URL")?;
                return Ok(());
            }
            let loaded = if arg.starts_with("data:") {
                ReferenceImage::from_data_url(arg).map_err(anyhow::Error::from)
            } else {
                ReferenceImage::from_path(Path::new(arg))
            };
            match loaded {
                Ok(image) => {
                    let mime = image.mime_type.clone();
                    if set_option(session, OptionUpdate::ReferenceImage(Some(image)), out)? {
                        writeln!(out, "Reference image set ({mime}).")?;
                    }
                }
                Err(err) => writeln!(out, "Reference image failed: {err:#}")?,
            }
        }
        ChatAction::ClearReference => {
            if set_option(session, OptionUpdate::ReferenceImage(None), out)? {
                writeln!(out, "Reference image cleared.")?;
            }
        }
        ChatAction::Improve => prompt_action(session, PromptActionKind::Improve, out)?,
        ChatAction::Random => prompt_action(session, PromptActionKind::Random, out)?,
        ChatAction::Describe => prompt_action(session, PromptActionKind::Describe, out)?,
        ChatAction::ListHistory => {
            let view = session.controller.view(now_millis());
            for line in history_lines(&view.history) {
                writeln!(out, "{line}")?;
            }
        }
        ChatAction::Select => {
            if arg.is_empty() {
                writeln!(out, "/select requires a history id")?;
            } else if apply(session, Action::SelectHistory(arg.to_string()), out)?.is_some() {
                let view = session.controller.view(now_millis());
                writeln!(out, "{}", gallery_line(&view.gallery))?;
            }
        }
        ChatAction::Delete => {
            if arg.is_empty() {
                writeln!(out, "/delete requires a history id")?;
            } else if session.controller.history().get(arg).is_none() {
                writeln!(out, "No history entry {arg}")?;
            } else if apply(session, Action::DeleteHistory(arg.to_string()), out)?.is_some() {
                writeln!(out, "Deleted {arg}")?;
            }
        }
        ChatAction::ClearHistory => {
            if apply(session, Action::ClearHistory, out)?.is_some() {
                writeln!(out, "History cleared.")?;
            }
        }
        ChatAction::Edit => {
            let id = if arg.is_empty() {
                session.controller.history().selected_id().map(str::to_string)
            } else {
                Some(arg.to_string())
            };
            let Some(id) = id else {
                writeln!(out, "/edit requires a history id (or a selected entry)")?;
                return Ok(());
            };
            if apply(session, Action::RestoreOptions(id.clone()), out)?.is_some() {
                writeln!(out, "Options restored from {id}")?;
            }
        }
        ChatAction::Export => {
            let Some(entry) = session.controller.history().selected() else {
                writeln!(out, "Nothing selected to export.")?;
                return Ok(());
            };
            let out_dir = if arg.is_empty() {
                PathBuf::from(".")
            } else {
                PathBuf::from(arg)
            };
            match export_entry(entry, &out_dir) {
                Ok(paths) => {
                    for path in paths {
                        writeln!(out, "Saved {}", path.display())?;
                    }
                }
                Err(err) => writeln!(out, "Export failed: {err:#}")?,
            }
        }
        ChatAction::ShowOptions => {
            for line in options_lines(session.controller.options()) {
                writeln!(out, "{line}")?;
            }
        }
        ChatAction::DismissNotice => {
            dismiss_notice(session.storage.as_mut())?;
            writeln!(out, "Notice dismissed.")?;
        }
        ChatAction::Unknown => {
            let command = intent.command.as_deref().unwrap_or("unknown");
            writeln!(out, "Unknown command: /{command}")?;
        }
    }
    Ok(())
}

fn generate(session: &mut Session, out: &mut dyn Write) -> Result<()> {
    let count = session.controller.options().number_of_images();
    writeln!(out, "Generating {count} image(s)...")?;
    let result = session.controller.submit(&session.client);
    if report(result, out)?.is_none() {
        return Ok(());
    }
    if let Some(message) = session.controller.error() {
        writeln!(out, "Generation failed: {message}")?;
    } else if let Some(entry) = session.controller.history().selected() {
        writeln!(
            out,
            "Generation complete: {} ({} image(s))",
            entry.id(),
            entry.images().len()
        )?;
    }
    Ok(())
}

fn prompt_action(
    session: &mut Session,
    kind: PromptActionKind,
    out: &mut dyn Write,
) -> Result<()> {
    let result = session.controller.run_prompt_action(kind, &session.client);
    let Some(update) = report(result, out)? else {
        return Ok(());
    };
    match update.effect {
        Effect::Notify(message) => writeln!(out, "{message}")?,
        _ => writeln!(out, "Prompt: {}", session.controller.options().prompt())?,
    }
    Ok(())
}

fn set_option(session: &mut Session, update: OptionUpdate, out: &mut dyn Write) -> Result<bool> {
    Ok(apply(session, Action::SetOption(update), out)?.is_some())
}

fn apply(session: &mut Session, action: Action, out: &mut dyn Write) -> Result<Option<Update>> {
    let result = session.controller.update(action);
    report(result, out)
}

fn report(result: Result<Update, Rejection>, out: &mut dyn Write) -> Result<Option<Update>> {
    match result {
        Ok(update) => Ok(Some(update)),
        Err(rejection) => {
            log::debug!("action rejected: {rejection:?}");
            writeln!(out, "Rejected: {rejection}")?;
            Ok(None)
        }
    }
}
