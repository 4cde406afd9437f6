use super::intent_parser::ChatAction;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArgKind {
    None,
    Text,
    Path,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: ChatAction,
    pub arg: ArgKind,
}

const fn spec(command: &'static str, action: ChatAction, arg: ArgKind) -> CommandSpec {
    CommandSpec {
        command,
        action,
        arg,
    }
}

pub(crate) const COMMANDS: &[CommandSpec] = &[
    spec("prompt", ChatAction::SetPrompt, ArgKind::Text),
    spec("generate", ChatAction::GenerateCurrent, ArgKind::None),
    spec("aspect", ChatAction::SetAspect, ArgKind::Text),
    spec("count", ChatAction::SetCount, ArgKind::Text),
    spec("style", ChatAction::SetStyle, ArgKind::Text),
    spec("negative", ChatAction::SetNegative, ArgKind::Text),
    spec("seed", ChatAction::SetSeed, ArgKind::Text),
    spec("ref", ChatAction::SetReference, ArgKind::Path),
    spec("ref_clear", ChatAction::ClearReference, ArgKind::None),
    spec("improve", ChatAction::Improve, ArgKind::None),
    spec("random", ChatAction::Random, ArgKind::None),
    spec("describe", ChatAction::Describe, ArgKind::None),
    spec("history", ChatAction::ListHistory, ArgKind::None),
    spec("select", ChatAction::Select, ArgKind::Text),
    spec("delete", ChatAction::Delete, ArgKind::Text),
    spec("clear", ChatAction::ClearHistory, ArgKind::None),
    spec("edit", ChatAction::Edit, ArgKind::Text),
    spec("export", ChatAction::Export, ArgKind::Path),
    spec("options", ChatAction::ShowOptions, ArgKind::None),
    spec("dismiss", ChatAction::DismissNotice, ArgKind::None),
    spec("help", ChatAction::Help, ArgKind::None),
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/prompt",
    "/generate",
    "/aspect",
    "/count",
    "/style",
    "/negative",
    "/seed",
    "/ref",
    "/ref_clear",
    "/improve",
    "/random",
    "/describe",
    "/history",
    "/select",
    "/delete",
    "/clear",
    "/edit",
    "/export",
    "/options",
    "/dismiss",
    "/help",
];

pub(crate) fn find_command(command: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.command == command)
}
