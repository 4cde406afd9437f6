use super::command_registry::{find_command, ArgKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    Noop,
    Generate,
    SetPrompt,
    GenerateCurrent,
    SetAspect,
    SetCount,
    SetStyle,
    SetNegative,
    SetSeed,
    SetReference,
    ClearReference,
    Improve,
    Random,
    Describe,
    ListHistory,
    Select,
    Delete,
    ClearHistory,
    Edit,
    Export,
    ShowOptions,
    DismissNotice,
    Help,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatIntent {
    pub action: ChatAction,
    pub raw: String,
    /// Command argument, or the prompt text for plain input.
    pub arg: String,
    /// Set only for unrecognised slash commands.
    pub command: Option<String>,
}

impl ChatIntent {
    fn new(action: ChatAction, raw: &str, arg: impl Into<String>) -> Self {
        Self {
            action,
            raw: raw.to_string(),
            arg: arg.into(),
            command: None,
        }
    }
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    parse_path_args(arg).join(" ")
}

pub fn parse_intent(text: &str) -> ChatIntent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return ChatIntent::new(ChatAction::Noop, text, "");
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            let Some(spec) = find_command(&command) else {
                let mut intent = ChatIntent::new(ChatAction::Unknown, text, arg);
                intent.command = Some(command);
                return intent;
            };
            let arg = match spec.arg {
                ArgKind::None => String::new(),
                ArgKind::Text => arg.to_string(),
                ArgKind::Path => parse_single_path_arg(arg),
            };
            return ChatIntent::new(spec.action, text, arg);
        }
    }

    ChatIntent::new(ChatAction::Generate, text, raw_trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_input_is_noop() {
        assert_eq!(parse_intent("   ").action, ChatAction::Noop);
    }

    #[test]
    fn plain_text_generates_with_trimmed_prompt() {
        let intent = parse_intent("  a red fox in snow \n");
        assert_eq!(intent.action, ChatAction::Generate);
        assert_eq!(intent.arg, "a red fox in snow");
    }

    #[test]
    fn text_commands_keep_their_argument() {
        let style = parse_intent("/style anime");
        assert_eq!(style.action, ChatAction::SetStyle);
        assert_eq!(style.arg, "anime");

        let prompt = parse_intent("/prompt  a castle, at dusk ");
        assert_eq!(prompt.action, ChatAction::SetPrompt);
        assert_eq!(prompt.arg, "a castle, at dusk");

        let select = parse_intent("/select gen_123");
        assert_eq!(select.action, ChatAction::Select);
        assert_eq!(select.arg, "gen_123");
    }

    #[test]
    fn path_commands_unquote_arguments() {
        let reference = parse_intent("/ref \"/tmp/my photo.png\"");
        assert_eq!(reference.action, ChatAction::SetReference);
        assert_eq!(reference.arg, "/tmp/my photo.png");

        let export = parse_intent("/export out/dir");
        assert_eq!(export.action, ChatAction::Export);
        assert_eq!(export.arg, "out/dir");
    }

    #[test]
    fn no_arg_commands_drop_trailing_text() {
        let improve = parse_intent("/improve please");
        assert_eq!(improve.action, ChatAction::Improve);
        assert_eq!(improve.arg, "");
        assert_eq!(parse_intent("/ref_clear").action, ChatAction::ClearReference);
        assert_eq!(parse_intent("/HELP").action, ChatAction::Help);
    }

    #[test]
    fn unknown_command_reports_name_and_arg() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, ChatAction::Unknown);
        assert_eq!(intent.command.as_deref(), Some("magic"));
        assert_eq!(intent.arg, "foo bar");
    }

    #[test]
    fn lone_slash_is_treated_as_prompt_text() {
        let intent = parse_intent("/ 50% off");
        assert_eq!(intent.action, ChatAction::Generate);
        assert_eq!(intent.arg, "/ 50% off");
    }
}
