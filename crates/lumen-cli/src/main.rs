mod chat;
mod render;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lumen_contracts::events::SessionJournal;
use lumen_contracts::history::{export_entry, HistoryStore};
use lumen_contracts::options::{random_seed, AspectRatio, OptionUpdate, ReferenceImage, StylePreset};
use lumen_contracts::storage::FileStorage;
use lumen_engine::{now_millis, Action, ClientConfig, Effect, PromptActionKind, SessionController};

use crate::chat::{run_chat, Session};
use crate::render::{entry_lines, history_lines};

#[derive(Debug, Parser)]
#[command(name = "lumen", version, about = "Image generation sessions with local history")]
struct Cli {
    /// Storage file holding history and flags.
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    /// Append session events to this JSONL file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    /// Use the offline placeholder transport.
    #[arg(long, global = true)]
    dryrun: bool,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat,
    Generate(GenerateArgs),
    Improve(ImproveArgs),
    Random,
    Describe(DescribeArgs),
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
    Export(ExportArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "1:1")]
    aspect: String,
    #[arg(long, default_value_t = 1)]
    count: u32,
    #[arg(long, default_value = "none")]
    style: String,
    #[arg(long, default_value = "")]
    negative: String,
    /// Whole number, or `random`.
    #[arg(long, default_value = "")]
    seed: String,
    /// Write the generated images here.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ImproveArgs {
    #[arg(long)]
    prompt: String,
}

#[derive(Debug, Parser)]
struct DescribeArgs {
    #[arg(long)]
    image: PathBuf,
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    List,
    Show { id: String },
    Delete { id: String },
    Clear,
}

#[derive(Debug, Parser)]
struct ExportArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    out: PathBuf,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("lumen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut session = open_session(&cli)?;
    match cli.command {
        Command::Chat => {
            run_chat(&mut session)?;
            Ok(0)
        }
        Command::Generate(args) => run_generate(&mut session, args),
        Command::Improve(args) => {
            apply(&mut session, Action::SetOption(OptionUpdate::Prompt(args.prompt)))?;
            run_prompt_action(&mut session, PromptActionKind::Improve)
        }
        Command::Random => run_prompt_action(&mut session, PromptActionKind::Random),
        Command::Describe(args) => {
            let image = ReferenceImage::from_path(&args.image)?;
            apply(
                &mut session,
                Action::SetOption(OptionUpdate::ReferenceImage(Some(image))),
            )?;
            run_prompt_action(&mut session, PromptActionKind::Describe)
        }
        Command::History { command } => run_history(&mut session, command),
        Command::Export(args) => {
            let Some(entry) = session.controller.history().get(&args.id) else {
                bail!("no history entry with id '{}'", args.id);
            };
            for path in export_entry(entry, &args.out)? {
                println!("{}", path.display());
            }
            Ok(0)
        }
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .target(env_logger::Target::Stderr);
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("lumen").join("storage.json"))
        .unwrap_or_else(|| Path::new(".lumen").join("storage.json"))
}

fn open_session(cli: &Cli) -> Result<Session> {
    let store_path = cli.store.clone().unwrap_or_else(default_store_path);
    log::debug!("using storage {}", store_path.display());
    let storage = FileStorage::new(&store_path);
    let history = HistoryStore::load(Box::new(storage.clone()));

    let config = ClientConfig::from_env(cli.dryrun);
    let client = config.build_client();
    let journal = cli.events.as_ref().map(SessionJournal::new);
    let controller = SessionController::new(history, config.is_configured(), journal);
    Ok(Session::new(controller, client, Box::new(storage)))
}

fn apply(session: &mut Session, action: Action) -> Result<()> {
    session.controller.update(action)?;
    Ok(())
}

fn run_generate(session: &mut Session, args: GenerateArgs) -> Result<i32> {
    let seed = if args.seed.trim() == "random" {
        random_seed()
    } else {
        args.seed
    };
    for update in [
        OptionUpdate::Prompt(args.prompt),
        OptionUpdate::AspectRatio(args.aspect.parse::<AspectRatio>()?),
        OptionUpdate::NumberOfImages(args.count),
        OptionUpdate::StylePreset(args.style.parse::<StylePreset>()?),
        OptionUpdate::NegativePrompt(args.negative),
        OptionUpdate::Seed(seed),
        OptionUpdate::ReferenceImage(None),
    ] {
        apply(session, Action::SetOption(update))?;
    }

    session.controller.submit(&session.client)?;
    if let Some(message) = session.controller.error() {
        bail!("{message}");
    }
    let Some(entry) = session.controller.history().selected() else {
        bail!("generation finished without a history entry");
    };
    println!("{} ({} image(s))", entry.id(), entry.images().len());
    if let Some(out) = &args.out {
        for path in export_entry(entry, out)
            .with_context(|| format!("failed to export {}", entry.id()))?
        {
            println!("{}", path.display());
        }
    }
    Ok(0)
}

fn run_prompt_action(session: &mut Session, kind: PromptActionKind) -> Result<i32> {
    let update = session.controller.run_prompt_action(kind, &session.client)?;
    if let Effect::Notify(message) = update.effect {
        bail!("{message}");
    }
    println!("{}", session.controller.options().prompt());
    Ok(0)
}

fn run_history(session: &mut Session, command: HistoryCommand) -> Result<i32> {
    match command {
        HistoryCommand::List => {
            let view = session.controller.view(now_millis());
            for line in history_lines(&view.history) {
                println!("{line}");
            }
        }
        HistoryCommand::Show { id } => {
            let Some(entry) = session.controller.history().get(&id) else {
                bail!("no history entry with id '{id}'");
            };
            for line in entry_lines(entry, now_millis()) {
                println!("{line}");
            }
        }
        HistoryCommand::Delete { id } => {
            if session.controller.history().get(&id).is_none() {
                println!("No history entry {id}");
                return Ok(1);
            }
            apply(session, Action::DeleteHistory(id.clone()))?;
            println!("Deleted {id}");
        }
        HistoryCommand::Clear => {
            let count = session.controller.history().len();
            apply(session, Action::ClearHistory)?;
            println!("Cleared {count} entries");
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_flags_default_to_first_run_options() {
        let cli = Cli::parse_from(["lumen", "--dryrun", "generate", "--prompt", "fox"]);
        assert!(cli.dryrun);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.aspect, "1:1");
        assert_eq!(args.count, 1);
        assert_eq!(args.style, "none");
        assert_eq!(args.seed, "");
        assert!(args.out.is_none());
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::parse_from([
            "lumen",
            "history",
            "show",
            "gen_1",
            "--store",
            "/tmp/lumen.json",
            "-v",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.store.as_deref(), Some(Path::new("/tmp/lumen.json")));
        assert!(matches!(
            cli.command,
            Command::History {
                command: HistoryCommand::Show { ref id }
            } if id == "gen_1"
        ));
    }

    #[test]
    fn dryrun_generate_persists_and_exports() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = temp.path().join("storage.json");
        let cli = Cli::parse_from([
            "lumen",
            "--dryrun",
            "--store",
            store.to_str().unwrap_or_default(),
            "generate",
            "--prompt",
            "a red fox",
            "--count",
            "2",
            "--style",
            "anime",
        ]);
        let mut session = open_session(&cli)?;
        let Command::Generate(mut args) = cli.command else {
            panic!("expected generate");
        };
        args.out = Some(temp.path().join("out"));
        assert_eq!(run_generate(&mut session, args)?, 0);
        assert!(temp.path().join("out").join("generated_a_red_fox_2.jpg").exists());

        let reopened = HistoryStore::load(Box::new(FileStorage::new(&store)));
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.entries()[0].images().len(), 2);
        Ok(())
    }
}
