use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use retouch_contracts::chat::{help_lines, parse_command, ChatCommand};
use retouch_contracts::ledger::{Ledger, SessionMode};
use retouch_contracts::models::Capability;
use retouch_contracts::session::Session;
use retouch_contracts::store::{FileStorage, HistoryStore};
use retouch_engine::{EditEngine, EngineOptions, SubmitError};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "retouch", version, about = "Chat-style image editing sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session: type prompts, steer with slash commands.
    Chat(ChatArgs),
    /// One edit turn against a main image.
    Edit(EditArgs),
    /// One text-to-image turn.
    Generate(GenerateArgs),
    /// Print the stored turns grouped by chain.
    History(OutArgs),
    /// Clear the stored history.
    Reset(OutArgs),
}

#[derive(Debug, Args)]
struct OutArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct EngineArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl EngineArgs {
    fn open(&self, mode: SessionMode) -> Result<EditEngine> {
        EditEngine::open(
            &self.out,
            mode,
            EngineOptions {
                image_model: self.image_model.clone(),
                request_timeout: self.timeout_secs.map(Duration::from_secs),
            },
        )
    }
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    engine: EngineArgs,
    /// Only applies when there is no stored history to restore.
    #[arg(long, default_value = "editor")]
    mode: SessionMode,
    #[arg(long)]
    image: Option<String>,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[command(flatten)]
    engine: EngineArgs,
    #[arg(long)]
    image: String,
    #[arg(long)]
    prompt: String,
    #[arg(long = "reference")]
    references: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[command(flatten)]
    engine: EngineArgs,
    #[arg(long)]
    prompt: String,
    #[arg(long = "reference")]
    references: Vec<PathBuf>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("retouch error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(env_filter),
        )
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Edit(args) => run_edit(args),
        Command::Generate(args) => run_generate(args),
        Command::History(args) => run_history(args),
        Command::Reset(args) => run_reset(args),
    }
}

fn run_edit(args: EditArgs) -> Result<i32> {
    let mut engine = args.engine.open(SessionMode::Editor)?;
    engine.session_mut().set_mode(SessionMode::Editor);
    engine
        .attach_anchor(&args.image)
        .with_context(|| format!("failed to load main image {}", args.image))?;
    engine.add_references(&args.references)?;
    let turn = engine.submit_prompt(args.prompt)?;
    println!("{}", turn.edited_url);
    Ok(0)
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let mut engine = args.engine.open(SessionMode::Generator)?;
    engine.session_mut().set_mode(SessionMode::Generator);
    engine.add_references(&args.references)?;
    let turn = engine.submit_prompt(args.prompt)?;
    println!("{}", turn.edited_url);
    Ok(0)
}

fn history_store(args: &OutArgs) -> HistoryStore {
    HistoryStore::new(FileStorage::new(args.out.join("storage.json")))
}

fn run_history(args: OutArgs) -> Result<i32> {
    let ledger = history_store(&args).load();
    print!("{}", render_history(&ledger));
    Ok(0)
}

fn run_reset(args: OutArgs) -> Result<i32> {
    history_store(&args).clear();
    println!("History cleared.");
    Ok(0)
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let mut engine = args.engine.open(args.mode)?;
    if let Some(image) = args.image.as_deref() {
        engine.session_mut().set_mode(SessionMode::Editor);
        engine
            .attach_anchor(image)
            .with_context(|| format!("failed to load main image {image}"))?;
    }

    let stdin = io::stdin();
    let mut line = String::new();

    println!(
        "Retouch chat started in {} mode ({} stored turns). Type /help for commands.",
        engine.mode(),
        engine.ledger().len()
    );

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        match dispatch(&mut engine, parse_command(input)) {
            Some(reply) if reply.is_empty() => {}
            Some(reply) => println!("{}", reply.trim_end()),
            None => break,
        }
    }
    Ok(())
}

/// Applies one chat command and returns what to show; `None` ends the chat.
fn dispatch(engine: &mut EditEngine, command: ChatCommand) -> Option<String> {
    tracing::debug!(?command, mode = %engine.mode(), "chat command");
    let reply = match command {
        ChatCommand::Noop => String::new(),
        ChatCommand::Quit => return None,
        ChatCommand::Help => {
            let mut out = "Commands:\n".to_string();
            for usage in help_lines() {
                out.push_str(&format!("  {usage}\n"));
            }
            out.push_str("Anything else is sent as a prompt.");
            out
        }
        ChatCommand::Editor(path) => {
            engine.start_new(SessionMode::Editor);
            let mut out = "Editor mode. Attach a main image with /image <path>.".to_string();
            if let Some(path) = path {
                out.push('\n');
                out.push_str(&attach_anchor(engine, &path));
            }
            out
        }
        ChatCommand::Generator => {
            engine.start_new(SessionMode::Generator);
            "Generator mode. Describe the image you want.".to_string()
        }
        ChatCommand::Image(None) => "/image requires a path".to_string(),
        ChatCommand::Image(Some(path)) => {
            if engine.mode() == SessionMode::Editor {
                attach_anchor(engine, &path)
            } else {
                "/image is only available in editor mode (use /editor).".to_string()
            }
        }
        ChatCommand::NewImage => {
            if engine.mode() == SessionMode::Editor {
                engine.new_main_image();
                "Attach the new main image with /image <path>.".to_string()
            } else {
                "/new_image is only available in editor mode.".to_string()
            }
        }
        ChatCommand::AddReferences(paths) if paths.is_empty() => {
            "/ref requires at least one path".to_string()
        }
        ChatCommand::AddReferences(paths) => match engine.add_references(&paths) {
            Ok(ids) => format!("Added reference images: {}", join_ids(&ids)),
            Err(err) => err.to_string(),
        },
        ChatCommand::RemoveReference(None) => {
            "/unref requires a numeric id (see /refs)".to_string()
        }
        ChatCommand::RemoveReference(Some(id)) => {
            if engine.remove_reference(id) {
                format!("Removed reference image {id}")
            } else {
                format!("No reference image with id {id}")
            }
        }
        ChatCommand::ListReferences => render_session(engine.session()),
        ChatCommand::History => render_history(engine.ledger()),
        ChatCommand::StartNew => {
            let mode = engine.mode();
            engine.start_new(mode);
            format!("Started a new {mode} session.")
        }
        ChatCommand::ImageModel(None) => {
            let current = engine
                .image_model()
                .map(str::to_string)
                .unwrap_or_else(|| default_image_model(engine));
            format!("Image model: {current}")
        }
        ChatCommand::ImageModel(Some(model)) => {
            let reply = format!("Image model set to {model}");
            engine.set_image_model(Some(model));
            reply
        }
        ChatCommand::Submit(prompt) => match engine.submit_prompt(prompt) {
            Ok(turn) => format!("Edited image: {}", turn.edited_url),
            Err(err) => submit_error_message(&err),
        },
        ChatCommand::Unknown { command, .. } => {
            format!("Unknown command: /{command}. Type /help for commands.")
        }
    };
    Some(reply)
}

fn attach_anchor(engine: &mut EditEngine, path: &str) -> String {
    match engine.attach_anchor(path) {
        Ok(()) => format!("Main image set to {path}"),
        Err(err) => err.to_string(),
    }
}

fn default_image_model(engine: &EditEngine) -> String {
    engine
        .models()
        .default_for(Capability::Edit)
        .map(|model| model.name.clone())
        .unwrap_or_default()
}

fn submit_error_message(err: &SubmitError) -> String {
    if err.is_validation() {
        err.to_string()
    } else {
        format!(
            "Error: {err}\nYour prompt and reference images were kept; send the prompt again to retry."
        )
    }
}

fn render_history(ledger: &Ledger) -> String {
    if ledger.is_empty() {
        return "No turns yet.\n".to_string();
    }
    let mut out = String::new();
    for (index, chain) in ledger.chains().iter().enumerate() {
        out.push_str(&format!(
            "Chain {} ({} turns) from {}\n",
            index + 1,
            chain.turns.len(),
            chain.original_url
        ));
        for turn in &chain.turns {
            out.push_str(&format!("  [{}] {} -> {}", turn.id, turn.prompt, turn.edited_url));
            if !turn.reference_image_urls.is_empty() {
                out.push_str(&format!(" (+{} refs)", turn.reference_image_urls.len()));
            }
            out.push('\n');
        }
    }
    out
}

fn render_session(session: &Session) -> String {
    let mut out = format!(
        "Main image: {}\n",
        session.anchor_url().unwrap_or("(none)")
    );
    let mut any = false;
    for reference in session.references() {
        any = true;
        out.push_str(&format!("  {}: {}\n", reference.id, reference.url));
    }
    if !any {
        out.push_str("No reference images.\n");
    }
    out
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<String>>()
        .join(", ")
}
