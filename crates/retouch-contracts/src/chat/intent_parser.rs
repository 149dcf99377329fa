use super::command_registry::{find_command, ArgShape};

/// One parsed chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Blank input.
    Noop,
    /// Any line that is not a slash command.
    Submit(String),
    /// Start a fresh editor session, optionally attaching a main image.
    Editor(Option<String>),
    Generator,
    /// Attach the main image.
    Image(Option<String>),
    NewImage,
    AddReferences(Vec<String>),
    RemoveReference(Option<u64>),
    ListReferences,
    History,
    StartNew,
    ImageModel(Option<String>),
    Help,
    Quit,
    Unknown { command: String, arg: String },
}

enum Arg {
    None,
    Text(Option<String>),
    Paths(Vec<String>),
}

fn split_paths(arg: &str) -> Vec<String> {
    // Unbalanced quotes fall back to plain whitespace splitting.
    shell_words::split(arg)
        .unwrap_or_else(|_| arg.split_whitespace().map(str::to_string).collect())
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn shape_arg(shape: ArgShape, arg: &str) -> Arg {
    match shape {
        ArgShape::None => Arg::None,
        ArgShape::Raw => Arg::Text(non_empty(arg.to_string())),
        ArgShape::Path => Arg::Text(non_empty(split_paths(arg).join(" "))),
        ArgShape::Paths => Arg::Paths(split_paths(arg)),
    }
}

/// Turns one chat line into a command. Lines that are not slash commands are
/// prompt submissions; so is a bare `/` followed by text.
pub fn parse_command(text: &str) -> ChatCommand {
    let line = text.trim();
    if line.is_empty() {
        return ChatCommand::Noop;
    }
    let Some(tail) = line.strip_prefix('/') else {
        return ChatCommand::Submit(line.to_string());
    };
    let name_len = tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if name_len == 0 {
        return ChatCommand::Submit(line.to_string());
    }
    let name = tail[..name_len].to_ascii_lowercase();
    let arg = tail[name_len..].trim();

    let Some(spec) = find_command(&name) else {
        return ChatCommand::Unknown {
            command: name,
            arg: arg.to_string(),
        };
    };
    let shaped = shape_arg(spec.shape, arg);
    let text_of = |shaped: Arg| match shaped {
        Arg::Text(value) => value,
        _ => None,
    };
    match spec.name {
        "editor" => ChatCommand::Editor(text_of(shaped)),
        "generator" => ChatCommand::Generator,
        "image" => ChatCommand::Image(text_of(shaped)),
        "new_image" => ChatCommand::NewImage,
        "ref" => match shaped {
            Arg::Paths(paths) => ChatCommand::AddReferences(paths),
            _ => ChatCommand::AddReferences(Vec::new()),
        },
        "unref" => ChatCommand::RemoveReference(text_of(shaped).and_then(|raw| raw.parse().ok())),
        "refs" => ChatCommand::ListReferences,
        "history" => ChatCommand::History,
        "new" => ChatCommand::StartNew,
        "image_model" => ChatCommand::ImageModel(text_of(shaped)),
        "help" => ChatCommand::Help,
        "quit" | "exit" => ChatCommand::Quit,
        other => ChatCommand::Unknown {
            command: other.to_string(),
            arg: arg.to_string(),
        },
    }
}
