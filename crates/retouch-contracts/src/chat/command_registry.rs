/// How the text after a slash command is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArgShape {
    None,
    /// Trimmed verbatim.
    Raw,
    /// One path; shell quoting is honoured.
    Path,
    /// Any number of shell-quoted paths.
    Paths,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub name: &'static str,
    pub shape: ArgShape,
    pub usage: &'static str,
}

const fn spec(name: &'static str, shape: ArgShape, usage: &'static str) -> CommandSpec {
    CommandSpec { name, shape, usage }
}

pub(crate) const COMMANDS: &[CommandSpec] = &[
    spec("editor", ArgShape::Path, "/editor [path]"),
    spec("generator", ArgShape::None, "/generator"),
    spec("image", ArgShape::Path, "/image <path>"),
    spec("new_image", ArgShape::None, "/new_image"),
    spec("ref", ArgShape::Paths, "/ref <paths...>"),
    spec("unref", ArgShape::Raw, "/unref <id>"),
    spec("refs", ArgShape::None, "/refs"),
    spec("history", ArgShape::None, "/history"),
    spec("new", ArgShape::None, "/new"),
    spec("image_model", ArgShape::Raw, "/image_model <name>"),
    spec("help", ArgShape::None, "/help"),
    spec("quit", ArgShape::None, "/quit"),
    spec("exit", ArgShape::None, "/exit"),
];

pub(crate) fn find_command(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name == name)
}

/// Usage lines for `/help`, in registry order.
pub fn help_lines() -> impl Iterator<Item = &'static str> {
    COMMANDS.iter().map(|spec| spec.usage)
}
