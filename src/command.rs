use strum::{Display, EnumString};

/// Command verbs accepted at the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Verb {
    List,
    Info,
    Play,
    Stop,
    Exit,
}

/// One parsed line of interactive input.
///
/// Index arguments are kept as raw text; the dispatcher validates them against
/// the catalog so every bad index takes the same reporting path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    /// `None` unless exactly one argument was given
    Info(Option<String>),
    /// `None` unless exactly one argument was given
    Play(Option<String>),
    Stop,
    Exit,
    /// Blank line
    Empty,
    Unknown(String),
}

impl Command {
    /// Parse a line case-insensitively: the first token selects the command,
    /// the rest are its arguments.
    pub fn parse(line: &str) -> Self {
        let normalized = line.to_uppercase();
        let tokens: Vec<&str> = normalized.split_whitespace().collect();

        let Some((first, arguments)) = tokens.split_first() else {
            return Command::Empty;
        };
        let index = match arguments {
            [index] => Some(index.to_string()),
            _ => None,
        };

        match first.parse::<Verb>() {
            Ok(Verb::List) => Command::List,
            Ok(Verb::Info) => Command::Info(index),
            Ok(Verb::Play) => Command::Play(index),
            Ok(Verb::Stop) => Command::Stop,
            Ok(Verb::Exit) => Command::Exit,
            Err(_) => Command::Unknown(line.trim().to_string()),
        }
    }

    pub fn verb(&self) -> Option<Verb> {
        match self {
            Command::List => Some(Verb::List),
            Command::Info(_) => Some(Verb::Info),
            Command::Play(_) => Some(Verb::Play),
            Command::Stop => Some(Verb::Stop),
            Command::Exit => Some(Verb::Exit),
            Command::Empty | Command::Unknown(_) => None,
        }
    }
}
