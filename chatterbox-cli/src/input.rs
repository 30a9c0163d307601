//! Parsing of lines typed at the prompt

/// What a line of input asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Plain text, posted to the current channel
    Say(String),
    Channels,
    Join(String),
    Add(String),
    Rename(String),
    Remove,
    Help,
    Quit,
    Unknown(String),
}

impl Input {
    /// `None` for a blank line
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }

        let Some(command) = line.trim_start().strip_prefix('/') else {
            return Some(Input::Say(line.to_string()));
        };
        let (verb, arg) = match command.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim().to_string()),
            None => (command, String::new()),
        };

        Some(match verb {
            "channels" | "list" => Input::Channels,
            "join" => Input::Join(arg),
            "add" => Input::Add(arg),
            "rename" => Input::Rename(arg),
            "remove" => Input::Remove,
            "help" => Input::Help,
            "quit" | "exit" => Input::Quit,
            other => Input::Unknown(other.to_string()),
        })
    }
}

pub const HELP: &str = "\
commands:
  /channels        list channels
  /join <name>     switch to a channel
  /add <name>      create a channel and switch to it
  /rename <name>   rename the current channel
  /remove          delete the current channel
  /quit            leave
anything else is sent to the current channel";
