use std::path::PathBuf;

/// One line of input in the interactive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Refines the head, or starts fresh when there is none.
    Prompt(String),
    New(String),
    Load(String),
    History,
    Clear,
    Download { id: String, output: Option<PathBuf> },
    Help,
    Quit,
    Invalid(String),
}

pub const HELP: &str = "\
plain text       refine the current part, or start one if there is none
/new <prompt>    start a new part
/load <id>       show an earlier turn and continue from it
/history         list turns
/download <id> [path]
                 write a turn's STL file
/clear           delete all turns and files
/quit            leave";

impl ChatCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(ChatCommand::Prompt(line.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let command = match (name, arg) {
            ("quit" | "exit" | "q", _) => ChatCommand::Quit,
            ("help" | "?", _) => ChatCommand::Help,
            ("history", _) => ChatCommand::History,
            ("clear", _) => ChatCommand::Clear,
            ("new", "") => ChatCommand::Invalid("/new needs a prompt".to_string()),
            ("new", prompt) => ChatCommand::New(prompt.to_string()),
            ("load", "") => ChatCommand::Invalid("/load needs a turn id".to_string()),
            ("load", id) => ChatCommand::Load(id.to_string()),
            ("download", "") => ChatCommand::Invalid("/download needs a turn id".to_string()),
            ("download", args) => {
                let mut parts = args.splitn(2, char::is_whitespace);
                let id = parts.next().unwrap_or_default().to_string();
                let output = parts
                    .next()
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .map(PathBuf::from);
                ChatCommand::Download { id, output }
            }
            (other, _) => ChatCommand::Invalid(format!("unknown command /{other}, try /help")),
        };
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::ChatCommand;

    #[test]
    fn plain_text_is_a_prompt() {
        assert_eq!(
            ChatCommand::parse("  make the hole 6mm  "),
            Some(ChatCommand::Prompt("make the hole 6mm".to_string()))
        );
        assert_eq!(ChatCommand::parse("   "), None);
    }

    #[test]
    fn slash_commands_take_arguments() {
        assert_eq!(
            ChatCommand::parse("/new a phone stand"),
            Some(ChatCommand::New("a phone stand".to_string()))
        );
        assert_eq!(
            ChatCommand::parse("/load 0190c2a4"),
            Some(ChatCommand::Load("0190c2a4".to_string()))
        );
        assert_eq!(
            ChatCommand::parse("/download 0190c2a4 out/plate.stl"),
            Some(ChatCommand::Download {
                id: "0190c2a4".to_string(),
                output: Some(PathBuf::from("out/plate.stl")),
            })
        );
        assert_eq!(
            ChatCommand::parse("/download 0190c2a4"),
            Some(ChatCommand::Download {
                id: "0190c2a4".to_string(),
                output: None,
            })
        );
        assert_eq!(ChatCommand::parse("/quit"), Some(ChatCommand::Quit));
        assert_eq!(ChatCommand::parse("/history"), Some(ChatCommand::History));
    }

    #[test]
    fn missing_or_unknown_arguments_are_invalid() {
        assert!(matches!(
            ChatCommand::parse("/new"),
            Some(ChatCommand::Invalid(_))
        ));
        assert!(matches!(
            ChatCommand::parse("/frobnicate now"),
            Some(ChatCommand::Invalid(message)) if message.contains("/frobnicate")
        ));
    }
}
