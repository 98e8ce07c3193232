//! The awsh control vocabulary and the in-process shell built-ins.

/// Control commands handled without touching the sandbox or backend (except
/// to propagate a setting change).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinCommand {
    /// `awh`: print the vocabulary.
    Help,

    /// `aws`: print child/backend status.
    Status,

    /// `awv [0|1|2]`: show or set verbosity.
    Verbosity(Option<u8>),

    /// `awp [name]`: show or set the AI provider.
    Provider(Option<String>),

    /// `awm [name]`: show or set the model.
    Model(Option<String>),
}

impl BuiltinCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let head = tokens.next()?;
        let arg = tokens.next();
        // Trailing garbage makes it not a control command.
        if tokens.next().is_some() {
            return None;
        }
        match (head, arg) {
            ("awh", None) => Some(BuiltinCommand::Help),
            ("aws", None) => Some(BuiltinCommand::Status),
            ("awv", None) => Some(BuiltinCommand::Verbosity(None)),
            ("awv", Some(level)) => {
                let level: u8 = level.parse().ok()?;
                (level <= 2).then_some(BuiltinCommand::Verbosity(Some(level)))
            }
            ("awp", None) => Some(BuiltinCommand::Provider(None)),
            ("awp", Some(name)) => Some(BuiltinCommand::Provider(Some(name.to_owned()))),
            ("awm", None) => Some(BuiltinCommand::Model(None)),
            ("awm", Some(name)) => Some(BuiltinCommand::Model(Some(name.to_owned()))),
            _ => None,
        }
    }
}

/// Built-ins that must run in the frontend process itself: `cd` mutates our
/// working directory, `exit` terminates us. Delegating them to a child
/// would be a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellBuiltin {
    /// `cd`, `cd <dir>`, `cd -`, with `~` expansion.
    Cd(Option<String>),
    Pwd,
    Exit,
}

impl ShellBuiltin {
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let built = match tokens.next()? {
            "cd" => ShellBuiltin::Cd(tokens.next().map(str::to_owned)),
            "pwd" => ShellBuiltin::Pwd,
            "exit" | "quit" => ShellBuiltin::Exit,
            _ => return None,
        };
        tokens.next().is_none().then_some(built)
    }
}

pub const HELP_TEXT: &str = "\
awsh control commands:
  awh            show this help
  aws            show backend, proxy and sandbox status
  awv [0|1|2]    show or set verbosity
  awp [name]     show or set the AI provider
  awm [name]     show or set the model
shell built-ins handled by awsh: cd, pwd, exit
everything else runs as a command, or is sent to the AI when it
reads as a question";

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_the_control_vocabulary() {
        assert_eq!(BuiltinCommand::parse("awh"), Some(BuiltinCommand::Help));
        assert_eq!(BuiltinCommand::parse("aws"), Some(BuiltinCommand::Status));
        assert_eq!(
            BuiltinCommand::parse("awv"),
            Some(BuiltinCommand::Verbosity(None))
        );
        assert_eq!(
            BuiltinCommand::parse("awv 2"),
            Some(BuiltinCommand::Verbosity(Some(2)))
        );
        assert_eq!(
            BuiltinCommand::parse("awm llama3"),
            Some(BuiltinCommand::Model(Some("llama3".to_owned())))
        );
    }

    #[test]
    fn rejects_out_of_range_verbosity() {
        assert_eq!(BuiltinCommand::parse("awv 3"), None);
        assert_eq!(BuiltinCommand::parse("awv x"), None);
    }

    #[test]
    fn rejects_similar_command_names() {
        assert_eq!(BuiltinCommand::parse("awhx"), None);
        assert_eq!(BuiltinCommand::parse("aws --verbose"), None);
        assert_eq!(BuiltinCommand::parse("awh extra"), None);
    }

    #[test]
    fn parses_shell_builtins() {
        assert_eq!(ShellBuiltin::parse("cd"), Some(ShellBuiltin::Cd(None)));
        assert_eq!(
            ShellBuiltin::parse("cd /tmp"),
            Some(ShellBuiltin::Cd(Some("/tmp".to_owned())))
        );
        assert_eq!(
            ShellBuiltin::parse("cd -"),
            Some(ShellBuiltin::Cd(Some("-".to_owned())))
        );
        assert_eq!(ShellBuiltin::parse("pwd"), Some(ShellBuiltin::Pwd));
        assert_eq!(ShellBuiltin::parse("exit"), Some(ShellBuiltin::Exit));
        assert_eq!(ShellBuiltin::parse("quit"), Some(ShellBuiltin::Exit));
    }

    #[test]
    fn pwd_with_arguments_is_a_plain_command() {
        assert_eq!(ShellBuiltin::parse("pwd -P"), None);
        assert_eq!(ShellBuiltin::parse("exit 1"), None);
        assert_eq!(ShellBuiltin::parse("cd a b"), None);
    }
}
