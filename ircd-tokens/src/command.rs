use std::fmt;

/// Commands known to the core dispatcher.
///
/// Unknown commands parse to `Err(&str)` in [`crate::Message`] rather than
/// a variant here, so the dispatcher can still report `ERR_UNKNOWNCOMMAND`
/// with the client's original spelling.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Command {
    Admin,
    Cap,
    Info,
    Invite,
    Join,
    Kick,
    List,
    Loadmodule,
    Lusers,
    Mode,
    Motd,
    Names,
    Nick,
    Notice,
    Oper,
    Part,
    Pass,
    Ping,
    Pong,
    Privmsg,
    Quit,
    Rehash,
    Time,
    Topic,
    Unloadmodule,
    User,
    Version,
    Who,
    Whois,
}

/// How many leading parameters a command requires, and who may issue it.
#[derive(Clone, Copy, Debug)]
pub struct Spec {
    pub min_params: usize,
    pub requires_registration: bool,
    pub requires_oper: bool,
    /// Index into the parameter list that may hold a comma-separated list
    /// of targets, consumed by the dispatcher's multi-target facility.
    pub target_index: Option<usize>,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        use Command::*;
        match self {
            Admin => "ADMIN",
            Cap => "CAP",
            Info => "INFO",
            Invite => "INVITE",
            Join => "JOIN",
            Kick => "KICK",
            List => "LIST",
            Loadmodule => "LOADMODULE",
            Lusers => "LUSERS",
            Mode => "MODE",
            Motd => "MOTD",
            Names => "NAMES",
            Nick => "NICK",
            Notice => "NOTICE",
            Oper => "OPER",
            Part => "PART",
            Pass => "PASS",
            Ping => "PING",
            Pong => "PONG",
            Privmsg => "PRIVMSG",
            Quit => "QUIT",
            Rehash => "REHASH",
            Time => "TIME",
            Topic => "TOPIC",
            Unloadmodule => "UNLOADMODULE",
            User => "USER",
            Version => "VERSION",
            Who => "WHO",
            Whois => "WHOIS",
        }
    }

    pub fn parse(s: &str) -> Option<Command> {
        use Command::*;
        Some(match_ignore_ascii_case(s, &[
            ("ADMIN", Admin), ("CAP", Cap), ("INFO", Info), ("INVITE", Invite),
            ("JOIN", Join), ("KICK", Kick), ("LIST", List), ("LOADMODULE", Loadmodule),
            ("LUSERS", Lusers), ("MODE", Mode), ("MOTD", Motd), ("NAMES", Names),
            ("NICK", Nick), ("NOTICE", Notice), ("OPER", Oper), ("PART", Part),
            ("PASS", Pass), ("PING", Ping), ("PONG", Pong), ("PRIVMSG", Privmsg),
            ("QUIT", Quit), ("REHASH", Rehash), ("TIME", Time), ("TOPIC", Topic),
            ("UNLOADMODULE", Unloadmodule), ("USER", User), ("VERSION", Version),
            ("WHO", Who), ("WHOIS", Whois),
        ])?)
    }

    /// Arity and privilege requirements, per spec §4.D.
    pub fn spec(self) -> Spec {
        use Command::*;
        let (min_params, requires_registration, requires_oper, target_index) = match self {
            Admin => (0, true, false, None),
            Cap => (1, false, false, None),
            Info => (0, true, false, None),
            Invite => (2, true, false, None),
            Join => (1, true, false, Some(0)),
            Kick => (2, true, false, Some(1)),
            List => (0, true, false, Some(0)),
            Loadmodule => (1, true, true, None),
            Lusers => (0, true, false, None),
            Mode => (1, true, false, None),
            Motd => (0, true, false, None),
            Names => (0, true, false, Some(0)),
            Nick => (1, false, false, None),
            Notice => (2, true, false, Some(0)),
            Oper => (2, true, false, None),
            Part => (1, true, false, Some(0)),
            Pass => (1, false, false, None),
            Ping => (1, false, false, None),
            Pong => (1, false, false, None),
            Privmsg => (2, true, false, Some(0)),
            Quit => (0, false, false, None),
            Rehash => (0, true, true, None),
            Time => (0, true, false, None),
            Topic => (1, true, false, None),
            Unloadmodule => (1, true, true, None),
            User => (4, false, false, None),
            Version => (0, true, false, None),
            Who => (0, true, false, None),
            Whois => (1, true, false, Some(0)),
        };
        Spec { min_params, requires_registration, requires_oper, target_index }
    }
}

fn match_ignore_ascii_case(s: &str, table: &[(&str, Command)]) -> Option<Command> {
    table.iter().find(|(name, _)| name.eq_ignore_ascii_case(s)).map(|(_, cmd)| *cmd)
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Command> for &'static str {
    fn from(c: Command) -> &'static str {
        c.as_str()
    }
}
