use crate::command::Command;

/// Maximum length of a line, per RFC 2812 (excluding CRLF).
pub const MESSAGE_LENGTH: usize = 512;

/// Maximum number of parameters a message can carry.
pub const PARAMS_LENGTH: usize = 15;

/// An IRCv3 message tag (`key[=value]`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tag<'a> {
    pub key: &'a str,
    pub value: Option<&'a str>,
}

/// Iterates the `;`-separated tags in a message's tag string (the part
/// between `@` and the first space, not including either).
pub fn tags(raw: &str) -> impl Iterator<Item = Tag<'_>> {
    raw.split(';').filter(|s| !s.is_empty()).map(|kv| {
        let mut it = kv.splitn(2, '=');
        let key = it.next().unwrap_or("");
        let value = it.next();
        Tag { key, value }
    })
}

/// Escapes a tag value per the IRCv3 message-tags spec (`;` `␣` `\` CR LF).
pub fn tag_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// A parsed, unowned IRC line: `[@tags ][:prefix ]COMMAND [params...]`.
#[derive(Debug, Clone)]
pub struct Message<'a> {
    pub tags: &'a str,
    pub prefix: Option<&'a str>,
    pub command: Result<Command, &'a str>,
    pub num_params: usize,
    pub params: [&'a str; PARAMS_LENGTH],
}

impl<'a> Message<'a> {
    /// Tokenizes a line: splits by space, with a final token introduced by
    /// `:` that may itself contain spaces. Returns `None` for an empty or
    /// whitespace-only line (nothing to dispatch).
    pub fn parse(line: &'a str) -> Option<Message<'a>> {
        let line = line.trim_end_matches(['\r', '\n'].as_ref());
        let mut rest = line;

        let tags = if let Some(s) = rest.strip_prefix('@') {
            let (tags, r) = split_first_word(s);
            rest = r;
            tags
        } else {
            ""
        };

        let prefix = if let Some(s) = rest.strip_prefix(':') {
            let (prefix, r) = split_first_word(s);
            rest = r;
            Some(prefix)
        } else {
            None
        };

        let (cmd_tok, r) = split_first_word(rest);
        rest = r;
        if cmd_tok.is_empty() {
            return None;
        }
        let command = Command::parse(cmd_tok).ok_or(cmd_tok);

        let mut params: [&str; PARAMS_LENGTH] = [""; PARAMS_LENGTH];
        let mut num_params = 0;
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if num_params == PARAMS_LENGTH {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params[num_params] = trailing;
                num_params += 1;
                break;
            }
            let (word, r) = split_first_word(rest);
            params[num_params] = word;
            num_params += 1;
            rest = r;
        }

        Some(Message { tags, prefix, command, num_params, params })
    }

    /// Whether the message carries at least as many parameters as its
    /// command requires.
    pub fn has_enough_params(&self) -> bool {
        match self.command {
            Ok(cmd) => self.num_params >= cmd.spec().min_params,
            Err(_) => true,
        }
    }
}

fn split_first_word(s: &str) -> (&str, &str) {
    match s.find(' ') {
        Some(i) => (&s[..i], &s[i + 1..]),
        None => (s, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_command() {
        let msg = Message::parse("NICK alice").unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, Ok(Command::Nick));
        assert_eq!(&msg.params[..msg.num_params], &["alice"]);
    }

    #[test]
    fn parses_prefix_and_trailing() {
        let msg = Message::parse(":alice!a@h NOTICE #room :hi there").unwrap();
        assert_eq!(msg.prefix, Some("alice!a@h"));
        assert_eq!(msg.command, Ok(Command::Notice));
        assert_eq!(&msg.params[..msg.num_params], &["#room", "hi there"]);
    }

    #[test]
    fn parses_unknown_command() {
        let msg = Message::parse("BLARG foo").unwrap();
        assert_eq!(msg.command, Err("BLARG"));
    }

    #[test]
    fn round_trips_modulo_trailing_colon() {
        let line = "NOTICE #room :hi there";
        let msg = Message::parse(line).unwrap();
        let mut rebuilt = format!("{} {}", msg.command.unwrap(), msg.params[0]);
        rebuilt.push_str(" :");
        rebuilt.push_str(msg.params[1]);
        assert_eq!(rebuilt, line);
    }

    #[test]
    fn empty_line_is_none() {
        assert!(Message::parse("").is_none());
        assert!(Message::parse("   ").is_none());
    }
}
