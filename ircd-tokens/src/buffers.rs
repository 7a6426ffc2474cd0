use crate::command::Command;
use crate::rpl::Reply;
use std::fmt;

/// Growable byte buffer holding zero or more complete, CRLF-terminated IRC
/// lines, built incrementally through [`MessageBuffer`]/[`TagBuffer`].
#[derive(Default)]
pub struct Buffer {
    data: String,
}

impl Buffer {
    pub fn new() -> Self {
        Buffer { data: String::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Starts a new line with the given source prefix (empty for "no
    /// prefix") and command, returning a builder for its parameters.
    pub fn message<C>(&mut self, prefix: &str, command: C) -> MessageBuffer<'_>
        where C: Into<CommandLike>
    {
        if !prefix.is_empty() {
            self.data.push(':');
            self.data.push_str(prefix);
            self.data.push(' ');
        }
        self.data.push_str(&command.into().as_str());
        MessageBuffer { buf: &mut self.data, has_param: false }
    }

    /// Starts a new line with an IRCv3 tag section.
    pub fn tag_message<C>(&mut self, client_tags: &str, prefix: &str, command: C) -> TagBuffer<'_>
        where C: Into<CommandLike>
    {
        let start = self.data.len();
        if !client_tags.is_empty() {
            self.data.push('@');
            self.data.push_str(client_tags);
        }
        TagBuffer { buf: &mut self.data, start, prefix: prefix.to_owned(), command: command.into() }
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.data.as_bytes()
    }
}

impl AsRef<str> for Buffer {
    fn as_ref(&self) -> &str {
        &self.data
    }
}

/// Either a known [`Command`] or a raw command string (e.g. `"ACCOUNT"`,
/// a capability-only pseudo-command ellidri's IRCv3 handlers send).
pub enum CommandLike {
    Command(Command),
    Reply(Reply),
    Raw(&'static str),
}

impl CommandLike {
    fn as_str(&self) -> std::borrow::Cow<'static, str> {
        match self {
            CommandLike::Command(c) => c.as_str().into(),
            CommandLike::Reply(r) => format!("{:03}", r).into(),
            CommandLike::Raw(s) => (*s).into(),
        }
    }
}

impl From<Command> for CommandLike {
    fn from(c: Command) -> Self { CommandLike::Command(c) }
}

impl From<Reply> for CommandLike {
    fn from(r: Reply) -> Self { CommandLike::Reply(r) }
}

impl From<&'static str> for CommandLike {
    fn from(s: &'static str) -> Self { CommandLike::Raw(s) }
}

/// Builder for one line's parameters. Dropping it without calling
/// [`build`](Self::build) still leaves a well-formed (unterminated) line;
/// `build` appends the CRLF terminator.
pub struct MessageBuffer<'a> {
    buf: &'a mut String,
    has_param: bool,
}

impl<'a> MessageBuffer<'a> {
    fn before_param(&mut self) {
        self.buf.push(' ');
        self.has_param = true;
    }

    /// Appends a middle parameter (must not contain a space).
    pub fn param(mut self, value: impl AsRef<str>) -> Self {
        self.before_param();
        self.buf.push_str(value.as_ref());
        self
    }

    /// Appends the trailing parameter (`:`-introduced, may contain spaces)
    /// and terminates the line.
    pub fn trailing_param(mut self, value: impl AsRef<str>) {
        self.before_param();
        self.buf.push(':');
        self.buf.push_str(value.as_ref());
        self.build();
    }

    /// Returns a handle to append raw text directly into the current
    /// middle parameter, for callers building it piecemeal (e.g. a channel
    /// mode string).
    pub fn raw_param(&mut self) -> &mut String {
        self.before_param();
        self.buf
    }

    /// Same as [`raw_param`](Self::raw_param), but introduces `:` so the
    /// parameter may contain spaces.
    pub fn raw_trailing_param(&mut self) -> &mut String {
        self.before_param();
        self.buf.push(':');
        self.buf
    }

    /// Terminates the line without a trailing parameter.
    pub fn build(self) {
        self.buf.push_str("\r\n");
    }
}

/// Builder for a line prefixed by IRCv3 client-only tags.
pub struct TagBuffer<'a> {
    buf: &'a mut String,
    start: usize,
    prefix: String,
    command: CommandLike,
}

impl<'a> TagBuffer<'a> {
    /// Appends a `key=value` tag (value already escaped by the caller).
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        if self.buf.len() == self.start {
            self.buf.push('@');
        } else {
            self.buf.push(';');
        }
        self.buf.push_str(key);
        if !value.is_empty() {
            self.buf.push('=');
            self.buf.push_str(value);
        }
        self
    }

    /// Finishes the tag section and starts the parameter list.
    pub fn build(self) -> MessageBuffer<'a> {
        if self.buf.len() != self.start {
            self.buf.push(' ');
        }
        if !self.prefix.is_empty() {
            self.buf.push(':');
            self.buf.push_str(&self.prefix);
            self.buf.push(' ');
        }
        self.buf.push_str(&self.command.as_str());
        MessageBuffer { buf: self.buf, has_param: false }
    }
}

/// A [`Buffer`] bound to a server domain and a recipient's current
/// nickname, for building numeric replies sent back to one client.
pub struct ReplyBuffer {
    domain: String,
    nick: String,
    inner: Buffer,
}

impl ReplyBuffer {
    pub fn new(domain: &str, nick: &str) -> Self {
        ReplyBuffer { domain: domain.to_owned(), nick: nick.to_owned(), inner: Buffer::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Starts a numeric reply: `:domain NNN nick ...`.
    pub fn reply(&mut self, code: Reply) -> MessageBuffer<'_> {
        self.inner.message(&self.domain, code).param(&self.nick)
    }

    /// Starts an arbitrary message with a given prefix and command (used
    /// for replies that are not numerics, e.g. `CAP`).
    pub fn message<C>(&mut self, prefix: &str, command: C) -> MessageBuffer<'_>
        where C: Into<CommandLike>
    {
        self.inner.message(prefix, command)
    }

    pub fn set_nick(&mut self, nick: &str) {
        self.nick.clear();
        self.nick.push_str(nick);
    }
}

impl AsRef<[u8]> for ReplyBuffer {
    fn as_ref(&self) -> &[u8] {
        self.inner.as_ref()
    }
}

impl AsRef<str> for ReplyBuffer {
    fn as_ref(&self) -> &str {
        self.inner.as_ref()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_numeric_reply() {
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        rb.reply(crate::rpl::ERR_NOSUCHCHANNEL).param("#nope").trailing_param("No such channel");
        let s: &str = rb.as_ref();
        assert_eq!(s, ":irc.example.net 403 alice #nope :No such channel\r\n");
    }

    #[test]
    fn builds_plain_message() {
        let mut buf = Buffer::new();
        buf.message("alice!a@h", Command::Notice).param("#room").trailing_param("hi");
        let s: &str = buf.as_ref();
        assert_eq!(s, ":alice!a@h NOTICE #room :hi\r\n");
    }

    #[test]
    fn message_without_prefix() {
        let mut buf = Buffer::new();
        buf.message("", Command::Ping).param("irc.example.net").build();
        let s: &str = buf.as_ref();
        assert_eq!(s, "PING irc.example.net\r\n");
    }
}
