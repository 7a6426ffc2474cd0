//! User- and channel-mode grammars, built on [`ircd_tokens::mode`]'s
//! generic `+x-y` flag scanner.

use ircd_tokens::mode::FlagChanges;

pub enum Error {
    UnknownMode(char),
    MissingModeParam,
}

pub type Result<T> = std::result::Result<T, Error>;

pub enum UserModeChange {
    Invisible(bool),
    Wallops(bool),
    ServerNotices(bool),
    Operator(bool),
}

pub struct UserQuery<'a> {
    inner: FlagChanges<'a>,
}

impl<'a> UserQuery<'a> {
    pub fn new(modes: &'a str) -> UserQuery<'a> {
        UserQuery { inner: FlagChanges::new(modes) }
    }
}

impl<'a> Iterator for UserQuery<'a> {
    type Item = Result<UserModeChange>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(value, mode)| match mode {
            b'i' => Ok(UserModeChange::Invisible(value)),
            b'w' => Ok(UserModeChange::Wallops(value)),
            b's' => Ok(UserModeChange::ServerNotices(value)),
            b'o' => Ok(UserModeChange::Operator(value)),
            other => Err(Error::UnknownMode(other as char)),
        })
    }
}

#[derive(Debug)]
pub enum ChannelModeChange {
    Anonymous(bool),
    InviteOnly(bool),
    Moderated(bool),
    NoExternalMessages(bool),
    Secret(bool),
    TopicRestricted(bool),
    Key(bool, String),
    UserLimit(Option<usize>),
    ChangeBan(bool, String),
    ChangeException(bool, String),
    ChangeInvitation(bool, String),
    ChangeOperator(bool, String),
    ChangeHalfOp(bool, String),
    ChangeVoice(bool, String),
}

/// Letters defined by `CHANMODES=b,k,l,psmnti` (spec.md §6): `b/e/I` take a
/// parameter on both set and unset (list modes); `k` and `l` take one only
/// on set; `p/s/m/n/t/i` never do. `o`/`h`/`v` are the status-prefix letters
/// and always take a target nickname.
pub struct ChannelQuery<'a, I> {
    inner: FlagChanges<'a>,
    params: I,
}

impl<'a, I> ChannelQuery<'a, I>
    where I: Iterator<Item = &'a str>
{
    pub fn new(modes: &'a str, params: I) -> ChannelQuery<'a, I> {
        ChannelQuery { inner: FlagChanges::new(modes), params }
    }
}

impl<'a, I> Iterator for ChannelQuery<'a, I>
    where I: Iterator<Item = &'a str>
{
    type Item = Result<ChannelModeChange>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(value, mode)| match mode {
            b'a' => Ok(ChannelModeChange::Anonymous(value)),
            b'i' => Ok(ChannelModeChange::InviteOnly(value)),
            b'm' => Ok(ChannelModeChange::Moderated(value)),
            b'n' => Ok(ChannelModeChange::NoExternalMessages(value)),
            b'p' | b's' => Ok(ChannelModeChange::Secret(value)),
            b't' => Ok(ChannelModeChange::TopicRestricted(value)),
            b'k' => self.params.next()
                .map(|p| ChannelModeChange::Key(value, p.to_owned()))
                .ok_or(Error::MissingModeParam),
            b'l' => Ok(ChannelModeChange::UserLimit(
                if value { self.params.next().and_then(|p| p.parse().ok()) } else { None }
            )),
            b'b' => self.params.next()
                .map(|p| ChannelModeChange::ChangeBan(value, p.to_owned()))
                .ok_or(Error::MissingModeParam),
            b'e' => self.params.next()
                .map(|p| ChannelModeChange::ChangeException(value, p.to_owned()))
                .ok_or(Error::MissingModeParam),
            b'I' => self.params.next()
                .map(|p| ChannelModeChange::ChangeInvitation(value, p.to_owned()))
                .ok_or(Error::MissingModeParam),
            b'o' => self.params.next()
                .map(|p| ChannelModeChange::ChangeOperator(value, p.to_owned()))
                .ok_or(Error::MissingModeParam),
            b'h' => self.params.next()
                .map(|p| ChannelModeChange::ChangeHalfOp(value, p.to_owned()))
                .ok_or(Error::MissingModeParam),
            b'v' => self.params.next()
                .map(|p| ChannelModeChange::ChangeVoice(value, p.to_owned()))
                .ok_or(Error::MissingModeParam),
            other => Err(Error::UnknownMode(other as char)),
        })
    }
}
