//! Channel table (spec.md §3 "Channel", §4.C).

use crate::modes::ChannelModeChange;
use ircd_tokens::{rpl::Reply, MessageBuffer};
use ircd_unicase::UniCase;
use std::collections::{HashMap, HashSet};

/// A member's status within one channel.
///
/// spec.md §3 names `owner/op/halfop/voice/none`, but the ISUPPORT string
/// fixed by spec.md §6 is `PREFIX=(ohv)@%+` -- three ranks, no owner
/// symbol. `Owner` is kept as an internal rank (set on the member who
/// creates the channel, ranked above `Operator`) but has no status-prefix
/// symbol of its own; see DESIGN.md.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Status {
    None,
    Voice,
    HalfOp,
    Operator,
    Owner,
}

impl Status {
    pub fn symbol(self) -> Option<char> {
        match self {
            Status::Owner | Status::Operator => Some('@'),
            Status::HalfOp => Some('%'),
            Status::Voice => Some('+'),
            Status::None => None,
        }
    }

    /// Parses one of the three filter prefixes accepted by NOTICE/PRIVMSG
    /// (spec.md §4.D step 4), returning the minimum rank required.
    pub fn from_filter(c: char) -> Option<Status> {
        match c {
            '@' => Some(Status::Operator),
            '%' => Some(Status::HalfOp),
            '+' => Some(Status::Voice),
            _ => None,
        }
    }
}

pub type Fd = i32;

/// Channel data, keyed by case-folded name in [`ChannelTable`].
#[derive(Default)]
pub struct Channel {
    pub name: String,
    pub topic: Option<String>,
    pub created_at: i64,

    /// Member set: descriptor -> status. The authoritative copy of
    /// membership; users hold only a back-reference (spec.md §3
    /// "Membership").
    pub members: HashMap<Fd, Status>,

    pub user_limit: Option<usize>,
    pub key: Option<String>,

    pub ban_mask: HashSet<String>,
    pub exception_mask: HashSet<String>,
    pub invitation_mask: HashSet<String>,

    pub anonymous: bool,
    pub invite_only: bool,
    pub moderated: bool,
    pub no_external_messages: bool,
    pub secret: bool,
    pub topic_restricted: bool,
}

impl Channel {
    pub fn new(name: &str, created_at: i64) -> Channel {
        Channel { name: name.to_owned(), created_at, ..Channel::default() }
    }

    pub fn add_member(&mut self, fd: Fd) {
        let status = if self.members.is_empty() { Status::Owner } else { Status::None };
        self.members.insert(fd, status);
    }

    pub fn remove_member(&mut self, fd: Fd) {
        self.members.remove(&fd);
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn status_of(&self, fd: Fd) -> Option<Status> {
        self.members.get(&fd).copied()
    }

    pub fn can_talk(&self, fd: Fd) -> bool {
        if self.moderated {
            self.members.get(&fd).map_or(false, |s| *s >= Status::Voice)
        } else {
            !self.no_external_messages || self.members.contains_key(&fd)
        }
    }

    pub fn apply_mode_change(&mut self, change: ChannelModeChange, fd_of_nick: impl Fn(&str) -> Option<Fd>)
        -> Result<bool, Reply>
    {
        use ChannelModeChange::*;
        let mut applied = false;
        match change {
            Anonymous(v) => { applied = self.anonymous != v; self.anonymous = v; }
            InviteOnly(v) => { applied = self.invite_only != v; self.invite_only = v; }
            Moderated(v) => { applied = self.moderated != v; self.moderated = v; }
            NoExternalMessages(v) => { applied = self.no_external_messages != v; self.no_external_messages = v; }
            Secret(v) => { applied = self.secret != v; self.secret = v; }
            TopicRestricted(v) => { applied = self.topic_restricted != v; self.topic_restricted = v; }
            Key(true, key) => {
                if self.key.is_some() {
                    return Err(ircd_tokens::rpl::ERR_KEYSET);
                }
                applied = true;
                self.key = Some(key);
            }
            Key(false, key) => {
                if self.key.as_deref() == Some(key.as_str()) {
                    applied = true;
                    self.key = None;
                }
            }
            UserLimit(Some(n)) => {
                applied = self.user_limit != Some(n);
                self.user_limit = Some(n);
            }
            UserLimit(None) => {
                applied = self.user_limit.is_some();
                self.user_limit = None;
            }
            ChangeBan(true, mask) => { applied = self.ban_mask.insert(mask); }
            ChangeBan(false, mask) => { applied = self.ban_mask.remove(&mask); }
            ChangeException(true, mask) => { applied = self.exception_mask.insert(mask); }
            ChangeException(false, mask) => { applied = self.exception_mask.remove(&mask); }
            ChangeInvitation(true, mask) => { applied = self.invitation_mask.insert(mask); }
            ChangeInvitation(false, mask) => { applied = self.invitation_mask.remove(&mask); }
            ChangeOperator(value, nick) => {
                let fd = fd_of_nick(&nick).ok_or(ircd_tokens::rpl::ERR_USERNOTINCHANNEL)?;
                let status = self.members.get_mut(&fd).ok_or(ircd_tokens::rpl::ERR_USERNOTINCHANNEL)?;
                let new_status = if value { Status::Operator } else { Status::None };
                applied = *status != new_status;
                *status = new_status;
            }
            ChangeHalfOp(value, nick) => {
                let fd = fd_of_nick(&nick).ok_or(ircd_tokens::rpl::ERR_USERNOTINCHANNEL)?;
                let status = self.members.get_mut(&fd).ok_or(ircd_tokens::rpl::ERR_USERNOTINCHANNEL)?;
                let new_status = if value { Status::HalfOp } else { Status::None };
                applied = *status != new_status;
                *status = new_status;
            }
            ChangeVoice(value, nick) => {
                let fd = fd_of_nick(&nick).ok_or(ircd_tokens::rpl::ERR_USERNOTINCHANNEL)?;
                let status = self.members.get_mut(&fd).ok_or(ircd_tokens::rpl::ERR_USERNOTINCHANNEL)?;
                let new_status = if value { Status::Voice } else { Status::None };
                applied = *status != new_status;
                *status = new_status;
            }
        }
        Ok(applied)
    }

    pub fn write_modes(&self, mut out: MessageBuffer<'_>) {
        let modes = out.raw_param();
        modes.push('+');
        if self.anonymous { modes.push('a'); }
        if self.invite_only { modes.push('i'); }
        if self.moderated { modes.push('m'); }
        if self.no_external_messages { modes.push('n'); }
        if self.secret { modes.push('s'); }
        if self.topic_restricted { modes.push('t'); }
        if self.user_limit.is_some() { modes.push('l'); }
        if self.key.is_some() { modes.push('k'); }
        out.build();
    }
}

/// Maps case-folded channel name to [`Channel`] (spec.md §4.C).
#[derive(Default)]
pub struct ChannelTable {
    channels: HashMap<UniCase<String>, Channel>,
}

impl ChannelTable {
    pub fn new() -> Self {
        ChannelTable { channels: HashMap::new() }
    }

    pub fn find(&self, name: &str) -> Option<&Channel> {
        self.channels.get(<&UniCase<str>>::from(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(<&UniCase<str>>::from(name))
    }

    pub fn get_or_create(&mut self, name: &str, now: i64) -> &mut Channel {
        self.channels.entry(UniCase::new(name.to_owned())).or_insert_with(|| Channel::new(name, now))
    }

    /// Removes the channel if it has no members left (spec.md §3 Channel
    /// Lifecycle).
    pub fn destroy_if_empty(&mut self, name: &str) -> bool {
        let empty = self.find(name).map_or(false, Channel::is_empty);
        if empty {
            self.channels.remove(<&UniCase<str>>::from(name));
        }
        empty
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Channel)> {
        self.channels.iter().map(|(k, v)| (k.0.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Removes `fd` from every channel it belongs to, destroying channels
    /// left empty. Returns the names of channels `fd` was a member of, for
    /// the caller to send QUIT notifications to the remaining members of
    /// (spec.md §3 User lifecycle: "destruction removes the user from
    /// every channel it is in").
    pub fn remove_member_everywhere(&mut self, fd: Fd) -> Vec<String> {
        let mut left = Vec::new();
        self.channels.retain(|_, channel| {
            if channel.members.remove(&fd).is_some() {
                left.push(channel.name.clone());
            }
            !channel.members.is_empty()
        });
        left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_joiner_becomes_owner() {
        let mut table = ChannelTable::new();
        let chan = table.get_or_create("#room", 0);
        chan.add_member(1);
        chan.add_member(2);
        assert_eq!(chan.status_of(1), Some(Status::Owner));
        assert_eq!(chan.status_of(2), Some(Status::None));
    }

    #[test]
    fn destroys_when_last_member_leaves() {
        let mut table = ChannelTable::new();
        table.get_or_create("#room", 0).add_member(1);
        table.remove_member_everywhere(1);
        assert!(table.destroy_if_empty("#room"));
        assert!(table.find("#room").is_none());
    }

    #[test]
    fn name_lookup_is_case_insensitive() {
        let mut table = ChannelTable::new();
        table.get_or_create("#Room", 0);
        assert!(table.find("#room").is_some());
        assert!(table.find("#ROOM").is_some());
    }

    #[test]
    fn moderated_blocks_below_voice() {
        let mut table = ChannelTable::new();
        let chan = table.get_or_create("#room", 0);
        chan.add_member(1); // owner
        chan.add_member(2); // none
        chan.moderated = true;
        assert!(chan.can_talk(1));
        assert!(!chan.can_talk(2));
    }
}
