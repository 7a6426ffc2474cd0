//! User table (spec.md §3 "User", §4.B).

use ircd_unicase::{casefold, UniCase};
use std::collections::{HashMap, HashSet};
use std::collections::VecDeque;

pub type Fd = i32;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Registration {
    /// Neither NICK nor USER received yet.
    New,
    /// Exactly one of NICK/USER received.
    Partial,
    /// Both received; welcome burst sent.
    Registered,
}

impl Registration {
    pub fn is_registered(self) -> bool {
        self == Registration::Registered
    }
}

/// A connection record (spec.md §3 "User").
pub struct User {
    /// Dense integer descriptor. `< 0` for a remote/virtual user, which is
    /// then absent from [`UserTable`]'s fd array (spec.md §4.B invariant).
    pub fd: Fd,
    pub nick: String,
    pub ident: String,
    pub hostname: String,
    /// Interned server-of-origin name.
    pub server: String,
    pub is_operator: bool,
    pub connected_at: i64,
    pub idle_since: i64,
    pub last_message_at: i64,
    pub registration: Registration,
    pub has_nick: bool,
    pub has_user: bool,

    /// Back-reference set of channel keys this user belongs to (spec.md §3
    /// "Membership": "users hold a back-reference set of channel keys").
    pub channels: HashSet<UniCase<String>>,

    pub read_buffer: ircd_reader::LineReader,
    pub write_queue: VecDeque<u8>,
}

impl User {
    pub fn new(fd: Fd, hostname: String, server: String, now: i64, max_line_len: usize) -> User {
        User {
            fd,
            nick: "*".to_owned(),
            ident: String::new(),
            hostname,
            server,
            is_operator: false,
            connected_at: now,
            idle_since: now,
            last_message_at: now,
            registration: Registration::New,
            has_nick: false,
            has_user: false,
            channels: HashSet::new(),
            read_buffer: ircd_reader::LineReader::new(max_line_len),
            write_queue: VecDeque::new(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}!{}@{}", self.nick, self.ident, self.hostname)
    }

    pub fn is_registered(&self) -> bool {
        self.registration.is_registered()
    }

    pub fn queue(&mut self, data: &[u8]) {
        self.write_queue.extend(data.iter().copied());
    }

    pub fn has_pending_write(&self) -> bool {
        !self.write_queue.is_empty()
    }

    /// Drops the first `n` bytes of the write queue once they've actually
    /// been handed to the socket (spec.md §4.A "writability is derived
    /// from non-empty write queue"). `n` may be less than the queue's
    /// length on a partial write.
    pub fn drain_written(&mut self, n: usize) {
        self.write_queue.drain(..n.min(self.write_queue.len()));
    }

    /// Copies out up to `max` queued bytes without removing them, for the
    /// multiplexer to attempt writing; draining happens separately once
    /// the write actually lands (`drain_written`).
    pub fn peek_pending_write(&self, max: usize) -> Vec<u8> {
        self.write_queue.iter().take(max).copied().collect()
    }
}

/// Maps fd -> user (dense array) and case-folded nick -> fd (hash), per
/// spec.md §4.B.
#[derive(Default)]
pub struct UserTable {
    by_fd: Vec<Option<User>>,
    by_nick: HashMap<UniCase<String>, Fd>,
}

impl UserTable {
    pub fn new() -> Self {
        UserTable { by_fd: Vec::new(), by_nick: HashMap::new() }
    }

    pub fn add(&mut self, user: User) {
        let fd = user.fd;
        if fd < 0 {
            return; // remote/virtual users are never indexed by fd.
        }
        let idx = fd as usize;
        if self.by_fd.len() <= idx {
            self.by_fd.resize_with(idx + 1, || None);
        }
        self.by_fd[idx] = Some(user);
    }

    pub fn find_by_fd(&self, fd: Fd) -> Option<&User> {
        if fd < 0 {
            return None;
        }
        self.by_fd.get(fd as usize).and_then(Option::as_ref)
    }

    pub fn find_by_fd_mut(&mut self, fd: Fd) -> Option<&mut User> {
        if fd < 0 {
            return None;
        }
        self.by_fd.get_mut(fd as usize).and_then(Option::as_mut)
    }

    pub fn find_by_nick(&self, nick: &str) -> Option<&User> {
        let fd = *self.by_nick.get(<&UniCase<str>>::from(nick))?;
        self.find_by_fd(fd)
    }

    /// Registers (or re-registers, on a NICK change) `user`'s nickname in
    /// the nick index. Fails if the nickname is already taken by a
    /// different fd (spec.md §4.B invariant: "no two users share a
    /// nickname").
    pub fn claim_nick(&mut self, fd: Fd, nick: &str) -> Result<(), ()> {
        let key = UniCase::new(nick.to_owned());
        match self.by_nick.get(&key) {
            Some(owner) if *owner != fd => return Err(()),
            _ => {}
        }
        if let Some(old_nick) = self.find_by_fd(fd).map(|user| user.nick.clone()) {
            self.by_nick.remove(<&UniCase<str>>::from(old_nick.as_str()));
        }
        self.by_nick.insert(key, fd);
        Ok(())
    }

    pub fn is_nick_in_use(&self, nick: &str) -> bool {
        self.by_nick.contains_key(<&UniCase<str>>::from(nick))
    }

    /// Removes the user from the table. Callers are responsible for
    /// firing the QUIT hook and channel cleanup before or after this call
    /// (spec.md §3 User Lifecycle).
    pub fn remove(&mut self, fd: Fd) -> Option<User> {
        if fd < 0 {
            return None;
        }
        let user = self.by_fd.get_mut(fd as usize).and_then(Option::take)?;
        self.by_nick.remove(<&UniCase<str>>::from(user.nick.as_str()));
        Some(user)
    }

    pub fn len(&self) -> usize {
        self.by_nick.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.by_fd.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut User> {
        self.by_fd.iter_mut().filter_map(Option::as_mut)
    }
}

/// Produces the canonical RFC 1459 case-folded form of `s`, re-exported
/// here so callers of the user table don't need a direct dependency on
/// `ircd-unicase` just to compare nicknames.
pub fn fold(s: &str) -> String {
    casefold(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_user(fd: Fd, nick: &str) -> User {
        let mut u = User::new(fd, "host".to_owned(), "irc.example.net".to_owned(), 0, 512);
        u.nick = nick.to_owned();
        u
    }

    #[test]
    fn fd_and_nick_lookup_agree() {
        let mut table = UserTable::new();
        table.add(make_user(3, "alice"));
        table.claim_nick(3, "alice").unwrap();
        assert_eq!(table.find_by_fd(3).unwrap().nick, "alice");
        assert_eq!(table.find_by_nick("alice").unwrap().fd, 3);
        assert_eq!(table.find_by_nick("ALICE").unwrap().fd, 3);
    }

    #[test]
    fn rejects_duplicate_nick() {
        let mut table = UserTable::new();
        table.add(make_user(1, "alice"));
        table.claim_nick(1, "alice").unwrap();
        table.add(make_user(2, "bob"));
        assert!(table.claim_nick(2, "alice").is_err());
    }

    #[test]
    fn remote_user_absent_from_fd_array() {
        let mut table = UserTable::new();
        table.add(make_user(-1, "remote"));
        assert!(table.find_by_fd(-1).is_none());
    }

    #[test]
    fn drain_written_removes_only_the_written_prefix() {
        let mut u = make_user(1, "alice");
        u.queue(b"hello world");
        u.drain_written(6);
        assert_eq!(u.write_queue.iter().copied().collect::<Vec<u8>>(), b"world".to_vec());
    }

    #[test]
    fn remove_clears_both_indices() {
        let mut table = UserTable::new();
        table.add(make_user(5, "carol"));
        table.claim_nick(5, "carol").unwrap();
        table.remove(5);
        assert!(table.find_by_fd(5).is_none());
        assert!(table.find_by_nick("carol").is_none());
    }
}
