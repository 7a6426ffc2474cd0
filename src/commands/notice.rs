//! NOTICE handler: the normative example of dispatch and hook weaving
//! (spec.md §4.D). Grounded step-by-step on `cmd_notice.cpp`'s
//! `CommandNotice::HandleLocal`, generalized to the module/hook facility in
//! [`crate::module`] instead of a switch on hard-coded module pointers.

use crate::channel::Status;
use crate::dispatch::TargetIter;
use crate::hooks::Hook;
use crate::server::Server;
use crate::user::Fd;
use ircd_tokens::{rpl, Command, ReplyBuffer};

/// Kind of NOTICE target, passed to the `OnUserPreNotice` collector hook so
/// a module can tell a channel notice from a private one (spec.md §4.D
/// steps 3/5/6 each name a distinct "kind").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NoticeKind {
    Server,
    Channel,
    User,
}

pub fn handle(server: &mut Server, fd: Fd, target: &str, text: &str, rb: &mut ReplyBuffer) {
    privmsg_or_notice(server, fd, target, text, rb, false);
}

/// PRIVMSG shares every step of NOTICE's dispatch; the only RFC-mandated
/// difference is that NOTICE never elicits an automatic error reply. Both
/// are threaded through here with `is_privmsg` gating which numerics fire.
pub fn privmsg_or_notice(server: &mut Server, fd: Fd, target: &str, text: &str, rb: &mut ReplyBuffer, is_privmsg: bool) {
    // Step 1: update sender's idle-last-message time.
    let now = server.users.find_by_fd(fd).map_or(0, |u| u.last_message_at);
    if let Some(u) = server.users.find_by_fd_mut(fd) {
        u.idle_since = now;
    }

    // Step 2: multi-target loop, owned by the dispatcher (no recursion):
    // split once, run the rest of the handler once per target.
    for t in TargetIter::new(target) {
        deliver_one(server, fd, t, text, rb, is_privmsg);
    }
}

fn deliver_one(server: &mut Server, fd: Fd, target: &str, text: &str, rb: &mut ReplyBuffer, is_privmsg: bool) {
    let sender_prefix = server.users.find_by_fd(fd).map_or_else(String::new, |u| u.full_name());

    // Step 3: server-wide notice (`$<glob>`), operator/U-line only.
    if let Some(glob) = target.strip_prefix('$') {
        let is_privileged = server.users.find_by_fd(fd).map_or(false, |u| {
            u.is_operator || server.config.ulines.iter().any(|uline| uline.server == u.server)
        });
        if !is_privileged {
            if is_privmsg {
                rb.reply(rpl::ERR_NOPRIVILEGES).trailing_param(crate::lines::NEED_OPER_PRIVS);
            }
            return;
        }
        let mut text = text.to_owned();
        let verdict = server.modules.collect(Hook::UserPreNotice, |m| m.on_user_pre_notice(NoticeKind::Server, &sender_prefix, target, &mut text));
        if verdict.is_veto() {
            return;
        }
        if glob_matches(glob, &server.domain) {
            let members: Vec<Fd> = server.users.iter().map(|u| u.fd).collect();
            let mut buf = ircd_tokens::Buffer::new();
            buf.message(&sender_prefix, Command::Notice).param(target).trailing_param(&text);
            let bytes: &[u8] = buf.as_ref();
            server.broadcast_raw(&members, bytes);
        }
        server.modules.fan_out(Hook::UserNotice, |m| m.on_user_notice(&sender_prefix, target, &text));
        return;
    }

    // Step 4: optional status-prefix filter (`@#room`, `%#room`, `+#room`).
    let (filter, target) = match target.chars().next().and_then(Status::from_filter) {
        Some(status) => (Some(status), &target[1..]),
        None => (None, target),
    };

    if target.starts_with('#') {
        // Step 5: channel target.
        let exists = server.channels.find(target).is_some();
        if !exists {
            if is_privmsg {
                rb.reply(rpl::ERR_NOSUCHNICK).param(target).trailing_param(crate::lines::NO_SUCH_NICK);
            }
            return;
        }
        let can_talk = server.channels.find(target).map_or(false, |c| c.can_talk(fd));
        if !can_talk {
            if is_privmsg {
                rb.reply(rpl::ERR_CANNOTSENDTOCHAN).param(target).trailing_param(crate::lines::CANNOT_SEND_TO_CHAN);
            }
            return;
        }

        let mut text = text.to_owned();
        let verdict = server.modules.collect(Hook::UserPreNotice, |m| m.on_user_pre_notice(NoticeKind::Channel, &sender_prefix, target, &mut text));
        if verdict.is_veto() {
            return;
        }
        if text.is_empty() {
            if is_privmsg {
                rb.reply(rpl::ERR_NOTEXTTOSEND).trailing_param(crate::lines::NO_TEXT_TO_SEND);
            }
            return;
        }

        let command = if is_privmsg { Command::Privmsg } else { Command::Notice };
        let mut buf = ircd_tokens::Buffer::new();
        buf.message(&sender_prefix, command).param(target).trailing_param(&text);
        let bytes: &[u8] = buf.as_ref();
        server.write_all_except(target, fd, filter, bytes);

        server.modules.fan_out(Hook::UserNotice, |m| m.on_user_notice(&sender_prefix, target, &text));
        return;
    }

    // Step 6: nickname target.
    let recipient_fd = server.users.find_by_nick(target).map(|u| u.fd);
    let recipient_fd = match recipient_fd {
        Some(fd) => fd,
        None => {
            if is_privmsg {
                rb.reply(rpl::ERR_NOSUCHNICK).param(target).trailing_param(crate::lines::NO_SUCH_NICK);
            }
            return;
        }
    };

    let mut text = text.to_owned();
    let verdict = server.modules.collect(Hook::UserPreNotice, |m| m.on_user_pre_notice(NoticeKind::User, &sender_prefix, target, &mut text));
    if verdict.is_veto() {
        return;
    }

    if recipient_fd >= 0 {
        let command = if is_privmsg { Command::Privmsg } else { Command::Notice };
        let mut buf = ircd_tokens::Buffer::new();
        buf.message(&sender_prefix, command).param(target).trailing_param(&text);
        let bytes: &[u8] = buf.as_ref();
        server.broadcast_raw(&[recipient_fd], bytes);
    }

    server.modules.fan_out(Hook::UserNotice, |m| m.on_user_notice(&sender_prefix, target, &text));
}

/// Minimal `*`/`?` glob matcher for the `$<glob>` server-notice target
/// (spec.md §4.D step 3 "match ... against the configured server name by
/// glob").
fn glob_matches(pattern: &str, text: &str) -> bool {
    fn rec(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => rec(&p[1..], t) || (!t.is_empty() && rec(p, &t[1..])),
            (Some(b'?'), Some(_)) => rec(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc.eq_ignore_ascii_case(tc) => rec(&p[1..], &t[1..]),
            _ => false,
        }
    }
    rec(pattern.as_bytes(), text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests_support::minimal_config;
    use crate::user::User;

    fn server_with_two_users() -> Server {
        let mut server = Server::new(minimal_config());
        server.users.add(User::new(1, "h1".to_owned(), "irc.example.net".to_owned(), 0, 512));
        server.users.add(User::new(2, "h2".to_owned(), "irc.example.net".to_owned(), 0, 512));
        server.users.find_by_fd_mut(1).unwrap().nick = "alice".to_owned();
        server.users.find_by_fd_mut(2).unwrap().nick = "bob".to_owned();
        server.users.claim_nick(1, "alice").unwrap();
        server.users.claim_nick(2, "bob").unwrap();
        server
    }

    #[test]
    fn delivers_to_nickname_target() {
        let mut server = server_with_two_users();
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        handle(&mut server, 1, "bob", "hi", &mut rb);
        assert!(server.users.find_by_fd(2).unwrap().has_pending_write());
        assert!(!server.users.find_by_fd(1).unwrap().has_pending_write());
    }

    #[test]
    fn unknown_nickname_is_silently_dropped_for_notice() {
        let mut server = server_with_two_users();
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        handle(&mut server, 1, "carol", "hi", &mut rb);
        assert!(rb.is_empty());
    }

    #[test]
    fn multi_target_fans_out_to_each_recipient() {
        let mut server = server_with_two_users();
        server.users.add(User::new(3, "h3".to_owned(), "irc.example.net".to_owned(), 0, 512));
        server.users.find_by_fd_mut(3).unwrap().nick = "carol".to_owned();
        server.users.claim_nick(3, "carol").unwrap();
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        handle(&mut server, 1, "bob,carol", "hi all", &mut rb);
        assert!(server.users.find_by_fd(2).unwrap().has_pending_write());
        assert!(server.users.find_by_fd(3).unwrap().has_pending_write());
    }

    #[test]
    fn channel_notice_reaches_other_members_not_sender() {
        let mut server = server_with_two_users();
        server.channels.get_or_create("#room", 0).add_member(1);
        server.channels.get_or_create("#room", 0).add_member(2);
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        handle(&mut server, 1, "#room", "hello room", &mut rb);
        assert!(server.users.find_by_fd(2).unwrap().has_pending_write());
        assert!(!server.users.find_by_fd(1).unwrap().has_pending_write());
    }

    #[test]
    fn privmsg_to_nonexistent_channel_errors() {
        let mut server = server_with_two_users();
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        privmsg_or_notice(&mut server, 1, "#ghost", "hi", &mut rb, true);
        let s: &str = rb.as_ref();
        assert!(s.contains(" 401 "));
    }

    #[test]
    fn glob_matches_server_name() {
        assert!(glob_matches("*.example.net", "irc.example.net"));
        assert!(!glob_matches("*.example.com", "irc.example.net"));
    }

    // spec.md §8 scenario S2: a `@#room`-filtered notice reaches only
    // members at or above the threshold, excluding the sender itself
    // (spec.md §4.D step 5 "write_all_except_sender with the status
    // filter") -- here a second operator, `dave`, stands in for "a
    // recipient that meets the threshold" since the sender never receives
    // its own broadcast (matching S1's sender-exclusion behavior).
    #[test]
    fn status_prefix_reaches_only_members_at_or_above_threshold() {
        let mut server = server_with_two_users();
        server.users.add(User::new(3, "h3".to_owned(), "irc.example.net".to_owned(), 0, 512));
        server.users.find_by_fd_mut(3).unwrap().nick = "carol".to_owned();
        server.users.claim_nick(3, "carol").unwrap();
        server.users.add(User::new(4, "h4".to_owned(), "irc.example.net".to_owned(), 0, 512));
        server.users.find_by_fd_mut(4).unwrap().nick = "dave".to_owned();
        server.users.claim_nick(4, "dave").unwrap();
        let channel = server.channels.get_or_create("#room", 0);
        channel.members.insert(1, Status::Operator);
        channel.members.insert(2, Status::Voice);
        channel.members.insert(3, Status::None);
        channel.members.insert(4, Status::Operator);
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        handle(&mut server, 1, "@#room", "ops", &mut rb);
        assert!(!server.users.find_by_fd(1).unwrap().has_pending_write());
        assert!(!server.users.find_by_fd(2).unwrap().has_pending_write());
        assert!(!server.users.find_by_fd(3).unwrap().has_pending_write());
        assert!(server.users.find_by_fd(4).unwrap().has_pending_write());
    }

    // spec.md §8 scenario S3: a server-mask notice from an operator reaches
    // every local user and never touches a channel.
    #[test]
    fn server_mask_notice_reaches_all_local_users() {
        let mut server = server_with_two_users();
        server.users.find_by_fd_mut(1).unwrap().is_operator = true;
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        handle(&mut server, 1, "$*.example.net", "maint", &mut rb);
        assert!(server.users.find_by_fd(1).unwrap().has_pending_write());
        assert!(server.users.find_by_fd(2).unwrap().has_pending_write());
    }

    // U-line counterpart of S3: a non-operator from a U-lined server is
    // privileged the same as an operator (spec.md §4.D step 3).
    #[test]
    fn server_mask_notice_is_allowed_from_a_uline_server() {
        let mut server = server_with_two_users();
        server.config.ulines.push(crate::config::UlineConfig { server: "irc.example.net".to_owned() });
        server.users.find_by_fd_mut(1).unwrap().server = "irc.example.net".to_owned();
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        handle(&mut server, 1, "$*.example.net", "maint", &mut rb);
        assert!(server.users.find_by_fd(2).unwrap().has_pending_write());
    }

    #[test]
    fn server_mask_notice_from_non_privileged_user_is_dropped() {
        let mut server = server_with_two_users();
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        handle(&mut server, 1, "$*.example.net", "maint", &mut rb);
        assert!(!server.users.find_by_fd(2).unwrap().has_pending_write());
    }

    struct Recorder {
        fired: std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>,
        veto_text: Option<&'static str>,
        rewrite_to: Option<&'static str>,
    }

    impl crate::module::Module for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn implements(&self) -> crate::hooks::HookBitmap {
            let mut b = crate::hooks::HookBitmap::new();
            b.set(Hook::UserPreNotice);
            b.set(Hook::UserNotice);
            b
        }

        fn on_user_pre_notice(&mut self, _kind: NoticeKind, _source: &str, _target: &str, text: &mut String) -> crate::hooks::Verdict {
            if Some(text.as_str()) == self.veto_text {
                return crate::hooks::Verdict::Veto;
            }
            if let Some(rewritten) = self.rewrite_to {
                *text = rewritten.to_owned();
            }
            crate::hooks::Verdict::Accept
        }

        fn on_user_notice(&mut self, _source: &str, _target: &str, _text: &str) {
            self.fired.borrow_mut().push("notice");
        }
    }

    // spec.md §8 scenario S4 / property #11: a veto suppresses both
    // delivery and the OnUserNotice fan-out.
    #[test]
    fn hook_veto_suppresses_delivery_and_fan_out() {
        let mut server = server_with_two_users();
        let fired = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        server.modules.load_static("recorder", Box::new(Recorder {
            fired: fired.clone(), veto_text: Some("blocked"), rewrite_to: None,
        })).unwrap();
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        handle(&mut server, 1, "bob", "blocked", &mut rb);
        assert!(!server.users.find_by_fd(2).unwrap().has_pending_write());
        assert!(fired.borrow().is_empty());
    }

    // spec.md §8 scenario S5: a hook rewrite changes the delivered text.
    #[test]
    fn hook_rewrite_changes_delivered_text() {
        let mut server = server_with_two_users();
        server.channels.get_or_create("#room", 0).add_member(1);
        server.channels.get_or_create("#room", 0).add_member(2);
        let fired = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        server.modules.load_static("recorder", Box::new(Recorder {
            fired: fired.clone(), veto_text: None, rewrite_to: Some("[mod] hi"),
        })).unwrap();
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        handle(&mut server, 1, "#room", "hi", &mut rb);
        let bob_wrote = server.users.find_by_fd(2).unwrap().write_queue.iter().copied().collect::<Vec<u8>>();
        let text = String::from_utf8(bob_wrote).unwrap();
        assert!(text.contains("[mod] hi"));
        assert_eq!(*fired.borrow(), vec!["notice"]);
    }

    // spec.md §8 property #10: a hook that rewrites text to empty yields
    // ERR_NOTEXTTOSEND (412) via PRIVMSG and no delivery.
    #[test]
    fn hook_rewrite_to_empty_yields_412_for_privmsg() {
        let mut server = server_with_two_users();
        server.channels.get_or_create("#room", 0).add_member(1);
        server.channels.get_or_create("#room", 0).add_member(2);
        let fired = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        server.modules.load_static("recorder", Box::new(Recorder {
            fired: fired.clone(), veto_text: None, rewrite_to: Some(""),
        })).unwrap();
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        privmsg_or_notice(&mut server, 1, "#room", "hi", &mut rb, true);
        let s: &str = rb.as_ref();
        assert!(s.contains(" 412 "));
        assert!(!server.users.find_by_fd(2).unwrap().has_pending_write());
    }

    // spec.md §8 property #8: NOTICE to a channel the sender isn't in,
    // with `n` (no-external-messages) set, is rejected with 404.
    #[test]
    fn no_external_messages_rejects_non_member_with_404() {
        let mut server = server_with_two_users();
        server.users.add(User::new(3, "h3".to_owned(), "irc.example.net".to_owned(), 0, 512));
        server.users.find_by_fd_mut(3).unwrap().nick = "carol".to_owned();
        server.users.claim_nick(3, "carol").unwrap();
        let channel = server.channels.get_or_create("#room", 0);
        channel.add_member(1);
        channel.add_member(2);
        channel.no_external_messages = true;
        let mut rb = ReplyBuffer::new("irc.example.net", "carol");
        privmsg_or_notice(&mut server, 3, "#room", "hi", &mut rb, true);
        let s: &str = rb.as_ref();
        assert!(s.contains(" 404 "));
    }

    // spec.md §8 property #9: a moderated channel rejects a below-voice
    // member with 404.
    #[test]
    fn moderated_channel_rejects_below_voice_with_404() {
        let mut server = server_with_two_users();
        let channel = server.channels.get_or_create("#room", 0);
        channel.members.insert(1, Status::None);
        channel.members.insert(2, Status::Operator);
        channel.moderated = true;
        let mut rb = ReplyBuffer::new("irc.example.net", "alice");
        privmsg_or_notice(&mut server, 1, "#room", "hi", &mut rb, true);
        let s: &str = rb.as_ref();
        assert!(s.contains(" 404 "));
    }
}
