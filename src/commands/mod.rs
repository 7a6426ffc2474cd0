//! Command handlers other than the normative NOTICE/PRIVMSG dispatch (see
//! [`notice`]). Grounded on `ellidri`'s `state/rfc2812.rs` handler shapes,
//! generalized from `StateInner`'s method-per-command style to free
//! functions taking `&mut Server` explicitly (spec.md §3: the server is a
//! value, never an implicit `self` hidden behind a lock).

pub mod notice;

use crate::channel::{Fd, Status};
use crate::dispatch::TargetIter;
use crate::hooks::Hook;
use crate::modes::ChannelQuery;
use crate::server::Server;
use ircd_tokens::{rpl, Command, ReplyBuffer};

pub fn dispatch(server: &mut Server, fd: Fd, command: Command, ps: &[&str], rb: &mut ReplyBuffer) {
    match command {
        Command::Admin => admin(server, rb),
        Command::Cap => {} // capability negotiation is out of scope (spec.md Non-goals).
        Command::Info => info(rb),
        Command::Invite => invite(server, fd, ps[0], ps[1], rb),
        Command::Join => join(server, fd, ps[0], ps.get(1).copied(), rb),
        Command::Kick => kick(server, fd, ps[0], ps[1], ps.get(2).copied().unwrap_or(""), rb),
        Command::List => list(server, ps.get(0).copied(), rb),
        Command::Loadmodule => {} // dynamic loading is wired by main.rs's CLI/REHASH path, not a live command here.
        Command::Lusers => lusers(server, rb),
        Command::Mode => mode(server, fd, ps, rb),
        Command::Motd => server.write_motd(rb),
        Command::Names => names(server, ps.get(0).copied(), rb),
        Command::Nick => nick(server, fd, ps[0], rb),
        Command::Notice => notice::handle(server, fd, ps[0], ps[1], rb),
        Command::Oper => oper(server, fd, ps[0], ps[1], rb),
        Command::Part => part(server, fd, ps[0], ps.get(1).copied().unwrap_or("leaving"), rb),
        Command::Pass => pass(server, fd, ps[0], rb),
        Command::Ping => { rb.message("", Command::Pong).param(&server.domain).trailing_param(ps[0]); }
        Command::Pong => {}
        Command::Privmsg => notice::privmsg_or_notice(server, fd, ps[0], ps[1], rb, true),
        Command::Quit => server.quit(fd, ps.get(0).copied().unwrap_or("Client Quit")),
        Command::Rehash => { rb.reply(rpl::YOUREOPER); server.modules.fan_out(Hook::OnRehash, |m| m.on_rehash()); }
        Command::Time => { rb.reply(rpl::TIME).trailing_param(&crate::util::time_str()); }
        Command::Topic => topic(server, fd, ps[0], ps.get(1).copied(), rb),
        Command::Unloadmodule => {}
        Command::User => user(server, fd, ps[0], ps[3], rb),
        Command::Version => { rb.reply(rpl::VERSION).param(env!("CARGO_PKG_VERSION")).param(&server.domain).trailing_param(""); }
        Command::Who => who(server, ps.get(0).copied().unwrap_or("*"), rb),
        Command::Whois => whois(server, ps[0], rb),
    }
}

fn pass(server: &mut Server, fd: Fd, password: &str, rb: &mut ReplyBuffer) {
    let _ = (server, fd, password, rb); // link password checking belongs to the (out-of-scope) server-link layer.
}

fn nick(server: &mut Server, fd: Fd, nick: &str, rb: &mut ReplyBuffer) {
    if nick.is_empty() || nick.len() > server.config.nicklen {
        rb.reply(rpl::ERR_ERRONEUSNICKNAME).param(nick).trailing_param("Erroneous nickname");
        return;
    }
    if server.users.is_nick_in_use(nick) && server.users.find_by_nick(nick).map_or(true, |u| u.fd != fd) {
        rb.reply(rpl::ERR_NICKNAMEINUSE).param(nick).trailing_param("Nickname is already in use");
        return;
    }
    let old_prefix = server.users.find_by_fd(fd).map(|u| u.full_name());
    if server.users.claim_nick(fd, nick).is_err() {
        rb.reply(rpl::ERR_NICKNAMEINUSE).param(nick).trailing_param("Nickname is already in use");
        return;
    }
    let was_registered = server.users.find_by_fd(fd).map_or(false, |u| u.is_registered());
    let channels: Vec<String> = server.users.find_by_fd(fd)
        .map(|u| u.channels.iter().map(|c| c.0.clone()).collect())
        .unwrap_or_default();
    if let Some(u) = server.users.find_by_fd_mut(fd) {
        u.nick = nick.to_owned();
        u.has_nick = true;
    }
    rb.set_nick(nick);
    if was_registered {
        if let Some(prefix) = old_prefix {
            let mut buf = ircd_tokens::Buffer::new();
            buf.message(&prefix, Command::Nick).trailing_param(nick);
            let bytes: &[u8] = buf.as_ref();
            let mut notified = std::collections::HashSet::new();
            for channel_name in &channels {
                let members: Vec<Fd> = server.channels.find(channel_name)
                    .map(|c| c.members.keys().copied().collect())
                    .unwrap_or_default();
                for member in members {
                    if notified.insert(member) && member != fd {
                        server.broadcast_raw(&[member], bytes);
                    }
                }
            }
            rb.message(&prefix, Command::Nick).trailing_param(nick);
        }
    }
}

fn user(server: &mut Server, fd: Fd, ident: &str, realname: &str, rb: &mut ReplyBuffer) {
    let _ = realname;
    if let Some(u) = server.users.find_by_fd(fd) {
        if u.is_registered() {
            rb.reply(rpl::ERR_ALREADYREGISTRED).trailing_param(crate::lines::ALREADY_REGISTERED);
            return;
        }
    }
    if let Some(u) = server.users.find_by_fd_mut(fd) {
        u.ident = ident.to_owned();
        u.has_user = true;
    }
}

fn admin(server: &mut Server, rb: &mut ReplyBuffer) {
    rb.reply(rpl::ADMINME).param(&server.domain).trailing_param("Administrative info");
    rb.reply(rpl::ADMINLOC1).trailing_param(&server.config.org_name);
    rb.reply(rpl::ADMINLOC2).trailing_param(&server.config.org_location);
    rb.reply(rpl::ADMINEMAIL).trailing_param(&server.config.org_mail);
}

fn info(rb: &mut ReplyBuffer) {
    rb.reply(rpl::VERSION).trailing_param(concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION")));
}

fn lusers(server: &mut Server, rb: &mut ReplyBuffer) {
    server.write_lusers(rb);
}

fn oper(server: &mut Server, fd: Fd, name: &str, password: &str, rb: &mut ReplyBuffer) {
    let ok = server.config.opers.iter().any(|o| o.name == name && o.password == password);
    if !ok {
        rb.reply(rpl::ERR_NOOPERHOST).trailing_param(crate::lines::NO_OPER_HOST);
        return;
    }
    if let Some(u) = server.users.find_by_fd_mut(fd) {
        u.is_operator = true;
    }
    crate::lines::you_are_oper(rb.reply(rpl::YOUREOPER));
}

fn join(server: &mut Server, fd: Fd, target: &str, key: Option<&str>, rb: &mut ReplyBuffer) {
    for t in TargetIter::new(target) {
        join_one(server, fd, t, key, rb);
    }
}

fn join_one(server: &mut Server, fd: Fd, target: &str, key: Option<&str>, rb: &mut ReplyBuffer) {
    if !target.starts_with('#') {
        rb.reply(rpl::ERR_NOSUCHCHANNEL).param(target).trailing_param(crate::lines::NO_SUCH_CHANNEL);
        return;
    }
    let now = 0;
    {
        let channel = server.channels.get_or_create(target, now);
        if channel.members.contains_key(&fd) {
            return;
        }
        if let Some(required) = &channel.key {
            if key != Some(required.as_str()) {
                rb.reply(rpl::ERR_BADCHANNELKEY).param(target).trailing_param(crate::lines::BAD_CHANNEL_KEY);
                return;
            }
        }
        if channel.invite_only {
            rb.reply(rpl::ERR_INVITEONLYCHAN).param(target).trailing_param(crate::lines::INVITE_ONLY_CHAN);
            return;
        }
        if let Some(limit) = channel.user_limit {
            if channel.members.len() >= limit {
                rb.reply(rpl::ERR_CHANNELISFULL).param(target).trailing_param(crate::lines::CHANNEL_IS_FULL);
                return;
            }
        }
        channel.add_member(fd);
    }
    if let Some(u) = server.users.find_by_fd_mut(fd) {
        u.channels.insert(ircd_unicase::UniCase::new(target.to_owned()));
    }
    let prefix = server.users.find_by_fd(fd).map_or_else(String::new, |u| u.full_name());
    let mut buf = ircd_tokens::Buffer::new();
    buf.message(&prefix, Command::Join).trailing_param(target);
    let bytes: &[u8] = buf.as_ref();
    let members: Vec<Fd> = server.channels.find(target).map(|c| c.members.keys().copied().collect()).unwrap_or_default();
    server.broadcast_raw(&members, bytes);
    if let Some(channel) = server.channels.find(target) {
        server.write_topic(rb, channel, target);
    }
    server.write_names(rb, target);
}

fn part(server: &mut Server, fd: Fd, target: &str, reason: &str, rb: &mut ReplyBuffer) {
    for t in TargetIter::new(target) {
        part_one(server, fd, t, reason, rb);
    }
}

fn part_one(server: &mut Server, fd: Fd, target: &str, reason: &str, rb: &mut ReplyBuffer) {
    let in_channel = server.channels.find(target).map_or(false, |c| c.members.contains_key(&fd));
    if !in_channel {
        rb.reply(rpl::ERR_NOTONCHANNEL).param(target).trailing_param(crate::lines::NOT_ON_CHANNEL);
        return;
    }
    let prefix = server.users.find_by_fd(fd).map_or_else(String::new, |u| u.full_name());
    let mut buf = ircd_tokens::Buffer::new();
    buf.message(&prefix, Command::Part).param(target).trailing_param(reason);
    let bytes: &[u8] = buf.as_ref();
    let members: Vec<Fd> = server.channels.find(target).map(|c| c.members.keys().copied().collect()).unwrap_or_default();
    server.broadcast_raw(&members, bytes);
    if let Some(channel) = server.channels.find_mut(target) {
        channel.remove_member(fd);
    }
    if let Some(u) = server.users.find_by_fd_mut(fd) {
        u.channels.remove(<&ircd_unicase::UniCase<str>>::from(target));
    }
    server.channels.destroy_if_empty(target);
}

fn topic(server: &mut Server, fd: Fd, channel_name: &str, new_topic: Option<&str>, rb: &mut ReplyBuffer) {
    let on_channel = server.channels.find(channel_name).map_or(false, |c| c.members.contains_key(&fd));
    if !on_channel {
        rb.reply(rpl::ERR_NOTONCHANNEL).param(channel_name).trailing_param(crate::lines::NOT_ON_CHANNEL);
        return;
    }
    match new_topic {
        None => {
            if let Some(channel) = server.channels.find(channel_name) {
                server.write_topic(rb, channel, channel_name);
            }
        }
        Some(topic) => {
            let restricted = server.channels.find(channel_name).map_or(false, |c| c.topic_restricted);
            let status = server.channels.find(channel_name).and_then(|c| c.status_of(fd)).unwrap_or(Status::None);
            if restricted && status < Status::HalfOp {
                rb.reply(rpl::ERR_CHANOPRIVSNEEDED).param(channel_name).trailing_param(crate::lines::CHAN_OP_PRIVS_NEEDED);
                return;
            }
            if let Some(channel) = server.channels.find_mut(channel_name) {
                channel.topic = Some(topic.to_owned());
            }
            let prefix = server.users.find_by_fd(fd).map_or_else(String::new, |u| u.full_name());
            let mut buf = ircd_tokens::Buffer::new();
            buf.message(&prefix, Command::Topic).param(channel_name).trailing_param(topic);
            let bytes: &[u8] = buf.as_ref();
            let members: Vec<Fd> = server.channels.find(channel_name).map(|c| c.members.keys().copied().collect()).unwrap_or_default();
            server.broadcast_raw(&members, bytes);
        }
    }
}

fn names(server: &mut Server, channel_name: Option<&str>, rb: &mut ReplyBuffer) {
    match channel_name {
        Some(name) => {
            for t in TargetIter::new(name) {
                server.write_names(rb, t);
            }
        }
        None => {
            let names: Vec<String> = server.channels.iter().map(|(n, _)| n.to_owned()).collect();
            for name in names {
                server.write_names(rb, &name);
            }
        }
    }
}

fn list(server: &mut Server, filter: Option<&str>, rb: &mut ReplyBuffer) {
    let wanted: Option<Vec<&str>> = filter.map(|f| f.split(',').collect());
    for (name, channel) in server.channels.iter() {
        if channel.secret {
            continue;
        }
        if let Some(ref w) = wanted {
            if !w.iter().any(|n| ircd_unicase::iequals(n, name)) {
                continue;
            }
        }
        rb.reply(rpl::LIST).param(name).param(&channel.members.len().to_string())
            .trailing_param(channel.topic.as_deref().unwrap_or(""));
    }
    rb.reply(rpl::LISTEND).trailing_param("End of LIST");
}

fn invite(server: &mut Server, fd: Fd, nick: &str, channel_name: &str, rb: &mut ReplyBuffer) {
    let on_channel = server.channels.find(channel_name).map_or(false, |c| c.members.contains_key(&fd));
    if !on_channel {
        rb.reply(rpl::ERR_NOTONCHANNEL).param(channel_name).trailing_param(crate::lines::NOT_ON_CHANNEL);
        return;
    }
    let target_fd = match server.users.find_by_nick(nick) {
        Some(u) => u.fd,
        None => {
            rb.reply(rpl::ERR_NOSUCHNICK).param(nick).trailing_param(crate::lines::NO_SUCH_NICK);
            return;
        }
    };
    if let Some(channel) = server.channels.find_mut(channel_name) {
        channel.invitation_mask.insert(nick.to_owned());
    }
    rb.reply(rpl::INVITING).param(nick).param(channel_name).build();
    let prefix = server.users.find_by_fd(fd).map_or_else(String::new, |u| u.full_name());
    let mut buf = ircd_tokens::Buffer::new();
    buf.message(&prefix, Command::Invite).param(nick).trailing_param(channel_name);
    let bytes: &[u8] = buf.as_ref();
    server.broadcast_raw(&[target_fd], bytes);
}

fn kick(server: &mut Server, fd: Fd, channel_name: &str, nick: &str, reason: &str, rb: &mut ReplyBuffer) {
    for t in TargetIter::new(nick) {
        kick_one(server, fd, channel_name, t, reason, rb);
    }
}

fn kick_one(server: &mut Server, fd: Fd, channel_name: &str, nick: &str, reason: &str, rb: &mut ReplyBuffer) {
    let kicker_status = server.channels.find(channel_name).and_then(|c| c.status_of(fd)).unwrap_or(Status::None);
    if kicker_status < Status::HalfOp {
        rb.reply(rpl::ERR_CHANOPRIVSNEEDED).param(channel_name).trailing_param(crate::lines::CHAN_OP_PRIVS_NEEDED);
        return;
    }
    let target_fd = match server.find_channel_member_fd(channel_name, nick) {
        Some(fd) => fd,
        None => {
            rb.reply(rpl::ERR_USERNOTINCHANNEL).param(nick).param(channel_name).trailing_param(crate::lines::NOT_ON_CHANNEL);
            return;
        }
    };
    let prefix = server.users.find_by_fd(fd).map_or_else(String::new, |u| u.full_name());
    let mut buf = ircd_tokens::Buffer::new();
    buf.message(&prefix, Command::Kick).param(channel_name).param(nick).trailing_param(reason);
    let bytes: &[u8] = buf.as_ref();
    let members: Vec<Fd> = server.channels.find(channel_name).map(|c| c.members.keys().copied().collect()).unwrap_or_default();
    server.broadcast_raw(&members, bytes);
    if let Some(channel) = server.channels.find_mut(channel_name) {
        channel.remove_member(target_fd);
    }
    if let Some(u) = server.users.find_by_fd_mut(target_fd) {
        u.channels.remove(<&ircd_unicase::UniCase<str>>::from(channel_name));
    }
    server.channels.destroy_if_empty(channel_name);
}

fn mode(server: &mut Server, fd: Fd, ps: &[&str], rb: &mut ReplyBuffer) {
    let target = ps[0];
    if target.starts_with('#') {
        if ps.len() == 1 {
            if let Some(channel) = server.channels.find(target) {
                channel.write_modes(rb.reply(rpl::CHANNELMODEIS).param(target));
            }
            return;
        }
        let status = server.channels.find(target).and_then(|c| c.status_of(fd)).unwrap_or(Status::None);
        if status < Status::HalfOp {
            rb.reply(rpl::ERR_CHANOPRIVSNEEDED).param(target).trailing_param(crate::lines::CHAN_OP_PRIVS_NEEDED);
            return;
        }
        let modes = ps[1];
        let params: Vec<&str> = ps[2..].to_vec();
        let changes: Vec<_> = ChannelQuery::new(modes, params.into_iter()).collect();
        let nicks: std::collections::HashMap<String, Fd> = server.channels.find(target)
            .map(|c| c.members.keys().filter_map(|&m| server.users.find_by_fd(m).map(|u| (u.nick.clone(), m))).collect())
            .unwrap_or_default();
        for change in changes {
            match change {
                Ok(c) => {
                    let applied = server.channels.find_mut(target).map(|channel| {
                        channel.apply_mode_change(c, |nick| nicks.get(nick).copied())
                    });
                    if let Some(Err(err)) = applied {
                        rb.reply(err).param(target).build();
                    }
                }
                Err(crate::modes::Error::UnknownMode(ch)) => {
                    rb.reply(rpl::ERR_UNKNOWNMODE).param(&ch.to_string()).trailing_param(crate::lines::UNKNOWN_MODE);
                }
                Err(crate::modes::Error::MissingModeParam) => {
                    rb.reply(rpl::ERR_NEEDMOREPARAMS).param("MODE").trailing_param(crate::lines::NEED_MORE_PARAMS);
                }
            }
        }
    } else {
        if !ircd_unicase::iequals(target, server.users.find_by_fd(fd).map_or("", |u| u.nick.as_str())) {
            rb.reply(rpl::ERR_USERSDONTMATCH).trailing_param(crate::lines::USERS_DONT_MATCH);
        }
    }
}

fn who(server: &mut Server, mask: &str, rb: &mut ReplyBuffer) {
    for user in server.users.iter() {
        if mask == "*" || ircd_unicase::iequals(&user.nick, mask) || ircd_unicase::iequals(&user.hostname, mask) {
            rb.reply(rpl::WHOREPLY)
                .param("*").param(&user.ident).param(&user.hostname).param(&server.domain)
                .param(&user.nick).param("H")
                .trailing_param(&format!("0 {}", user.nick));
        }
    }
    rb.reply(rpl::ENDOFWHO).param(mask).trailing_param("End of WHO list");
}

fn whois(server: &mut Server, nick: &str, rb: &mut ReplyBuffer) {
    for t in TargetIter::new(nick) {
        whois_one(server, t, rb);
    }
}

fn whois_one(server: &mut Server, nick: &str, rb: &mut ReplyBuffer) {
    match server.users.find_by_nick(nick) {
        Some(user) => {
            rb.reply(rpl::WHOISUSER).param(&user.nick).param(&user.ident).param(&user.hostname).param("*").trailing_param(&user.ident);
            rb.reply(rpl::WHOISSERVER).param(&user.nick).param(&user.server).trailing_param("");
            if user.is_operator {
                rb.reply(rpl::WHOISOPERATOR).param(&user.nick).trailing_param("is an IRC operator");
            }
            rb.reply(rpl::ENDOFWHOIS).param(&user.nick).trailing_param("End of WHOIS list");
        }
        None => {
            rb.reply(rpl::ERR_NOSUCHNICK).param(nick).trailing_param(crate::lines::NO_SUCH_NICK);
        }
    }
}
