//! Process-wide state (spec.md §3 "Process-wide state"): one `Server`
//! value owns every table, the module registry, and the configuration.
//! Never behind an `Arc<Mutex<_>>` -- the whole reactor runs on a single
//! task, so `&mut Server` is the only access mode that ever exists
//! (spec.md §5).

use crate::channel::{Channel, ChannelTable, Fd, Status};
use crate::config::Config;
use crate::hooks::Hook;
use crate::lines;
use crate::module::ModuleRegistry;
use crate::user::{Registration, User, UserTable};
use crate::util::{time_str, ServerNames};
use ircd_tokens::{rpl, Command, ReplyBuffer};

/// Accept-failure and other process counters (spec.md §4.H "increments a
/// refused-count statistic").
#[derive(Default)]
pub struct Stats {
    pub refused_connections: u64,
    pub total_connections: u64,
}

pub struct Server {
    pub config: Config,
    pub domain: String,
    pub created_at: String,
    pub users: UserTable,
    pub channels: ChannelTable,
    pub modules: ModuleRegistry,
    pub server_names: ServerNames,
    pub stats: Stats,
}

impl Server {
    pub fn new(config: Config) -> Server {
        let domain = config.domain.clone();
        Server {
            config,
            domain,
            created_at: time_str(),
            users: UserTable::new(),
            channels: ChannelTable::new(),
            modules: ModuleRegistry::new(),
            server_names: ServerNames::new(),
            stats: Stats::default(),
        }
    }

    fn reply_buffer_for(&self, fd: Fd) -> ReplyBuffer {
        let nick = self.users.find_by_fd(fd).map_or("*", |u| u.nick.as_str());
        ReplyBuffer::new(&self.domain, nick)
    }

    /// Queues `rb`'s built bytes onto `fd`'s write buffer, a no-op if
    /// nothing was written or the descriptor is gone (e.g. it quit earlier
    /// in the same dispatch).
    pub fn flush_to(&mut self, fd: Fd, rb: &ReplyBuffer) {
        if rb.is_empty() {
            return;
        }
        let bytes: &[u8] = rb.as_ref();
        if let Some(user) = self.users.find_by_fd_mut(fd) {
            user.queue(bytes);
        }
    }

    pub fn broadcast_raw(&mut self, members: &[Fd], bytes: &[u8]) {
        for &fd in members {
            if let Some(user) = self.users.find_by_fd_mut(fd) {
                user.queue(bytes);
            }
        }
    }

    /// Sends a built buffer to every channel member except `except`,
    /// optionally filtered to members whose status meets `filter`
    /// (spec.md §4.D step 5 "deliver via `write_all_except_sender` with
    /// the status filter").
    pub fn write_all_except(&mut self, channel_name: &str, except: Fd, filter: Option<Status>, bytes: &[u8]) {
        let targets: Vec<Fd> = match self.channels.find(channel_name) {
            Some(channel) => channel.members.iter()
                .filter(|(&fd, &status)| fd != except && filter.map_or(true, |min| status >= min))
                .map(|(&fd, _)| fd)
                .collect(),
            None => return,
        };
        self.broadcast_raw(&targets, bytes);
    }

    pub fn write_i_support(&self, rb: &mut ReplyBuffer) {
        let mut msg = rb.reply(rpl::ISUPPORT);
        for token in self.config.isupport_tokens() {
            msg = msg.param(&token);
        }
        msg.trailing_param(lines::I_SUPPORT);
    }

    pub fn write_lusers(&self, rb: &mut ReplyBuffer) {
        let n = self.users.len();
        lines::luser_client(rb.reply(rpl::LUSERCLIENT), n);
        if self.channels.len() != 0 {
            rb.reply(rpl::LUSERCHANNELS).param(&self.channels.len().to_string()).trailing_param(lines::LUSER_CHANNELS);
        }
        lines::luser_me(rb.reply(rpl::LUSERME), n);
    }

    pub fn write_motd(&self, rb: &mut ReplyBuffer) {
        match &self.config.motd_file {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(motd) => {
                    lines::motd_start(rb.reply(rpl::MOTDSTART), &self.domain);
                    for line in motd.lines() {
                        let mut msg = rb.reply(rpl::MOTD);
                        let trailing = msg.raw_trailing_param();
                        trailing.push_str("- ");
                        trailing.push_str(line);
                        trailing.push_str("\r\n");
                    }
                    rb.reply(rpl::ENDOFMOTD).trailing_param(lines::END_OF_MOTD);
                }
                Err(_) => {
                    rb.reply(rpl::ERR_NOMOTD).trailing_param(lines::NO_MOTD);
                }
            },
            None => {
                rb.reply(rpl::ERR_NOMOTD).trailing_param(lines::NO_MOTD);
            }
        }
    }

    pub fn write_names(&self, rb: &mut ReplyBuffer, channel_name: &str) {
        if let Some(channel) = self.channels.find(channel_name) {
            if !channel.members.is_empty() {
                let mut msg = rb.reply(rpl::NAMREPLY).param("=").param(channel_name);
                let trailing = msg.raw_trailing_param();
                for (&fd, &status) in &channel.members {
                    if let Some(nick) = self.users.find_by_fd(fd).map(|u| u.nick.as_str()) {
                        if let Some(symbol) = status.symbol() {
                            trailing.push(symbol);
                        }
                        trailing.push_str(nick);
                        trailing.push(' ');
                    }
                }
                trailing.pop();
                msg.build();
            }
        }
        rb.reply(rpl::ENDOFNAMES).param(channel_name).trailing_param(lines::END_OF_NAMES);
    }

    pub fn write_topic(&self, rb: &mut ReplyBuffer, channel: &Channel, channel_name: &str) {
        match &channel.topic {
            Some(topic) => { rb.reply(rpl::TOPIC).param(channel_name).trailing_param(topic); }
            None => { rb.reply(rpl::NOTOPIC).param(channel_name).trailing_param(lines::NO_TOPIC); }
        }
    }

    /// Sends the registration burst (001-004, ISUPPORT, LUSERS, MOTD): the
    /// moment a connection becomes `Registration::Registered` (spec.md §3
    /// "User Lifecycle").
    pub fn write_welcome(&self, fd: Fd) -> ReplyBuffer {
        let mut rb = self.reply_buffer_for(fd);
        let full_name = self.users.find_by_fd(fd).map_or_else(String::new, User::full_name);
        lines::welcome(rb.reply(rpl::WELCOME), &full_name);
        rb.reply(rpl::YOURHOST).trailing_param(lines::YOUR_HOST);
        lines::created(rb.reply(rpl::CREATED), &self.created_at);
        rb.reply(rpl::MYINFO).param(&self.domain).param(env!("CARGO_PKG_VERSION"));
        self.write_i_support(&mut rb);
        self.write_lusers(&mut rb);
        self.write_motd(&mut rb);
        rb
    }

    /// Completes registration for `fd` once both NICK and USER have been
    /// seen, firing the registration burst. No-op if already registered or
    /// still missing one of the two.
    pub fn try_complete_registration(&mut self, fd: Fd) {
        let ready = match self.users.find_by_fd(fd) {
            Some(u) if u.registration != Registration::Registered && u.has_nick && u.has_user => true,
            _ => false,
        };
        if !ready {
            return;
        }
        if self.modules.collect(Hook::OnCheckReady, |_| crate::hooks::Verdict::Accept).is_veto() {
            return;
        }
        if let Some(u) = self.users.find_by_fd_mut(fd) {
            u.registration = Registration::Registered;
        }
        let rb = self.write_welcome(fd);
        self.flush_to(fd, &rb);
    }

    /// Removes `fd` from the user and channel tables, notifying former
    /// channel-mates with QUIT and firing the `OnUserQuit` hook (spec.md §3
    /// "User Lifecycle": "destruction removes the user from every channel
    /// it is in ... fires a QUIT hook").
    pub fn quit(&mut self, fd: Fd, reason: &str) {
        let user = match self.users.remove(fd) {
            Some(u) => u,
            None => return,
        };
        let full_name = user.full_name();
        let mut quit_line = ircd_tokens::Buffer::new();
        quit_line.message(&full_name, Command::Quit).trailing_param(reason);
        let bytes: &[u8] = quit_line.as_ref();

        for channel_name in self.channels.remove_member_everywhere(fd) {
            let members: Vec<Fd> = self.channels.find(&channel_name)
                .map(|c| c.members.keys().copied().collect())
                .unwrap_or_default();
            self.broadcast_raw(&members, bytes);
            self.channels.destroy_if_empty(&channel_name);
        }

        self.modules.fan_out(Hook::UserQuit, |m| m.on_user_quit(&user.nick, reason));
    }

    pub fn find_channel_member_fd(&self, channel_name: &str, nick: &str) -> Option<Fd> {
        let channel = self.channels.find(channel_name)?;
        channel.members.keys().copied().find(|&fd| {
            self.users.find_by_fd(fd).map_or(false, |u| ircd_unicase::iequals(&u.nick, nick))
        })
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("domain", &self.domain)
            .field("users", &self.users.len())
            .field("channels", &self.channels.len())
            .field("modules", &self.modules.len())
            .finish()
    }
}

/// Shared by this module's tests and by other modules' tests (dispatch,
/// commands) that need a minimally valid `Server` without a config file.
#[cfg(test)]
pub(crate) mod tests_support {
    use crate::config::{BindConfig, Config};

    pub fn minimal_config() -> Config {
        Config {
            domain: "irc.example.net".to_owned(),
            network: "ExampleNet".to_owned(),
            org_name: "Example Org".to_owned(), org_location: "Nowhere".to_owned(), org_mail: "admin@example.net".to_owned(),
            bind: vec![BindConfig { port: 6667, address: None, io_hook: None }],
            nicklen: 30, channellen: 64, topiclen: 307, kicklen: 307,
            maxtargets: 20, awaylen: 200, maxchannels: 20, modes: 20,
            motd_file: None, pid_file: "/tmp/ircd.pid".to_owned(), module_path: "/tmp".to_owned(),
            opers: Vec::new(), ulines: Vec::new(), static_modules: Vec::new(), load_modules: Vec::new(),
        }
    }
}
