//! Canned reply text. Kept out of the command handlers so wording changes
//! don't touch dispatch logic, mirroring how numerics with fixed English
//! text are isolated from the numerics that carry caller-chosen data.

use ircd_tokens::MessageBuffer;

pub const UNKNOWN_COMMAND: &str = "Unknown command";
pub const NOT_REGISTERED: &str = "You have not registered";
pub const NEED_MORE_PARAMS: &str = "Not enough parameters";
pub const ALREADY_REGISTERED: &str = "You may not reregister";
pub const NO_SUCH_CHANNEL: &str = "No such channel";
pub const NO_SUCH_NICK: &str = "No such nick/channel";
pub const NOT_ON_CHANNEL: &str = "You're not on that channel";
pub const NO_TEXT_TO_SEND: &str = "No text to send";
pub const CANNOT_SEND_TO_CHAN: &str = "Cannot send to channel";
pub const NO_MOTD: &str = "MOTD File is missing";
pub const NO_TOPIC: &str = "No topic is set";
pub const END_OF_NAMES: &str = "End of NAMES list";
pub const END_OF_MOTD: &str = "End of MOTD command";
pub const YOUR_HOST: &str = "Your host is running this ircd";
pub const I_SUPPORT: &str = "are supported by this server";
pub const LUSER_CHANNELS: &str = "channels formed";
pub const NEED_OPER_PRIVS: &str = "Permission Denied - You're not an IRC operator";
pub const NO_OPER_HOST: &str = "No O-lines for your host";
pub const PASSWORD_MISMATCH: &str = "Password incorrect";
pub const UNKNOWN_MODE: &str = "is unknown mode char to me";
pub const KEY_SET: &str = "Channel key already set";
pub const CHANNEL_IS_FULL: &str = "Cannot join channel (+l)";
pub const INVITE_ONLY_CHAN: &str = "Cannot join channel (+i)";
pub const BANNED_FROM_CHAN: &str = "Cannot join channel (+b)";
pub const BAD_CHANNEL_KEY: &str = "Cannot join channel (+k)";
pub const CHAN_OP_PRIVS_NEEDED: &str = "You're not channel operator";
pub const USERS_DONT_MATCH: &str = "Cannot change mode for other users";
pub const MODULE_LOAD_FAILED_PREFIX: &str = "Could not load module";
pub const MODULE_UNLOAD_FAILED_PREFIX: &str = "Could not unload module";

pub fn welcome(msg: MessageBuffer<'_>, full_name: &str) {
    msg.trailing_param(&format!("Welcome to the network, {}", full_name));
}

pub fn created(msg: MessageBuffer<'_>, created_at: &str) {
    msg.trailing_param(&format!("This server was created {}", created_at));
}

pub fn luser_client(msg: MessageBuffer<'_>, num_users: usize) {
    msg.trailing_param(&format!("There are {} users on 1 server", num_users));
}

pub fn luser_me(msg: MessageBuffer<'_>, num_users: usize) {
    msg.trailing_param(&format!("I have {} clients and 1 server", num_users));
}

pub fn motd_start(msg: MessageBuffer<'_>, domain: &str) {
    msg.trailing_param(&format!("- {} message of the day", domain));
}

pub fn you_are_oper(msg: MessageBuffer<'_>) {
    msg.trailing_param("You are now an IRC operator");
}

pub fn no_such_server(target: &str) -> String {
    format!("No such server name: {}", target)
}
