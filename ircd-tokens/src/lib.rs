//! IRC line tokenizing and message building for the daemon core.
//!
//! Kept as one crate, separate from `ircd` itself, so the wire-format code
//! can be unit tested without pulling in the server/channel/module state
//! machinery that depends on it.

mod buffers;
mod command;
mod message;
pub mod mode;
pub mod rpl;

pub use buffers::{Buffer, MessageBuffer, ReplyBuffer, TagBuffer};
pub use command::Command;
pub use message::{
    Message,
    Tag,
    MESSAGE_LENGTH,
    PARAMS_LENGTH,
    tag_escape,
    tags,
};

/// Asserts a parsed message against its expected shape, for dispatch tests.
///
/// An empty string in `params` skips that position instead of asserting
/// equality -- useful for replies whose parameter order isn't stable (e.g.
/// NAMREPLY, built from a `HashMap` iteration order).
pub fn assert_msg(msg: &Message<'_>, prefix: Option<&str>, command: Result<Command, &str>, params: &[&str]) {
    assert_eq!(msg.prefix, prefix, "prefix of {:?}", msg);
    assert_eq!(msg.command, command, "command of {:?}", msg);
    assert_eq!(msg.num_params, params.len(), "number of parameters of {:?}", msg);
    for (i, (actual, expected)) in msg.params.iter().zip(params.iter()).enumerate() {
        if expected.is_empty() {
            continue;
        }
        assert_eq!(actual, expected, "parameter #{} of {:?}", i, msg);
    }
}
