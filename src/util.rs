//! Small helpers shared across components: timestamp formatting and the
//! server-name interning table (spec.md §3, "Interning").

use std::collections::HashSet;

/// Formats the current time the way numeric replies and the `TIME` command
/// expect it.
pub fn time_str() -> String {
    chrono::Local::now().format("%a %b %e %Y -- %T %z").to_string()
}

/// Unix timestamp in seconds, the clock source for the timer wheel and
/// per-user idle/registration tracking.
pub fn now() -> i64 {
    chrono::Local::now().timestamp()
}

/// A deduplicated, append-only list of server names.
///
/// Interned names live for the process lifetime, so a `&'static str`-like
/// stable reference can be handed out once and reused -- mirroring the
/// `servernames`/`AddServerName` list in the original InspIRCd core, minus
/// the leak: interning here hands back an owned `String` clone, which is
/// cheap since server names are short and looked up rarely (only at user
/// registration and module load).
#[derive(Default)]
pub struct ServerNames {
    names: HashSet<String>,
}

impl ServerNames {
    pub fn new() -> Self {
        ServerNames { names: HashSet::new() }
    }

    /// Interns `name`, returning the canonical stored copy.
    pub fn intern(&mut self, name: &str) -> String {
        if let Some(found) = self.names.get(name) {
            return found.clone();
        }
        self.names.insert(name.to_owned());
        name.to_owned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut names = ServerNames::new();
        let a = names.intern("hub.example.net");
        let b = names.intern("hub.example.net");
        assert_eq!(a, b);
        assert_eq!(names.names.len(), 1);
    }
}
