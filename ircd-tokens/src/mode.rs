//! Generic `+x-y` flag-change parsing, shared by the user-mode and
//! channel-mode grammars.
//!
//! This only understands `+`/`-` segments and individual mode letters; it
//! says nothing about which letters exist or take a parameter. Callers
//! (`ircd::modes`) map each `(bool, u8)` pair onto their own mode enum and
//! pull a parameter off a separate iterator when the letter needs one.

/// Iterates `(value, mode_char)` pairs out of a raw modestring such as
/// `+im-s`.
pub struct FlagChanges<'a> {
    modes: &'a [u8],
    value: bool,
}

impl<'a> FlagChanges<'a> {
    pub fn new(modes: &'a str) -> Self {
        FlagChanges { modes: modes.as_bytes(), value: true }
    }
}

impl<'a> Iterator for FlagChanges<'a> {
    type Item = (bool, u8);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.modes.is_empty() {
                return None;
            }
            match self.modes[0] {
                b'+' => self.value = true,
                b'-' => self.value = false,
                c => {
                    self.modes = &self.modes[1..];
                    return Some((self.value, c));
                }
            }
            self.modes = &self.modes[1..];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sign_runs() {
        let changes: Vec<_> = FlagChanges::new("+im-s+k").collect();
        assert_eq!(changes, vec![
            (true, b'i'), (true, b'm'), (false, b's'), (true, b'k'),
        ]);
    }

    #[test]
    fn defaults_to_plus_without_a_leading_sign() {
        let changes: Vec<_> = FlagChanges::new("o").collect();
        assert_eq!(changes, vec![(true, b'o')]);
    }
}
