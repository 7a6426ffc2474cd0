//! Hook identifiers and the two invocation shapes (spec.md §3 "Hook
//! identifier", §4.F).

/// Total number of hook identifiers the slot bitmaps are sized for
/// (spec.md §3: "an enum-like integer in `[0, 255)`").
pub const HOOK_COUNT: usize = 256;

/// A named extension point. Only the hooks this core actually fires are
/// named here; the bitmap is still sized for the full 256-identifier space
/// (spec.md §9 "model hooks as a closed enumeration over the 256
/// identifiers") so a module's `implements()` bitmap and the global counter
/// array share one index space with room for hooks this core doesn't use.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(usize)]
pub enum Hook {
    UserPreNotice = 0,
    UserNotice = 1,
    UserQuit = 2,
    OnRehash = 3,
    OnLoadModule = 4,
    OnUnloadModule = 5,
    OnCheckReady = 6,
    OnBackgroundTimer = 7,
    OnCleanup = 8,
    On005Numeric = 9,
    OnRawSocketAccept = 10,
    OnRawSocketRead = 11,
    OnRawSocketWrite = 12,
    OnRawSocketClose = 13,
}

impl Hook {
    pub fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`Hook::index`] for the named hooks. `None` for an index
    /// outside the named set, e.g. one reserved for a module-defined hook
    /// this core never fires itself.
    pub fn from_index(i: usize) -> Option<Hook> {
        use Hook::*;
        Some(match i {
            0 => UserPreNotice,
            1 => UserNotice,
            2 => UserQuit,
            3 => OnRehash,
            4 => OnLoadModule,
            5 => OnUnloadModule,
            6 => OnCheckReady,
            7 => OnBackgroundTimer,
            8 => OnCleanup,
            9 => On005Numeric,
            10 => OnRawSocketAccept,
            11 => OnRawSocketRead,
            12 => OnRawSocketWrite,
            13 => OnRawSocketClose,
            _ => return None,
        })
    }
}

/// A fixed-capacity bitmap over the 256 hook identifiers: "slot `i`'s
/// bitmap bit `h` is set iff module at slot `i` implements hook `h`"
/// (spec.md §3 "Module slot").
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct HookBitmap([u64; 4]);

impl HookBitmap {
    pub fn new() -> Self {
        HookBitmap([0; 4])
    }

    pub fn set(&mut self, hook: Hook) {
        let i = hook.index();
        self.0[i / 64] |= 1 << (i % 64);
    }

    pub fn get(&self, hook: Hook) -> bool {
        let i = hook.index();
        self.0[i / 64] & (1 << (i % 64)) != 0
    }

    /// Iterates the set bits.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..HOOK_COUNT).filter(move |&i| self.0[i / 64] & (1 << (i % 64)) != 0)
    }
}

/// Result of a collector hook: `Accept` continues the pipeline, `Veto`
/// stops it (spec.md §4.F "stop at the first non-zero return").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    Accept,
    Veto,
}

impl Verdict {
    pub fn is_veto(self) -> bool {
        self == Verdict::Veto
    }
}
