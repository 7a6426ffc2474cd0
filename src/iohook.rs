//! I/O hook interface (spec.md §4.K): a configuration may bind a listening
//! port to an object that intercepts the raw socket events for every
//! connection accepted on it (e.g. to terminate TLS before IRC framing
//! ever sees the bytes). The core treats a bound hook as transparent:
//! bytes handed to/from the hook replace direct syscalls on that
//! descriptor.

use crate::multiplexer::Descriptor;

#[derive(Debug)]
pub enum IoHookError {
    Rejected(String),
}

impl std::fmt::Display for IoHookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoHookError::Rejected(reason) => write!(f, "io hook rejected connection: {}", reason),
        }
    }
}

impl std::error::Error for IoHookError {}

/// One named I/O hook, referenced from `config::BindConfig::io_hook`.
pub trait IoHook {
    fn name(&self) -> &str;

    /// Called right after `accept`, before the descriptor is registered as
    /// `ESTAB_CLIENT` (spec.md §4.H). Rejecting here closes the connection
    /// without ever creating a user record.
    fn on_raw_socket_accept(&mut self, descriptor: Descriptor, peer_addr: &str) -> Result<(), IoHookError> {
        let _ = (descriptor, peer_addr);
        Ok(())
    }

    /// Transforms bytes as they arrive, before line framing.
    fn on_raw_socket_read(&mut self, descriptor: Descriptor, data: &[u8]) -> Vec<u8> {
        let _ = descriptor;
        data.to_vec()
    }

    /// Transforms bytes as they are about to be written.
    fn on_raw_socket_write(&mut self, descriptor: Descriptor, data: &[u8]) -> Vec<u8> {
        let _ = descriptor;
        data.to_vec()
    }

    fn on_raw_socket_close(&mut self, descriptor: Descriptor) {
        let _ = descriptor;
    }
}

/// The identity hook: bytes pass through unmodified. Used for any bound
/// port that doesn't name an `io_hook` in its configuration.
pub struct PlainIoHook;

impl IoHook for PlainIoHook {
    fn name(&self) -> &str {
        "plain"
    }
}

#[derive(Default)]
pub struct IoHookRegistry {
    hooks: std::collections::HashMap<String, Box<dyn IoHook>>,
}

impl IoHookRegistry {
    pub fn new() -> Self {
        IoHookRegistry { hooks: std::collections::HashMap::new() }
    }

    pub fn register(&mut self, hook: Box<dyn IoHook>) {
        self.hooks.insert(hook.name().to_owned(), hook);
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn IoHook + 'static)> {
        self.hooks.get_mut(name).map(|h| h.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uppercase;
    impl IoHook for Uppercase {
        fn name(&self) -> &str { "uppercase" }
        fn on_raw_socket_read(&mut self, _descriptor: Descriptor, data: &[u8]) -> Vec<u8> {
            data.to_ascii_uppercase()
        }
    }

    #[test]
    fn registry_dispatches_by_name() {
        let mut registry = IoHookRegistry::new();
        registry.register(Box::new(Uppercase));
        let hook = registry.get_mut("uppercase").unwrap();
        assert_eq!(hook.on_raw_socket_read(3, b"hi"), b"HI");
        assert!(registry.get_mut("missing").is_none());
    }

    #[test]
    fn plain_hook_passes_bytes_through() {
        let mut hook = PlainIoHook;
        assert_eq!(hook.on_raw_socket_read(3, b"hi"), b"hi");
        assert!(hook.on_raw_socket_accept(3, "127.0.0.1").is_ok());
    }
}
