//! Resolver bridge (spec.md §4.J): each in-flight DNS lookup owns one
//! descriptor registered as `Dns` in the multiplexer. On readiness the
//! resolver reads the response, matches it to the originating request by
//! id, and delivers it to the requester -- a user still completing
//! registration (reverse DNS for the hostname banner), or a module that
//! issued its own lookup.
//!
//! Uses `tokio::net::lookup_host` (the "dns" feature already pulled in for
//! the multiplexer) rather than a hand-rolled resolver, so there is no
//! actual wire protocol to frame here: the "descriptor" is a request slot
//! the event loop polls, not a real socket.

use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::oneshot;

pub type RequestId = u64;

/// Who receives the resolved address once the lookup completes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Requester {
    /// A user still in registration, identified by descriptor.
    UserRegistration(crate::user::Fd),
    /// A module-issued lookup, identified by an opaque token the module
    /// chose when it called `resolve`.
    Module(u64),
}

#[derive(Debug)]
pub enum ResolveError {
    NotFound,
    Cancelled,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::NotFound => write!(f, "no address found"),
            ResolveError::Cancelled => write!(f, "lookup cancelled"),
        }
    }
}

impl std::error::Error for ResolveError {}

struct InFlight {
    requester: Requester,
    cancel: oneshot::Sender<()>,
}

/// Tracks in-flight lookups so a result (or cancellation) can be routed
/// back to whoever asked for it.
#[derive(Default)]
pub struct Resolver {
    next_id: RequestId,
    in_flight: HashMap<RequestId, InFlight>,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver { next_id: 0, in_flight: HashMap::new() }
    }

    /// Starts a lookup for `host`, returning its request id and a future
    /// that resolves once the lookup completes or is cancelled via
    /// [`Resolver::cancel`].
    pub fn resolve(&mut self, host: String, requester: Requester)
        -> (RequestId, impl std::future::Future<Output = Result<Vec<IpAddr>, ResolveError>>)
    {
        let id = self.next_id;
        self.next_id += 1;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.in_flight.insert(id, InFlight { requester, cancel: cancel_tx });

        let lookup = async move {
            tokio::select! {
                result = tokio::net::lookup_host((host.as_str(), 0)) => {
                    match result {
                        Ok(addrs) => {
                            let ips: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
                            if ips.is_empty() { Err(ResolveError::NotFound) } else { Ok(ips) }
                        }
                        Err(_) => Err(ResolveError::NotFound),
                    }
                }
                _ = cancel_rx => Err(ResolveError::Cancelled),
            }
        };
        (id, lookup)
    }

    /// Cancels an in-flight lookup, e.g. because the requesting
    /// descriptor was torn down before the answer arrived (spec.md §4.J
    /// "Cancellation on descriptor teardown is required").
    pub fn cancel(&mut self, id: RequestId) {
        if let Some(in_flight) = self.in_flight.remove(&id) {
            let _ = in_flight.cancel.send(());
        }
    }

    pub fn requester_of(&self, id: RequestId) -> Option<Requester> {
        self.in_flight.get(&id).map(|f| f.requester)
    }

    pub fn complete(&mut self, id: RequestId) {
        self.in_flight.remove(&id);
    }
}
