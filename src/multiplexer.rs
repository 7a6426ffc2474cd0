//! Pluggable multiplexer (spec.md §4.A): the event loop asks one object
//! "what's ready", independent of how readiness is actually determined.
//!
//! `TokioMultiplexer` is the production implementation, standing in for
//! the spec's abstract epoll/kqueue wrapper: tokio's reactor is this
//! core's single-threaded event source, and `wait` is built from each
//! registered socket's own readiness future rather than a raw `poll(2)`
//! call. Writability is derived from non-empty write queues (spec.md
//! §4.A) rather than subscribed unconditionally: the caller only passes
//! in the descriptors that currently have bytes queued, and `wait`
//! attempts a bounded write for exactly those, reporting back how many
//! bytes actually went out so the caller can drain its queue by that
//! amount. `MockMultiplexer` drives the same trait from a fixed script,
//! for testing `eventloop.rs` without real sockets.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

pub type Descriptor = i32;

/// What kind of endpoint a descriptor is, so the event loop knows how to
/// service it once it's ready (spec.md §4.I step 8 "dispatch by kind").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DescriptorKind {
    Client,
    ModuleSocket,
    Dns,
    Listener,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Readiness {
    Readable,
    /// How many bytes of the caller-supplied pending buffer were
    /// actually written to the socket (always `> 0`; a descriptor with
    /// nothing written never appears in `wait`'s result).
    Writable(usize),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadyEvent {
    pub descriptor: Descriptor,
    pub kind: DescriptorKind,
    pub readiness: Readiness,
}

#[async_trait(?Send)]
pub trait Multiplexer {
    fn add(&mut self, descriptor: Descriptor, kind: DescriptorKind);
    fn remove(&mut self, descriptor: Descriptor);
    fn type_of(&self, descriptor: Descriptor) -> Option<DescriptorKind>;

    /// Blocks up to `timeout` for at least one ready descriptor, returning
    /// whatever became ready in that window (possibly empty, on timeout).
    /// `pending_writes` names exactly the descriptors that currently have
    /// a non-empty write queue and the bytes to attempt writing for each;
    /// descriptors absent from the map are never probed for writability.
    async fn wait(&mut self, timeout: Duration, pending_writes: &HashMap<Descriptor, Vec<u8>>) -> Vec<ReadyEvent>;
}

struct Registered {
    kind: DescriptorKind,
    stream: Option<TcpStream>,
}

#[derive(Default)]
pub struct TokioMultiplexer {
    descriptors: HashMap<Descriptor, Registered>,
}

impl TokioMultiplexer {
    pub fn new() -> Self {
        TokioMultiplexer { descriptors: HashMap::new() }
    }

    /// Registers a connected socket under `descriptor`, so `wait` can poll
    /// its readability directly instead of treating it as a bare
    /// bookkeeping entry (used for `Client` and `Dns` descriptors).
    pub fn add_stream(&mut self, descriptor: Descriptor, kind: DescriptorKind, stream: TcpStream) {
        self.descriptors.insert(descriptor, Registered { kind, stream: Some(stream) });
    }

    /// Hands back the raw socket for a registered descriptor, for
    /// framing (`ircd_reader::LineReader`) to operate on directly.
    /// `None` for a bookkeeping-only registration (no stream attached) or
    /// an unknown descriptor.
    pub fn stream_mut(&mut self, descriptor: Descriptor) -> Option<&mut TcpStream> {
        self.descriptors.get_mut(&descriptor)?.stream.as_mut()
    }
}

#[async_trait(?Send)]
impl Multiplexer for TokioMultiplexer {
    fn add(&mut self, descriptor: Descriptor, kind: DescriptorKind) {
        self.descriptors.entry(descriptor).or_insert(Registered { kind, stream: None });
    }

    fn remove(&mut self, descriptor: Descriptor) {
        self.descriptors.remove(&descriptor);
    }

    fn type_of(&self, descriptor: Descriptor) -> Option<DescriptorKind> {
        self.descriptors.get(&descriptor).map(|r| r.kind)
    }

    async fn wait(&mut self, timeout: Duration, pending_writes: &HashMap<Descriptor, Vec<u8>>) -> Vec<ReadyEvent> {
        let mut probe = Vec::new();
        for (&descriptor, reg) in self.descriptors.iter_mut() {
            let kind = reg.kind;
            let stream = match &mut reg.stream {
                Some(stream) => stream,
                None => continue,
            };
            let pending = pending_writes.get(&descriptor);
            probe.push(async move {
                let mut events = Vec::new();
                if let Some(bytes) = pending {
                    if let Ok(Ok(n)) = tokio::time::timeout(timeout, stream.write(bytes)).await {
                        if n > 0 {
                            events.push(ReadyEvent { descriptor, kind, readiness: Readiness::Writable(n) });
                        }
                    }
                }
                let mut buf = [0u8; 0];
                if tokio::time::timeout(timeout, stream.peek(&mut buf)).await.is_ok() {
                    events.push(ReadyEvent { descriptor, kind, readiness: Readiness::Readable });
                }
                events
            });
        }
        let results = futures::future::join_all(probe).await;
        results.into_iter().flatten().collect()
    }
}

/// A scripted sequence of readiness batches, for driving `eventloop.rs` in
/// tests deterministically.
#[derive(Default)]
pub struct MockMultiplexer {
    descriptors: HashMap<Descriptor, DescriptorKind>,
    script: std::collections::VecDeque<Vec<ReadyEvent>>,
}

impl MockMultiplexer {
    pub fn new() -> Self {
        MockMultiplexer { descriptors: HashMap::new(), script: std::collections::VecDeque::new() }
    }

    pub fn push_batch(&mut self, batch: Vec<ReadyEvent>) {
        self.script.push_back(batch);
    }
}

#[async_trait(?Send)]
impl Multiplexer for MockMultiplexer {
    fn add(&mut self, descriptor: Descriptor, kind: DescriptorKind) {
        self.descriptors.insert(descriptor, kind);
    }

    fn remove(&mut self, descriptor: Descriptor) {
        self.descriptors.remove(&descriptor);
    }

    fn type_of(&self, descriptor: Descriptor) -> Option<DescriptorKind> {
        self.descriptors.get(&descriptor).copied()
    }

    async fn wait(&mut self, _timeout: Duration, _pending_writes: &HashMap<Descriptor, Vec<u8>>) -> Vec<ReadyEvent> {
        self.script.pop_front().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_replays_scripted_batches_in_order() {
        let mut mux = MockMultiplexer::new();
        mux.add(3, DescriptorKind::Client);
        mux.push_batch(vec![ReadyEvent { descriptor: 3, kind: DescriptorKind::Client, readiness: Readiness::Readable }]);
        mux.push_batch(Vec::new());

        let no_writes = HashMap::new();
        let first = mux.wait(Duration::from_millis(1), &no_writes).await;
        assert_eq!(first.len(), 1);
        let second = mux.wait(Duration::from_millis(1), &no_writes).await;
        assert!(second.is_empty());
    }

    #[test]
    fn type_of_reflects_registration() {
        let mut mux = MockMultiplexer::new();
        mux.add(5, DescriptorKind::Listener);
        assert_eq!(mux.type_of(5), Some(DescriptorKind::Listener));
        mux.remove(5);
        assert_eq!(mux.type_of(5), None);
    }

    #[tokio::test]
    async fn writable_probe_only_fires_for_descriptors_with_pending_bytes() {
        let mut mux = TokioMultiplexer::new();
        let mut listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (accepted, _) = listener.accept().await.unwrap();
        let _client_side = client.await.unwrap();

        mux.add_stream(7, DescriptorKind::Client, accepted);
        let mut pending = HashMap::new();
        pending.insert(7, b"hello".to_vec());

        let events = mux.wait(Duration::from_millis(200), &pending).await;
        assert!(events.iter().any(|e| matches!(e.readiness, Readiness::Writable(n) if n > 0)));
    }

    use tokio::net::TcpListener;
}
