//! Listener & accept path (spec.md §4.H): turns a ready listening
//! descriptor into a registered client. Grounded on the multiplexer's
//! `TokioMultiplexer` (a listening socket is just another descriptor the
//! reactor polls) and on [`crate::iohook::IoHookRegistry`] for the
//! per-port interception step.

use crate::iohook::IoHookRegistry;
use crate::multiplexer::{Descriptor, DescriptorKind, TokioMultiplexer};
use crate::server::Server;
use crate::user::User;
use tokio::net::{TcpListener, TcpStream};

/// One bound port, holding the accept socket and the name of the I/O hook
/// (if any) bound to it (spec.md §4.K).
pub struct Listener {
    pub descriptor: Descriptor,
    pub listener: TcpListener,
    pub io_hook: Option<String>,
}

impl Listener {
    pub async fn bind(descriptor: Descriptor, address: &str, port: u16, io_hook: Option<String>) -> std::io::Result<Listener> {
        let listener = TcpListener::bind((address, port)).await?;
        Ok(Listener { descriptor, listener, io_hook })
    }
}

/// Runs the accept path for one ready listener (spec.md §4.H): accept,
/// consult the bound I/O hook, register the stream with the multiplexer,
/// and add a user record. Any failure along the way closes the new
/// descriptor (by dropping it) and counts as a refusal.
pub async fn accept_one(
    server: &mut Server,
    mux: &mut TokioMultiplexer,
    io_hooks: &mut IoHookRegistry,
    listener: &mut Listener,
    next_fd: &mut crate::user::Fd,
) {
    let (stream, peer_addr) = match listener.listener.accept().await {
        Ok(pair) => pair,
        Err(_) => {
            server.stats.refused_connections += 1;
            return;
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        log::warn!("failed to set TCP_NODELAY on accepted socket: {}", e);
    }

    if let Some(hook_name) = &listener.io_hook {
        if let Some(hook) = io_hooks.get_mut(hook_name) {
            let fd = *next_fd;
            if let Err(e) = hook.on_raw_socket_accept(fd, &peer_addr.to_string()) {
                log::info!("io hook {} rejected connection from {}: {}", hook_name, peer_addr, e);
                server.stats.refused_connections += 1;
                return; // `stream` is dropped here, closing the descriptor.
            }
        }
    }

    let fd = *next_fd;
    *next_fd += 1;

    register_accepted(server, mux, fd, stream, peer_addr.ip().to_string());
}

fn register_accepted(server: &mut Server, mux: &mut TokioMultiplexer, fd: crate::user::Fd, stream: TcpStream, peer_ip: String) {
    mux.add_stream(fd, DescriptorKind::Client, stream);
    let user = User::new(fd, peer_ip, server.domain.clone(), crate::util::now(), 512);
    server.users.add(user);
    server.stats.total_connections += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_and_accept_registers_a_user() {
        let mut server = Server::new(crate::server::tests_support::minimal_config());
        let mut mux = TokioMultiplexer::new();
        let mut listener = Listener::bind(0, "127.0.0.1", 0, None).await.unwrap();
        let local_addr = listener.listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            TcpStream::connect(local_addr).await.unwrap()
        });

        let mut io_hooks = IoHookRegistry::new();
        let mut next_fd: crate::user::Fd = 5;
        accept_one(&mut server, &mut mux, &mut io_hooks, &mut listener, &mut next_fd).await;
        client.await.unwrap();

        assert_eq!(next_fd, 6);
        assert!(server.users.find_by_fd(5).is_some());
        assert_eq!(server.stats.total_connections, 1);
    }
}
