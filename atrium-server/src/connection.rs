//! Per-connection handling
//!
//! One task per viewer connection: register it, reconcile it to the tab it
//! now watches, then dispatch its commands in arrival order. Outgoing
//! traffic (responses, scoped events, broadcasts) all flows through the
//! connection's registry channel so ordering is preserved.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use atrium_protocol::{ErrorCode, ServerCodec, ServerMessage};
use atrium_utils::Result;

use crate::handlers::{register_tab, HandlerContext, HandlerResult};
use crate::sync::build_sync;
use crate::SharedState;

/// Outgoing queue depth per connection
const CLIENT_QUEUE_DEPTH: usize = 256;

/// Drive one viewer connection to completion
pub async fn handle_client<S>(stream: S, state: SharedState)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, ServerCodec::new());

    let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
    let client_id = state.registry.register_client(tx);
    let ctx = state.handler_for(client_id);
    info!("Client {} connected", client_id);

    // A connection always watches a tab: make sure one exists, bind, and
    // reconcile the viewer to its current state
    match ensure_initial_tab(&ctx).await {
        Ok(tab_id) => {
            state.registry.bind(client_id, tab_id);
            let tabs = state.tabs.read().await;
            state
                .registry
                .try_send_to_client(client_id, ServerMessage::TabsUpdate { tabs: tabs.list() });
            if let Some(handle) = tabs.get(tab_id) {
                state
                    .registry
                    .try_send_to_client(client_id, build_sync(handle));
            }
        }
        Err(e) => {
            error!("Refusing connection, no tab available: {}", e);
            let _ = framed
                .send(ServerMessage::Error {
                    code: ErrorCode::RuntimeSpawnFailed,
                    message: e.to_string(),
                })
                .await;
            state.registry.unregister_client(client_id);
            return;
        }
    }

    let mut shutdown_rx = state.subscribe_shutdown();

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(msg) => {
                    if let Err(e) = framed.send(msg).await {
                        debug!("Send to client {} failed: {}", client_id, e);
                        break;
                    }
                }
                None => break,
            },
            frame = framed.next() => match frame {
                Some(Ok(msg)) => {
                    // Commands from one connection dispatch in arrival order
                    match ctx.route_message(msg).await {
                        HandlerResult::Response(resp) => {
                            state.registry.try_send_to_client(client_id, resp);
                        }
                        HandlerResult::NoResponse => {}
                    }
                }
                Some(Err(e)) if e.is_recoverable() => {
                    // Malformed frame: drop it, keep the connection
                    warn!("Client {} sent a malformed frame: {}", client_id, e);
                }
                Some(Err(e)) => {
                    warn!("Client {} codec error: {}", client_id, e);
                    break;
                }
                None => break,
            },
            _ = shutdown_rx.recv() => {
                debug!("Shutdown: closing connection {}", client_id);
                break;
            }
        }
    }

    state.registry.unregister_client(client_id);
    info!("Client {} disconnected", client_id);
}

/// Return the first tab, creating one if the registry is empty
///
/// The registry must never be empty while a connection exists. The runtime
/// is constructed outside the write lock; if another connection won the
/// race to create the first tab meanwhile, the extra runtime is disposed.
async fn ensure_initial_tab(ctx: &HandlerContext) -> Result<Uuid> {
    {
        let tabs = ctx.tabs.read().await;
        if let Some(first) = tabs.first() {
            return Ok(first);
        }
    }

    let spawn = ctx.factory.spawn(Arc::clone(&ctx.ui), None)?;
    let mut tabs = ctx.tabs.write().await;
    if let Some(first) = tabs.first() {
        spawn.runtime.dispose();
        return Ok(first);
    }
    Ok(register_tab(&mut tabs, &ctx.registry, spawn, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::MockRuntimeFactory;
    use crate::storage::SessionStore;
    use atrium_protocol::{ClientCodec, ClientMessage};
    use bytes::BufMut;
    use tokio::io::AsyncWriteExt;

    fn test_state() -> (SharedState, Arc<MockRuntimeFactory>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let factory = Arc::new(MockRuntimeFactory::new());
        let state = SharedState::new(
            Arc::clone(&factory) as _,
            SessionStore::new(dir.path().to_path_buf()),
            50,
        );
        (state, factory, dir)
    }

    #[tokio::test]
    async fn test_connect_creates_tab_and_syncs() {
        let (state, _factory, _dir) = test_state();
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);

        let conn_state = state.clone();
        let task = tokio::spawn(async move {
            handle_client(server_side, conn_state).await;
        });

        let mut client = Framed::new(client_side, ClientCodec::new());

        // First tab is created for the first viewer, then reconciled
        match client.next().await.unwrap().unwrap() {
            ServerMessage::TabsUpdate { tabs } => {
                assert_eq!(tabs.len(), 1);
                assert_eq!(tabs[0].name, "Session 1");
            }
            other => panic!("Expected TabsUpdate, got {:?}", other),
        }
        let tab_id = match client.next().await.unwrap().unwrap() {
            ServerMessage::StateSync { tab_id, .. } => tab_id,
            other => panic!("Expected StateSync, got {:?}", other),
        };
        assert_eq!(state.tabs.read().await.first(), Some(tab_id));

        // Ping round-trips through the dispatcher
        client.send(ClientMessage::Ping).await.unwrap();
        assert_eq!(client.next().await.unwrap().unwrap(), ServerMessage::Pong);

        // Disconnect cleans up the binding table entry
        drop(client);
        task.await.unwrap();
        assert_eq!(state.registry.client_count(), 0);
    }

    #[tokio::test]
    async fn test_second_connection_reuses_first_tab() {
        let (state, _factory, _dir) = test_state();

        let (client1, server1) = tokio::io::duplex(64 * 1024);
        let (client2, server2) = tokio::io::duplex(64 * 1024);
        let s1 = state.clone();
        let s2 = state.clone();
        tokio::spawn(async move { handle_client(server1, s1).await });

        let mut viewer1 = Framed::new(client1, ClientCodec::new());
        viewer1.next().await.unwrap().unwrap(); // TabsUpdate
        viewer1.next().await.unwrap().unwrap(); // StateSync

        tokio::spawn(async move { handle_client(server2, s2).await });
        let mut viewer2 = Framed::new(client2, ClientCodec::new());
        viewer2.next().await.unwrap().unwrap();
        viewer2.next().await.unwrap().unwrap();

        // Still a single tab, two watchers
        let tabs = state.tabs.read().await;
        assert_eq!(tabs.len(), 1);
        assert_eq!(state.registry.watcher_count(tabs.first().unwrap()), 2);
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection_open() {
        let (state, _factory, _dir) = test_state();
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);

        tokio::spawn(async move { handle_client(server_side, state).await });

        let (read_half, mut write_half) = tokio::io::split(client_side);

        // A well-delimited frame full of garbage
        let mut frame = bytes::BytesMut::new();
        frame.put_u32(4);
        frame.put_slice(&[0xff, 0xff, 0xff, 0xff]);
        write_half.write_all(&frame).await.unwrap();

        // Followed by a valid Ping
        let mut codec = ClientCodec::new();
        let mut buf = bytes::BytesMut::new();
        use tokio_util::codec::Encoder;
        codec.encode(ClientMessage::Ping, &mut buf).unwrap();
        write_half.write_all(&buf).await.unwrap();

        // The connection survived the garbage: initial messages, then Pong
        let mut client = tokio_util::codec::FramedRead::new(read_half, ClientCodec::new());
        assert!(matches!(
            client.next().await.unwrap().unwrap(),
            ServerMessage::TabsUpdate { .. }
        ));
        assert!(matches!(
            client.next().await.unwrap().unwrap(),
            ServerMessage::StateSync { .. }
        ));
        assert_eq!(client.next().await.unwrap().unwrap(), ServerMessage::Pong);
    }

    #[tokio::test]
    async fn test_connect_refused_when_first_tab_cannot_spawn() {
        let (state, factory, _dir) = test_state();
        factory.set_fail(true);

        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let conn_state = state.clone();
        let task = tokio::spawn(async move { handle_client(server_side, conn_state).await });

        let mut client = Framed::new(client_side, ClientCodec::new());
        match client.next().await.unwrap().unwrap() {
            ServerMessage::Error { code, .. } => {
                assert_eq!(code, ErrorCode::RuntimeSpawnFailed);
            }
            other => panic!("Expected Error, got {:?}", other),
        }

        task.await.unwrap();
        assert_eq!(state.registry.client_count(), 0);
        assert!(state.tabs.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_events_scoped_per_connection_binding() {
        let (state, factory, _dir) = test_state();

        let (client1, server1) = tokio::io::duplex(64 * 1024);
        let (client2, server2) = tokio::io::duplex(64 * 1024);
        let s1 = state.clone();
        let s2 = state.clone();
        tokio::spawn(async move { handle_client(server1, s1).await });

        let mut viewer1 = Framed::new(client1, ClientCodec::new());
        viewer1.next().await.unwrap().unwrap(); // TabsUpdate
        viewer1.next().await.unwrap().unwrap(); // StateSync

        tokio::spawn(async move { handle_client(server2, s2).await });
        let mut viewer2 = Framed::new(client2, ClientCodec::new());
        viewer2.next().await.unwrap().unwrap();
        viewer2.next().await.unwrap().unwrap();

        // Viewer 2 opens a second tab and is rebound to it
        viewer2.send(ClientMessage::NewSession).await.unwrap();
        loop {
            match viewer2.next().await.unwrap().unwrap() {
                ServerMessage::StateSync { .. } => break,
                ServerMessage::TabsUpdate { .. } => continue,
                other => panic!("Unexpected message {:?}", other),
            }
        }
        // Viewer 1 sees the tab list change too
        assert!(matches!(
            viewer1.next().await.unwrap().unwrap(),
            ServerMessage::TabsUpdate { .. }
        ));

        // The second tab's runtime emits an event
        let second_runtime = factory.last_spawned().unwrap();
        second_runtime.emit(atrium_protocol::RuntimeEvent::TextDelta {
            text: "tab two only".into(),
        });

        // Viewer 2 (bound to tab two) receives it
        match viewer2.next().await.unwrap().unwrap() {
            ServerMessage::Event { event, .. } => {
                assert_eq!(
                    event,
                    atrium_protocol::RuntimeEvent::TextDelta {
                        text: "tab two only".into()
                    }
                );
            }
            other => panic!("Expected Event, got {:?}", other),
        }

        // Viewer 1 (bound to tab one) must not: prove it by round-tripping
        // a Ping and seeing Pong arrive next, not the event
        viewer1.send(ClientMessage::Ping).await.unwrap();
        assert_eq!(viewer1.next().await.unwrap().unwrap(), ServerMessage::Pong);
    }
}
