//! Overview link: forwards pane-registry traffic to the overview collaborator
//! as length-delimited JSON frames over a Unix domain socket.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use futures_util::{SinkExt, StreamExt};
use statespace_core::RegistryMsg;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::net::LinkEvent;
use crate::sync::{BusEvent, SyncBus, Topic};

pub struct OverviewLink {
    pub socket: String,
    pub events: Receiver<LinkEvent>,
    subscription: u64,
    bus: SyncBus,
}

impl OverviewLink {
    /// Stops forwarding; the socket closes once the queue drains.
    pub fn close(self) {
        self.bus.unsubscribe(self.subscription);
    }
}

/// Connects in the background. Connection failures are reported on
/// [`OverviewLink::events`] and logged, never propagated.
pub fn spawn_overview_link(socket: String, bus: &SyncBus) -> OverviewLink {
    let (tx, events) = crossbeam_channel::unbounded();
    let subscription = bus.subscribe(&[Topic::Registry]);
    let subscription_id = subscription.id;
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for event in subscription.rx.iter() {
            if let BusEvent::Registry(msg) = event {
                if out_tx.send(msg).is_err() {
                    break;
                }
            }
        }
    });

    let sock = socket.clone();
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                let _ = tx.send(LinkEvent::error(sock, format!("runtime: {e}")));
                return;
            }
        };
        rt.block_on(async move {
            if let Err(e) = connect(sock.clone(), out_rx, tx.clone()).await {
                tracing::warn!(socket = %sock, error = ?e, "overview link unavailable");
                let _ = tx.send(LinkEvent::error(sock.clone(), format!("{e:?}")));
                let _ = tx.send(LinkEvent::disconnected(sock.clone()));
            }
        });
    });

    OverviewLink {
        socket,
        events,
        subscription: subscription_id,
        bus: bus.clone(),
    }
}

async fn connect(
    socket: String,
    outbound: mpsc::UnboundedReceiver<RegistryMsg>,
    tx: Sender<LinkEvent>,
) -> Result<()> {
    let stream = UnixStream::connect(&socket)
        .await
        .with_context(|| format!("connect UDS {socket}"))?;
    run_link(stream, socket, outbound, tx).await
}

async fn run_link<S>(
    stream: S,
    socket: String,
    mut outbound: mpsc::UnboundedReceiver<RegistryMsg>,
    tx: Sender<LinkEvent>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    let _ = tx.send(LinkEvent::connected(socket.clone()));

    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                framed.send(Bytes::from(serde_json::to_vec(&msg)?)).await?;
            }
            frame = framed.next() => {
                let Some(frame) = frame else { break };
                let bytes = frame?;
                match serde_json::from_slice::<RegistryMsg>(&bytes) {
                    Ok(m) => {
                        let _ = tx.send(LinkEvent::received(socket.clone(), m));
                    }
                    Err(e) => {
                        let _ = tx.send(LinkEvent::error(
                            socket.clone(),
                            format!("decode error: {e}"),
                        ));
                    }
                }
            }
        }
    }

    let _ = tx.send(LinkEvent::disconnected(socket));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::LinkEventKind;
    use statespace_core::PaneId;
    use std::time::Duration;

    async fn next_event(rx: &Receiver<LinkEvent>) -> LinkEvent {
        for _ in 0..200 {
            if let Ok(ev) = rx.try_recv() {
                return ev;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no link event");
    }

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (ours, theirs) = UnixStream::pair().expect("pair");
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (tx, rx) = crossbeam_channel::unbounded();
        let link = tokio::spawn(run_link(ours, "test".to_string(), out_rx, tx));

        let mut peer = Framed::new(theirs, LengthDelimitedCodec::new());
        assert_eq!(next_event(&rx).await.kind, LinkEventKind::Connected);

        out_tx
            .send(RegistryMsg::PaneRemoved {
                id: PaneId::from("pane-2"),
            })
            .expect("queue");
        let frame = peer.next().await.expect("frame").expect("bytes");
        let decoded: RegistryMsg = serde_json::from_slice(&frame).expect("decode");
        assert_eq!(
            decoded,
            RegistryMsg::PaneRemoved {
                id: PaneId::from("pane-2")
            }
        );

        let click = RegistryMsg::ActivePane {
            id: PaneId::from("pane-1"),
        };
        peer.send(Bytes::from(serde_json::to_vec(&click).expect("encode")))
            .await
            .expect("send");
        assert_eq!(next_event(&rx).await.kind, LinkEventKind::Received(click));

        drop(out_tx);
        link.await.expect("join").expect("link");
        assert_eq!(next_event(&rx).await.kind, LinkEventKind::Disconnected);
    }

    #[test]
    fn missing_socket_reports_error() {
        let bus = SyncBus::new();
        let link = spawn_overview_link("/nonexistent/statespace.sock".to_string(), &bus);
        let first = link
            .events
            .recv_timeout(Duration::from_secs(5))
            .expect("event");
        assert!(matches!(first.kind, LinkEventKind::Error(_)));
        link.close();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
