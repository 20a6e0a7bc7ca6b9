use std::time::{Duration, Instant};

use log::debug;

use skein_shared::{Connection, ConnectionConfig, HostType, PacketIndex};

use crate::{LocalTransport, TestReferenceCache};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

/// A server and a client connection wired together through in-memory
/// transports. Nothing moves until the test delivers it.
pub struct ConnectionPair {
    pub server: Connection<LocalTransport>,
    pub client: Connection<LocalTransport>,
    pub server_refs: TestReferenceCache,
    pub client_refs: TestReferenceCache,
    pub now: Instant,
}

impl ConnectionPair {
    pub fn new(config: ConnectionConfig) -> Self {
        let server = Connection::new(HostType::Server, config.clone(), LocalTransport::new())
            .expect("server config should be valid");
        let client = Connection::new(HostType::Client, config, LocalTransport::new())
            .expect("client config should be valid");
        Self {
            server,
            client,
            server_refs: TestReferenceCache::new(),
            client_refs: TestReferenceCache::new(),
            now: Instant::now(),
        }
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Delivers every packet `from` has sent, acking or naking each one back
    pub fn deliver(&mut self, from: Side) -> usize {
        self.deliver_with(from, |_| true)
    }

    /// Like `deliver`, but packets for which `keep` returns false are lost
    /// and reported back as naks
    pub fn deliver_with(&mut self, from: Side, mut keep: impl FnMut(PacketIndex) -> bool) -> usize {
        let now = self.now;
        let (sender, receiver, refs) = match from {
            Side::Client => (&mut self.client, &mut self.server, &mut self.server_refs),
            Side::Server => (&mut self.server, &mut self.client, &mut self.client_refs),
        };
        sender.flush();

        let packets = sender.transport_mut().take_sent();
        let mut delivered = 0;
        for (index, data) in packets {
            if !keep(index) {
                debug!("{from:?}: dropping packet {index}");
                let _ = sender.on_nak(now, index);
                continue;
            }
            match receiver.receive_packet(now, index, &data, &mut *refs) {
                Ok(receipt) if receipt.should_ack => sender.on_ack(index),
                Ok(_) => {
                    let _ = sender.on_nak(now, index);
                }
                Err(err) => debug!("{from:?}: packet {index} ended the connection: {err}"),
            }
            delivered += 1;
        }
        delivered
    }

    /// Ticks both ends and delivers in both directions a few times, long
    /// enough for resends and queued messages to settle
    pub fn exchange(&mut self) {
        for _ in 0..4 {
            let _ = self.server.tick(self.now, &mut self.server_refs);
            let _ = self.client.tick(self.now, &mut self.client_refs);
            self.deliver(Side::Client);
            self.deliver(Side::Server);
        }
    }
}
