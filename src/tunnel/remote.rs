//! Remote relay
//!
//! Per connection: control handshake, SOCKS5 negotiation on the decoded
//! stream, outbound dial, success reply, then relay until both sides close.

use super::{RelayOptions, TunnelError};
use crate::obfuscation::Codec;
use crate::protocol::{accept_handshake, ProtocolError};
use crate::proxy::{negotiate, send_success};
use crate::sudoku::Catalog;
use crate::transport::{
    dial, relay, sink, source, NoProtection, RelaySummary, SocketProtector, TrafficStats,
};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

pub struct RemoteRelay {
    catalog: Arc<Catalog>,
    options: RelayOptions,
    stats: Arc<TrafficStats>,
    protector: Arc<dyn SocketProtector>,
    conn_semaphore: Semaphore,
}

impl RemoteRelay {
    /// At most `max_connections` tunnels are served at once
    pub fn new(catalog: Arc<Catalog>, options: RelayOptions, max_connections: usize) -> Self {
        Self {
            catalog,
            options,
            stats: Arc::new(TrafficStats::new()),
            protector: Arc::new(NoProtection),
            conn_semaphore: Semaphore::new(max_connections),
        }
    }

    /// Hook applied to every outbound socket before it connects
    pub fn with_protector(mut self, protector: Arc<dyn SocketProtector>) -> Self {
        self.protector = protector;
        self
    }

    pub fn with_stats(mut self, stats: Arc<TrafficStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<TrafficStats> {
        &self.stats
    }

    /// Accept tunnel connections until the listener fails permanently
    pub async fn run_on(self: Arc<Self>, listener: TcpListener) -> Result<(), TunnelError> {
        info!("Remote relay listening on {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("New tunnel connection from {}", peer_addr);

                    let relay = Arc::clone(&self);
                    tokio::spawn(async move {
                        match relay.handle_connection(stream).await {
                            Ok(summary) => debug!(
                                "Tunnel from {} closed ({} bytes up, {} bytes down)",
                                peer_addr, summary.upstream, summary.downstream
                            ),
                            Err(e) => debug!("Tunnel from {} failed: {}", peer_addr, e),
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    /// Serve one tunnel connection
    pub async fn handle_connection(
        &self,
        mut stream: TcpStream,
    ) -> Result<RelaySummary, TunnelError> {
        let _permit = self
            .conn_semaphore
            .acquire()
            .await
            .map_err(|_| TunnelError::Shutdown)?;

        stream.set_nodelay(true)?;
        let transport = &self.options.transport;

        let (_, code) =
            tokio::time::timeout(transport.handshake_timeout(), accept_handshake(&mut stream))
                .await
                .map_err(|_| ProtocolError::Timeout)??;

        let codec = Codec::new(Arc::clone(&self.catalog), code);
        let directions = self.options.directions;
        let policy = self.options.on_ambiguous;

        let (client_rd, client_wr) = stream.into_split();
        let mut client_source = source(client_rd, directions.upstream.then_some(&codec), policy);
        let mut client_sink = sink(client_wr, directions.downstream.then_some(&codec));

        let address = tokio::time::timeout(
            transport.handshake_timeout(),
            negotiate(client_source.as_mut(), client_sink.as_mut()),
        )
        .await
        .map_err(|_| TunnelError::NegotiationTimeout)??;

        let target_addr = address.resolve(transport.connect_timeout()).await?;
        let target = dial(target_addr, transport, Arc::clone(&self.protector)).await?;
        debug!("Connected to {} ({})", address, target_addr);

        send_success(client_sink.as_mut()).await?;

        let (target_rd, target_wr) = target.into_split();
        let summary = relay(
            (client_source, sink(target_wr, None)),
            (source(target_rd, None, policy), client_sink),
            Arc::clone(&self.stats),
            transport.idle_timeout(),
        )
        .await?;

        Ok(summary)
    }
}
