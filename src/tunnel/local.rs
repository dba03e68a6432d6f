//! Local relay
//!
//! Accepts connections from the client application, opens one connection
//! to the remote relay per client, performs the control handshake and then
//! relays. The SOCKS5 exchange itself travels inside the tunnel and is
//! answered by the remote relay.

use super::{RelayOptions, TunnelError};
use crate::obfuscation::{Codec, ObfuscationCode};
use crate::protocol::{
    initiate_handshake, ProtocolError, Request, DEFAULT_DECOY_DOMAIN, DEFAULT_DECOY_PORT,
};
use crate::sudoku::Catalog;
use crate::transport::{
    dial, relay, resolve, sink, source, NoProtection, RelaySummary, SocketProtector,
    TrafficStats,
};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

pub struct LocalRelay {
    server: String,
    code: ObfuscationCode,
    decoy_domains: Vec<String>,
    decoy_port: u16,
    catalog: Arc<Catalog>,
    options: RelayOptions,
    stats: Arc<TrafficStats>,
    protector: Arc<dyn SocketProtector>,
}

impl LocalRelay {
    /// Create a relay forwarding to the remote relay at `server` (`host:port`)
    pub fn new(
        server: impl Into<String>,
        catalog: Arc<Catalog>,
        code: ObfuscationCode,
        options: RelayOptions,
    ) -> Self {
        Self {
            server: server.into(),
            code,
            decoy_domains: vec![DEFAULT_DECOY_DOMAIN.to_string()],
            decoy_port: DEFAULT_DECOY_PORT,
            catalog,
            options,
            stats: Arc::new(TrafficStats::new()),
            protector: Arc::new(NoProtection),
        }
    }

    /// Decoy domains to pick from per connection; an empty list keeps the default
    pub fn with_decoys(mut self, domains: Vec<String>, port: u16) -> Self {
        if !domains.is_empty() {
            self.decoy_domains = domains;
        }
        self.decoy_port = port;
        self
    }

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

    fn request(&self) -> Result<Request, ProtocolError> {
        let decoy = self
            .decoy_domains
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_DECOY_DOMAIN);
        Request::new(self.code, decoy, self.decoy_port)
    }

    /// Accept client connections until the listener fails permanently
    pub async fn run_on(self: Arc<Self>, listener: TcpListener) -> Result<(), TunnelError> {
        info!(
            "Local relay listening on {}, forwarding to {}",
            listener.local_addr()?,
            self.server
        );

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("New client connection from {}", peer_addr);

                    let relay = Arc::clone(&self);
                    tokio::spawn(async move {
                        match relay.handle_connection(stream).await {
                            Ok(summary) => debug!(
                                "Connection from {} closed ({} bytes up, {} bytes down)",
                                peer_addr, summary.upstream, summary.downstream
                            ),
                            Err(e) => debug!("Connection from {} failed: {}", peer_addr, e),
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    /// Tunnel one client connection to the remote relay
    pub async fn handle_connection(&self, client: TcpStream) -> Result<RelaySummary, TunnelError> {
        client.set_nodelay(true)?;

        let transport = &self.options.transport;
        let server_addr = resolve(self.server.as_str(), transport.connect_timeout()).await?;
        let mut remote = dial(server_addr, transport, Arc::clone(&self.protector)).await?;

        let request = self.request()?;
        let code = tokio::time::timeout(
            transport.handshake_timeout(),
            initiate_handshake(&mut remote, &request),
        )
        .await
        .map_err(|_| ProtocolError::Timeout)??;
        debug!("Handshake with {} complete, code {:?}", server_addr, code);

        let codec = Codec::new(Arc::clone(&self.catalog), code);
        let directions = self.options.directions;
        let policy = self.options.on_ambiguous;

        let (client_rd, client_wr) = client.into_split();
        let (remote_rd, remote_wr) = remote.into_split();

        let summary = relay(
            (
                source(client_rd, None, policy),
                sink(remote_wr, directions.upstream.then_some(&codec)),
            ),
            (
                source(remote_rd, directions.downstream.then_some(&codec), policy),
                sink(client_wr, None),
            ),
            Arc::clone(&self.stats),
            transport.idle_timeout(),
        )
        .await?;

        Ok(summary)
    }
}
