//! UDP echo diagnostics over the P2P link.
//!
//! The group owner runs the *server*: every datagram it receives is sent
//! straight back to its sender.  The client runs the *client*: it sends
//! `count` stamped datagrams, one per `interval`, and waits up to
//! `recv_timeout` for each reply to measure the round-trip time.
//!
//! # Task model
//!
//! A session is one Tokio task that owns its `UdpSocket`; the socket is
//! closed when the task ends, however it ends.  [`EchoController::stop`]
//! raises the session's stop flag and waits up to `stop_grace` for the task
//! to notice.  The loops never block longer than `recv_timeout` between two
//! looks at the flag, so with `stop_grace >= recv_timeout` the abort
//! fallback is only reached if something is badly wrong.
//!
//! # Stale replies (for beginners)
//!
//! UDP gives no ordering guarantee.  A reply to packet 4 that arrives after
//! packet 4 already timed out would otherwise be counted as the reply to
//! packet 5.  The client decodes the sequence number of every reply and
//! discards any that do not match the packet it is waiting for.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use p2p_core::{EchoHeader, EchoStats};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::ports::{EchoError, EchoService};

/// Largest datagram the loops will read: an Ethernet MTU minus IPv4 and
/// UDP headers.  Larger payloads would be truncated on receive.
pub const MAX_DATAGRAM: usize = 1472;

/// Granularity at which the inter-packet sleep checks the stop flag.
const STOP_POLL: Duration = Duration::from_millis(100);

/// Parameters of an echo session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoSettings {
    pub port: u16,
    pub packet_size: usize,
    pub interval: Duration,
    /// Datagrams per client session; 0 runs until stopped.
    pub count: u32,
    pub recv_timeout: Duration,
    pub stop_grace: Duration,
}

impl Default for EchoSettings {
    fn default() -> Self {
        Self {
            port: 5001,
            packet_size: 64,
            interval: Duration::from_millis(1000),
            count: 10,
            recv_timeout: Duration::from_millis(2000),
            stop_grace: Duration::from_millis(2500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EchoRole {
    Server,
    Client,
}

struct RunningSession {
    id: Uuid,
    role: EchoRole,
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// State shared between the controller and a loop task.
#[derive(Clone)]
struct LoopContext {
    id: Uuid,
    settings: EchoSettings,
    stats: Arc<Mutex<EchoStats>>,
    stop: Arc<AtomicBool>,
    epoch: Instant,
}

impl LoopContext {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn record(&self, f: impl FnOnce(&mut EchoStats)) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn snapshot(&self) -> EchoStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs at most one echo session (server or client) at a time.
pub struct EchoController {
    settings: EchoSettings,
    stats: Arc<Mutex<EchoStats>>,
    session: Mutex<Option<RunningSession>>,
    epoch: Instant,
}

impl EchoController {
    pub fn new(settings: EchoSettings) -> Self {
        Self {
            settings,
            stats: Arc::new(Mutex::new(EchoStats::new())),
            session: Mutex::new(None),
            epoch: Instant::now(),
        }
    }

    pub fn settings(&self) -> &EchoSettings {
        &self.settings
    }

    /// Address the running session's socket is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_session()
            .as_ref()
            .filter(|s| !s.handle.is_finished())
            .map(|s| s.local_addr)
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<RunningSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_idle(&self) -> Result<(), EchoError> {
        match self.lock_session().as_ref() {
            Some(s) if !s.handle.is_finished() => Err(EchoError::AlreadyRunning),
            _ => Ok(()),
        }
    }

    async fn bind(addr: SocketAddr) -> Result<UdpSocket, EchoError> {
        UdpSocket::bind(addr)
            .await
            .map_err(|source| EchoError::Bind { addr, source })
    }

    /// Spawns the loop for `role` on `socket` and records the session.
    fn launch<F, Fut>(&self, role: EchoRole, socket: UdpSocket, body: F) -> Result<(), EchoError>
    where
        F: FnOnce(UdpSocket, LoopContext) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.lock_session();
        if matches!(slot.as_ref(), Some(s) if !s.handle.is_finished()) {
            return Err(EchoError::AlreadyRunning);
        }

        let local_addr = socket
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();

        let ctx = LoopContext {
            id: Uuid::new_v4(),
            settings: self.settings.clone(),
            stats: Arc::clone(&self.stats),
            stop: Arc::new(AtomicBool::new(false)),
            epoch: self.epoch,
        };
        let id = ctx.id;
        let stop = Arc::clone(&ctx.stop);
        let handle = tokio::spawn(body(socket, ctx));

        *slot = Some(RunningSession {
            id,
            role,
            local_addr,
            stop,
            handle,
        });
        Ok(())
    }
}

#[async_trait]
impl EchoService for EchoController {
    async fn start_server(&self) -> Result<(), EchoError> {
        self.ensure_idle()?;
        let addr = SocketAddr::from(([0, 0, 0, 0], self.settings.port));
        let socket = Self::bind(addr).await?;
        info!("UDP echo server listening on {addr}");
        self.launch(EchoRole::Server, socket, server_loop)
    }

    async fn start_client(&self, target: Ipv4Addr) -> Result<(), EchoError> {
        self.ensure_idle()?;
        let socket = Self::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await?;
        let target = SocketAddr::V4(SocketAddrV4::new(target, self.settings.port));
        info!(
            "UDP echo client: target {target}, {} bytes, interval {} ms, count {}",
            self.settings.packet_size,
            self.settings.interval.as_millis(),
            self.settings.count
        );
        self.launch(EchoRole::Client, socket, move |socket, ctx| {
            client_loop(socket, target, ctx)
        })
    }

    async fn stop(&self) -> Option<EchoStats> {
        let session = self.lock_session().take()?;
        let RunningSession {
            id,
            role,
            stop,
            mut handle,
            ..
        } = session;

        stop.store(true, Ordering::Relaxed);
        if time::timeout(self.settings.stop_grace, &mut handle)
            .await
            .is_err()
        {
            warn!(
                "echo session {id} did not stop within {} ms; aborting",
                self.settings.stop_grace.as_millis()
            );
            handle.abort();
            // Wait for the cancelled task to drop its socket.
            if let Err(e) = handle.await {
                debug!("echo session {id} ended after abort: {e}");
            }
        }

        info!("UDP echo {role:?} stopped");
        Some(self.stats())
    }

    fn stats(&self) -> EchoStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.lock_session()
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }
}

// ── Loops ─────────────────────────────────────────────────────────────────────

async fn server_loop(socket: UdpSocket, ctx: LoopContext) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    debug!("echo session {} (server) started", ctx.id);

    while !ctx.stopped() {
        let (len, src) = match time::timeout(ctx.settings.recv_timeout, socket.recv_from(&mut buf)).await {
            Err(_) => continue,
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) if is_timeout_error(&e) => continue,
            Ok(Err(e)) => {
                warn!("echo server recv error: {e}");
                continue;
            }
        };

        ctx.record(|s| s.record_inbound(len as u32));
        match socket.send_to(&buf[..len], src).await {
            Ok(sent) => {
                ctx.record(|s| s.record_echoed(sent as u32));
                debug!("echoed {sent} bytes to {src}");
            }
            Err(e) => warn!("failed to echo {len} bytes to {src}: {e}"),
        }
    }

    info!("{}", ctx.snapshot());
    debug!("echo session {} (server) ended", ctx.id);
}

async fn client_loop(socket: UdpSocket, target: SocketAddr, ctx: LoopContext) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let count = ctx.settings.count;
    let mut seq: u32 = 0;
    debug!("echo session {} (client) started", ctx.id);

    while !ctx.stopped() && (count == 0 || seq < count) {
        let timestamp_ms = i64::try_from(ctx.epoch.elapsed().as_millis()).unwrap_or(i64::MAX);
        let packet = EchoHeader::new(seq, timestamp_ms).encode(ctx.settings.packet_size);

        let sent_at = Instant::now();
        match socket.send_to(&packet, target).await {
            Ok(sent) => match await_reply(&socket, &mut buf, seq, &ctx).await {
                Some(len) => {
                    let rtt_us = u32::try_from(sent_at.elapsed().as_micros()).unwrap_or(u32::MAX);
                    ctx.record(|s| s.record_reply(rtt_us, sent as u32, len as u32));
                    info!("seq={seq} rtt={}.{:03} ms", rtt_us / 1000, rtt_us % 1000);
                }
                None => {
                    ctx.record(|s| s.record_loss(sent as u32));
                    info!("seq={seq} timeout");
                }
            },
            Err(e) => {
                warn!("send failed for seq={seq}: {e}");
                ctx.record(|s| s.record_loss(0));
            }
        }

        seq = seq.wrapping_add(1);
        if count != 0 && seq >= count {
            break;
        }
        sleep_unless_stopped(ctx.settings.interval, &ctx).await;
    }

    info!("{}", ctx.snapshot());
    debug!("echo session {} (client) ended", ctx.id);
}

/// Waits for the reply carrying `seq`, discarding anything else, until
/// `recv_timeout` has elapsed since the call.
async fn await_reply(
    socket: &UdpSocket,
    buf: &mut [u8],
    seq: u32,
    ctx: &LoopContext,
) -> Option<usize> {
    let deadline = Instant::now() + ctx.settings.recv_timeout;
    loop {
        let len = match time::timeout_at(deadline, socket.recv_from(buf)).await {
            Err(_) => return None,
            Ok(Ok((len, _src))) => len,
            Ok(Err(e)) if is_timeout_error(&e) => continue,
            Ok(Err(e)) => {
                warn!("echo client recv error: {e}");
                return None;
            }
        };

        match EchoHeader::decode(&buf[..len]) {
            Ok(header) if header.seq == seq => return Some(len),
            Ok(header) => debug!("discarding stale reply seq={} (waiting for {seq})", header.seq),
            Err(e) => debug!("discarding undecodable reply: {e}"),
        }
    }
}

async fn sleep_unless_stopped(total: Duration, ctx: &LoopContext) {
    let deadline = Instant::now() + total;
    while !ctx.stopped() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        time::sleep((deadline - now).min(STOP_POLL)).await;
    }
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_settings(port: u16) -> EchoSettings {
        EchoSettings {
            port,
            packet_size: 64,
            interval: Duration::from_millis(10),
            count: 3,
            recv_timeout: Duration::from_millis(200),
            stop_grace: Duration::from_millis(500),
        }
    }

    /// Loopback peer that answers each datagram through `reply`.
    async fn fake_server<F>(reply: F) -> (u16, JoinHandle<()>)
    where
        F: Fn(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM];
            while let Ok((len, src)) = socket.recv_from(&mut buf).await {
                for datagram in reply(&buf[..len]) {
                    let _ = socket.send_to(&datagram, src).await;
                }
            }
        });
        (port, handle)
    }

    async fn wait_until_idle(echo: &EchoController) {
        for _ in 0..200 {
            if !echo.is_running() {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!("echo session did not finish");
    }

    #[test]
    fn test_is_timeout_error_recognises_timed_out() {
        // Arrange
        let e = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");

        // Act / Assert
        assert!(is_timeout_error(&e));
    }

    #[test]
    fn test_is_timeout_error_returns_false_for_other_errors() {
        let e = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(!is_timeout_error(&e));
    }

    #[tokio::test]
    async fn test_server_echoes_exact_payload_and_counts() {
        // Arrange
        let echo = EchoController::new(fast_settings(0));
        echo.start_server().await.unwrap();
        let port = echo.local_addr().unwrap().port();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let payload = EchoHeader::new(7, 1234).encode(48);

        // Act
        peer.send_to(&payload, ("127.0.0.1", port)).await.unwrap();
        let mut buf = [0u8; 128];
        let (len, _) = time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();

        // Assert
        assert_eq!(&buf[..len], payload.as_slice());
        let stats = echo.stop().await.unwrap();
        assert_eq!(stats.packets_received, 1);
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.bytes_received, 48);
        assert_eq!(stats.bytes_sent, 48);
        assert!(!echo.is_running());
    }

    #[tokio::test]
    async fn test_client_counts_replies_from_echoing_peer() {
        // Arrange
        let (port, server) = fake_server(|data| vec![data.to_vec()]).await;
        let echo = EchoController::new(fast_settings(port));

        // Act
        echo.start_client(Ipv4Addr::LOCALHOST).await.unwrap();
        wait_until_idle(&echo).await;

        // Assert
        let stats = echo.stats();
        assert_eq!(stats.packets_sent, 3);
        assert_eq!(stats.packets_received, 3);
        assert_eq!(stats.packets_lost, 0);
        assert_eq!(stats.bytes_sent, 3 * 64);
        assert!(stats.rtt_min_us <= stats.rtt_avg_us && stats.rtt_avg_us <= stats.rtt_max_us);
        server.abort();
    }

    #[tokio::test]
    async fn test_client_records_loss_when_peer_is_silent() {
        let (port, server) = fake_server(|_| Vec::new()).await;
        let mut settings = fast_settings(port);
        settings.count = 2;
        settings.recv_timeout = Duration::from_millis(50);
        let echo = EchoController::new(settings);

        echo.start_client(Ipv4Addr::LOCALHOST).await.unwrap();
        wait_until_idle(&echo).await;

        let stats = echo.stats();
        assert_eq!(stats.packets_sent, 2);
        assert_eq!(stats.packets_lost, 2);
        assert_eq!(stats.loss_percent(), Some(100));
        assert!(!stats.has_rtt());
        server.abort();
    }

    #[tokio::test]
    async fn test_client_discards_stale_reply() {
        // Arrange: every reply is preceded by one for an unrelated sequence number.
        let (port, server) = fake_server(|data| {
            let stale = EchoHeader::new(9_999, 0).encode(data.len());
            vec![stale, data.to_vec()]
        })
        .await;
        let mut settings = fast_settings(port);
        settings.count = 2;
        let echo = EchoController::new(settings);

        // Act
        echo.start_client(Ipv4Addr::LOCALHOST).await.unwrap();
        wait_until_idle(&echo).await;

        // Assert
        let stats = echo.stats();
        assert_eq!(stats.packets_received, 2);
        assert_eq!(stats.packets_lost, 0);
        server.abort();
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_running() {
        let echo = EchoController::new(fast_settings(0));
        echo.start_server().await.unwrap();

        let err = echo.start_client(Ipv4Addr::LOCALHOST).await.unwrap_err();

        assert!(matches!(err, EchoError::AlreadyRunning));
        echo.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let echo = EchoController::new(EchoSettings::default());
        assert!(echo.stop().await.is_none());
        assert!(!echo.is_running());
    }

    #[tokio::test]
    async fn test_stop_unbounded_client_within_grace() {
        // Arrange
        let (port, server) = fake_server(|data| vec![data.to_vec()]).await;
        let mut settings = fast_settings(port);
        settings.count = 0;
        let echo = EchoController::new(settings);
        echo.start_client(Ipv4Addr::LOCALHOST).await.unwrap();
        time::sleep(Duration::from_millis(100)).await;

        // Act
        let started = Instant::now();
        let stats = echo.stop().await.unwrap();

        // Assert
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(stats.packets_sent >= 1);
        assert!(!echo.is_running());
        server.abort();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let echo = EchoController::new(fast_settings(port));

        let err = echo.start_server().await.unwrap_err();

        assert!(matches!(err, EchoError::Bind { .. }));
        assert!(!echo.is_running());
    }
}
