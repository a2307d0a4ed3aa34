//! UDP side channel carrying live CPU time from a wrapper.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Latest CPU time reported by a wrapper, shared with the observer pusher.
#[derive(Debug, Clone)]
pub struct RuntimeReading {
    bits: Arc<AtomicU64>,
}

impl Default for RuntimeReading {
    fn default() -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(f64::NAN.to_bits())),
        }
    }
}

impl RuntimeReading {
    /// The last reported CPU time, if any.
    pub fn get(&self) -> Option<f64> {
        let value = f64::from_bits(self.bits.load(Ordering::Acquire));
        value.is_finite().then_some(value)
    }

    fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

/// UDP listener receiving live CPU time updates from one run.
///
/// Only packets from the loopback address are accepted. Each packet is a
/// decimal number of CPU seconds. Stops listening when dropped.
#[derive(Debug)]
pub struct RuntimeSideChannel {
    port: u16,
    reading: RuntimeReading,
    listener: JoinHandle<()>,
}

impl RuntimeSideChannel {
    /// Listen on an ephemeral loopback port.
    pub async fn bind() -> std::io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await?;
        let port = socket.local_addr()?.port();
        let reading = RuntimeReading::default();
        let listener = tokio::spawn(listen(socket, reading.clone()));

        Ok(Self {
            port,
            reading,
            listener,
        })
    }

    /// Port the wrapper should report to.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Shared handle to the latest reading.
    pub fn reading(&self) -> RuntimeReading {
        self.reading.clone()
    }
}

impl Drop for RuntimeSideChannel {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn listen(socket: UdpSocket, reading: RuntimeReading) {
    let mut buf = [0u8; 256];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(err) => {
                warn!(error = %err, "Runtime side channel receive failed");
                return;
            }
        };

        if !from.ip().is_loopback() {
            warn!(%from, "Ignoring runtime update from non-local address");
            continue;
        }

        match std::str::from_utf8(&buf[..len]).ok().and_then(|s| s.trim().parse::<f64>().ok()) {
            Some(runtime) if runtime.is_finite() => reading.set(runtime),
            _ => debug!(%from, "Ignoring malformed runtime update"),
        }
    }
}
