//! Connected UDP datagram channel with preallocated ring-buffered I/O.
//!
//! Mirrors the reference `UDPConnection`: a socket connected to exactly one
//! peer, a fixed-size input ring and output ring, and a single
//! [`DatagramChannel::process_io`] entry point that performs one
//! non-blocking pass of reads and/or writes.

use crate::constants::{RING_BUFFER_LEN, VOICE_PACKET_MAX};
use crate::ring::RingBuffer;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;

#[derive(Debug, Error)]
pub enum DatagramError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not connected to a peer")]
    NotConnected,
}

/// Which direction(s) of I/O a single [`DatagramChannel::process_io`] call
/// should attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IoMode {
    Read,
    Write,
    Both,
}

/// A UDP socket connected to a single peer, with ring-buffered input and
/// output so the hot path never allocates per-packet.
pub struct DatagramChannel {
    socket: Option<UdpSocket>,
    input: RingBuffer,
    output: RingBuffer,
    scratch: [u8; VOICE_PACKET_MAX],
}

impl DatagramChannel {
    pub fn new() -> Self {
        Self {
            socket: None,
            input: RingBuffer::new(RING_BUFFER_LEN),
            output: RingBuffer::new(RING_BUFFER_LEN),
            scratch: [0u8; VOICE_PACKET_MAX],
        }
    }

    /// Binds an ephemeral local socket and connects it to `peer`, so that
    /// subsequent sends/receives don't need to carry an address.
    pub async fn connect(&mut self, peer: SocketAddr) -> Result<(), DatagramError> {
        let local: SocketAddr = if peer.is_ipv6() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        self.socket = Some(socket);
        self.input.clear();
        self.output.clear();
        Ok(())
    }

    pub fn connected(&self) -> bool {
        self.socket.is_some()
    }

    pub fn disconnect(&mut self) {
        self.socket = None;
        self.input.clear();
        self.output.clear();
    }

    /// Queues `packet` for sending on the next write pass.
    pub fn write_data(&mut self, packet: &[u8]) -> bool {
        self.output.push(packet)
    }

    /// A view of whatever unread bytes have been received so far.
    pub fn input_view(&self) -> Vec<u8> {
        self.input.pop_view()
    }

    /// Marks `n` bytes of the input view as consumed.
    pub fn consume_input(&mut self, n: usize) {
        self.input.consume(n);
    }

    /// One non-blocking pass of reads and/or writes against the connected
    /// peer. Drains the entire output ring per call; reads at most one
    /// datagram into the input ring.
    pub async fn process_io(&mut self, mode: IoMode) -> Result<(), DatagramError> {
        let socket = self.socket.as_ref().ok_or(DatagramError::NotConnected)?;

        if matches!(mode, IoMode::Write | IoMode::Both) {
            while !self.output.is_empty() {
                let view = self.output.pop_view();
                match socket.try_send(&view) {
                    Ok(n) => self.output.consume(n),
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if matches!(mode, IoMode::Read | IoMode::Both) {
            match socket.try_recv(&mut self.scratch) {
                Ok(n) => {
                    self.input.push(&self.scratch[..n]);
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {},
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Blocks until at least one of read/write readiness fires, then
    /// performs a [`DatagramChannel::process_io`] pass. Used by the
    /// session's background receive loop instead of busy-polling.
    pub async fn readable(&self) -> Result<(), DatagramError> {
        let socket = self.socket.as_ref().ok_or(DatagramError::NotConnected)?;
        socket.readable().await?;
        Ok(())
    }
}

impl Default for DatagramChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_data_queues_into_output_ring() {
        let mut chan = DatagramChannel::new();
        assert!(chan.write_data(b"hello"));
    }

    #[test]
    fn disconnect_clears_buffered_state() {
        let mut chan = DatagramChannel::new();
        chan.write_data(b"hello");
        chan.disconnect();
        assert!(!chan.connected());
    }
}
