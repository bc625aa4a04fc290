//! Byte transports the client runs over.
//!
//! [`MqttTransport`] is all the client needs: send a buffer, receive into a
//! buffer. [`StreamTransport`] implements it for any `embedded-io-async`
//! stream, which covers both a bare TCP socket and a TLS connection.

use embassy_net::tcp::TcpSocket;
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};

/// Transport error type for codec-only code paths that never touch a stream.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorPlaceHolder;

/// An ordered, reliable byte channel to the broker.
#[allow(async_fn_in_trait)]
pub trait MqttTransport {
    type Error: TransportError;

    /// Writes all of `buf`.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Reads at least one byte into `buf` and returns how many.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Marks types usable as [`MqttTransport::Error`].
pub trait TransportError: core::fmt::Debug {}

impl TransportError for ErrorPlaceHolder {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamError<E> {
    /// The stream itself failed.
    Io(E),
    /// The peer closed the connection.
    Closed,
    /// Nothing arrived within the receive timeout.
    Timeout,
}

impl<E: core::fmt::Debug> TransportError for StreamError<E> {}

/// [`MqttTransport`] over an async byte stream, with a receive timeout.
pub struct StreamTransport<S> {
    stream: S,
    timeout: Duration,
}

/// Plain TCP transport.
pub type TcpTransport<'a> = StreamTransport<TcpSocket<'a>>;

impl<S> StreamTransport<S>
where
    S: Read + Write,
{
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self { stream, timeout }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    async fn read_with_timeout(&mut self, buf: &mut [u8]) -> Result<usize, StreamError<S::Error>> {
        let read = self.stream.read(buf);
        let deadline = Timer::after(self.timeout);

        match futures::future::select(core::pin::pin!(read), core::pin::pin!(deadline)).await {
            futures::future::Either::Left((Ok(0), _)) => {
                debug!("stream closed by peer");
                Err(StreamError::Closed)
            }
            futures::future::Either::Left((Ok(n), _)) => {
                trace!("stream read: {} bytes", n);
                Ok(n)
            }
            futures::future::Either::Left((Err(e), _)) => {
                debug!("stream read error");
                Err(StreamError::Io(e))
            }
            futures::future::Either::Right(((), _)) => {
                debug!("stream read timeout");
                Err(StreamError::Timeout)
            }
        }
    }
}

impl<S> MqttTransport for StreamTransport<S>
where
    S: Read + Write,
{
    type Error = StreamError<S::Error>;

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        trace!("stream write: {} bytes", buf.len());
        self.stream.write_all(buf).await.map_err(StreamError::Io)?;
        self.stream.flush().await.map_err(StreamError::Io)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.read_with_timeout(buf).await
    }
}
