//! TLS 1.3 channel for `mqtts://` brokers, built on `embedded-tls`.
//!
//! The board supplies the random number generator and the certificate
//! verifier. The verifier receives the broker host name and the trust anchor
//! on every handshake.

use core::marker::PhantomData;

use embassy_net::tcp::TcpSocket;
use embedded_tls::{
    Aes128GcmSha256, Certificate, TlsConfig, TlsConnection, TlsContext, TlsVerifier,
};
use rand_core::{CryptoRng, RngCore};

use crate::session::{ChannelParams, SecureChannel, SessionError};
use crate::transport::StreamTransport;

/// Size of one TLS record buffer. A full 16 KiB record plus overhead.
pub const TLS_RECORD_SIZE: usize = 16640;

/// Transport produced by [`TlsChannel`].
pub type TlsTransport<'s> = StreamTransport<TlsConnection<'s, TcpSocket<'s>, Aes128GcmSha256>>;

/// Handshake settings derived from the peer.
#[derive(Debug, Clone)]
pub struct TlsSettings<'a> {
    /// Sent as SNI and checked against the broker certificate.
    pub server_name: &'a str,
    pub ca: Option<Certificate<'a>>,
}

impl<'a> TlsSettings<'a> {
    pub fn from_params(params: &ChannelParams<'a>) -> Self {
        Self {
            server_name: params.host,
            ca: params.trust_anchor.map(Certificate::X509),
        }
    }

    pub fn config(&self) -> TlsConfig<'a, Aes128GcmSha256> {
        let config = TlsConfig::new().with_server_name(self.server_name);
        match &self.ca {
            Some(ca) => config.with_ca(ca.clone()),
            None => config,
        }
    }
}

/// Wraps each new TCP connection in a TLS session.
///
/// `V` checks the broker certificate. `embedded_tls::NoVerify` skips the
/// check and is only fit for a trusted network.
///
/// ```ignore
/// static READ_RECORD: StaticCell<[u8; TLS_RECORD_SIZE]> = StaticCell::new();
/// static WRITE_RECORD: StaticCell<[u8; TLS_RECORD_SIZE]> = StaticCell::new();
///
/// let mut channel = TlsChannel::<_, _, BoardVerifier>::new(
///     READ_RECORD.init([0; TLS_RECORD_SIZE]),
///     WRITE_RECORD.init([0; TLS_RECORD_SIZE]),
///     board_rng,
/// );
/// ```
pub struct TlsChannel<'b, R, V> {
    read_record: &'b mut [u8],
    write_record: &'b mut [u8],
    rng: R,
    _verifier: PhantomData<fn() -> V>,
}

impl<'b, R, V> TlsChannel<'b, R, V>
where
    R: CryptoRng + RngCore,
    V: for<'v> TlsVerifier<'v, Aes128GcmSha256>,
{
    pub fn new(read_record: &'b mut [u8], write_record: &'b mut [u8], rng: R) -> Self {
        Self {
            read_record,
            write_record,
            rng,
            _verifier: PhantomData,
        }
    }
}

impl<'b, R, V> SecureChannel for TlsChannel<'b, R, V>
where
    R: CryptoRng + RngCore,
    V: for<'v> TlsVerifier<'v, Aes128GcmSha256>,
{
    const SECURE: bool = true;

    type Transport<'s>
        = TlsTransport<'s>
    where
        Self: 's;

    async fn establish<'s>(
        &'s mut self,
        socket: TcpSocket<'s>,
        params: ChannelParams<'_>,
    ) -> Result<Self::Transport<'s>, SessionError> {
        let settings = TlsSettings::from_params(&params);
        if settings.ca.is_none() {
            warn!("no trust anchor configured, relying on the verifier alone");
        }
        let config = settings.config();

        let mut tls = TlsConnection::new(socket, &mut *self.read_record, &mut *self.write_record);
        tls.open::<R, V>(TlsContext::new(&config, &mut self.rng))
            .await
            .map_err(|_| SessionError::Tls)?;
        info!("tls session established with {}", params.host);

        Ok(StreamTransport::new(tls, params.receive_timeout))
    }
}
