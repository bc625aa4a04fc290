//! Broker session supervisor.
//!
//! Waits for the link, resolves and dials the broker, secures the stream,
//! and runs the module runtime over it. Whatever ends a session, the
//! supervisor logs it, waits [`RECONNECT_DELAY`] and starts over.

use core::future::Future;

use embassy_futures::select::{Either, select};
use embassy_net::Stack;
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_time::{Duration, Timer};

use crate::client::{MqttClient, MqttOptions};
use crate::config::{BrokerConfig, BrokerEndpoint, Scheme, UriError};
use crate::error::{ConnectReasonCode, MqttError, ProtocolError};
use crate::runtime::{MqttModule, MqttRuntime, PublishRequestReceiver};
use crate::transport::{MqttTransport, StreamTransport, TcpTransport};
use crate::wifi::LinkState;

/// Pause between a failed or dropped session and the next attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// TCP socket buffer size, each direction.
pub const SOCKET_BUFFER_SIZE: usize = 1024;
/// MQTT packet buffer size, each direction.
pub const MQTT_BUFFER_SIZE: usize = 1024;
/// Subscriptions tracked per session.
pub const MAX_TOPICS: usize = 4;

/// Receive timeout used when keep-alive is disabled.
const IDLE_RECEIVE_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    /// The broker URI could not be parsed.
    Uri(UriError),
    /// The URI scheme does not match the channel (`mqtts://` needs TLS, `mqtt://` must not use it).
    SchemeMismatch,
    Dns,
    NoAddress,
    Connect,
    Tls,
    /// The broker answered CONNECT with a non-zero return code.
    Refused(ConnectReasonCode),
    Protocol(ProtocolError),
    /// The stream to the broker failed, closed or went silent.
    Transport,
    /// A broker packet did not fit the client buffers.
    BufferTooSmall,
    /// The station lost its association while the session was up.
    LinkLost,
}

impl SessionError {
    pub fn describe(&self) -> &'static str {
        match self {
            SessionError::Uri(_) => "invalid broker uri",
            SessionError::SchemeMismatch => "uri scheme does not match channel",
            SessionError::Dns => "dns lookup failed",
            SessionError::NoAddress => "broker host has no address",
            SessionError::Connect => "tcp connect failed",
            SessionError::Tls => "tls handshake failed",
            SessionError::Refused(_) => "connection refused by broker",
            SessionError::Protocol(p) => p.describe(),
            SessionError::Transport => "transport error",
            SessionError::BufferTooSmall => "buffer too small",
            SessionError::LinkLost => "wifi link lost",
        }
    }
}

impl From<UriError> for SessionError {
    fn from(err: UriError) -> Self {
        SessionError::Uri(err)
    }
}

impl<T> From<MqttError<T>> for SessionError {
    fn from(err: MqttError<T>) -> Self {
        match err {
            MqttError::ConnectionRefused(code) => SessionError::Refused(code),
            MqttError::Protocol(p) => SessionError::Protocol(p),
            MqttError::BufferTooSmall => SessionError::BufferTooSmall,
            // The client only reports NotConnected after its transport failed.
            MqttError::Transport(_) | MqttError::Timeout | MqttError::NotConnected => {
                SessionError::Transport
            }
        }
    }
}

/// What a [`SecureChannel`] needs to know about the peer.
#[derive(Debug, Clone, Copy)]
pub struct ChannelParams<'p> {
    /// Broker host name, used for SNI.
    pub host: &'p str,
    /// DER certificate the broker must chain to.
    pub trust_anchor: Option<&'static [u8]>,
    pub receive_timeout: Duration,
}

/// Turns a connected TCP socket into an MQTT transport.
#[allow(async_fn_in_trait)]
pub trait SecureChannel {
    /// Whether the channel encrypts; must match the URI scheme.
    const SECURE: bool;

    type Transport<'s>: MqttTransport
    where
        Self: 's;

    async fn establish<'s>(
        &'s mut self,
        socket: TcpSocket<'s>,
        params: ChannelParams<'_>,
    ) -> Result<Self::Transport<'s>, SessionError>;
}

/// Plain TCP, for `mqtt://` brokers.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainChannel;

impl SecureChannel for PlainChannel {
    const SECURE: bool = false;

    type Transport<'s> = TcpTransport<'s>;

    async fn establish<'s>(
        &'s mut self,
        socket: TcpSocket<'s>,
        params: ChannelParams<'_>,
    ) -> Result<Self::Transport<'s>, SessionError> {
        Ok(StreamTransport::new(socket, params.receive_timeout))
    }
}

/// Resolves the broker endpoint and checks it against the channel kind.
pub fn resolve_endpoint(
    broker: &BrokerConfig,
    secure: bool,
) -> Result<BrokerEndpoint<'static>, SessionError> {
    let endpoint = broker.endpoint()?;
    if (endpoint.scheme == Scheme::Mqtts) != secure {
        return Err(SessionError::SchemeMismatch);
    }
    Ok(endpoint)
}

/// Transport receive timeout for a keep-alive interval: twice the interval,
/// so the client's own PINGREQ always gets a chance first.
pub fn receive_timeout(keep_alive_secs: u16) -> Duration {
    if keep_alive_secs == 0 {
        IDLE_RECEIVE_TIMEOUT
    } else {
        Duration::from_secs(keep_alive_secs as u64 * 2)
    }
}

/// Client options for a broker configuration.
pub fn mqtt_options(broker: &BrokerConfig) -> MqttOptions<'static> {
    let options = MqttOptions::new(broker.client_id)
        .with_keep_alive(Duration::from_secs(broker.keep_alive_secs as u64));
    match broker.username {
        Some(username) => options.with_credentials(username, broker.password),
        None => options,
    }
}

/// Runs broker sessions forever.
///
/// ```ignore
/// static LINK: LinkState = LinkState::new();
/// static PUBLISH_CHANNEL: PublishRequestChannel<'static, 4> = Channel::new();
///
/// #[embassy_executor::task]
/// async fn mqtt_task(stack: Stack<'static>) {
///     let mut module = InventoryModule::from_config(&config::APP);
///     run_session(
///         stack,
///         &LINK,
///         &config::BROKER,
///         &mut PlainChannel,
///         &mut module,
///         PUBLISH_CHANNEL.receiver(),
///     )
///     .await
/// }
/// ```
pub async fn run_session<C, M, const OUTBOX_DEPTH: usize>(
    stack: Stack<'_>,
    link: &LinkState,
    broker: &BrokerConfig,
    channel: &mut C,
    module: &mut M,
    requests: PublishRequestReceiver<'_, OUTBOX_DEPTH>,
) where
    C: SecureChannel,
    M: MqttModule + ?Sized,
{
    loop {
        link.wait_up().await;
        let session = connect_and_run(stack, broker, channel, &mut *module, requests);
        match while_linked(link, session).await {
            Ok(()) => info!("session closed"),
            Err(SessionError::Refused(code)) => {
                warn!("broker refused the session: {}", code.describe());
            }
            Err(e) => warn!("session ended: {}", e.describe()),
        }
        Timer::after(RECONNECT_DELAY).await;
    }
}

/// Runs `session` until it ends or the link goes down, whichever comes first.
pub async fn while_linked<F>(link: &LinkState, session: F) -> Result<(), SessionError>
where
    F: Future<Output = Result<(), SessionError>>,
{
    match select(session, link.wait_down()).await {
        Either::First(result) => result,
        Either::Second(()) => Err(SessionError::LinkLost),
    }
}

async fn connect_and_run<C, M, const OUTBOX_DEPTH: usize>(
    stack: Stack<'_>,
    broker: &BrokerConfig,
    channel: &mut C,
    module: M,
    requests: PublishRequestReceiver<'_, OUTBOX_DEPTH>,
) -> Result<(), SessionError>
where
    C: SecureChannel,
    M: MqttModule,
{
    let endpoint = resolve_endpoint(broker, C::SECURE)?;

    let addresses = stack
        .dns_query(endpoint.host, DnsQueryType::A)
        .await
        .map_err(|_| SessionError::Dns)?;
    let address = *addresses.first().ok_or(SessionError::NoAddress)?;
    info!("connecting to {} port {}", endpoint.host, endpoint.port);

    let mut rx_buffer = [0u8; SOCKET_BUFFER_SIZE];
    let mut tx_buffer = [0u8; SOCKET_BUFFER_SIZE];
    let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
    socket
        .connect((address, endpoint.port))
        .await
        .map_err(|_| SessionError::Connect)?;
    debug!("tcp connected");

    let params = ChannelParams {
        host: endpoint.host,
        trust_anchor: broker.trust_anchor,
        receive_timeout: receive_timeout(broker.keep_alive_secs),
    };
    let transport = channel.establish(socket, params).await?;

    let client = MqttClient::<_, MAX_TOPICS, MQTT_BUFFER_SIZE>::new(transport, mqtt_options(broker));
    let mut runtime = MqttRuntime::new(client, module, requests);
    runtime.run().await.map_err(SessionError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::{block_on, yield_now};

    fn broker(uri: &'static str) -> BrokerConfig {
        BrokerConfig {
            uri,
            port: None,
            client_id: "node",
            username: None,
            password: None,
            trust_anchor: None,
            keep_alive_secs: 120,
        }
    }

    #[test]
    fn scheme_must_match_channel() {
        assert_eq!(
            resolve_endpoint(&broker("mqtts://broker"), true).unwrap().port,
            8883
        );
        assert_eq!(
            resolve_endpoint(&broker("mqtt://broker"), false).unwrap().port,
            1883
        );
        assert_eq!(
            resolve_endpoint(&broker("mqtts://broker"), false),
            Err(SessionError::SchemeMismatch)
        );
        assert_eq!(
            resolve_endpoint(&broker("mqtt://broker"), true),
            Err(SessionError::SchemeMismatch)
        );
        assert_eq!(
            resolve_endpoint(&broker("ws://broker"), true),
            Err(SessionError::Uri(UriError::UnsupportedScheme))
        );
    }

    #[test]
    fn receive_timeout_outlasts_keep_alive() {
        assert_eq!(receive_timeout(60), Duration::from_secs(120));
        assert_eq!(receive_timeout(0), IDLE_RECEIVE_TIMEOUT);
    }

    #[test]
    fn options_carry_credentials() {
        let mut config = broker("mqtts://broker");
        assert_eq!(mqtt_options(&config).keep_alive(), Duration::from_secs(120));

        config.username = Some("user");
        config.password = Some("pw");
        let options = mqtt_options(&config);
        assert_eq!(options.client_id(), "node");
    }

    #[test]
    fn mqtt_errors_stay_distinguishable() {
        let refused: SessionError =
            MqttError::<()>::ConnectionRefused(ConnectReasonCode::BadUserNameOrPassword).into();
        assert_eq!(
            refused,
            SessionError::Refused(ConnectReasonCode::BadUserNameOrPassword)
        );
        assert_eq!(refused.describe(), "connection refused by broker");

        let dropped: SessionError = MqttError::Transport(()).into();
        assert_eq!(dropped, SessionError::Transport);

        let malformed: SessionError = MqttError::<()>::Protocol(ProtocolError::MalformedPacket).into();
        assert_eq!(malformed, SessionError::Protocol(ProtocolError::MalformedPacket));
        assert_eq!(malformed.describe(), "malformed packet");
    }

    #[test]
    fn link_loss_cuts_the_session_short() {
        static LINK: LinkState = LinkState::new();
        LINK.set_up(true);

        let outcome = block_on(async {
            let drop_link = async {
                yield_now().await;
                LINK.set_up(false);
                core::future::pending::<()>().await
            };
            let session = core::future::pending::<Result<(), SessionError>>();
            match select(while_linked(&LINK, session), drop_link).await {
                Either::First(result) => result,
                Either::Second(()) => unreachable!(),
            }
        });
        assert_eq!(outcome, Err(SessionError::LinkLost));
    }

    #[test]
    fn finished_session_passes_its_result_through() {
        static LINK: LinkState = LinkState::new();
        LINK.set_up(true);

        let outcome = block_on(while_linked(&LINK, async { Err(SessionError::Tls) }));
        assert_eq!(outcome, Err(SessionError::Tls));
        let outcome = block_on(while_linked(&LINK, async { Ok(()) }));
        assert_eq!(outcome, Ok(()));
    }
}
