//! Wireless station supervisor.
//!
//! The radio itself is board specific and sits behind [`StationDriver`]. The
//! supervisor keeps the station associated forever and publishes link
//! readiness through a [`LinkState`] the session task waits on.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::select::{Either, select};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::config::WifiConfig;

/// A station-mode radio.
#[allow(async_fn_in_trait)]
pub trait StationDriver {
    type Error: core::fmt::Debug;

    /// Configures and starts the radio.
    async fn start(&mut self, config: &WifiConfig) -> Result<(), Self::Error>;

    /// Associates with the configured access point.
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Resolves once the station has lost its association.
    async fn wait_for_disconnect(&mut self);
}

/// Something that reports when the interface has an address.
#[allow(async_fn_in_trait)]
pub trait AddressSource {
    async fn wait_for_address(&self);
}

impl AddressSource for embassy_net::Stack<'_> {
    async fn wait_for_address(&self) {
        self.wait_config_up().await;
    }
}

/// Link readiness shared between the station and session tasks.
pub struct LinkState {
    up: AtomicBool,
    changed: Signal<CriticalSectionRawMutex, ()>,
}

impl LinkState {
    pub const fn new() -> Self {
        Self {
            up: AtomicBool::new(false),
            changed: Signal::new(),
        }
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::Release);
        self.changed.signal(());
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    /// Waits until the link is up. Returns at once if it already is.
    pub async fn wait_up(&self) {
        self.wait_for(true).await
    }

    /// Waits until the link is down. Returns at once if it already is.
    pub async fn wait_down(&self) {
        self.wait_for(false).await
    }

    async fn wait_for(&self, up: bool) {
        while self.is_up() != up {
            self.changed.wait().await;
        }
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Station {
    config: WifiConfig,
    attempts: u32,
}

impl Station {
    pub fn new(config: WifiConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Association attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Keeps the station associated. Never returns.
    ///
    /// Failed starts and failed associations are retried immediately; the
    /// task only yields between attempts.
    pub async fn run<D, A>(&mut self, driver: &mut D, address: &A, link: &LinkState)
    where
        D: StationDriver,
        A: AddressSource,
    {
        info!("starting station for {}", self.config.ssid);
        while driver.start(&self.config).await.is_err() {
            warn!("radio start failed, retrying");
            yield_now().await;
        }

        loop {
            self.attempts = self.attempts.wrapping_add(1);
            if driver.connect().await.is_err() {
                info!(".");
                yield_now().await;
                continue;
            }
            info!("associated with {} (attempt {})", self.config.ssid, self.attempts);

            match select(address.wait_for_address(), driver.wait_for_disconnect()).await {
                Either::First(()) => {
                    info!("link up");
                    link.set_up(true);
                    driver.wait_for_disconnect().await;
                    link.set_up(false);
                    warn!("link lost, reconnecting");
                }
                Either::Second(()) => warn!("disconnected before an address was assigned"),
            }
        }
    }
}
