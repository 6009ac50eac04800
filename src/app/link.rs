//! Link manager: drives local-network connect attempts.
//!
//! Holds the current [`Credentials`] and wraps a [`LinkDriver`].  Every
//! attempt starts from a clean slate (disconnect, then connect) so no
//! association from a previous network survives a credential change.

use log::{info, warn};

use super::credentials::Credentials;
use super::ports::LinkDriver;
use crate::error::LinkError;

pub struct LinkManager<L: LinkDriver> {
    driver: L,
    credentials: Option<Credentials>,
    /// Attempts since credentials were last set.
    attempts: u32,
    in_flight: bool,
    initial_timeout_ms: u32,
    retry_timeout_ms: u32,
}

impl<L: LinkDriver> LinkManager<L> {
    pub fn new(driver: L, initial_timeout_ms: u32, retry_timeout_ms: u32) -> Self {
        Self {
            driver,
            credentials: None,
            attempts: 0,
            in_flight: false,
            initial_timeout_ms,
            retry_timeout_ms,
        }
    }

    /// Replace the current credentials wholesale.  The next attempt uses
    /// the long initial timeout again.
    pub fn set_credentials(&mut self, credentials: Option<Credentials>) {
        self.credentials = credentials;
        self.attempts = 0;
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Timeout the next attempt will use.
    pub fn next_timeout_ms(&self) -> u32 {
        if self.attempts == 0 {
            self.initial_timeout_ms
        } else {
            self.retry_timeout_ms
        }
    }

    /// One bounded connect attempt with the current credentials.
    pub fn connect(&mut self) -> Result<(), LinkError> {
        if self.in_flight {
            return Err(LinkError::Busy);
        }
        let Some(creds) = self.credentials.as_ref() else {
            return Err(LinkError::NoCredentials);
        };

        let timeout_ms = self.next_timeout_ms();
        self.attempts = self.attempts.saturating_add(1);
        self.in_flight = true;

        info!(
            "Link: connecting to '{}' (attempt {}, timeout {} ms)",
            creds.network_name(),
            self.attempts,
            timeout_ms
        );
        self.driver.disconnect();
        let ok = self
            .driver
            .connect(creds.network_name(), creds.secret(), timeout_ms);
        self.in_flight = false;

        if ok {
            info!(
                "Link: up ip={} rssi={}",
                self.driver.local_ip(),
                self.driver.rssi()
            );
            Ok(())
        } else {
            warn!("Link: {}", LinkError::Timeout);
            Err(LinkError::Timeout)
        }
    }

    pub fn is_up(&self) -> bool {
        self.driver.is_connected()
    }

    pub fn disconnect(&mut self) {
        self.driver.disconnect();
    }

    pub fn local_ip(&self) -> String {
        self.driver.local_ip()
    }

    pub fn rssi(&self) -> i32 {
        self.driver.rssi()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn driver(&self) -> &L {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut L {
        &mut self.driver
    }
}
