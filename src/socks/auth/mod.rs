//! SOCKS5 authentication module
//!
//! Authentication is pluggable per method byte. An [`AuthRegistry`] holds one
//! [`Authenticator`] per method; during negotiation the first method in the
//! client's list that has a registered handler wins.

mod none;
mod password;

pub use none::NoAuth;
pub use password::{Credentials, DynamicUserPass, StaticUserPass};

use super::command::{read_methods, ResponseWriter};
use super::types::Identity;
use crate::error::SocksError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Authentication capability for a single method byte
///
/// The server has already acknowledged the method with `[0x05, method]`
/// when [`authenticate`](Authenticator::authenticate) runs; the
/// implementation owns any sub-negotiation after that.
#[async_trait]
pub trait Authenticator: Send + Sync + Debug {
    /// Method byte this authenticator answers to
    fn method(&self) -> u8;

    /// Run the method's sub-negotiation on the control stream
    async fn authenticate(&self, rw: &mut ResponseWriter) -> Result<Identity, SocksError>;
}

/// Registered authenticators keyed by method byte
#[derive(Debug, Clone, Default)]
pub struct AuthRegistry {
    handlers: HashMap<u8, Arc<dyn Authenticator>>,
}

impl AuthRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticator, replacing any previous one for its method
    pub fn register(&mut self, auth: Arc<dyn Authenticator>) -> Option<Arc<dyn Authenticator>> {
        self.handlers.insert(auth.method(), auth)
    }

    /// Builder form of [`register`](Self::register)
    pub fn with<A: Authenticator + 'static>(mut self, auth: A) -> Self {
        self.register(Arc::new(auth));
        self
    }

    /// Look up the handler for a method byte
    pub fn get(&self, method: u8) -> Option<&Arc<dyn Authenticator>> {
        self.handlers.get(&method)
    }

    /// Whether no authenticator is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// First offered method that has a handler, in the client's order
    pub fn select(&self, offered: &[u8]) -> Option<Arc<dyn Authenticator>> {
        offered
            .iter()
            .find_map(|method| self.handlers.get(method).cloned())
    }

    /// Read the offered methods, pick one and run it
    ///
    /// When nothing matches, `[0x05, 0xFF]` is sent and no further bytes are
    /// read from the stream.
    pub async fn negotiate(&self, rw: &mut ResponseWriter) -> Result<Identity, SocksError> {
        let offered = read_methods(rw.stream_mut()).await?;

        let auth = match self.select(&offered) {
            Some(auth) => auth,
            None => {
                debug!("No acceptable auth method in {:?}", offered);
                rw.send_no_acceptable_auth().await?;
                return Err(SocksError::NoAcceptableMethod);
            }
        };

        debug!("Selected auth method {:#04x}", auth.method());
        rw.send_method(auth.method()).await?;
        auth.authenticate(rw).await
    }
}
