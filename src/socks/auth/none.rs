//! No-authentication method

use super::Authenticator;
use crate::error::SocksError;
use crate::socks::command::ResponseWriter;
use crate::socks::consts::SOCKS5_AUTH_METHOD_NONE;
use crate::socks::types::Identity;
use async_trait::async_trait;

/// Accepts every client without a sub-negotiation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl Authenticator for NoAuth {
    fn method(&self) -> u8 {
        SOCKS5_AUTH_METHOD_NONE
    }

    async fn authenticate(&self, _rw: &mut ResponseWriter) -> Result<Identity, SocksError> {
        Ok(Identity::anonymous())
    }
}
