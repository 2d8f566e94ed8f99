//! Username/password authentication handlers
//!
//! Implements RFC 1929 username/password authentication for SOCKS5, either
//! against one fixed credential pair or through a caller-supplied validator.

use super::Authenticator;
use crate::error::SocksError;
use crate::socks::command::ResponseWriter;
use crate::socks::consts::{SOCKS5_AUTH_METHOD_PASSWORD, SOCKS5_AUTH_VERSION};
use crate::socks::types::Identity;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Credentials presented by a client
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: Vec<u8>,
    password: Vec<u8>,
}

impl Credentials {
    /// Build from raw bytes
    pub fn new(username: impl Into<Vec<u8>>, password: impl Into<Vec<u8>>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read the sub-negotiation request
    ///
    /// # Protocol
    ///
    /// ```text
    /// +----+------+----------+------+----------+
    /// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
    /// +----+------+----------+------+----------+
    /// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
    /// +----+------+----------+------+----------+
    /// ```
    ///
    /// A wrong version is a protocol error and nothing is replied.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, SocksError>
    where
        R: AsyncRead + Unpin,
    {
        let version = reader.read_u8().await?;
        if version != SOCKS5_AUTH_VERSION {
            return Err(SocksError::UnsupportedAuthVersion(version));
        }

        let ulen = reader.read_u8().await? as usize;
        let mut username = vec![0u8; ulen];
        reader.read_exact(&mut username).await?;

        let plen = reader.read_u8().await? as usize;
        let mut password = vec![0u8; plen];
        reader.read_exact(&mut password).await?;

        Ok(Credentials { username, password })
    }

    /// Raw username bytes
    pub fn username(&self) -> &[u8] {
        &self.username
    }

    /// Raw password bytes
    pub fn password(&self) -> &[u8] {
        &self.password
    }

    /// Username as text, lossily decoded
    pub fn username_lossy(&self) -> String {
        String::from_utf8_lossy(&self.username).into_owned()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username_lossy())
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Read credentials, validate them, and send the status reply
async fn run_exchange<F>(rw: &mut ResponseWriter, validate: F) -> Result<Identity, SocksError>
where
    F: FnOnce(&Credentials) -> Option<Identity>,
{
    let creds = Credentials::read_from(rw.stream_mut()).await?;

    match validate(&creds) {
        Some(identity) => {
            rw.send_auth_status(true).await?;
            debug!("Authentication successful for user: {}", creds.username_lossy());
            Ok(identity)
        }
        None => {
            rw.send_auth_status(false).await?;
            debug!("Authentication failed for user: {}", creds.username_lossy());
            Err(SocksError::AuthFailed)
        }
    }
}

/// Username/password check against one fixed pair
///
/// On success the identity carries the username as a `String`.
#[derive(Clone)]
pub struct StaticUserPass {
    expected: Credentials,
}

impl StaticUserPass {
    /// Accept exactly this username and password
    pub fn new(username: impl Into<Vec<u8>>, password: impl Into<Vec<u8>>) -> Self {
        StaticUserPass {
            expected: Credentials::new(username, password),
        }
    }
}

impl fmt::Debug for StaticUserPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticUserPass")
            .field("username", &self.expected.username_lossy())
            .finish()
    }
}

#[async_trait]
impl Authenticator for StaticUserPass {
    fn method(&self) -> u8 {
        SOCKS5_AUTH_METHOD_PASSWORD
    }

    async fn authenticate(&self, rw: &mut ResponseWriter) -> Result<Identity, SocksError> {
        run_exchange(rw, |creds| {
            (creds == &self.expected).then(|| Identity::new(creds.username_lossy()))
        })
        .await
    }
}

/// Validator signature for [`DynamicUserPass`]
pub type Validator = dyn Fn(&Credentials) -> Option<Identity> + Send + Sync;

/// Username/password check through a callback
///
/// The callback returns the identity to attach on success, or `None` to
/// reject. Rejection always sends the failure status before the connection
/// ends.
#[derive(Clone)]
pub struct DynamicUserPass {
    validator: Arc<Validator>,
}

impl DynamicUserPass {
    /// Wrap a validator callback
    pub fn new<F>(validator: F) -> Self
    where
        F: Fn(&Credentials) -> Option<Identity> + Send + Sync + 'static,
    {
        DynamicUserPass {
            validator: Arc::new(validator),
        }
    }
}

impl fmt::Debug for DynamicUserPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DynamicUserPass")
    }
}

#[async_trait]
impl Authenticator for DynamicUserPass {
    fn method(&self) -> u8 {
        SOCKS5_AUTH_METHOD_PASSWORD
    }

    async fn authenticate(&self, rw: &mut ResponseWriter) -> Result<Identity, SocksError> {
        run_exchange(rw, |creds| (*self.validator)(creds)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    fn auth_request(username: &[u8], password: &[u8]) -> Vec<u8> {
        let mut request = vec![SOCKS5_AUTH_VERSION, username.len() as u8];
        request.extend_from_slice(username);
        request.push(password.len() as u8);
        request.extend_from_slice(password);
        request
    }

    async fn run<A: Authenticator>(
        auth: &A,
        input: &[u8],
    ) -> (Result<Identity, SocksError>, DuplexStream) {
        let (server, mut client) = tokio::io::duplex(1024);
        client.write_all(input).await.unwrap();

        let mut rw = ResponseWriter::new(Box::new(server));
        let result = auth.authenticate(&mut rw).await;
        (result, client)
    }

    async fn read_status(client: &mut DuplexStream) -> [u8; 2] {
        let mut status = [0u8; 2];
        client.read_exact(&mut status).await.unwrap();
        status
    }

    #[tokio::test]
    async fn test_read_credentials() {
        let mut cursor = Cursor::new(auth_request(b"alice", b"secret"));
        let creds = Credentials::read_from(&mut cursor).await.unwrap();
        assert_eq!(creds.username(), b"alice");
        assert_eq!(creds.password(), b"secret");
    }

    #[tokio::test]
    async fn test_read_credentials_zero_length() {
        let mut cursor = Cursor::new(auth_request(b"", b""));
        let creds = Credentials::read_from(&mut cursor).await.unwrap();
        assert!(creds.username().is_empty());
        assert!(creds.password().is_empty());
    }

    #[tokio::test]
    async fn test_static_success() {
        let auth = StaticUserPass::new("user", "pass");
        let (result, mut client) = run(&auth, &auth_request(b"user", b"pass")).await;

        let identity = result.unwrap();
        assert_eq!(identity.downcast_ref::<String>().unwrap(), "user");
        assert_eq!(read_status(&mut client).await, [0x01, 0x00]);
    }

    #[tokio::test]
    async fn test_static_wrong_password() {
        let auth = StaticUserPass::new("user", "pass");
        let (result, mut client) = run(&auth, &auth_request(b"user", b"wrong")).await;

        assert!(matches!(result, Err(SocksError::AuthFailed)));
        assert_eq!(read_status(&mut client).await, [0x01, 0x01]);
    }

    #[tokio::test]
    async fn test_static_wrong_username() {
        let auth = StaticUserPass::new("user", "pass");
        let (result, mut client) = run(&auth, &auth_request(b"other", b"pass")).await;

        assert!(matches!(result, Err(SocksError::AuthFailed)));
        assert_eq!(read_status(&mut client).await, [0x01, 0x01]);
    }

    #[tokio::test]
    async fn test_bad_sub_version_sends_nothing() {
        let auth = StaticUserPass::new("user", "pass");
        let mut input = auth_request(b"user", b"pass");
        input[0] = 0x05;

        let (result, client) = run(&auth, &input).await;
        assert!(matches!(result, Err(SocksError::UnsupportedAuthVersion(5))));

        // Server side is gone; the client sees EOF without a status
        let mut client = client;
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_dynamic_identity() {
        #[derive(Debug, PartialEq)]
        struct Account(u32);

        let auth = DynamicUserPass::new(|creds| {
            if creds.username() == b"bob" && creds.password() == b"hunter2" {
                Some(Identity::new(Account(42)))
            } else {
                None
            }
        });

        let (result, mut client) = run(&auth, &auth_request(b"bob", b"hunter2")).await;
        let identity = result.unwrap();
        assert_eq!(identity.downcast_ref::<Account>(), Some(&Account(42)));
        assert_eq!(read_status(&mut client).await, [0x01, 0x00]);

        let (result, mut client) = run(&auth, &auth_request(b"bob", b"nope")).await;
        assert!(matches!(result, Err(SocksError::AuthFailed)));
        assert_eq!(read_status(&mut client).await, [0x01, 0x01]);
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("user", "topsecret");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("user"));
        assert!(!debug.contains("topsecret"));
    }
}
