use crate::{CqlError, CqlResult};
use secstr::SecUtf8;

/// Produces the SASL handshake bytes when a server demands authentication.
pub trait AuthenticationProvider: Send + Sync + std::fmt::Debug {
    /// The initial response for the authenticator class the server
    /// announced in AUTHENTICATE.
    fn initial_response(&self, authenticator: &str) -> CqlResult<Vec<u8>>;

    /// The response to a subsequent AUTH_CHALLENGE token.
    fn evaluate_challenge(&self, challenge: &[u8]) -> CqlResult<Vec<u8>>;
}

/// SASL PLAIN, as spoken by `PasswordAuthenticator` and its Scylla
/// counterpart.
#[derive(Debug)]
pub struct PlainAuthenticationProvider {
    username: String,
    password: SecUtf8,
}

impl PlainAuthenticationProvider {
    /// Creates a provider for the given credentials.
    pub fn new(username: String, password: String) -> Self {
        Self {
            username,
            password: SecUtf8::from(password),
        }
    }
}

impl AuthenticationProvider for PlainAuthenticationProvider {
    fn initial_response(&self, authenticator: &str) -> CqlResult<Vec<u8>> {
        debug!("responding to authenticator {authenticator}");
        let mut token = Vec::with_capacity(
            2 + self.username.len() + self.password.unsecure().len(),
        );
        token.push(0);
        token.extend_from_slice(self.username.as_bytes());
        token.push(0);
        token.extend_from_slice(self.password.unsecure().as_bytes());
        Ok(token)
    }

    fn evaluate_challenge(&self, _challenge: &[u8]) -> CqlResult<Vec<u8>> {
        Err(CqlError::Auth(
            "PLAIN authentication expects no challenge".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthenticationProvider, PlainAuthenticationProvider};

    #[test]
    fn plain_token_layout() {
        let provider = PlainAuthenticationProvider::new("jo".to_string(), "pw".to_string());
        let token = provider
            .initial_response("org.apache.cassandra.auth.PasswordAuthenticator")
            .unwrap();
        assert_eq!(token, b"\0jo\0pw");
        assert!(provider.evaluate_challenge(b"x").is_err());
    }
}
