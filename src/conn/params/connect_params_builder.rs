use crate::conn::{AuthenticationProvider, PlainAuthenticationProvider};
use crate::conn::params::connect_params::validate_keyspace_name;
use crate::{ConnectParams, CqlError, CqlResult, ServerCerts, Tls};
use std::sync::Arc;

/// A builder for [`ConnectParams`].
///
/// ```rust
/// use cqlconnect::ConnectParams;
/// let connect_params = ConnectParams::builder()
///     .hostname("db1.example.com")
///     .port(9042)
///     .keyspace("sensor_data")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Debug, Default)]
pub struct ConnectParamsBuilder {
    hostname: Option<String>,
    port: Option<u16>,
    keyspace: Option<String>,
    auth: Option<Arc<dyn AuthenticationProvider>>,
    tls: Tls,
}

impl ConnectParamsBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hostname.
    pub fn hostname<H: Into<String>>(&mut self, hostname: H) -> &mut Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Sets the port; defaults to [`DEFAULT_PORT`](crate::DEFAULT_PORT).
    pub fn port(&mut self, port: u16) -> &mut Self {
        self.port = Some(port);
        self
    }

    /// Sets the keyspace the session starts in.
    pub fn keyspace<K: Into<String>>(&mut self, keyspace: K) -> &mut Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    /// Sets username and password for SASL PLAIN authentication.
    pub fn credentials<U: Into<String>, P: Into<String>>(
        &mut self,
        username: U,
        password: P,
    ) -> &mut Self {
        self.auth = Some(Arc::new(PlainAuthenticationProvider::new(
            username.into(),
            password.into(),
        )));
        self
    }

    /// Sets a custom authentication provider.
    pub fn authentication_provider(
        &mut self,
        provider: Arc<dyn AuthenticationProvider>,
    ) -> &mut Self {
        self.auth = Some(provider);
        self
    }

    /// Activates server-validated TLS with the given certificate source;
    /// can be called repeatedly to add sources.
    pub fn tls_with(&mut self, server_certs: ServerCerts) -> &mut Self {
        match &mut self.tls {
            Tls::Secure(certs) => certs.push(server_certs),
            tls => *tls = Tls::Secure(vec![server_certs]),
        }
        self
    }

    /// Activates TLS without server validation - dangerous!
    pub fn tls_without_server_verification(&mut self) -> &mut Self {
        self.tls = Tls::Insecure;
        self
    }

    /// Builds the `ConnectParams`.
    pub fn build(&self) -> CqlResult<ConnectParams> {
        let hostname = self
            .hostname
            .clone()
            .ok_or(CqlError::Usage("hostname is missing"))?;
        if let Some(keyspace) = &self.keyspace {
            validate_keyspace_name(keyspace)?;
        }
        Ok(ConnectParams::new(
            hostname,
            self.port.unwrap_or(crate::DEFAULT_PORT),
            self.keyspace.clone(),
            self.auth.clone(),
            self.tls.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::ConnectParams;

    #[test]
    fn builder_defaults() {
        let params = ConnectParams::builder()
            .hostname("node1")
            .keyspace("ks")
            .build()
            .unwrap();
        assert_eq!(params.host(), "node1");
        assert_eq!(params.port(), 9042);
        assert_eq!(params.keyspace(), Some("ks"));
        assert!(!params.is_tls());
        assert!(params.authentication().is_none());
    }

    #[test]
    fn hostname_is_mandatory() {
        assert!(ConnectParams::builder().port(9999).build().is_err());
    }
}
