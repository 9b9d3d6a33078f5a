//! IMAP connection and TLS helpers
//!
//! [`connect`] opens a TCP connection, secures it according to
//! [`Security`], and logs in. The resulting [`ImapConnection`] is the
//! production [`Transport`].

use crate::config::{ImapConfig, Security};
use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::message::MessageRef;
use crate::transport::{FetchSection, Transport};
use async_imap::types::Fetch;
use async_trait::async_trait;
use futures::TryStreamExt;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::ServerName;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info};

/// Byte stream an IMAP session can run over: plain TCP or TLS.
pub trait ImapStream: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug> ImapStream for T {}

/// An authenticated IMAP session over any [`ImapStream`].
pub type ImapSession = async_imap::Session<Compat<Box<dyn ImapStream>>>;

/// A logged-in connection to an IMAP server.
pub struct ImapConnection {
    session: ImapSession,
}

/// Open a connection to `config.host:config.port` and log in.
///
/// # Errors
///
/// Returns [`Error::Connection`] if the server cannot be reached,
/// [`Error::Tls`] if STARTTLS or the TLS handshake fails, and
/// [`Error::Authentication`] if the credentials are rejected.
pub async fn connect(config: &ImapConfig) -> Result<ImapConnection> {
    let addr = format!("{}:{}", config.host, config.port);
    debug!("Connecting to IMAP server at {} ({})", addr, config.security);

    let tcp_stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| Error::Connection(format!("{addr}: {e}")))?;

    let stream: Box<dyn ImapStream> = match config.security {
        Security::Plain => Box::new(tcp_stream),
        Security::Tls => Box::new(tls_handshake(config, tcp_stream).await?),
        Security::StartTls => {
            let tcp_stream = starttls(tcp_stream).await?;
            Box::new(tls_handshake(config, tcp_stream).await?)
        }
    };

    let client = async_imap::Client::new(stream.compat());
    let session = client
        .login(&config.username, &config.password)
        .await
        .map_err(|(e, _)| login_error(e))?;

    info!("Logged in to {} as {}", addr, config.username);
    Ok(ImapConnection { session })
}

/// Issue STARTTLS on a fresh plain connection and hand the socket back
/// for the TLS handshake.
async fn starttls(tcp_stream: TcpStream) -> Result<TcpStream> {
    let mut client = async_imap::Client::new(tcp_stream.compat());
    client
        .run_command_and_check_ok("STARTTLS", None)
        .await
        .map_err(|e| Error::Tls(format!("STARTTLS failed: {e}")))?;
    Ok(client.into_inner().into_inner())
}

async fn tls_handshake(config: &ImapConfig, tcp_stream: TcpStream) -> Result<TlsStream<TcpStream>> {
    let connector = tls_connector(config.accept_invalid_certs)?;
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;

    connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|e| Error::Tls(e.to_string()))
}

/// Build a TLS connector backed by the `ring` provider.
///
/// With `accept_invalid_certs` every server certificate is accepted,
/// which test servers with self-signed certificates need. Otherwise
/// the Mozilla root set from `webpki-roots` is trusted.
fn tls_connector(accept_invalid_certs: bool) -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?;

    let config = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth()
    } else {
        let roots = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

fn login_error(err: async_imap::error::Error) -> Error {
    use async_imap::error::Error as ImapError;

    match err {
        ImapError::No(msg) | ImapError::Bad(msg) => Error::Authentication(msg),
        other => Error::Connection(format!("Login failed: {other}")),
    }
}

#[async_trait]
impl Transport for ImapConnection {
    async fn select(&mut self, mailbox: &str) -> Result<()> {
        let info = self
            .session
            .select(mailbox)
            .await
            .map_err(|e| Error::from_imap("SELECT", e))?;
        debug!("Selected {} ({} messages)", mailbox, info.exists);
        Ok(())
    }

    async fn search(&mut self, query: &str) -> Result<Vec<MessageRef>> {
        let uids = self
            .session
            .uid_search(query)
            .await
            .map_err(|e| Error::from_imap("SEARCH", e))?;

        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable();
        Ok(uid_list.into_iter().map(MessageRef::from).collect())
    }

    async fn fetch(&mut self, reference: &MessageRef, section: FetchSection) -> Result<Vec<u8>> {
        let messages: Vec<Fetch> = self
            .session
            .uid_fetch(reference.as_str(), section.as_query())
            .await
            .map_err(|e| Error::from_imap("FETCH", e))?
            .try_collect()
            .await
            .map_err(|e| Error::from_imap("FETCH", e))?;

        messages
            .iter()
            .find_map(|msg| match section {
                FetchSection::Full => msg.body(),
                FetchSection::Text => msg.text(),
            })
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::NotFound(format!("No message with reference {reference}")))
    }

    async fn add_flag(&mut self, reference: &MessageRef, flag: Flag) -> Result<()> {
        let _updated: Vec<Fetch> = self
            .session
            .uid_store(reference.as_str(), flag.add_query())
            .await
            .map_err(|e| Error::from_imap("STORE", e))?
            .try_collect()
            .await
            .map_err(|e| Error::from_imap("STORE", e))?;
        Ok(())
    }

    async fn expunge(&mut self) -> Result<()> {
        let removed: Vec<u32> = self
            .session
            .expunge()
            .await
            .map_err(|e| Error::from_imap("EXPUNGE", e))?
            .try_collect()
            .await
            .map_err(|e| Error::from_imap("EXPUNGE", e))?;
        debug!("Expunged {} messages", removed.len());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.session
            .close()
            .await
            .map_err(|e| Error::from_imap("CLOSE", e))?;
        self.session
            .logout()
            .await
            .map_err(|e| Error::from_imap("LOGOUT", e))?;
        info!("Closed IMAP connection");
        Ok(())
    }
}

/// Certificate verifier that accepts every server certificate but
/// still checks handshake signatures with the provider's algorithms.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
