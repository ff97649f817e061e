//! TLS configuration loading and the handshake helper used to upgrade the
//! control and data channels.

use rustls::{internal::pemfile, AllowAnyAnonymousOrAuthenticatedClient, Certificate, NoClientAuth, PrivateKey, RootCertStore, ServerConfig, Session};
use std::fmt;
use std::fmt::Formatter;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_rustls::TlsAcceptor;

// Tells how TLS security is configured for the server.
#[derive(Clone)]
pub enum FtpsConfig {
    Off,
    On {
        tls_config: Arc<ServerConfig>,
        // True when a client CA was configured, so the peer was asked for a
        // certificate and `authorized` is a meaningful outcome.
        client_auth_requested: bool,
        // Accept peers that were asked for a certificate but presented none.
        allow_unauthorized: bool,
    },
}

impl FtpsConfig {
    pub fn is_on(&self) -> bool {
        matches!(self, FtpsConfig::On { .. })
    }
}

impl fmt::Debug for FtpsConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FtpsConfig::Off => write!(f, "Off"),
            FtpsConfig::On { .. } => write!(f, "On"),
        }
    }
}

/// Builds a rustls server configuration from PEM encoded certificate chain
/// and private key files. When `client_ca_file` is given the server asks
/// connecting peers for a certificate signed by one of those roots.
pub fn new_config<P: AsRef<Path>>(certs_file: P, key_file: P, client_ca_file: Option<P>) -> std::io::Result<Arc<ServerConfig>> {
    let certs: Vec<Certificate> = load_certs(certs_file)?;
    let privkey: PrivateKey = load_private_key(key_file)?;

    let verifier = match client_ca_file {
        Some(path) => {
            let mut roots = RootCertStore::empty();
            let ca_file = File::open(path)?;
            let mut reader = BufReader::new(ca_file);
            roots
                .add_pem_file(&mut reader)
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid client CA file"))?;
            AllowAnyAnonymousOrAuthenticatedClient::new(roots)
        }
        None => NoClientAuth::new(),
    };

    let mut config = ServerConfig::new(verifier);
    config
        .set_single_cert(certs, privkey)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    Ok(Arc::new(config))
}

fn load_certs<P: AsRef<Path>>(filename: P) -> std::io::Result<Vec<Certificate>> {
    let certfile: File = File::open(filename)?;
    let mut reader: BufReader<File> = BufReader::new(certfile);
    pemfile::certs(&mut reader).map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidData))
}

fn load_private_key<P: AsRef<Path>>(filename: P) -> std::io::Result<PrivateKey> {
    let rsa_keys = {
        let keyfile = File::open(&filename)?;
        let mut reader = BufReader::new(keyfile);
        pemfile::rsa_private_keys(&mut reader).map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidData))?
    };

    let pkcs8_keys = {
        let keyfile = File::open(&filename)?;
        let mut reader = BufReader::new(keyfile);
        pemfile::pkcs8_private_keys(&mut reader).map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidData))?
    };

    // prefer pkcs8 keys
    let key = pkcs8_keys
        .into_iter()
        .next()
        .or_else(|| rsa_keys.into_iter().next())
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::InvalidData))?;

    Ok(key)
}

/// Performs the server side of the TLS handshake over `io` and reports
/// whether the peer presented a verified certificate. When the peer was
/// asked for a certificate but did not present one and the configuration
/// does not allow unauthorized peers, the stream is shut down and an error
/// returned. Plaintext already buffered by the caller must be wrapped into
/// `io` (see [`PrefixedStream`](super::io::PrefixedStream)) before calling.
pub async fn upgrade<S>(io: S, config: &FtpsConfig) -> std::io::Result<(tokio_rustls::server::TlsStream<S>, bool)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (tls_config, client_auth_requested, allow_unauthorized) = match config {
        FtpsConfig::On {
            tls_config,
            client_auth_requested,
            allow_unauthorized,
        } => (tls_config.clone(), *client_auth_requested, *allow_unauthorized),
        FtpsConfig::Off => return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "TLS not configured")),
    };

    let acceptor: TlsAcceptor = tls_config.into();
    let mut stream = acceptor.accept(io).await?;

    let authorized = {
        let (_, session) = stream.get_ref();
        !client_auth_requested || session.get_peer_certificates().is_some()
    };

    if !authorized && !allow_unauthorized {
        let _ = stream.shutdown().await;
        return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "peer did not present a certificate"));
    }

    Ok((stream, authorized))
}
