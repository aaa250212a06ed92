//! TlsTransport (§4.4): a non-blocking `rustls` wrapper driven entirely by
//! the network thread's readiness loop — no async runtime, matching the
//! teacher crate's blocking-thread style. Also owns first-run self-signed
//! certificate generation.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use rustls::{ServerConfig, ServerConnection};

use crate::error::{Error, Result};

/// Generates a self-signed certificate + key in PEM, reproducing the
/// original's `openssl req -x509 -newkey rsa:4096 -days 365 -nodes -subj
/// "/C=US/ST=State/L=City/O=HaikuRemote/CN=localhost"` distinguished name
/// and validity period.
pub fn generate_self_signed() -> Result<(String, String)> {
    let mut params = rcgen::CertificateParams::new(vec!["localhost".to_string()])
        .map_err(|e| Error::TlsContext(format!("certificate params: {e}")))?;
    params.distinguished_name = rcgen::DistinguishedName::new();
    params.distinguished_name.push(rcgen::DnType::CountryName, "US");
    params.distinguished_name.push(rcgen::DnType::StateOrProvinceName, "State");
    params.distinguished_name.push(rcgen::DnType::LocalityName, "City");
    params.distinguished_name.push(rcgen::DnType::OrganizationName, "HaikuRemote");
    params.distinguished_name.push(rcgen::DnType::CommonName, "localhost");
    let not_before = time::OffsetDateTime::now_utc();
    params.not_before = not_before;
    params.not_after = not_before + time::Duration::days(365);

    let key_pair = rcgen::KeyPair::generate()
        .map_err(|e| Error::TlsContext(format!("key generation: {e}")))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| Error::TlsContext(format!("self-signing: {e}")))?;

    Ok((cert.pem(), key_pair.serialize_pem()))
}

/// Loads `cert_path`/`key_path`, generating and persisting a self-signed
/// pair on first run if either is missing.
pub fn load_or_generate(cert_path: &Path, key_path: &Path) -> Result<()> {
    if cert_path.exists() && key_path.exists() {
        return Ok(());
    }
    let (cert_pem, key_pem) = generate_self_signed()?;
    std::fs::write(cert_path, cert_pem)?;
    std::fs::write(key_path, key_pem)?;
    Ok(())
}

/// Builds the server-side TLS config from a PEM certificate chain + key.
pub fn server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let cert_file = std::fs::read(cert_path)?;
    let key_file = std::fs::read(key_path)?;

    let certs: std::result::Result<Vec<_>, _> =
        rustls_pemfile::certs(&mut cert_file.as_slice()).collect();
    let certs = certs.map_err(|e| Error::TlsContext(format!("invalid certificate PEM: {e}")))?;

    let key = rustls_pemfile::private_key(&mut key_file.as_slice())
        .map_err(|e| Error::TlsContext(format!("invalid key PEM: {e}")))?
        .ok_or_else(|| Error::TlsContext("no private key found in key file".into()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::TlsContext(format!("bad certificate/key pair: {e}")))?;

    Ok(Arc::new(config))
}

/// One session's non-blocking TLS state machine: feed raw bytes in via
/// `read_tls`, drain plaintext via `read_plaintext`, and pull bytes to
/// write via `write_tls`. Handshake progress is implicit in
/// `process_new_packets` — callers poll `is_handshaking()`.
pub struct TlsTransport {
    conn: ServerConnection,
}

impl TlsTransport {
    pub fn new(config: Arc<ServerConfig>) -> Result<Self> {
        let conn = ServerConnection::new(config)
            .map_err(|e| Error::TlsHandshake(e.to_string()))?;
        Ok(TlsTransport { conn })
    }

    pub fn is_handshaking(&self) -> bool {
        self.conn.is_handshaking()
    }

    pub fn wants_read(&self) -> bool {
        self.conn.wants_read()
    }

    pub fn wants_write(&self) -> bool {
        self.conn.wants_write()
    }

    /// Reads raw TLS bytes from the socket into rustls' internal buffer
    /// and processes whatever complete records that yields.
    pub fn read_tls_from(&mut self, socket: &mut dyn Read) -> Result<usize> {
        let n = self.conn.read_tls(socket)?;
        self.conn
            .process_new_packets()
            .map_err(|e| Error::TlsHandshake(e.to_string()))?;
        Ok(n)
    }

    /// Drains any plaintext rustls has buffered into `out`, returning the
    /// number of bytes copied. Zero means no plaintext is available right
    /// now (WantRead — not necessarily EOF).
    pub fn read_plaintext(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut reader = self.conn.reader();
        let mut buf = [0u8; 4096];
        let mut total = 0;
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    out.extend_from_slice(&buf[..n]);
                    total += n;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(total)
    }

    pub fn write_plaintext(&mut self, data: &[u8]) -> Result<()> {
        self.conn.writer().write_all(data)?;
        Ok(())
    }

    pub fn write_tls_to(&mut self, socket: &mut dyn Write) -> Result<usize> {
        Ok(self.conn.write_tls(socket)?)
    }
}
