//! Shared utilities for front door integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use frontdoor::config::FrontDoorConfig;
use frontdoor::lifecycle::{build_services, Collaborators, Shutdown};
use frontdoor::routing::{Domain, MemoryZoneStore, RecordKind, ZoneRecord};
use frontdoor::tls::{CertificateRecord, MemoryCertificateStore, MemoryTicketStore};
use frontdoor::FrontDoor;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

pub const TENANT: &str = "tenant.test";

/// A self-signed certificate as PEM plus the leaf DER.
pub struct TestCert {
    pub key_pem: Vec<u8>,
    pub cert_pem: Vec<u8>,
    pub der: CertificateDer<'static>,
}

pub fn self_signed(name: &str) -> TestCert {
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert = rcgen::CertificateParams::new(vec![name.to_string()])
        .unwrap()
        .self_signed(&key_pair)
        .unwrap();
    TestCert {
        key_pem: key_pair.serialize_pem().into_bytes(),
        cert_pem: cert.pem().into_bytes(),
        der: cert.der().clone(),
    }
}

/// Write `cert` to `dir` and point the default identity at it.
pub fn use_default_identity(config: &mut FrontDoorConfig, dir: &Path, cert: &TestCert) {
    let key_path = dir.join("default.key");
    let cert_path = dir.join("default.crt");
    std::fs::write(&key_path, &cert.key_pem).unwrap();
    std::fs::write(&cert_path, &cert.cert_pem).unwrap();
    config.tls.default_key_path = Some(key_path);
    config.tls.default_cert_path = Some(cert_path);
}

/// Loopback config on ephemeral ports.
pub fn test_config() -> FrontDoorConfig {
    let mut config = FrontDoorConfig::default();
    config.http.host = "127.0.0.1".to_string();
    config.http.port = 0;
    config.https.host = "127.0.0.1".to_string();
    config.https.port = 0;
    config.shutdown.drain_timeout_secs = 5;
    config
}

/// Zones and certificates with one routed tenant holding `cert`.
pub fn tenant_collaborators(cert: &TestCert) -> Collaborators {
    let domain = Domain::normalize(TENANT);

    let zones = Arc::new(MemoryZoneStore::new());
    zones.insert(
        &domain,
        ZoneRecord {
            kind: RecordKind::Txt,
            value: "tenant".to_string(),
        },
    );

    let certificates = Arc::new(MemoryCertificateStore::new());
    certificates.put(CertificateRecord {
        domain,
        private_key: cert.key_pem.clone(),
        certificate_chain: cert.cert_pem.clone(),
        expires_at: 1_900_000_000,
    });

    Collaborators {
        zones,
        certificates,
        tickets: Arc::new(MemoryTicketStore::new()),
        handler: None,
    }
}

pub struct TestServer {
    pub http: SocketAddr,
    pub https: SocketAddr,
    pub shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(config: FrontDoorConfig, collaborators: Collaborators) -> Self {
        let services = build_services(&config, collaborators).unwrap();
        let door = FrontDoor::bind(&config, services.resolver, services.pipeline)
            .await
            .unwrap();
        let (http, https) = door.local_addrs().unwrap();

        let shutdown = Shutdown::new();
        let task = tokio::spawn(door.run(shutdown.clone()));

        Self {
            http,
            https,
            shutdown,
            task,
        }
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("front door did not stop")
            .unwrap();
    }
}

/// Accepts any server certificate; tests compare the leaf themselves.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Client config offering `alpn`, trusting any certificate.
pub fn client_config(alpn: &[&str]) -> Arc<ClientConfig> {
    let provider = Arc::new(ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .unwrap()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
    Arc::new(config)
}

/// TLS connection to `addr`. `sni = None` connects by IP, which sends no SNI.
pub async fn connect_tls(
    addr: SocketAddr,
    sni: Option<&str>,
    config: Arc<ClientConfig>,
) -> TlsStream<TcpStream> {
    let server_name = match sni {
        Some(name) => ServerName::try_from(name.to_string()).unwrap(),
        None => ServerName::IpAddress(addr.ip().into()),
    };
    let tcp = TcpStream::connect(addr).await.unwrap();
    TlsConnector::from(config).connect(server_name, tcp).await.unwrap()
}

pub fn peer_leaf(stream: &TlsStream<TcpStream>) -> CertificateDer<'static> {
    let (_, session) = stream.get_ref();
    session.peer_certificates().unwrap()[0].clone().into_owned()
}

/// Send a minimal HTTP/1.1 GET and return everything read back.
pub async fn http1_get<S>(stream: &mut S, host: &str, path: &str) -> String
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}
