/// Configuration management for the gateway.
use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| anyhow!("{} missing from environment", name))
}

/// Broker connection settings, mirroring the identity service's contract.
/// Transport is always `amqps`; the client identity is the PKCS#12 bundle at
/// `CERT_PATH`, the trust chain lives at `CA_PATH`.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub user: String,
    pub pass: String,
    pub host: String,
    pub queue: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub passphrase: String,
    pub ca_path: PathBuf,
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            user: required("USER")?,
            pass: required("PASS")?,
            host: required("HOST")?,
            queue: required("QUEUE")?,
            cert_path: required("CERT_PATH")?.into(),
            key_path: required("KEY_PATH")?.into(),
            passphrase: required("PASSPHRASE")?,
            ca_path: required("CA_PATH")?.into(),
        };

        for path in [&config.cert_path, &config.key_path, &config.ca_path] {
            if !path.exists() {
                return Err(anyhow!("TLS material not found at {}", path.display()));
            }
        }

        Ok(config)
    }

    pub fn uri(&self) -> String {
        format!("amqps://{}:{}@{}:5671", self.user, self.pass, self.host)
    }

    pub fn tls(&self) -> Result<lapin::tcp::OwnedTLSConfig> {
        let identity = std::fs::read(&self.cert_path)
            .with_context(|| format!("reading client identity {}", self.cert_path.display()))?;
        let cert_chain = std::fs::read_to_string(&self.ca_path)
            .with_context(|| format!("reading CA chain {}", self.ca_path.display()))?;

        Ok(lapin::tcp::OwnedTLSConfig {
            identity: Some(lapin::tcp::OwnedIdentity {
                der: identity,
                password: self.passphrase.clone(),
            }),
            cert_chain: Some(cert_chain),
        })
    }
}

/// Vision backend endpoint.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub host: String,
    pub port: u16,
}

impl VisionConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: required("VISION_HOST")?,
            port: required("VISION_PORT")?
                .parse()
                .context("VISION_PORT must be a port number")?,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// HTTP bind address. These have sensible defaults; everything else is
/// required.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl HttpConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("HTTP_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(8000),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub broker: BrokerConfig,
    pub vision: VisionConfig,
    pub http: HttpConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            broker: BrokerConfig::from_env()?,
            vision: VisionConfig::from_env()?,
            http: HttpConfig::from_env()?,
        })
    }
}
