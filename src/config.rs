use anyhow::{bail, Context, Result};
use std::{net::IpAddr, path::PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct TunnelConfig {
    pub ngrok_bin: String,
    /// Local inspection API of the ngrok agent.
    pub api_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
    pub tunnel: Option<TunnelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 8000,
            model_path: PathBuf::from("artifacts/model.json"),
            scaler_path: PathBuf::from("artifacts/scaler.json"),
            tunnel: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Defaults overridden by whatever `get` returns for HOST, PORT,
    /// MODEL_PATH, SCALER_PATH, TUNNEL, NGROK_BIN and NGROK_API.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(h) = get("HOST") {
            cfg.host = h.parse().with_context(|| format!("invalid HOST {:?}", h))?;
        }
        if let Some(p) = get("PORT") {
            cfg.port = p.parse().with_context(|| format!("invalid PORT {:?}", p))?;
        }
        if let Some(p) = get("MODEL_PATH") {
            cfg.model_path = PathBuf::from(p);
        }
        if let Some(p) = get("SCALER_PATH") {
            cfg.scaler_path = PathBuf::from(p);
        }

        let tunnel = match get("TUNNEL").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => bail!("invalid TUNNEL {:?}, expected true/false", other),
        };
        if tunnel {
            cfg.tunnel = Some(TunnelConfig {
                ngrok_bin: get("NGROK_BIN").unwrap_or_else(|| "ngrok".to_string()),
                api_url: get("NGROK_API")
                    .unwrap_or_else(|| "http://127.0.0.1:4040/api/tunnels".to_string()),
            });
        }

        Ok(cfg)
    }

    pub fn local_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
