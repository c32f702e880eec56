use serde::Deserialize;
use std::{process::Stdio, time::Duration};
use thiserror::Error;
use tokio::process::{Child, Command};

use crate::config::TunnelConfig;

const POLL_ATTEMPTS: u32 = 20;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("failed to spawn {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ngrok agent exited early ({0})")]
    Exited(std::process::ExitStatus),
    #[error("failed to poll ngrok agent: {0}")]
    Io(#[from] std::io::Error),
    #[error("no public URL reported after {0} attempts")]
    Timeout(u32),
}

#[derive(Deserialize, Debug)]
pub struct TunnelList {
    #[serde(default)]
    pub tunnels: Vec<TunnelInfo>,
}

#[derive(Deserialize, Debug)]
pub struct TunnelInfo {
    pub public_url: String,
    #[serde(default)]
    pub proto: String,
}

/// HTTPS endpoint if the agent reports one, otherwise whatever comes first.
pub fn pick_public_url(list: &TunnelList) -> Option<String> {
    list.tunnels
        .iter()
        .find(|t| t.proto == "https" || t.public_url.starts_with("https://"))
        .or_else(|| list.tunnels.first())
        .map(|t| t.public_url.clone())
}

/// Running ngrok agent. The child is killed when this is dropped.
pub struct Tunnel {
    pub public_url: String,
    _agent: Child,
}

/// Starts `ngrok http <port>` and waits for it to publish a URL.
pub async fn open(cfg: &TunnelConfig, port: u16) -> Result<Tunnel, TunnelError> {
    let mut agent = Command::new(&cfg.ngrok_bin)
        .arg("http")
        .arg(port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TunnelError::Spawn {
            bin: cfg.ngrok_bin.clone(),
            source,
        })?;
    tracing::debug!(bin = %cfg.ngrok_bin, port, "spawned ngrok agent");

    let client = reqwest::Client::new();
    for attempt in 1..=POLL_ATTEMPTS {
        if let Some(status) = agent.try_wait()? {
            return Err(TunnelError::Exited(status));
        }

        match poll_once(&client, &cfg.api_url).await {
            Ok(Some(public_url)) => {
                return Ok(Tunnel {
                    public_url,
                    _agent: agent,
                })
            }
            Ok(None) => tracing::debug!(attempt, "ngrok agent has no tunnels yet"),
            Err(e) => tracing::debug!(attempt, error = %e, "ngrok agent API not ready"),
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    Err(TunnelError::Timeout(POLL_ATTEMPTS))
}

async fn poll_once(client: &reqwest::Client, api_url: &str) -> reqwest::Result<Option<String>> {
    let list: TunnelList = client
        .get(api_url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(pick_public_url(&list))
}
