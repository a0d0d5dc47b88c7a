use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::api::ApiError;
use crate::realtime::WebSocketFeedConfig;
use crate::replicator::{ReplicatorConfig, DEFAULT_POLL_INTERVAL};

/// Everything a client process needs to reach the backend and cache state.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: Url,
    /// Defaults to the api base with its scheme switched to `ws`/`wss`.
    pub realtime_base: Url,
    pub storage_dir: PathBuf,
    pub poll_interval: Duration,
    pub handshake_timeout: Duration,
    pub reconnect_delay: Duration,
    pub play_url_base: String,
}

impl ClientConfig {
    pub fn new(api_base: Url, storage_dir: PathBuf) -> Result<Self, ApiError> {
        let realtime_base = derive_realtime_url(&api_base)?;
        let feed = WebSocketFeedConfig::new(realtime_base.clone());
        Ok(Self {
            api_base,
            realtime_base,
            storage_dir,
            poll_interval: DEFAULT_POLL_INTERVAL,
            handshake_timeout: feed.handshake_timeout,
            reconnect_delay: feed.reconnect_delay,
            play_url_base: ReplicatorConfig::default().play_url_base,
        })
    }

    pub fn replicator(&self) -> ReplicatorConfig {
        ReplicatorConfig {
            poll_interval: self.poll_interval,
            play_url_base: self.play_url_base.clone(),
            ..ReplicatorConfig::default()
        }
    }

    pub fn feed(&self) -> WebSocketFeedConfig {
        WebSocketFeedConfig {
            realtime_base: self.realtime_base.clone(),
            handshake_timeout: self.handshake_timeout,
            reconnect_delay: self.reconnect_delay,
        }
    }
}

/// `http://host/api/` becomes `ws://host/`; `https` maps to `wss`. The
/// listen endpoint hangs off the host root, not the REST prefix.
pub fn derive_realtime_url(api_base: &Url) -> Result<Url, ApiError> {
    let scheme = match api_base.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(ApiError::Config(format!(
                "unsupported api url scheme {other}"
            )))
        }
    };
    let mut url = api_base.clone();
    url.set_scheme(scheme)
        .map_err(|_| ApiError::Config(format!("cannot derive realtime url from {api_base}")))?;
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
