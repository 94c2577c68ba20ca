use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, Proxy, Url};
use tessera_fetch::ReqwestClient;

#[derive(Clone, Default)]
pub struct ClientSetting {
    pub proxies: Option<Vec<Url>>,
    pub connect_timeout: Option<Duration>,
}

impl ClientSetting {
    pub fn build(self) -> Result<ReqwestClient> {
        let mut cb = Client::builder();

        if let Some(proxies) = self.proxies {
            let (secure, insecure) = split_proxies(proxies);

            for u in secure {
                cb = cb.proxy(Proxy::https(u)?);
            }

            for u in insecure {
                cb = cb.proxy(Proxy::http(u)?);
            }
        }

        if let Some(timeout) = self.connect_timeout {
            cb = cb.connect_timeout(timeout);
        }

        Ok(ReqwestClient::from_client(cb.build()?))
    }
}

/// `https://` proxies carry https traffic, everything else http traffic.
fn split_proxies(proxies: Vec<Url>) -> (Vec<Url>, Vec<Url>) {
    proxies.into_iter().partition(|u| u.scheme() == "https")
}
