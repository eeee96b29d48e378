//! Trojan servers.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::serverobj::{
    bare_host, decode_component, share_url, Protocol, ServerObjError, ServerObjResult,
};

const DEFAULT_PORT: u16 = 443;

/// A Trojan server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trojan {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub password: String,
    pub sni: String,
    pub allow_insecure: bool,
}

impl Trojan {
    /// Parse `trojan://password@host[:port]?sni=…&allowInsecure=1#name`.
    pub fn parse(link: &str) -> ServerObjResult<Self> {
        let invalid = |reason: &str| ServerObjError::invalid(Protocol::Trojan, reason);

        let url = Url::parse(link.trim())
            .map_err(|e| ServerObjError::invalid(Protocol::Trojan, e.to_string()))?;
        if !matches!(url.scheme(), "trojan" | "trojan-go") {
            return Err(invalid("missing trojan:// prefix"));
        }
        let password = decode_component(url.username());
        if password.is_empty() {
            return Err(invalid("missing password"));
        }
        let server = url
            .host_str()
            .map(bare_host)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing address"))?
            .to_string();

        let mut trojan = Self {
            name: url.fragment().map(decode_component).unwrap_or_default(),
            server,
            port: url.port().unwrap_or(DEFAULT_PORT),
            password,
            ..Default::default()
        };
        for (key, value) in url.query_pairs() {
            match &*key {
                "sni" | "peer" => trojan.sni = value.into_owned(),
                "allowInsecure" => trojan.allow_insecure = value == "1" || value == "true",
                _ => {}
            }
        }
        Ok(trojan)
    }

    pub fn export(&self) -> String {
        share_url(
            "trojan",
            &self.password,
            &self.server,
            &self.port.to_string(),
            &[
                ("sni", self.sni.as_str()),
                ("allowInsecure", if self.allow_insecure { "1" } else { "" }),
            ],
            &self.name,
        )
    }
}
