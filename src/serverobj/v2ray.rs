//! VMess and VLESS servers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::serverobj::{
    bare_host, decode_base64, decode_component, parse_port, share_url, Protocol, ServerObjError,
    ServerObjResult,
};
use crate::store::lenient;

/// A server speaking VMess or VLESS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct V2Ray {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub id: String,
    pub aid: u16,
    pub net: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub path: String,
    pub tls: String,
    pub flow: String,
    pub sni: String,
    pub alpn: String,
    pub allow_insecure: bool,
}

/// JSON payload of a `vmess://` link.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VmessPayload {
    ps: String,
    add: String,
    #[serde(deserialize_with = "lenient::as_string")]
    port: String,
    id: String,
    #[serde(deserialize_with = "lenient::as_string")]
    aid: String,
    net: String,
    #[serde(rename = "type")]
    kind: String,
    host: String,
    path: String,
    tls: String,
    sni: String,
    alpn: String,
}

impl V2Ray {
    /// Parse `vmess://base64(json)`.
    pub fn parse_vmess(link: &str) -> ServerObjResult<Self> {
        let invalid = |reason: &str| ServerObjError::invalid(Protocol::Vmess, reason);

        let payload = link
            .trim()
            .strip_prefix("vmess://")
            .ok_or_else(|| invalid("missing vmess:// prefix"))?;
        let bytes = decode_base64(payload).ok_or_else(|| invalid("payload is not base64"))?;
        let info: VmessPayload = serde_json::from_slice(&bytes)
            .map_err(|e| ServerObjError::invalid(Protocol::Vmess, e.to_string()))?;

        if info.add.trim().is_empty() {
            return Err(invalid("missing address"));
        }
        if info.id.trim().is_empty() {
            return Err(invalid("missing user id"));
        }
        let port = parse_port(Protocol::Vmess, &info.port)?;
        let aid = match info.aid.trim() {
            "" => 0,
            aid => aid.parse().map_err(|_| invalid("bad alter id"))?,
        };

        Ok(Self {
            name: info.ps,
            server: info.add.trim().to_string(),
            port,
            id: info.id.trim().to_string(),
            aid,
            net: if info.net.is_empty() { "tcp".to_string() } else { info.net },
            kind: info.kind,
            host: info.host,
            path: info.path,
            tls: info.tls,
            flow: String::new(),
            sni: info.sni,
            alpn: info.alpn,
            allow_insecure: false,
        })
    }

    /// Parse `vless://id@host:port?type=…&security=…#name`.
    pub fn parse_vless(link: &str) -> ServerObjResult<Self> {
        let invalid = |reason: &str| ServerObjError::invalid(Protocol::Vless, reason);

        let url = Url::parse(link.trim())
            .map_err(|e| ServerObjError::invalid(Protocol::Vless, e.to_string()))?;
        if url.scheme() != "vless" {
            return Err(invalid("missing vless:// prefix"));
        }
        let id = decode_component(url.username());
        if id.is_empty() {
            return Err(invalid("missing user id"));
        }
        let server = url
            .host_str()
            .map(bare_host)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing address"))?
            .to_string();
        let port = url.port().ok_or_else(|| invalid("missing port"))?;

        let mut server_obj = Self {
            name: url.fragment().map(decode_component).unwrap_or_default(),
            server,
            port,
            id,
            net: "tcp".to_string(),
            ..Default::default()
        };
        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match &*key {
                "type" if !value.is_empty() => server_obj.net = value,
                "security" if value != "none" => server_obj.tls = value,
                "host" => server_obj.host = value,
                "path" => server_obj.path = value,
                "flow" => server_obj.flow = value,
                "sni" => server_obj.sni = value,
                "alpn" => server_obj.alpn = value,
                "headerType" => server_obj.kind = value,
                "allowInsecure" => server_obj.allow_insecure = value == "1" || value == "true",
                _ => {}
            }
        }
        Ok(server_obj)
    }

    pub fn export_vmess(&self) -> String {
        let body = serde_json::json!({
            "v": "2",
            "ps": self.name,
            "add": self.server,
            "port": self.port.to_string(),
            "id": self.id,
            "aid": self.aid.to_string(),
            "net": self.net,
            "type": self.kind,
            "host": self.host,
            "path": self.path,
            "tls": self.tls,
            "sni": self.sni,
            "alpn": self.alpn,
        });
        format!("vmess://{}", STANDARD.encode(body.to_string()))
    }

    pub fn export_vless(&self) -> String {
        share_url(
            "vless",
            &self.id,
            &self.server,
            &self.port.to_string(),
            &[
                ("type", self.net.as_str()),
                ("security", self.tls.as_str()),
                ("host", self.host.as_str()),
                ("path", self.path.as_str()),
                ("flow", self.flow.as_str()),
                ("sni", self.sni.as_str()),
                ("alpn", self.alpn.as_str()),
                ("headerType", self.kind.as_str()),
                ("allowInsecure", if self.allow_insecure { "1" } else { "" }),
            ],
            &self.name,
        )
    }
}
