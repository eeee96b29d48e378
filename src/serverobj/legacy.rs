//! Schema v1 server record.
//!
//! Before server objects became polymorphic every server was stored as a
//! `VmessInfo`, whatever its real protocol. The protocol tag says how the
//! generic fields are to be read.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::serverobj::{share_url, Protocol};
use crate::store::lenient;

/// Legacy protocol assumed when a v1 record carries no tag.
pub const LEGACY_PROTOCOL: &str = "vmess";

/// A schema v1 server description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmessInfo {
    pub ps: String,
    pub add: String,
    #[serde(deserialize_with = "lenient::as_string")]
    pub port: String,
    pub id: String,
    #[serde(deserialize_with = "lenient::as_string")]
    pub aid: String,
    /// Transport for v2ray protocols, cipher for shadowsocks.
    pub net: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub path: String,
    pub tls: String,
    pub flow: String,
    pub alpn: String,
    #[serde(rename = "allowInsecure", deserialize_with = "lenient::as_bool")]
    pub allow_insecure: bool,
    #[serde(deserialize_with = "lenient::as_string")]
    pub v: String,
    pub protocol: String,
}

impl VmessInfo {
    /// Export the record as a share link of its protocol.
    ///
    /// Returns an empty string for protocols that have no link form here.
    pub fn export_to_url(&self) -> String {
        let protocol = if self.protocol.is_empty() { LEGACY_PROTOCOL } else { &self.protocol };
        match Protocol::from_tag(protocol) {
            Ok(Protocol::Vmess) => self.export_vmess(),
            Ok(Protocol::Vless) => share_url(
                "vless",
                self.id.as_str(),
                self.add.as_str(),
                self.port.as_str(),
                &[
                    ("type", self.net.as_str()),
                    ("security", self.tls.as_str()),
                    ("host", self.host.as_str()),
                    ("path", self.path.as_str()),
                    ("flow", self.flow.as_str()),
                    ("alpn", self.alpn.as_str()),
                ],
                self.ps.as_str(),
            ),
            Ok(Protocol::Shadowsocks) => {
                let user = URL_SAFE_NO_PAD.encode(format!("{}:{}", self.net, self.id));
                format!(
                    "ss://{}@{}:{}#{}",
                    user,
                    crate::serverobj::authority_host(&self.add),
                    self.port,
                    urlencoding::encode(&self.ps)
                )
            }
            Ok(Protocol::Trojan) => share_url(
                "trojan",
                self.id.as_str(),
                self.add.as_str(),
                self.port.as_str(),
                &[
                    ("sni", self.host.as_str()),
                    ("allowInsecure", if self.allow_insecure { "1" } else { "" }),
                ],
                self.ps.as_str(),
            ),
            Err(_) => String::new(),
        }
    }

    fn export_vmess(&self) -> String {
        let body = serde_json::json!({
            "v": if self.v.is_empty() { "2" } else { self.v.as_str() },
            "ps": self.ps,
            "add": self.add,
            "port": self.port,
            "id": self.id,
            "aid": self.aid,
            "net": self.net,
            "type": self.kind,
            "host": self.host,
            "path": self.path,
            "tls": self.tls,
        });
        format!("vmess://{}", STANDARD.encode(body.to_string()))
    }
}
