//! Polymorphic proxy server objects.
//!
//! # Data Flow
//! ```text
//! share link ("vmess://…", "ss://…", …) + protocol tag
//!     → Protocol::from_tag (closed set of supported kinds)
//!     → per-kind parser (v2ray.rs, shadowsocks.rs, trojan.rs)
//!     → ServerObj (tagged variant, persisted as JSON)
//!
//! legacy VmessInfo (schema v1)
//!     → legacy.rs export_to_url
//!     → same parsers as above
//! ```
//!
//! # Design Decisions
//! - Unknown protocol tags are a typed error, never a generic failure
//! - Every variant can export itself back to a share link
//! - Parsers are strict about address and port, lenient about encoding

pub mod legacy;
pub mod shadowsocks;
pub mod trojan;
pub mod v2ray;

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub use legacy::VmessInfo;
pub use shadowsocks::Shadowsocks;
pub use trojan::Trojan;
pub use v2ray::V2Ray;

/// Errors raised while building a server object from a link.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServerObjError {
    /// The protocol tag or link scheme names no supported protocol.
    #[error("unsupported protocol: {0:?}")]
    UnsupportedProtocol(String),

    /// The link belongs to a supported protocol but is malformed.
    #[error("invalid {protocol} link: {reason}")]
    InvalidLink {
        protocol: Protocol,
        reason: String,
    },
}

impl ServerObjError {
    pub(crate) fn invalid(protocol: Protocol, reason: impl Into<String>) -> Self {
        ServerObjError::InvalidLink {
            protocol,
            reason: reason.into(),
        }
    }
}

pub type ServerObjResult<T> = Result<T, ServerObjError>;

/// Supported proxy protocol kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vmess,
    Vless,
    Shadowsocks,
    Trojan,
}

impl Protocol {
    /// Resolve a protocol tag as stored in legacy records.
    pub fn from_tag(tag: &str) -> ServerObjResult<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "vmess" => Ok(Protocol::Vmess),
            "vless" => Ok(Protocol::Vless),
            "ss" | "shadowsocks" => Ok(Protocol::Shadowsocks),
            "trojan" | "trojan-go" => Ok(Protocol::Trojan),
            _ => Err(ServerObjError::UnsupportedProtocol(tag.to_string())),
        }
    }

    /// Resolve the protocol from a share link's scheme.
    pub fn from_link(link: &str) -> ServerObjResult<Self> {
        let scheme = link
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| ServerObjError::UnsupportedProtocol(link.to_string()))?;
        Self::from_tag(scheme)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::Trojan => "trojan",
        }
    }

    /// Link parser registered for this protocol.
    fn parser(self) -> fn(&str) -> ServerObjResult<ServerObj> {
        match self {
            Protocol::Vmess => |link: &str| V2Ray::parse_vmess(link).map(ServerObj::Vmess),
            Protocol::Vless => |link: &str| V2Ray::parse_vless(link).map(ServerObj::Vless),
            Protocol::Shadowsocks => |link: &str| Shadowsocks::parse(link).map(ServerObj::Shadowsocks),
            Protocol::Trojan => |link: &str| Trojan::parse(link).map(ServerObj::Trojan),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ServerObjError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}

/// A proxy server of one of the supported protocols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ServerObj {
    Vmess(V2Ray),
    Vless(V2Ray),
    Shadowsocks(Shadowsocks),
    Trojan(Trojan),
}

impl ServerObj {
    /// Build a server object from a link under an explicit protocol tag.
    ///
    /// The link scheme must belong to the same protocol as the tag.
    pub fn from_link(tag: &str, link: &str) -> ServerObjResult<Self> {
        let protocol = Protocol::from_tag(tag)?;
        match Protocol::from_link(link) {
            Ok(scheme) if scheme == protocol => {}
            _ => return Err(ServerObjError::invalid(protocol, "link scheme does not match protocol")),
        }
        (protocol.parser())(link)
    }

    /// Build a server object, inferring the protocol from the link scheme.
    pub fn from_link_auto(link: &str) -> ServerObjResult<Self> {
        let protocol = Protocol::from_link(link.trim())?;
        (protocol.parser())(link.trim())
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            ServerObj::Vmess(_) => Protocol::Vmess,
            ServerObj::Vless(_) => Protocol::Vless,
            ServerObj::Shadowsocks(_) => Protocol::Shadowsocks,
            ServerObj::Trojan(_) => Protocol::Trojan,
        }
    }

    /// Display name of the server.
    pub fn name(&self) -> &str {
        match self {
            ServerObj::Vmess(s) | ServerObj::Vless(s) => &s.name,
            ServerObj::Shadowsocks(s) => &s.name,
            ServerObj::Trojan(s) => &s.name,
        }
    }

    pub fn hostname(&self) -> &str {
        match self {
            ServerObj::Vmess(s) | ServerObj::Vless(s) => &s.server,
            ServerObj::Shadowsocks(s) => &s.server,
            ServerObj::Trojan(s) => &s.server,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            ServerObj::Vmess(s) | ServerObj::Vless(s) => s.port,
            ServerObj::Shadowsocks(s) => s.port,
            ServerObj::Trojan(s) => s.port,
        }
    }

    /// Export the server back to a share link.
    pub fn export_link(&self) -> String {
        match self {
            ServerObj::Vmess(s) => s.export_vmess(),
            ServerObj::Vless(s) => s.export_vless(),
            ServerObj::Shadowsocks(s) => s.export(),
            ServerObj::Trojan(s) => s.export(),
        }
    }
}

/// Decode base64 that may be standard or URL-safe, padded or not.
pub(crate) fn decode_base64(input: &str) -> Option<Vec<u8>> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .collect();
    STANDARD_NO_PAD
        .decode(&cleaned)
        .or_else(|_| URL_SAFE_NO_PAD.decode(&cleaned))
        .ok()
}

/// Parse a port given as text.
pub(crate) fn parse_port(protocol: Protocol, port: &str) -> ServerObjResult<u16> {
    match port.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(ServerObjError::invalid(protocol, format!("bad port {:?}", port))),
        Ok(p) => Ok(p),
    }
}

/// Strip brackets from an IPv6 host as returned by `Url::host_str`.
pub(crate) fn bare_host(host: &str) -> &str {
    host.trim_start_matches('[').trim_end_matches(']')
}

/// Build a `scheme://user@host:port?query#name` share link.
///
/// Empty query values are omitted. Returns an empty string when the
/// host and port do not form a valid authority.
pub(crate) fn share_url(
    scheme: &str,
    user: &str,
    host: &str,
    port: &str,
    query: &[(&str, &str)],
    name: &str,
) -> String {
    let base = format!("{}://{}:{}", scheme, authority_host(host), port);
    let mut url = match Url::parse(&base) {
        Ok(url) => url,
        Err(_) => return String::new(),
    };
    if url.set_username(user).is_err() {
        return String::new();
    }
    let pairs: Vec<_> = query.iter().filter(|(_, v)| !v.is_empty()).collect();
    if !pairs.is_empty() {
        let mut serializer = url.query_pairs_mut();
        for (key, value) in pairs {
            serializer.append_pair(key, value);
        }
    }
    if !name.is_empty() {
        url.set_fragment(Some(&urlencoding::encode(name)));
    }
    url.to_string()
}

/// Percent-decode a URL component, keeping the raw text if it is not UTF-8.
pub(crate) fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Format a host for use in a URL authority.
pub(crate) fn authority_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_tags() {
        assert_eq!(Protocol::from_tag("ss").unwrap(), Protocol::Shadowsocks);
        assert_eq!(Protocol::from_tag("Trojan-Go").unwrap(), Protocol::Trojan);
        assert_eq!(
            Protocol::from_tag("pingtunnel"),
            Err(ServerObjError::UnsupportedProtocol("pingtunnel".into()))
        );
        assert_eq!(Protocol::from_link("vless://id@host:1").unwrap(), Protocol::Vless);
        assert!(Protocol::from_link("no scheme").is_err());
    }

    #[test]
    fn test_tag_must_match_scheme() {
        let link = "trojan://secret@example.com:443#node";
        assert!(ServerObj::from_link("trojan", link).is_ok());
        assert!(matches!(
            ServerObj::from_link("vmess", link),
            Err(ServerObjError::InvalidLink { protocol: Protocol::Vmess, .. })
        ));
    }

    #[test]
    fn test_serialized_form_is_tagged() {
        let obj = ServerObj::from_link_auto("trojan://secret@example.com:443#node").unwrap();
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["protocol"], "trojan");
        let back: ServerObj = serde_json::from_value(json).unwrap();
        assert_eq!(back, obj);
    }

    #[test]
    fn test_decode_base64_variants() {
        assert_eq!(decode_base64("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_base64("aGVsbG8").unwrap(), b"hello");
        assert_eq!(decode_base64("-_8").unwrap(), vec![0xfb, 0xff]);
        assert!(decode_base64("!!").is_none());
    }
}
