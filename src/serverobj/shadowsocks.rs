//! Shadowsocks servers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::serverobj::{
    authority_host, bare_host, decode_base64, decode_component, parse_port, Protocol,
    ServerObjError, ServerObjResult,
};

/// A Shadowsocks server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shadowsocks {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub cipher: String,
    pub password: String,
    pub plugin: String,
}

impl Shadowsocks {
    /// Parse either SIP002 (`ss://base64(method:pass)@host:port/?plugin=…#name`)
    /// or the older fully-encoded form (`ss://base64(method:pass@host:port)#name`).
    pub fn parse(link: &str) -> ServerObjResult<Self> {
        let invalid = |reason: &str| ServerObjError::invalid(Protocol::Shadowsocks, reason);

        let rest = link
            .trim()
            .strip_prefix("ss://")
            .ok_or_else(|| invalid("missing ss:// prefix"))?;
        let (rest, name) = match rest.split_once('#') {
            Some((rest, name)) => (rest, decode_component(name)),
            None => (rest, String::new()),
        };
        let (rest, query) = rest.split_once('?').unwrap_or((rest, ""));

        let (userinfo, hostport) = match rest.rsplit_once('@') {
            Some((user, hostport)) => {
                let user = decode_component(user);
                let userinfo = match decode_base64(&user).and_then(|b| String::from_utf8(b).ok()) {
                    Some(decoded) if decoded.contains(':') => decoded,
                    _ => user,
                };
                (userinfo, hostport.trim_end_matches('/').to_string())
            }
            None => {
                let decoded = decode_base64(rest)
                    .and_then(|b| String::from_utf8(b).ok())
                    .ok_or_else(|| invalid("payload is not base64"))?;
                let (user, hostport) = decoded
                    .rsplit_once('@')
                    .ok_or_else(|| invalid("missing server address"))?;
                (user.to_string(), hostport.to_string())
            }
        };

        let (cipher, password) = userinfo
            .split_once(':')
            .ok_or_else(|| invalid("missing cipher"))?;
        let (host, port) = hostport
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        let host = bare_host(host);
        if host.is_empty() {
            return Err(invalid("missing address"));
        }
        if cipher.is_empty() {
            return Err(invalid("missing cipher"));
        }

        let plugin = url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == "plugin")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            server: host.to_string(),
            port: parse_port(Protocol::Shadowsocks, port)?,
            cipher: cipher.to_string(),
            password: password.to_string(),
            plugin,
        })
    }

    pub fn export(&self) -> String {
        let user = URL_SAFE_NO_PAD.encode(format!("{}:{}", self.cipher, self.password));
        let mut link = format!("ss://{}@{}:{}", user, authority_host(&self.server), self.port);
        if !self.plugin.is_empty() {
            link.push_str("/?plugin=");
            link.push_str(&urlencoding::encode(&self.plugin));
        }
        if !self.name.is_empty() {
            link.push('#');
            link.push_str(&urlencoding::encode(&self.name));
        }
        link
    }
}
