use axum::http::HeaderMap;
use std::net::SocketAddr;

const UNKNOWN: &str = "unknown";
const DEFAULT_CLIENT: &str = "default";
const IPV4_MAPPED_PREFIX: &str = "::ffff:";
const MAX_CLIENT_ID_CHARS: usize = 64;
const MAX_USERNAME_CHARS: usize = 128;

/// 归一化后的登录身份，决定限流记录落在哪两个 key 上
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginIdentity {
    ip: String,
    client_id: String,
    username: String,
}

impl LoginIdentity {
    /// 缺失或为空的字段都会落到固定的默认桶（unknown / default），不会报错
    pub fn new(ip: Option<&str>, client_id: Option<&str>, username: Option<&str>) -> Self {
        Self {
            ip: normalize_ip(ip),
            client_id: normalize_token(client_id, MAX_CLIENT_ID_CHARS, DEFAULT_CLIENT),
            username: normalize_token(username, MAX_USERNAME_CHARS, UNKNOWN),
        }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn ip_key(&self) -> String {
        format!("ip:{}", self.ip)
    }

    pub fn user_key(&self) -> String {
        format!("user:{}:{}:{}", self.ip, self.client_id, self.username)
    }
}

fn normalize_ip(raw: Option<&str>) -> String {
    let lowered = raw.unwrap_or_default().trim().to_lowercase();
    let ip = lowered
        .strip_prefix(IPV4_MAPPED_PREFIX)
        .unwrap_or(lowered.as_str())
        .trim();
    if ip.is_empty() {
        UNKNOWN.to_string()
    } else {
        ip.to_string()
    }
}

fn normalize_token(raw: Option<&str>, max_chars: usize, fallback: &str) -> String {
    let value: String = raw
        .unwrap_or_default()
        .trim()
        .to_lowercase()
        .chars()
        .take(max_chars)
        .collect();
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// 提取客户端 IP
///
/// 只有 `trust_proxy` 打开时才读取 X-Forwarded-For（第一个非空项）和 X-Real-IP，
/// 否则一律使用 socket 对端地址，避免客户端伪造头部绕过 IP 限流。
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').map(str::trim).find(|s| !s.is_empty()));
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(ip) = real_ip {
            return Some(ip.to_string());
        }
    }

    peer.map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_ipv4_mapped_address_shares_key() {
        let mapped = LoginIdentity::new(Some("::ffff:192.0.2.1"), None, Some("alice"));
        let plain = LoginIdentity::new(Some("192.0.2.1"), None, Some("alice"));
        assert_eq!(mapped.ip_key(), plain.ip_key());
        assert_eq!(mapped.user_key(), plain.user_key());
        assert_eq!(plain.ip_key(), "ip:192.0.2.1");
    }

    #[test]
    fn test_missing_fields_use_default_buckets() {
        let identity = LoginIdentity::new(None, Some("   "), None);
        assert_eq!(identity.ip_key(), "ip:unknown");
        assert_eq!(identity.user_key(), "user:unknown:default:unknown");
    }

    #[test]
    fn test_case_and_whitespace_are_normalized() {
        let identity = LoginIdentity::new(Some(" ::FFFF:10.0.0.1 "), Some(" Tablet "), Some(" Admin "));
        assert_eq!(identity.user_key(), "user:10.0.0.1:tablet:admin");
    }

    #[test]
    fn test_long_fields_are_truncated() {
        let client = "c".repeat(100);
        let username = "ü".repeat(200);
        let identity = LoginIdentity::new(Some("10.0.0.1"), Some(&client), Some(&username));
        assert_eq!(identity.client_id().chars().count(), 64);
        assert_eq!(identity.username().chars().count(), 128);
    }

    #[test]
    fn test_client_ip_ignores_headers_without_trust_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer), false).as_deref(), Some("127.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer), true).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn test_client_ip_forwarded_chain_and_fallbacks() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" , 198.51.100.7, 10.0.0.2"));
        assert_eq!(client_ip(&headers, None, true).as_deref(), Some("198.51.100.7"));

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.8"));
        assert_eq!(client_ip(&headers, None, true).as_deref(), Some("198.51.100.8"));

        assert_eq!(client_ip(&HeaderMap::new(), None, true), None);
    }
}
