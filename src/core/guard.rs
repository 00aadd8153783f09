// src/core/guard.rs

//! Target resolution and the SSRF guard.
//!
//! Every scan starts here: the raw URL is parsed, its scheme and host checked,
//! the host resolved, and every resolved address classified. A [`Target`] only
//! comes out of this module once all of that has passed.

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use strum::Display;
use tracing::{debug, info, warn};
use url::{Host, ParseError, Url};

use crate::core::error::ScanError;
use crate::core::models::{Scheme, Target};

/// Resolves hostnames to addresses. Abstracted so the guard can be exercised
/// without touching the network.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, String>;
}

/// System DNS resolution through hickory's tokio resolver.
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
}

impl DnsResolver {
    pub fn new() -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        }
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostResolver for DnsResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, String> {
        debug!(host, "Resolving host.");
        match self.resolver.lookup_ip(host).await {
            Ok(answer) => Ok(answer.iter().collect()),
            Err(e) => {
                warn!(host, error = %e, "DNS lookup failed.");
                Err(e.to_string())
            }
        }
    }
}

/// Why an address counts as internal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum AddressClass {
    Private,
    Loopback,
    LinkLocal,
    Multicast,
    Unspecified,
    Broadcast,
    SharedAddressSpace,
    Documentation,
    Reserved,
    UniqueLocal,
}

/// Classifies an address, returning `None` for ordinary public unicast addresses.
pub fn classify(ip: IpAddr) -> Option<AddressClass> {
    match ip {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => classify_v6(v6),
    }
}

pub fn is_internal(ip: IpAddr) -> bool {
    classify(ip).is_some()
}

fn classify_v4(ip: Ipv4Addr) -> Option<AddressClass> {
    let [a, b, c, _] = ip.octets();
    if ip.is_unspecified() {
        Some(AddressClass::Unspecified)
    } else if ip.is_loopback() {
        Some(AddressClass::Loopback)
    } else if ip.is_private() {
        Some(AddressClass::Private)
    } else if ip.is_link_local() {
        Some(AddressClass::LinkLocal)
    } else if ip.is_multicast() {
        Some(AddressClass::Multicast)
    } else if ip.is_broadcast() {
        Some(AddressClass::Broadcast)
    } else if a == 100 && (64..128).contains(&b) {
        Some(AddressClass::SharedAddressSpace)
    } else if ip.is_documentation() {
        Some(AddressClass::Documentation)
    } else if a == 0 || a >= 240 || (a == 192 && b == 0 && c == 0) || (a == 198 && (b == 18 || b == 19)) {
        Some(AddressClass::Reserved)
    } else {
        None
    }
}

fn classify_v6(ip: Ipv6Addr) -> Option<AddressClass> {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return classify_v4(mapped);
    }
    let first = ip.segments()[0];
    if ip.is_unspecified() {
        Some(AddressClass::Unspecified)
    } else if ip.is_loopback() {
        Some(AddressClass::Loopback)
    } else if ip.is_multicast() {
        Some(AddressClass::Multicast)
    } else if first & 0xfe00 == 0xfc00 {
        Some(AddressClass::UniqueLocal)
    } else if first & 0xffc0 == 0xfe80 {
        Some(AddressClass::LinkLocal)
    } else if first == 0x2001 && ip.segments()[1] == 0x0db8 {
        Some(AddressClass::Documentation)
    } else {
        None
    }
}

/// True for redirect hosts the HTTP probe must never follow: internal IP literals
/// and the `localhost` names.
pub fn is_blocked_redirect_host(host: &Host<&str>) -> bool {
    match host {
        Host::Ipv4(v4) => is_internal(IpAddr::V4(*v4)),
        Host::Ipv6(v6) => is_internal(IpAddr::V6(*v6)),
        Host::Domain(name) => {
            let name = name.trim_end_matches('.').to_ascii_lowercase();
            name == "localhost" || name.ends_with(".localhost")
        }
    }
}

/// The syntactic part of validation: scheme, host and port, no network access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTarget {
    pub url: Url,
    pub scheme: Scheme,
    pub hostname: String,
    pub literal_ip: Option<IpAddr>,
    pub port: u16,
}

/// Parses a raw target URL and checks scheme and host.
pub fn parse_target(raw_url: &str) -> Result<ParsedTarget, ScanError> {
    let trimmed = raw_url.trim();
    let url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(ParseError::RelativeUrlWithoutBase) => return Err(ScanError::InvalidScheme(String::new())),
        Err(ParseError::EmptyHost) => return Err(ScanError::InvalidHost),
        Err(e) => {
            return Err(ScanError::InvalidUrl {
                url: trimmed.to_string(),
                reason: e.to_string(),
            });
        }
    };

    let scheme = match url.scheme() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        other => return Err(ScanError::InvalidScheme(other.to_string())),
    };

    let (hostname, literal_ip) = match url.host() {
        Some(Host::Domain(d)) if !d.is_empty() => (d.trim_end_matches('.').to_ascii_lowercase(), None),
        Some(Host::Ipv4(v4)) => (v4.to_string(), Some(IpAddr::V4(v4))),
        Some(Host::Ipv6(v6)) => (v6.to_string(), Some(IpAddr::V6(v6))),
        _ => return Err(ScanError::InvalidHost),
    };
    if hostname.is_empty() {
        return Err(ScanError::InvalidHost);
    }

    let port = url.port_or_known_default().unwrap_or(match scheme {
        Scheme::Http => 80,
        Scheme::Https => 443,
    });

    Ok(ParsedTarget { url, scheme, hostname, literal_ip, port })
}

/// Resolves and validates scan targets.
#[derive(Clone)]
pub struct TargetGuard {
    resolver: Arc<dyn HostResolver>,
}

impl TargetGuard {
    pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
        Self { resolver }
    }

    /// Turns a raw URL into a probe-safe [`Target`].
    ///
    /// Scheme and host problems are reported before any DNS traffic. When
    /// `allow_private` is false, a target is blocked if *any* of its resolved
    /// addresses is internal, so a round-robin record cannot smuggle one in.
    pub async fn resolve_and_validate(&self, raw_url: &str, allow_private: bool) -> Result<Target, ScanError> {
        let parsed = parse_target(raw_url)?;

        let addresses = match parsed.literal_ip {
            Some(ip) => vec![ip],
            None => {
                let answer = self.resolver.lookup(&parsed.hostname).await.map_err(|reason| {
                    ScanError::ResolutionFailed {
                        host: parsed.hostname.clone(),
                        reason,
                    }
                })?;
                if answer.is_empty() {
                    return Err(ScanError::ResolutionFailed {
                        host: parsed.hostname.clone(),
                        reason: "no addresses returned".to_string(),
                    });
                }
                answer
            }
        };

        if !allow_private {
            if let Some((ip, class)) = addresses.iter().find_map(|ip| classify(*ip).map(|c| (*ip, c))) {
                warn!(host = %parsed.hostname, %ip, %class, "Target blocked by SSRF guard.");
                return Err(ScanError::TargetBlocked { host: parsed.hostname, ip });
            }
        }

        let resolved_ip = addresses[0];
        info!(host = %parsed.hostname, %resolved_ip, "Target validated.");
        Ok(Target::new(
            parsed.url.as_str(),
            parsed.scheme,
            &parsed.hostname,
            parsed.port,
            resolved_ip,
        ))
    }
}
