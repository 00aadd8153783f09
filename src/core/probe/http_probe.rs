// src/core/probe/http_probe.rs

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect::Policy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{cookies_from_headers, HttpRequest, HttpSnapshot, MAX_BODY_BYTES, USER_AGENT};
use crate::core::error::ProbeError;
use crate::core::guard::{is_blocked_redirect_host, is_internal, HostResolver};
use crate::core::models::Target;

pub(crate) struct HttpOptions {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub resolver: Arc<dyn HostResolver>,
}

/// DNS for redirect hops. The original host is pinned to its validated address, so
/// this only sees hosts a redirect points at; internal answers are refused.
struct GuardedDns {
    resolver: Arc<dyn HostResolver>,
    allow_private: bool,
}

impl Resolve for GuardedDns {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.resolver.clone();
        let allow_private = self.allow_private;
        Box::pin(async move {
            let host = name.as_str().to_string();
            let answer = resolver.lookup(&host).await?;
            if !allow_private {
                if let Some(ip) = answer.iter().find(|ip| is_internal(**ip)) {
                    warn!(host = %host, %ip, "Refusing redirect hop to internal address.");
                    return Err(format!("redirect target {} resolves to internal address {}", host, ip).into());
                }
            }
            let addrs: Addrs = Box::new(answer.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok(addrs)
        })
    }
}

fn redirect_policy(request: &HttpRequest, max_redirects: usize, counter: Arc<AtomicUsize>) -> Policy {
    if !request.follow_redirects {
        return Policy::none();
    }
    let allow_private = request.allow_private_redirects;
    Policy::custom(move |attempt| {
        let hops = attempt.previous().len();
        if hops > max_redirects {
            debug!(hops, "Redirect limit reached.");
            return attempt.stop();
        }
        let blocked = attempt
            .url()
            .host()
            .map(|host| !allow_private && is_blocked_redirect_host(&host))
            .unwrap_or(true);
        if blocked {
            warn!(url = %attempt.url(), "Not following redirect to internal host.");
            return attempt.stop();
        }
        counter.store(hops, Ordering::SeqCst);
        attempt.follow()
    })
}

fn classify_error(e: &reqwest::Error, timeout: Duration) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout(timeout)
    } else if e.is_connect() {
        ProbeError::Connect(e.to_string())
    } else {
        ProbeError::Http(e.to_string())
    }
}

/// Sends one request and captures the response, or the reason it failed.
///
/// The target's hostname is pinned to its validated IP, so the request cannot be
/// re-resolved somewhere else between validation and connect.
pub(crate) async fn send(target: &Target, request: &HttpRequest, options: &HttpOptions) -> Result<HttpSnapshot, ProbeError> {
    info!(method = %request.method, url = %request.url, "Sending HTTP probe.");

    let redirects = Arc::new(AtomicUsize::new(0));
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(options.timeout)
        .connect_timeout(options.timeout)
        .redirect(redirect_policy(request, options.max_redirects, redirects.clone()))
        .resolve(target.hostname(), SocketAddr::new(target.resolved_ip(), target.port()))
        .dns_resolver(Arc::new(GuardedDns {
            resolver: options.resolver.clone(),
            allow_private: request.allow_private_redirects,
        }))
        .build()
        .map_err(|e| ProbeError::Http(format!("could not build HTTP client: {}", e)))?;

    let mut response = client
        .request(request.method.clone(), request.url.clone())
        .send()
        .await
        .map_err(|e| {
            warn!(url = %request.url, error = %e, "HTTP probe failed.");
            classify_error(&e, options.timeout)
        })?;

    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let final_url = response.url().to_string();
    info!(status, final_url = %final_url, "Received HTTP response.");

    let mut body = Vec::new();
    while body.len() < MAX_BODY_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let room = MAX_BODY_BYTES - body.len();
                body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
            Ok(None) => break,
            Err(e) => {
                // Headers already arrived; a broken body only shortens what we keep.
                debug!(error = %e, "Response body read aborted.");
                break;
            }
        }
    }

    Ok(HttpSnapshot {
        status,
        cookies: cookies_from_headers(&headers),
        headers,
        final_url,
        redirects: redirects.load(Ordering::SeqCst),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}
