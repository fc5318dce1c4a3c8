//! HTTP endpoints for the edge filter.
//!
//! `/check` is meant to sit behind a forward-auth hook of the fronting proxy:
//! the proxy passes the original request's headers and acts on the status.
//! 200 with an empty body means "continue to the application"; 403 and 429
//! carry a plain-text reason.

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::core::{Pipeline, Verdict};
use crate::models::{ClientRequest, Config, DenyReason, FilterConfig, FilterDecision};

pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<Config>,
    pub metrics: Option<PrometheusHandle>,
}

/// API configuration function for Actix-web
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health_check)))
        .service(web::resource("/metrics").route(web::get().to(render_metrics)))
        .service(web::resource("/check").to(check_request));
}

/// Health check endpoint response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    mode: String,
}

/// Health check endpoint
async fn health_check(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode: state.pipeline.mode_label().to_string(),
    })
}

/// Prometheus scrape endpoint
async fn render_metrics(state: web::Data<ApiState>) -> impl Responder {
    match &state.metrics {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}

/// Admission check for the calling request
pub async fn check_request(state: web::Data<ApiState>, req: HttpRequest) -> impl Responder {
    let client = client_request(&req, &state.config.filter);
    let verdict = state.pipeline.evaluate(&client).await;
    respond(&verdict)
}

/// Build the filter's view of an HTTP request
///
/// The client key is the TCP peer address unless `client_key_header` is
/// configured, in which case that header is used as set by the trusted
/// proxy in front of the filter. `Forwarded`/`X-Forwarded-For` are never
/// consulted on their own since any client can write them.
pub fn client_request(req: &HttpRequest, filter: &FilterConfig) -> ClientRequest {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let client_key = filter
        .client_key_header
        .as_deref()
        .and_then(|name| header(name))
        .map(|value| strip_port(&value))
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    ClientRequest {
        country: header(&filter.country_header),
        client_key,
        identity: header("User-Agent"),
    }
}

fn strip_port(addr: &str) -> String {
    if let Ok(socket) = addr.parse::<SocketAddr>() {
        return socket.ip().to_string();
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return ip.to_string();
    }
    addr.to_string()
}

fn respond(verdict: &Verdict) -> HttpResponse {
    let status = StatusCode::from_u16(verdict.decision.status()).unwrap_or(StatusCode::OK);
    let mut builder = HttpResponse::build(status);

    if let Some(rate_limit) = verdict.rate_limit {
        builder.insert_header(("X-RateLimit-Limit", rate_limit.limit.to_string()));
        builder.insert_header(("X-RateLimit-Remaining", rate_limit.remaining.to_string()));
    }

    match &verdict.decision {
        FilterDecision::Allow => builder.finish(),
        FilterDecision::Deny(reason) => {
            if let (DenyReason::TooManyRequests, Some(rate_limit)) = (reason, verdict.rate_limit) {
                let reset = rate_limit.reset_after;
                let secs = reset.as_secs() + u64::from(reset.subsec_nanos() > 0);
                builder.insert_header(("Retry-After", secs.max(1).to_string()));
            }
            builder
                .content_type("text/plain; charset=utf-8")
                .body(reason.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProtectionMode;
    use crate::store::MemoryStore;
    use actix_web::{test, App};

    const CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) Chrome/120.0 Safari/537.36";

    fn state(mode: ProtectionMode) -> web::Data<ApiState> {
        let mut config = Config::default();
        config.filter.blocked_countries = vec!["RU".to_string()];
        config.filter.allowed_identities = vec!["Chrome".to_string()];
        let pipeline = Pipeline::new(&config, mode, None);

        web::Data::new(ApiState {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
            metrics: None,
        })
    }

    fn enforced() -> web::Data<ApiState> {
        state(ProtectionMode::Enforced(Arc::new(MemoryStore::new())))
    }

    fn check(country: Option<&str>, identity: Option<&str>) -> test::TestRequest {
        let mut req = test::TestRequest::get()
            .uri("/check")
            .peer_addr("203.0.113.5:41000".parse().unwrap());
        if let Some(country) = country {
            req = req.insert_header(("CF-IPCountry", country));
        }
        if let Some(identity) = identity {
            req = req.insert_header(("User-Agent", identity));
        }
        req
    }

    #[actix_web::test]
    async fn test_health_check() {
        let app = test::init_service(App::new().app_data(enforced()).configure(config)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(resp["status"], "ok");
        assert_eq!(resp["mode"], "enforced");
    }

    #[actix_web::test]
    async fn test_blocked_country_body_names_country() {
        let app = test::init_service(App::new().app_data(enforced()).configure(config)).await;

        let resp = test::call_service(&app, check(Some("RU"), Some(CHROME)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body = test::read_body(resp).await;
        assert!(std::str::from_utf8(&body).unwrap().contains("RU"));
    }

    #[actix_web::test]
    async fn test_curl_without_country_is_forbidden() {
        let app = test::init_service(App::new().app_data(enforced()).configure(config)).await;

        let resp = test::call_service(&app, check(None, Some("curl/8.0")).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body = test::read_body(resp).await;
        assert_eq!(body, "identity not allowed");
    }

    #[actix_web::test]
    async fn test_rate_limit_returns_429_on_eleventh_request() {
        let app = test::init_service(App::new().app_data(enforced()).configure(config)).await;

        for _ in 0..10 {
            let resp = test::call_service(&app, check(Some("US"), Some(CHROME)).to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert!(test::read_body(resp).await.is_empty());
        }

        let resp = test::call_service(&app, check(Some("US"), Some(CHROME)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("X-RateLimit-Remaining").unwrap(), "0");
        assert!(resp.headers().contains_key("Retry-After"));
        assert_eq!(test::read_body(resp).await, "too many requests");
    }

    #[actix_web::test]
    async fn test_disabled_mode_passes_everything() {
        let app = test::init_service(
            App::new()
                .app_data(state(ProtectionMode::Disabled))
                .configure(config),
        )
        .await;

        let resp = test::call_service(&app, check(Some("RU"), None).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_client_key_ignores_forwarded_for() {
        let filter = Config::default().filter;
        let req = test::TestRequest::get()
            .peer_addr("10.0.0.2:5000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "198.51.100.23, 10.0.0.1"))
            .insert_header(("Forwarded", "for=198.51.100.24"))
            .insert_header(("CF-IPCountry", "DE"))
            .to_http_request();

        let client = client_request(&req, &filter);
        assert_eq!(client.client_key, "10.0.0.2");
        assert_eq!(client.country.as_deref(), Some("DE"));
        assert_eq!(client.identity, None);
    }

    #[actix_web::test]
    async fn test_client_key_from_trusted_header() {
        let mut filter = Config::default().filter;
        filter.client_key_header = Some("CF-Connecting-IP".to_string());

        let req = test::TestRequest::get()
            .peer_addr("10.0.0.2:5000".parse().unwrap())
            .insert_header(("CF-Connecting-IP", " 198.51.100.23 "))
            .to_http_request();
        assert_eq!(client_request(&req, &filter).client_key, "198.51.100.23");

        // Header missing: fall back to the peer.
        let direct = test::TestRequest::get()
            .peer_addr("10.0.0.2:5000".parse().unwrap())
            .to_http_request();
        assert_eq!(client_request(&direct, &filter).client_key, "10.0.0.2");
    }

    #[actix_web::test]
    async fn test_rotating_forwarded_for_is_still_rate_limited() {
        let app = test::init_service(App::new().app_data(enforced()).configure(config)).await;

        let mut admitted = 0;
        for i in 0..50 {
            let req = check(Some("US"), Some(CHROME))
                .insert_header(("X-Forwarded-For", format!("10.9.9.{}", i)))
                .to_request();
            if test::call_service(&app, req).await.status() == StatusCode::OK {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }

    #[actix_web::test]
    async fn test_strip_port() {
        assert_eq!(strip_port("198.51.100.23:443"), "198.51.100.23");
        assert_eq!(strip_port("[2001:db8::1]:8080"), "2001:db8::1");
        assert_eq!(strip_port("2001:db8::1"), "2001:db8::1");
        assert_eq!(strip_port("edge-node"), "edge-node");
    }

    #[actix_web::test]
    async fn test_metrics_disabled_without_recorder() {
        let app = test::init_service(App::new().app_data(enforced()).configure(config)).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
