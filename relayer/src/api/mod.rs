mod endpoints;
mod errors;
mod handler;
mod types;

pub use endpoints::{Endpoints, TransactionSubmitter};
pub use handler::{ClientInfo, Handler};

use std::{num::NonZeroU32, sync::Arc};

use actix_web::{
    error::InternalError,
    get,
    http::{header, Method, StatusCode},
    middleware::{Condition, DefaultHeaders, Logger},
    web, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use metrics::{
    prometheus::{self, Encoder, Registry, TextEncoder},
    HealthChecker,
};
use services::HealthReporter;

use crate::{
    config::Config,
    errors::{Error, Result},
};

use self::types::{Request, Response};

const MAX_REQUEST_CONTENT_LENGTH: usize = 1024 * 1024 * 5;
const CONTENT_TYPE: &str = "application/json";
// https://www.jsonrpc.org/historical/json-rpc-over-http.html#http-header
const ACCEPTED_CONTENT_TYPES: [&str; 3] = [
    CONTENT_TYPE,
    "application/json-rpc",
    "application/jsonrequest",
];

struct AppState {
    handler: Handler,
    batch_requests_enabled: bool,
    batch_requests_limit: usize,
    rate_limiter: Option<DefaultKeyedRateLimiter<String>>,
}

pub async fn launch_api_server<Db, S>(
    config: &Config,
    metrics_registry: Registry,
    storage: Db,
    sender: Arc<S>,
    sequencer_health_check: HealthChecker,
    l2_node_health_check: HealthChecker,
) -> Result<()>
where
    Db: services::ports::storage::Storage + 'static,
    S: TransactionSubmitter + 'static,
{
    let state = web::Data::new(AppState {
        handler: Handler::new(Arc::new(Endpoints::new(storage, sender))),
        batch_requests_enabled: config.server.batch_requests_enabled,
        batch_requests_limit: config.server.batch_requests_limit,
        rate_limiter: NonZeroU32::new(config.server.max_requests_per_ip_and_second)
            .map(|max_rps| RateLimiter::keyed(Quota::per_second(max_rps))),
    });

    let metrics_registry = Arc::new(metrics_registry);
    let health_reporter = Arc::new(HealthReporter::new(
        sequencer_health_check,
        l2_node_health_check,
    ));
    let enable_http_log = config.server.enable_http_log;

    HttpServer::new(move || {
        App::new()
            .wrap(Condition::new(enable_http_log, Logger::default()))
            .wrap(
                DefaultHeaders::new()
                    .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
                    .add((header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"))
                    .add((
                        header::ACCESS_CONTROL_ALLOW_HEADERS,
                        "Accept, Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization",
                    )),
            )
            .app_data(web::Data::clone(&state))
            .app_data(web::Data::new(Arc::clone(&metrics_registry)))
            .app_data(web::Data::new(Arc::clone(&health_reporter)))
            .app_data(web::PayloadConfig::new(MAX_REQUEST_CONTENT_LENGTH))
            .service(health)
            .service(metrics_endpoint)
            .default_service(web::route().to(handle_rpc))
    })
    .bind((config.server.host, config.server.port))
    .map_err(|e| Error::Other(e.to_string()))?
    .run()
    .await
    .map_err(|e| Error::Other(e.to_string()))
}

async fn handle_rpc(req: HttpRequest, body: web::Bytes, state: web::Data<AppState>) -> HttpResponse {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check_key(&rate_limit_key(&req)).is_err() {
            return HttpResponse::TooManyRequests().body("too many requests from this IP");
        }
    }

    let method = req.method();
    if method == Method::OPTIONS {
        HttpResponse::Ok().finish()
    } else if method == Method::GET {
        HttpResponse::Ok()
            .content_type(CONTENT_TYPE)
            .body("zkEVM Pool Manager")
    } else if method == Method::POST {
        handle_post(&req, &body, &state).await
    } else {
        HttpResponse::MethodNotAllowed().body(format!("method {method} not allowed"))
    }
}

async fn handle_post(req: &HttpRequest, body: &web::Bytes, state: &AppState) -> HttpResponse {
    if body.len() > MAX_REQUEST_CONTENT_LENGTH {
        return HttpResponse::PayloadTooLarge().body(format!(
            "content length too large ({} > {MAX_REQUEST_CONTENT_LENGTH})",
            body.len()
        ));
    }

    if !has_accepted_content_type(req) {
        return HttpResponse::UnsupportedMediaType()
            .body(format!("invalid content type, only {CONTENT_TYPE} is supported"));
    }

    let whitespace = body
        .iter()
        .take_while(|byte| matches!(byte, b' ' | b'\t' | b'\r' | b'\n'))
        .count();
    let data = &body[whitespace..];

    if data.is_empty() {
        return HttpResponse::BadRequest().body("empty request body");
    }

    let client = ClientInfo {
        ip: forwarded_for_ip(req),
    };

    if data[0] != b'[' {
        handle_single_request(state, data, client).await
    } else {
        handle_batch_request(state, data, client).await
    }
}

async fn handle_single_request(state: &AppState, data: &[u8], client: ClientInfo) -> HttpResponse {
    let Ok(request) = serde_json::from_slice::<Request>(data) else {
        return HttpResponse::BadRequest().body("invalid json object request body");
    };

    let response = state.handler.handle(request, client).await;
    json_response(&response)
}

async fn handle_batch_request(state: &AppState, data: &[u8], client: ClientInfo) -> HttpResponse {
    if !state.batch_requests_enabled {
        return HttpResponse::BadRequest().body("batch requests are disabled");
    }

    let Ok(requests) = serde_json::from_slice::<Vec<Request>>(data) else {
        return HttpResponse::BadRequest().body("invalid json array request body");
    };

    if state.batch_requests_limit > 0 && requests.len() > state.batch_requests_limit {
        return HttpResponse::PayloadTooLarge().body("batch requests limit exceeded");
    }

    let mut responses = Vec::with_capacity(requests.len());
    for request in requests {
        responses.push(state.handler.handle(request, client.clone()).await);
    }

    match serde_json::to_string(&responses) {
        Ok(body) => HttpResponse::Ok().content_type(CONTENT_TYPE).body(body),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

fn json_response(response: &Response) -> HttpResponse {
    match serde_json::to_string(response) {
        Ok(body) => HttpResponse::Ok().content_type(CONTENT_TYPE).body(body),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

fn has_accepted_content_type(req: &HttpRequest) -> bool {
    let Some(content_type) = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };

    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    ACCEPTED_CONTENT_TYPES.contains(&media_type.as_str())
}

// The address persisted with the transaction: first `X-Forwarded-For`
// token, or empty. No peer-address fallback; the column records what the
// proxy reported and nothing else.
fn forwarded_for_ip(req: &HttpRequest) -> String {
    req.headers()
        .get("X-Forwarded-For")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .unwrap_or_default()
}

// Rate limiting keys on the forwarded address when present and falls back
// to the peer address, so directly connected clients are bounded too.
fn rate_limit_key(req: &HttpRequest) -> String {
    let forwarded = forwarded_for_ip(req);
    if forwarded.is_empty() {
        req.peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default()
    } else {
        forwarded
    }
}

#[get("/health")]
async fn health(data: web::Data<Arc<HealthReporter>>) -> impl Responder {
    let report = data.generate_report();

    let mut response = if report.is_healthy() {
        HttpResponse::Ok()
    } else {
        HttpResponse::InternalServerError()
    };

    response.json(report)
}

#[get("/metrics")]
async fn metrics_endpoint(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let mut buf: Vec<u8> = vec![];
    let mut encode = |metrics: &_| {
        encoder
            .encode(metrics, &mut buf)
            .map_err(map_to_internal_err)
    };

    encode(&registry.gather())?;
    encode(&prometheus::gather())?;

    let text = String::from_utf8(buf).map_err(map_to_internal_err)?;

    std::result::Result::<_, InternalError<_>>::Ok(text)
}

fn map_to_internal_err(error: impl std::error::Error) -> InternalError<String> {
    InternalError::new(error.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
}
