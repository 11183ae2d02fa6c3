//! Registration throttling and request logging.

use crate::error::ProvisioningError;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{sync::Arc, time::Instant};
use tracing::{debug, warn};

/// Budget for new registrations, shared by all clients.
///
/// Every registration rewrites the PJSIP file and reloads the telephony
/// server, so only `/register` draws from it. Read-only routes are free.
#[derive(Clone)]
pub struct RegistrationThrottle {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RegistrationThrottle {
    pub fn new(quota: Quota) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Take one registration slot, or report when the next one frees up.
    pub fn acquire(&self) -> Result<(), ProvisioningError> {
        self.limiter.check().map_err(|not_until| {
            ProvisioningError::RateLimitExceeded {
                retry_after: not_until.wait_time_from(self.limiter.clock().now()),
            }
        })
    }
}

/// Answer 429 with `Retry-After` once the registration budget is spent.
pub async fn throttle_registrations(
    State(throttle): State<RegistrationThrottle>,
    request: Request,
    next: Next,
) -> Result<Response, ProvisioningError> {
    if let Err(e) = throttle.acquire() {
        warn!("Registration throttled: {}", e);
        return Err(e);
    }

    Ok(next.run(request).await)
}

/// Log requests by route template, so identifiers in the path stay out of
/// the logs. Bodies are never logged.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "<unmatched>".to_owned());
    let method = request.method().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;
    if status.is_server_error() {
        warn!(%method, %route, %status, elapsed_ms, "Request failed");
    } else {
        debug!(%method, %route, %status, elapsed_ms, "Request handled");
    }

    response
}
