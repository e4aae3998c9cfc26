use std::time::Instant;

use axum::{http::Request, middleware::Next, response::Response};
use hyper::Method;
use tracing::info;

pub async fn logger_middleware<B>(
    method: Method,
    request: Request<B>,
    next: Next<B>,
) -> Response {
    let uri = request.uri().clone();
    let started = Instant::now();
    info!("{} {}", method, uri);

    let response = next.run(request).await;

    info!(
        "{} {} -> {} in {:?}",
        method,
        uri,
        response.status(),
        started.elapsed()
    );
    response
}
