//! Adapters between framework requests/responses and the validator's
//! framework neutral shapes.

pub mod multipart;

use crate::framework::{canonical_pattern, Request, Response};
use crate::validator::{
    media_essence, parse_urlencoded, OpenApiRequest, OpenApiResponse, RequestBody,
    RequestParameters,
};
use tracing::debug;

/// Route pattern used for operation lookup. Without a matched route the
/// literal request path stands in.
pub fn path_pattern(request: &Request) -> String {
    request
        .matched_route()
        .map(|route| canonical_pattern(&route.pattern))
        .unwrap_or_else(|| request.path.clone())
}

/// Application URL joined with the path pattern.
pub fn full_url_pattern(request: &Request) -> String {
    format!(
        "{}/{}",
        request.application_url.trim_end_matches('/'),
        path_pattern(request).trim_start_matches('/')
    )
}

fn header_pairs(headers: &http::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Form bodies are decoded here; everything else stays raw.
fn request_body(request: &Request, mimetype: &str) -> RequestBody {
    match media_essence(mimetype).as_str() {
        "application/x-www-form-urlencoded" => RequestBody::Form(parse_urlencoded(&request.body)),
        "multipart/form-data" => match multipart::parse(&request.body, mimetype) {
            Ok(fields) => RequestBody::Form(fields),
            Err(reason) => {
                debug!(%reason, "Leaving undecodable multipart body raw");
                RequestBody::Raw(request.body.clone())
            }
        },
        _ => RequestBody::Raw(request.body.clone()),
    }
}

/// Adapt a framework request.
pub fn openapi_request(request: &Request) -> OpenApiRequest {
    // The full header value is kept: multipart decoding needs the boundary.
    let mimetype = request.content_type().unwrap_or_default().to_string();
    OpenApiRequest {
        method: request.method.as_str().to_ascii_lowercase(),
        full_url_pattern: full_url_pattern(request),
        host_url: request.application_url.clone(),
        path: request.path.clone(),
        path_pattern: path_pattern(request),
        parameters: RequestParameters {
            path: request.matchdict().clone(),
            query: request.query.clone(),
            header: header_pairs(&request.headers),
            cookie: request.cookies(),
        },
        body: request_body(request, &mimetype),
        mimetype,
    }
}

/// Adapt a framework response.
pub fn openapi_response(response: &Response) -> OpenApiResponse {
    OpenApiResponse {
        data: response.body.clone(),
        status_code: response.status,
        mimetype: response.content_type().unwrap_or_default().to_string(),
        headers: header_pairs(&response.headers),
    }
}
