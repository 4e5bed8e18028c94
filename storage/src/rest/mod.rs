//! The REST projection described in storage.md §8: a contract, not a server.
//! This module defines the request/response shapes, conditional-header
//! semantics, and well-known error envelope a storage's HTTP surface must
//! honor, plus the `RequestFramework`/`Codec` traits an actual HTTP crate
//! (axum, actix-web, warp -- whichever the embedding binary already depends
//! on) is expected to be adapted to. No HTTP server dependency is pulled in
//! here; `InProcessFramework` below is a minimal in-memory stand-in used by
//! this crate's own tests and by `storage-cli`'s `serve`-less demo mode.

pub mod conditional;
pub mod dialect;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The well-known error names storage.md §8 requires every dialect to
/// surface identically, independent of the response envelope shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestErrorName {
    InvalidKey,
    ResourceNotFound,
    ResourceAlreadyExists,
    ResourceWasModifiedError,
    InvalidHeader,
    ParseJSONError,
    MethodNotAllowed,
    RequiredKeyIsMissing,
}

impl RestErrorName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestErrorName::InvalidKey => "InvalidKey",
            RestErrorName::ResourceNotFound => "ResourceNotFound",
            RestErrorName::ResourceAlreadyExists => "ResourceAlreadyExists",
            RestErrorName::ResourceWasModifiedError => "ResourceWasModifiedError",
            RestErrorName::InvalidHeader => "InvalidHeader",
            RestErrorName::ParseJSONError => "ParseJSONError",
            RestErrorName::MethodNotAllowed => "MethodNotAllowed",
            RestErrorName::RequiredKeyIsMissing => "RequiredKeyIsMissing",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            RestErrorName::InvalidKey => 400,
            RestErrorName::ResourceNotFound => 404,
            RestErrorName::ResourceAlreadyExists => 409,
            RestErrorName::ResourceWasModifiedError => 412,
            RestErrorName::InvalidHeader => 400,
            RestErrorName::ParseJSONError => 400,
            RestErrorName::MethodNotAllowed => 405,
            RestErrorName::RequiredKeyIsMissing => 400,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestError {
    pub name: RestErrorName,
    pub message: String,
    pub details: Value,
}

impl RestError {
    pub fn new(name: RestErrorName, message: impl Into<String>) -> Self {
        RestError { name, message: message.into(), details: Value::Null }
    }

    pub fn with_details(name: RestErrorName, message: impl Into<String>, details: Value) -> Self {
        RestError { name, message: message.into(), details }
    }
}

/// The nested `error` object inside a `Hypermedia`-dialect envelope:
/// `{"name":…,"message":…,"details":{…}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub name: String,
    pub message: String,
    pub details: Value,
}

/// The error envelope every dialect serializes a `RestError` into:
/// `{"success":false,"message":…,"error":{…}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    pub error: ErrorDetail,
}

impl From<&RestError> for ErrorEnvelope {
    fn from(err: &RestError) -> Self {
        ErrorEnvelope {
            success: false,
            message: err.message.clone(),
            error: ErrorDetail {
                name: err.name.as_str().to_string(),
                message: err.message.clone(),
                details: err.details.clone(),
            },
        }
    }
}

/// A minimal HTTP method set; enough to express the CRUD surface storage.md
/// §8 describes without depending on any particular HTTP crate's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Patch,
    Delete,
    Post,
}

/// An inbound request, already stripped of transport concerns (connection
/// handling, TLS, etc.) -- whatever real HTTP framework is embedding this
/// crate is responsible for producing one of these from its own request
/// type.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Vec<u8>,
    pub if_unmodified_since: Option<crate::clock::Us>,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
    pub current_if_unmodified_since: Option<crate::clock::Us>,
}

impl Response {
    pub fn from_error(err: &RestError) -> Self {
        let envelope = ErrorEnvelope::from(err);
        Response {
            status: err.name.status_code(),
            body: serde_json::to_vec(&envelope).unwrap_or_default(),
            current_if_unmodified_since: None,
        }
    }
}

/// Encodes and decodes request/response bodies for one REST dialect. Kept
/// separate from `dialect::Dialect` so a binary can mix, e.g., the `Simple`
/// envelope shape with a non-JSON wire encoding if it ever needs to.
pub trait Codec: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, RestError>;
    fn decode<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T, RestError>;
}

/// The default codec: plain JSON via `serde_json`, matching storage.md §6's
/// persisted wire format.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, RestError> {
        serde_json::to_vec(value).map_err(|err| RestError::new(RestErrorName::ParseJSONError, err.to_string()))
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T, RestError> {
        serde_json::from_slice(bytes)
            .map_err(|err| RestError::new(RestErrorName::ParseJSONError, err.to_string()))
    }
}

/// Backs `<prefix>/status` and `SwitchHTTPEndpointsTo503s()`: a shared flag
/// an embedding binary flips to take every data endpoint down for
/// maintenance without tearing down the process. `is_up()` false means every
/// data-path request should short-circuit to a `503` before touching the
/// storage at all.
#[derive(Default)]
pub struct ServiceStatus(std::sync::atomic::AtomicBool);

impl ServiceStatus {
    pub fn new() -> Self {
        ServiceStatus(std::sync::atomic::AtomicBool::new(true))
    }

    pub fn is_up(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Flips every data endpoint to `503 Service Unavailable` and `up:false`.
    pub fn switch_to_503s(&self) {
        self.0.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// The body of `GET <prefix>/status`: `{"up":true|false}`.
    pub fn status_body(&self) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({ "up": self.is_up() })).unwrap_or_default()
    }

    /// `503` with `up:false` if switched off, otherwise `None` -- callers
    /// check this before dispatching to any data endpoint.
    pub fn guard(&self) -> Option<Response> {
        if self.is_up() {
            return None;
        }
        Some(Response { status: 503, body: self.status_body(), current_if_unmodified_since: None })
    }
}

/// Rejects a mutating verb (`PUT`/`PATCH`/`DELETE`/`POST`) with `405` when
/// the backing storage is a follower, per storage.md §8: "Follower storages
/// reject mutating verbs with `405`." `GET` always passes through.
pub fn reject_follower_mutation(method: Method, is_master: bool) -> Option<RestError> {
    if is_master {
        return None;
    }
    match method {
        Method::Get => None,
        Method::Put | Method::Patch | Method::Delete | Method::Post => {
            Some(RestError::new(RestErrorName::MethodNotAllowed, "storage is a follower; mutating verbs are rejected"))
        }
    }
}

pub type Handler = Box<dyn Fn(Request) -> Response + Send + Sync>;

/// The collaborator an embedding binary implements to wire this crate's
/// handlers into its own HTTP server. A real implementation forwards
/// `register` calls into axum/actix-web/warp's own router; `InProcessRouter`
/// below is a trivial in-memory one for tests and the bundled examples.
pub trait RequestFramework {
    fn register(&mut self, method: Method, path: &str, handler: Handler);
    fn dispatch(&self, request: Request) -> Response;
}

/// An in-process stand-in for a real HTTP framework: routes by exact
/// `(method, path)` match, nothing else. Not meant to be run behind a
/// socket.
#[derive(Default)]
pub struct InProcessRouter {
    routes: HashMap<(Method, String), Handler>,
}

impl InProcessRouter {
    pub fn new() -> Self {
        InProcessRouter { routes: HashMap::new() }
    }
}

impl RequestFramework for InProcessRouter {
    fn register(&mut self, method: Method, path: &str, handler: Handler) {
        self.routes.insert((method, path.to_string()), handler);
    }

    fn dispatch(&self, request: Request) -> Response {
        match self.routes.get(&(request.method, request.path.clone())) {
            Some(handler) => handler(request),
            None => Response::from_error(&RestError::new(RestErrorName::ResourceNotFound, "no route registered")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_route_returns_not_found_envelope() {
        let router = InProcessRouter::new();
        let response = router.dispatch(Request {
            method: Method::Get,
            path: "/nope".to_string(),
            body: Vec::new(),
            if_unmodified_since: None,
        });
        assert_eq!(response.status, 404);
    }

    #[test]
    fn error_envelope_matches_the_nested_hypermedia_shape() {
        let err = RestError::with_details(
            RestErrorName::ResourceWasModifiedError,
            "stale write",
            serde_json::json!({ "requested": 1, "actual": 2 }),
        );
        let response = Response::from_error(&err);
        assert_eq!(response.status, 412);
        let envelope: ErrorEnvelope = serde_json::from_slice(&response.body).unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.error.name, "ResourceWasModifiedError");
        assert_eq!(envelope.error.details["requested"], 1);
    }

    #[test]
    fn registered_route_dispatches() {
        let mut router = InProcessRouter::new();
        router.register(
            Method::Get,
            "/ping",
            Box::new(|_req| Response { status: 200, body: b"pong".to_vec(), current_if_unmodified_since: None }),
        );
        let response = router.dispatch(Request {
            method: Method::Get,
            path: "/ping".to_string(),
            body: Vec::new(),
            if_unmodified_since: None,
        });
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"pong");
    }

    #[test]
    fn service_status_starts_up_and_guard_passes_through() {
        let status = ServiceStatus::new();
        assert!(status.is_up());
        assert!(status.guard().is_none());
        assert_eq!(status.status_body(), br#"{"up":true}"#);
    }

    #[test]
    fn switch_to_503s_makes_guard_short_circuit() {
        let status = ServiceStatus::new();
        status.switch_to_503s();
        assert!(!status.is_up());
        let guarded = status.guard().unwrap();
        assert_eq!(guarded.status, 503);
        assert_eq!(guarded.body, br#"{"up":false}"#);

        status.resume();
        assert!(status.guard().is_none());
    }

    #[test]
    fn follower_rejects_mutating_verbs_but_not_reads() {
        assert!(reject_follower_mutation(Method::Get, false).is_none());
        for method in [Method::Put, Method::Patch, Method::Post, Method::Delete] {
            let err = reject_follower_mutation(method, false).unwrap();
            assert_eq!(err.name, RestErrorName::MethodNotAllowed);
        }
    }

    #[test]
    fn master_never_rejects_any_verb() {
        for method in [Method::Get, Method::Put, Method::Patch, Method::Post, Method::Delete] {
            assert!(reject_follower_mutation(method, true).is_none());
        }
    }
}
