// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Request authentication.
//!
//! The [`Authenticator`] decides who a request is made by, and hands out a
//! [`ResourceResolver`] logged in as that user. Credentials are extracted
//! by __authentication handlers__ registered below URL prefixes. The handler
//! with the most specific prefix is asked first.
//!
//! # Anonymous Access
//!
//! Requests without credentials are served anonymously, unless an
//! __authentication requirement__ says otherwise for the request URL. The
//! login page of every handler always allows anonymous access, so clients
//! can reach it to log in.
//!
//! # Failure
//!
//! If no usable credentials are present where they are required, the
//! client is asked for some:
//!
//! - Browsers are sent to whatever the applicable handler deems fit, e.g.,
//!   a login page.
//! - Other clients get an HTTP Basic challenge, if HTTP Basic is on.
//! - Everything else, including credential validation requests and Ajax
//!   requests, gets `403 Forbidden` with an `X-Reason` header.
//!
//! Too many open sessions yields `503 Service Unavailable`, and any other
//! error yields `500 Internal Server Error`.

pub mod basic;
pub mod holder;
pub mod redirect;
pub mod requirement;

use crate::{
    auth::{
        basic::HttpBasicHandler,
        holder::{host_key, HolderCache, HolderPath, PathHolder},
        requirement::AuthRequirement,
    },
    resolver::{Credentials, LoginError, ResourceResolver, ResourceResolverFactory},
};

use http::{header, HeaderValue, Request, Response, StatusCode};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{
        atomic::{AtomicU64, Ordering as AtomicOrdering},
        Arc,
    },
};
use tracing::{debug, error, info, instrument, warn};

/// Request as seen by authentication.
///
/// Authentication never looks at the request body.
pub type AuthRequest = Request<()>;

/// Response sent instead of processing a request.
pub type AuthResponse = Response<String>;

/// Header stating why access was denied.
pub const X_REASON: &str = "X-Reason";

/// Query parameter marking a credential validation request.
pub const PARAM_VALIDATE: &str = "j_validate";

/// Query parameter naming the resource to go to after login or logout.
pub const PARAM_RESOURCE: &str = "resource";

/// Credentials extracted from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationInfo {
    auth_type: String,
    credentials: Credentials,
}

impl AuthenticationInfo {
    pub fn new(auth_type: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            auth_type: auth_type.into(),
            credentials,
        }
    }

    pub fn auth_type(&self) -> &str {
        &self.auth_type
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    pub fn user_id(&self) -> &str {
        self.credentials.user_id()
    }
}

/// Outcome of asking a handler for credentials.
#[derive(Debug)]
pub enum Extraction {
    /// Request carries nothing the handler understands.
    Nothing,

    /// Request carries credentials.
    Credentials(AuthenticationInfo),

    /// Handler is in the middle of authenticating, and answers the request
    /// itself.
    Doing(AuthResponse),

    /// Request carries credentials the handler already knows to be invalid.
    Failed,
}

/// Extracts credentials from requests, and asks clients for them.
pub trait AuthenticationHandler: Send + Sync + 'static {
    /// Extract credentials from request.
    fn extract_credentials(&self, request: &AuthRequest) -> Extraction;

    /// Ask client for credentials.
    ///
    /// Returns `None` if the handler cannot ask for credentials for this
    /// request.
    fn request_credentials(&self, request: &AuthRequest) -> Option<AuthResponse>;

    /// Tell client to forget credentials.
    fn drop_credentials(&self, _request: &AuthRequest, _response: &mut AuthResponse) {}

    /// Path of login page clients are sent to, if any.
    ///
    /// Anonymous access is always allowed to it.
    fn login_path(&self) -> Option<&str> {
        None
    }
}

/// Inspects credentials after extraction, before login.
pub trait AuthInfoPostProcessor: Send + Sync + 'static {
    /// Inspect, and possibly adjust, extracted credentials.
    ///
    /// # Errors
    ///
    /// - Return [`AuthError`] to reject the credentials.
    fn post_process(&self, info: &mut AuthenticationInfo, request: &AuthRequest) -> Result<()>;
}

/// Identifier of a registered authentication handler.
pub type HandlerId = u64;

/// Registered authentication handler.
#[derive(Clone)]
pub struct HandlerHolder {
    id: HandlerId,
    name: String,
    path: HolderPath,
    handler: Arc<dyn AuthenticationHandler>,
}

impl HandlerHolder {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &dyn AuthenticationHandler {
        self.handler.as_ref()
    }
}

impl PathHolder for HandlerHolder {
    fn holder_path(&self) -> &HolderPath {
        &self.path
    }

    fn tie_break(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl PartialEq for HandlerHolder {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Debug for HandlerHolder {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("HandlerHolder")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// What to do with an authenticated request.
#[derive(Debug)]
pub enum AuthOutcome {
    /// Process request with resolver.
    Proceed(ResourceResolver),

    /// Stop processing, and send response back.
    Respond(AuthResponse),
}

/// Selects authentication handlers and logs requests in.
pub struct Authenticator {
    factory: ResourceResolverFactory,
    basic: HttpBasicHandler,
    anonymous_allowed: bool,
    handlers: HolderCache<HandlerHolder>,
    requirements: HolderCache<AuthRequirement>,
    registered: Mutex<HashMap<HandlerId, HandlerHolder>>,
    next_id: AtomicU64,
    post_processors: RwLock<Vec<Arc<dyn AuthInfoPostProcessor>>>,
}

impl Authenticator {
    /// Construct new authenticator.
    ///
    /// If `anonymous_allowed` is false, every request needs credentials,
    /// except where requirements added later say otherwise.
    pub fn new(
        factory: ResourceResolverFactory,
        basic: HttpBasicHandler,
        anonymous_allowed: bool,
    ) -> Self {
        let requirements = HolderCache::new();
        if !anonymous_allowed {
            requirements.add(AuthRequirement::new("/", true));
        }

        Self {
            factory,
            basic,
            anonymous_allowed,
            handlers: HolderCache::new(),
            requirements,
            registered: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            post_processors: RwLock::new(Vec::new()),
        }
    }

    pub fn factory(&self) -> &ResourceResolverFactory {
        &self.factory
    }

    pub fn add_requirement(&self, requirement: AuthRequirement) {
        debug!("adding requirement {requirement}");
        self.requirements.add(requirement);
    }

    pub fn remove_requirement(&self, requirement: &AuthRequirement) -> bool {
        self.requirements.remove(requirement)
    }

    pub fn requirements(&self) -> Vec<AuthRequirement> {
        self.requirements.holders()
    }

    pub fn add_post_processor(&self, processor: Arc<dyn AuthInfoPostProcessor>) {
        self.post_processors.write().push(processor);
    }

    /// Register authentication handler below URL.
    ///
    /// Returns id of the registration, needed to unregister it later.
    #[instrument(skip(self, handler), level = "debug")]
    pub fn register_handler(
        &self,
        url: &str,
        name: &str,
        handler: Arc<dyn AuthenticationHandler>,
    ) -> HandlerId {
        let mut registered = self.registered.lock();
        let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        let holder = HandlerHolder {
            id,
            name: name.to_owned(),
            path: HolderPath::parse(url),
            handler,
        };

        if let Some(login_path) = holder.handler.login_path() {
            self.requirements.add(AuthRequirement::login_page(login_path, id));
        }
        self.handlers.add(holder.clone());
        registered.insert(id, holder);
        info!("registered authentication handler {name} at {url:?}");

        id
    }

    /// Unregister authentication handler.
    ///
    /// Returns `false` if no handler is registered under id.
    #[instrument(skip(self), level = "debug")]
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        let Some(holder) = self.registered.lock().remove(&id) else {
            warn!("no authentication handler registered with id {id}");
            return false;
        };

        if let Some(login_path) = holder.handler.login_path() {
            self.requirements
                .remove(&AuthRequirement::login_page(login_path, id));
        }
        self.handlers.remove(&holder);
        info!("unregistered authentication handler {}", holder.name);

        true
    }

    /// Registered handlers by URL, most specific first.
    ///
    /// HTTP Basic is listed below `/` unless it is disabled.
    pub fn handlers(&self) -> IndexMap<String, Vec<String>> {
        let mut handlers: IndexMap<String, Vec<String>> = IndexMap::new();
        for holder in self.handlers.holders() {
            handlers
                .entry(holder.path.full.clone())
                .or_default()
                .push(holder.name.clone());
        }

        if self.basic.is_available() {
            handlers
                .entry("/".to_owned())
                .or_default()
                .push(self.basic.to_string());
        }

        handlers
    }

    /// Authenticate request.
    ///
    /// Either the request may proceed with a resolver logged in as the user
    /// making it, or a response has to be sent back instead.
    #[instrument(skip(self, request), fields(path = request_path(request)), level = "debug")]
    pub fn handle_security(&self, request: &AuthRequest) -> AuthOutcome {
        let mut info = match self.extract(request) {
            Extraction::Nothing => {
                debug!("no credentials in request, trying anonymous");
                return self.anonymous(request);
            }
            Extraction::Doing(response) => {
                debug!("authentication in progress in handler");
                return AuthOutcome::Respond(response);
            }
            Extraction::Failed => {
                debug!("credentials present but invalid, requesting new ones");
                return AuthOutcome::Respond(self.do_login(request, None));
            }
            Extraction::Credentials(info) => info,
        };

        for processor in self.post_processors.read().iter() {
            if let Err(error) = processor.post_process(&mut info, request) {
                return self.handle_login_failure(request, Some(info.user_id()), error);
            }
        }

        debug!("trying to log in {}", info.user_id());
        match self.factory.resolver(info.credentials()) {
            Ok(mut resolver) => {
                info!("logged in {} using {}", info.user_id(), info.auth_type());
                if is_validate_request(request) {
                    resolver.close();
                    return AuthOutcome::Respond(send_valid());
                }

                AuthOutcome::Proceed(resolver)
            }
            Err(error) => self.handle_login_failure(request, Some(info.user_id()), error.into()),
        }
    }

    /// Ask client for credentials.
    ///
    /// Returns `None` if no handler can ask for credentials for this
    /// request.
    pub fn login(&self, request: &AuthRequest) -> Option<AuthResponse> {
        let path = request_path(request);
        let applicable = self.applicable_handlers(request);
        for holder in applicable.iter().flat_map(|holders| holders.iter()) {
            if !holder.applies_to(path) {
                continue;
            }

            debug!("requesting credentials using {}", holder.name);
            if let Some(response) = holder.handler.request_credentials(request) {
                return Some(response);
            }
        }

        if let Some(response) = self.basic.request_credentials(request) {
            return Some(response);
        }

        let available = applicable.iter().map(|holders| holders.len()).sum::<usize>();
        info!("no handler for request ({available} handlers available)");
        None
    }

    /// Tell client to forget credentials.
    ///
    /// Every applicable handler gets to drop credentials. The client is
    /// then redirected to the `resource` query parameter if it names a
    /// valid target, or to `/` otherwise.
    pub fn logout(&self, request: &AuthRequest) -> AuthResponse {
        let target = query_param(request, PARAM_RESOURCE)
            .filter(|target| is_redirect_valid(target))
            .unwrap_or_else(|| "/".to_owned());
        let mut response = redirect(&target);

        let path = request_path(request);
        for holder in self
            .applicable_handlers(request)
            .iter()
            .flat_map(|holders| holders.iter())
            .filter(|holder| holder.applies_to(path))
        {
            debug!("dropping credentials using {}", holder.name);
            holder.handler.drop_credentials(request, &mut response);
        }
        self.basic.drop_credentials(request, &mut response);

        response
    }

    /// Check if request may be served anonymously.
    pub fn is_anonymous_allowed(&self, request: &AuthRequest) -> bool {
        let path = request_path(request);
        let (scheme, host) = request_bucket(request);
        let applicable = self.requirements.find_applicable(&scheme, &host);
        applicable
            .iter()
            .flat_map(|holders| holders.iter())
            .find(|requirement| requirement.applies_to(path))
            .map_or(self.anonymous_allowed, |requirement| !requirement.requires_auth())
    }

    fn applicable_handlers(&self, request: &AuthRequest) -> holder::Applicable<HandlerHolder> {
        let (scheme, host) = request_bucket(request);
        self.handlers.find_applicable(&scheme, &host)
    }

    fn extract(&self, request: &AuthRequest) -> Extraction {
        let path = request_path(request);
        for holder in self
            .applicable_handlers(request)
            .iter()
            .flat_map(|holders| holders.iter())
            .filter(|holder| holder.applies_to(path))
        {
            match holder.handler.extract_credentials(request) {
                Extraction::Nothing => continue,
                extraction => {
                    debug!("{} handled credentials", holder.name);
                    return extraction;
                }
            }
        }

        self.basic.extract_credentials(request)
    }

    fn anonymous(&self, request: &AuthRequest) -> AuthOutcome {
        if !self.is_anonymous_allowed(request) {
            info!("anonymous access not allowed, requesting credentials");
            return AuthOutcome::Respond(self.do_login(request, None));
        }

        match self.factory.anonymous_resolver() {
            Ok(resolver) => AuthOutcome::Proceed(resolver),
            Err(error) => self.handle_login_failure(request, None, error.into()),
        }
    }

    fn handle_login_failure(
        &self,
        request: &AuthRequest,
        user: Option<&str>,
        error: AuthError,
    ) -> AuthOutcome {
        match error {
            AuthError::Login(LoginError::TooManySessions { .. }) => {
                info!("too many sessions for {user:?}: {error}");
                AuthOutcome::Respond(status(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Too Many Users",
                ))
            }
            AuthError::Login(_) | AuthError::Rejected { .. } => {
                info!("unable to authenticate {user:?}: {error}");
                if self.is_anonymous_allowed(request) && !is_validate_request(request) {
                    debug!("falling back to anonymous access");
                    return self.anonymous(request);
                }

                let reason = match &error {
                    AuthError::Rejected { reason } => reason.as_str(),
                    _ => "User name and password do not match",
                };
                AuthOutcome::Respond(self.do_login(request, Some(reason)))
            }
            AuthError::Internal(_) => {
                error!("unable to authenticate {user:?}: {error}");
                AuthOutcome::Respond(status(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "data access error",
                ))
            }
        }
    }

    fn do_login(&self, request: &AuthRequest, reason: Option<&str>) -> AuthResponse {
        if !is_validate_request(request) {
            if is_browser_request(request) {
                if !is_ajax_request(request) && !is_login_loop(request) {
                    if let Some(response) = self.login(request) {
                        return response;
                    }
                    error!("cannot login, no handler available to handle the request");
                }
            } else if self.basic.is_available() {
                return self.basic.unauthorized();
            }
        }

        send_invalid(reason.unwrap_or("Authentication Failed"))
    }
}

impl Debug for Authenticator {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("Authenticator")
            .field("basic", &self.basic)
            .field("anonymous_allowed", &self.anonymous_allowed)
            .field("handlers", &self.handlers.holders())
            .field("requirements", &self.requirements.holders())
            .finish_non_exhaustive()
    }
}

/// Path of request used to select handlers and requirements.
pub fn request_path(request: &AuthRequest) -> &str {
    match request.uri().path() {
        "" => "/",
        path => path,
    }
}

/// Protocol and host bucket keys of request.
fn request_bucket(request: &AuthRequest) -> (String, String) {
    let uri = request.uri();
    let scheme = uri.scheme_str().unwrap_or("http").to_owned();
    if let Some(host) = uri.host() {
        return (scheme, host_key(host, uri.port_u16()));
    }

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let host = match host.rsplit_once(':') {
        Some((name, port)) => match port.parse::<u16>() {
            Ok(port) => host_key(name, Some(port)),
            Err(_) => host.to_owned(),
        },
        None => host.to_owned(),
    };

    (scheme, host)
}

/// Full URL of request, as a browser would send it in a referer.
fn request_url(request: &AuthRequest) -> String {
    let uri = request.uri();
    if uri.scheme().is_some() {
        return uri.to_string();
    }

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
    format!("http://{host}{path_and_query}")
}

/// Decoded value of query parameter.
pub fn query_param(request: &AuthRequest, name: &str) -> Option<String> {
    request
        .uri()
        .query()?
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| {
            let value = value.replace('+', " ");
            urlencoding::decode(&value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or(value)
        })
}

/// Check if request only validates credentials.
pub fn is_validate_request(request: &AuthRequest) -> bool {
    query_param(request, PARAM_VALIDATE).is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

/// Check if request comes from a browser.
pub fn is_browser_request(request: &AuthRequest) -> bool {
    request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|agent| agent.contains("Mozilla") || agent.contains("Opera"))
}

/// Check if request was placed by script in a browser.
pub fn is_ajax_request(request: &AuthRequest) -> bool {
    request
        .headers()
        .get("X-Requested-With")
        .is_some_and(|value| value == "XMLHttpRequest")
}

/// Check if request was referred to by itself.
///
/// Asking for credentials again would never succeed in that case.
fn is_login_loop(request: &AuthRequest) -> bool {
    request
        .headers()
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|referer| referer == request_url(request))
}

/// Check if redirect target is a normalized path.
pub fn is_redirect_valid(target: &str) -> bool {
    if target.is_empty() || !target.starts_with('/') {
        warn!("redirect target {target:?} is not an absolute path");
        return false;
    }

    if target.contains("://") {
        warn!("redirect target {target:?} must not be an URL");
        return false;
    }

    if target.contains("//")
        || target.contains("/../")
        || target.contains("/./")
        || target.ends_with("/.")
        || target.ends_with("/..")
    {
        warn!("redirect target {target:?} is not normalized");
        return false;
    }

    true
}

/// Response with status and plain text body.
pub fn status(code: StatusCode, message: &str) -> AuthResponse {
    let mut response = Response::new(message.to_owned());
    *response.status_mut() = code;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Redirect response to target.
pub fn redirect(target: &str) -> AuthResponse {
    let mut response = Response::new(String::new());
    *response.status_mut() = StatusCode::FOUND;
    match HeaderValue::from_str(target) {
        Ok(location) => {
            response.headers_mut().insert(header::LOCATION, location);
        }
        Err(_) => warn!("cannot redirect to {target:?}"),
    }
    response
}

/// Response to a successful credential validation request.
pub fn send_valid() -> AuthResponse {
    let mut response = Response::new(String::new());
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.append(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Forbidden response stating reason.
pub fn send_invalid(reason: &str) -> AuthResponse {
    let mut response = status(StatusCode::FORBIDDEN, &format!("{reason}\n"));
    match HeaderValue::from_str(reason) {
        Ok(value) => {
            response.headers_mut().insert(X_REASON, value);
        }
        Err(_) => warn!("cannot send reason {reason:?} as header"),
    }
    response
}

/// Authentication error types.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Login(#[from] LoginError),

    /// Credentials were rejected after extraction.
    #[error("credentials rejected: {reason}")]
    Rejected { reason: String },

    /// Authentication could not be carried out at all.
    #[error("authentication failed")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Friendly result alias :3
pub type Result<T, E = AuthError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{basic::BasicMode, redirect::LoginRedirectHandler},
        provider::memory::MemoryProvider,
        resolver::ProviderOptions,
        resource::Resource,
    };
    use base64::{prelude::BASE64_STANDARD, Engine};
    use pretty_assertions::assert_eq;

    const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64)";

    fn factory(max_sessions: usize) -> ResourceResolverFactory {
        let factory = ResourceResolverFactory::builder()
            .account("admin", "secret")
            .max_sessions(max_sessions)
            .build();
        let content = MemoryProvider::from_iter([Resource::new("/content", "t")]);
        factory.register("content", ["/content"], Arc::new(content), ProviderOptions::default());
        factory
    }

    fn authenticator(anonymous_allowed: bool, mode: BasicMode) -> Authenticator {
        Authenticator::new(factory(4), HttpBasicHandler::new("Sling", mode), anonymous_allowed)
    }

    fn request(uri: &str) -> http::request::Builder {
        Request::builder().uri(uri).header(header::HOST, "localhost:8080")
    }

    fn basic(user: &str, password: &str) -> String {
        format!("Basic {}", BASE64_STANDARD.encode(format!("{user}:{password}")))
    }

    fn respond(outcome: AuthOutcome) -> AuthResponse {
        match outcome {
            AuthOutcome::Respond(response) => response,
            AuthOutcome::Proceed(resolver) => panic!("expected response, got {resolver:?}"),
        }
    }

    fn proceed(outcome: AuthOutcome) -> ResourceResolver {
        match outcome {
            AuthOutcome::Proceed(resolver) => resolver,
            AuthOutcome::Respond(response) => panic!("expected resolver, got {response:?}"),
        }
    }

    #[test]
    fn anonymous_access_when_allowed() -> anyhow::Result<()> {
        let auth = authenticator(true, BasicMode::Preemptive);
        let request = request("/content").body(())?;
        let resolver = proceed(auth.handle_security(&request));
        assert_eq!(resolver.user_id()?, None);
        Ok(())
    }

    #[test]
    fn basic_credentials_log_in() -> anyhow::Result<()> {
        let auth = authenticator(false, BasicMode::Preemptive);
        let request = request("/content")
            .header(header::AUTHORIZATION, basic("admin", "secret"))
            .body(())?;
        let resolver = proceed(auth.handle_security(&request));
        assert_eq!(resolver.user_id()?, Some("admin"));
        Ok(())
    }

    #[test]
    fn non_browser_without_credentials_gets_challenge() -> anyhow::Result<()> {
        let auth = authenticator(false, BasicMode::Preemptive);
        let request = request("/content").header(header::USER_AGENT, "curl/8.0").body(())?;
        let response = respond(auth.handle_security(&request));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"Sling\""
        );
        Ok(())
    }

    #[test]
    fn forbidden_when_basic_disabled() -> anyhow::Result<()> {
        let auth = authenticator(false, BasicMode::Disabled);
        let request = request("/content").body(())?;
        let response = respond(auth.handle_security(&request));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[X_REASON], "Authentication Failed");
        Ok(())
    }

    #[test]
    fn validate_request_outcomes() -> anyhow::Result<()> {
        let auth = authenticator(true, BasicMode::Enabled);

        let request_ok = request("/content?j_validate=true")
            .header(header::AUTHORIZATION, basic("admin", "secret"))
            .body(())?;
        let response = respond(auth.handle_security(&request_ok));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(auth.factory().open_sessions(), 0);

        let request_bad = request("/content?j_validate=TRUE")
            .header(header::USER_AGENT, BROWSER)
            .header(header::AUTHORIZATION, basic("admin", "wrong"))
            .body(())?;
        let response = respond(auth.handle_security(&request_bad));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers()[X_REASON],
            "User name and password do not match"
        );
        Ok(())
    }

    #[test]
    fn bad_credentials_fall_back_to_anonymous_where_allowed() -> anyhow::Result<()> {
        let auth = authenticator(true, BasicMode::Enabled);
        let request = request("/content")
            .header(header::AUTHORIZATION, basic("admin", "wrong"))
            .body(())?;
        let resolver = proceed(auth.handle_security(&request));
        assert_eq!(resolver.user_id()?, None);
        Ok(())
    }

    #[test]
    fn too_many_sessions_is_unavailable() -> anyhow::Result<()> {
        let auth = Authenticator::new(
            factory(1),
            HttpBasicHandler::new("Sling", BasicMode::Enabled),
            true,
        );
        let request = request("/content").body(())?;
        let _held = proceed(auth.handle_security(&request));
        let response = respond(auth.handle_security(&request));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        Ok(())
    }

    #[test]
    fn browser_redirected_to_login_page() -> anyhow::Result<()> {
        let auth = authenticator(false, BasicMode::Preemptive);
        auth.register_handler(
            "/content",
            "form",
            Arc::new(LoginRedirectHandler::new("/system/login")),
        );

        let page = request("/content/page.html")
            .header(header::USER_AGENT, BROWSER)
            .body(())?;
        let response = respond(auth.handle_security(&page));
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/system/login?resource=%2Fcontent%2Fpage.html"
        );

        // Login page itself is reachable anonymously.
        let login = request("/system/login").header(header::USER_AGENT, BROWSER).body(())?;
        assert!(auth.is_anonymous_allowed(&login));

        // Ajax requests cannot follow a login page.
        let ajax = request("/content/page.json")
            .header(header::USER_AGENT, BROWSER)
            .header("X-Requested-With", "XMLHttpRequest")
            .body(())?;
        let response = respond(auth.handle_security(&ajax));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Browser outside of handler path has nobody to ask for credentials.
        let other = request("/apps/x").header(header::USER_AGENT, BROWSER).body(())?;
        let response = respond(auth.handle_security(&other));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        Ok(())
    }

    #[test]
    fn login_loop_is_broken() -> anyhow::Result<()> {
        let auth = authenticator(false, BasicMode::Preemptive);
        auth.register_handler("/", "form", Arc::new(LoginRedirectHandler::new("/login")));
        let request = request("/content?x=1")
            .header(header::USER_AGENT, BROWSER)
            .header(header::REFERER, "http://localhost:8080/content?x=1")
            .body(())?;
        let response = respond(auth.handle_security(&request));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }

    #[test]
    fn requirements_select_by_longest_path() -> anyhow::Result<()> {
        let auth = authenticator(true, BasicMode::Enabled);
        auth.add_requirement(AuthRequirement::from_config("+/content"));
        auth.add_requirement(AuthRequirement::from_config("-/content/public"));

        let allowed = |uri: &str| -> anyhow::Result<bool> {
            Ok(auth.is_anonymous_allowed(&request(uri).body(())?))
        };
        assert!(!allowed("/content/page")?);
        assert!(allowed("/content/public/page")?);
        assert!(allowed("/apps")?);
        Ok(())
    }

    struct DenyUser(&'static str);

    impl AuthInfoPostProcessor for DenyUser {
        fn post_process(&self, info: &mut AuthenticationInfo, _request: &AuthRequest) -> Result<()> {
            if info.user_id() == self.0 {
                return Err(AuthError::Rejected {
                    reason: "Account is locked".into(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn post_processor_rejects_credentials() -> anyhow::Result<()> {
        let auth = authenticator(false, BasicMode::Preemptive);
        auth.add_post_processor(Arc::new(DenyUser("admin")));
        let request = request("/content?j_validate=true")
            .header(header::AUTHORIZATION, basic("admin", "secret"))
            .body(())?;
        let response = respond(auth.handle_security(&request));
        assert_eq!(response.headers()[X_REASON], "Account is locked");
        Ok(())
    }

    #[test]
    fn handlers_listing_and_unregister() {
        let auth = authenticator(true, BasicMode::Enabled);
        let id = auth.register_handler(
            "/content",
            "form",
            Arc::new(LoginRedirectHandler::new("/login")),
        );
        auth.register_handler("/", "other", Arc::new(LoginRedirectHandler::new("/login")));

        let result = auth.handlers();
        let expect = IndexMap::from([
            ("/content".to_owned(), vec!["form".to_owned()]),
            (
                "/".to_owned(),
                vec!["other".to_owned(), "HTTP Basic (Sling)".to_owned()],
            ),
        ]);
        assert_eq!(result, expect);

        assert!(auth.unregister_handler(id));
        assert!(!auth.unregister_handler(id));
        assert!(!auth.handlers().contains_key("/content"));
    }

    #[test]
    fn login_page_stays_open_while_any_owner_remains() -> anyhow::Result<()> {
        let auth = authenticator(false, BasicMode::Enabled);
        let login = request("/login").body(())?;
        let first =
            auth.register_handler("/content", "a", Arc::new(LoginRedirectHandler::new("/login")));
        let second =
            auth.register_handler("/apps", "b", Arc::new(LoginRedirectHandler::new("/login")));
        assert!(auth.is_anonymous_allowed(&login));

        assert!(auth.unregister_handler(first));
        assert!(auth.is_anonymous_allowed(&login));

        auth.add_requirement(AuthRequirement::from_config("-/login"));
        assert!(auth.unregister_handler(second));
        assert!(auth.is_anonymous_allowed(&login));
        let result = auth
            .requirements()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(result, vec!["-/login", "+/"]);

        assert!(auth.remove_requirement(&AuthRequirement::from_config("-/login")));
        assert!(!auth.is_anonymous_allowed(&login));

        Ok(())
    }

    #[test]
    fn logout_redirects_to_valid_resource() -> anyhow::Result<()> {
        let auth = authenticator(true, BasicMode::Enabled);
        let response = auth.logout(&request("/logout?resource=%2Fcontent%2Fpage").body(())?);
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/content/page");

        let response = auth.logout(&request("/logout?resource=http://evil.com/").body(())?);
        assert_eq!(response.headers()[header::LOCATION], "/");
        Ok(())
    }
}
