// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::SiteFixture;

use anyhow::{bail, Result};
use base64::{prelude::BASE64_STANDARD, Engine};
use http::{header, Request, StatusCode};
use indoc::indoc;
use simple_test_case::test_case;
use slingshot::auth::{AuthOutcome, X_REASON};

const SITE: &str = indoc! {r#"
    [resolver]
    max_sessions = 2

    [auth]
    anonymous_allowed = false
    realm = "Site"
    http_basic = "enabled"
    requirements = ["-/content/public"]
    login_page = "/system/login"

    [[account]]
    user = "admin"
    password = "secret"

    [[provider]]
    name = "content"
    root = "/content"

    [[provider.resource]]
    path = "public/news"
"#};

const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:130.0) Gecko/20100101 Firefox/130.0";

fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", BASE64_STANDARD.encode(format!("{user}:{password}")))
}

/// Outcome as status code, or user id of resolver.
fn outcome(outcome: AuthOutcome) -> Result<String, StatusCode> {
    match outcome {
        AuthOutcome::Proceed(resolver) => Ok(resolver
            .user_id()
            .ok()
            .flatten()
            .unwrap_or("anonymous")
            .to_owned()),
        AuthOutcome::Respond(response) => Err(response.status()),
    }
}

#[test_case("/content/page", None, None, Err(StatusCode::FOUND); "browser sent to login")]
#[test_case("/content/page", Some("curl/8.5.0"), None, Err(StatusCode::UNAUTHORIZED); "client challenged")]
#[test_case("/content/page", None, Some(("admin", "secret")), Ok("admin".into()); "valid credentials")]
#[test_case("/content/page", Some("curl/8.5.0"), Some(("admin", "nope")), Err(StatusCode::UNAUTHORIZED); "bad password")]
#[test_case("/content/public/news", None, None, Ok("anonymous".into()); "public content")]
#[test_case("/system/login", None, None, Ok("anonymous".into()); "login page")]
#[test]
fn authenticate_request(
    uri: &str,
    agent: Option<&str>,
    credentials: Option<(&str, &str)>,
    expect: Result<String, StatusCode>,
) -> Result<()> {
    let site = SiteFixture::new(SITE, &[])?;
    let mut request = Request::builder()
        .uri(uri)
        .header(header::HOST, "localhost")
        .header(header::USER_AGENT, agent.unwrap_or(BROWSER));
    if let Some((user, password)) = credentials {
        request = request.header(header::AUTHORIZATION, basic(user, password));
    }

    let result = outcome(site.slingshot().authenticator.handle_security(&request.body(())?));
    assert_eq!(result, expect);

    Ok(())
}

#[test]
fn validate_credentials() -> Result<()> {
    let site = SiteFixture::new(SITE, &[])?;
    let authenticator = &site.slingshot().authenticator;

    let request = Request::builder()
        .uri("/content/page?j_validate=true")
        .header(header::USER_AGENT, BROWSER)
        .header(header::AUTHORIZATION, basic("admin", "nope"))
        .body(())?;
    let AuthOutcome::Respond(response) = authenticator.handle_security(&request) else {
        bail!("bad credentials must not validate");
    };
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.headers()[X_REASON],
        "User name and password do not match"
    );

    let request = Request::builder()
        .uri("/content/page?j_validate=true")
        .header(header::AUTHORIZATION, basic("admin", "secret"))
        .body(())?;
    let AuthOutcome::Respond(response) = authenticator.handle_security(&request) else {
        bail!("validation must not proceed");
    };
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), "");
    assert_eq!(site.slingshot().factory.open_sessions(), 0);

    Ok(())
}

#[test]
fn session_limit_answers_unavailable() -> Result<()> {
    let site = SiteFixture::new(SITE, &[])?;
    let authenticator = &site.slingshot().authenticator;
    let request = Request::builder()
        .uri("/content/public/news")
        .body(())?;

    let mut held = Vec::new();
    for _ in 0..2 {
        match authenticator.handle_security(&request) {
            AuthOutcome::Proceed(resolver) => held.push(resolver),
            AuthOutcome::Respond(response) => bail!("unexpected {}", response.status()),
        }
    }

    let result = outcome(authenticator.handle_security(&request));
    assert_eq!(result, Err(StatusCode::SERVICE_UNAVAILABLE));

    held.clear();
    let result = outcome(authenticator.handle_security(&request));
    assert_eq!(result, Ok("anonymous".into()));

    Ok(())
}
