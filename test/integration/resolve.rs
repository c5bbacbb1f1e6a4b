// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::SiteFixture;

use anyhow::{anyhow, Result};
use indoc::indoc;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use slingshot::{resource::RESOURCE_TYPE_NON_EXISTING, RequestPathInfo, Resource};

const SITE: &str = indoc! {r#"
    [[provider]]
    name = "apps"
    kind = "fs"
    root = "/apps"
    source = "site/apps"

    [[provider]]
    name = "content"
    root = "/content"

    [[provider.resource]]
    path = "/content"
    type = "sling:Folder"

    [[provider.resource]]
    path = "page"
    type = "site/page"
    properties = { title = "Welcome" }

    [[provider]]
    name = "archive"
    root = "/content/archive/2024"

    [[provider.resource]]
    path = "/content/archive/2024"
    type = "sling:Folder"
"#};

const SCRIPTS: &[(&str, &str)] = &[
    ("site/apps/site/page/html.jsp", "<html/>"),
    ("site/apps/site/page/print/a4.html.jsp", "<html/>"),
    ("site/apps/site/page/.hidden.jsp", "secret"),
];

#[sealed_test]
fn resolve_request_to_resource_and_script() -> Result<()> {
    let site = SiteFixture::new(SITE, SCRIPTS)?;
    let slingshot = site.slingshot();
    let resolver = slingshot.factory.anonymous_resolver()?;

    let resource = resolver.resolve("/content/page.print.a4.html/extra")?;
    assert_eq!(resource.path(), "/content/page");
    assert_eq!(
        resource.property("title").and_then(|title| title.as_str()),
        Some("Welcome")
    );

    let info = RequestPathInfo::new(&resource);
    assert_eq!(info.resource_path(), "/content/page");
    assert_eq!(info.selector_string(), Some("print.a4".into()));
    assert_eq!(info.extension(), Some("html"));
    assert_eq!(info.suffix(), Some("/extra"));

    let script = slingshot
        .scripts
        .find(&resolver, &resource, &info, "GET")?
        .ok_or_else(|| anyhow!("no script found"))?;
    assert_eq!(script.path(), "/apps/site/page/print/a4.html.jsp");

    let resource = resolver.resolve("/content/page.json")?;
    let info = RequestPathInfo::new(&resource);
    let script = slingshot.scripts.find(&resolver, &resource, &info, "GET")?;
    assert_eq!(script, None);

    let resource = resolver.resolve("/content/page.html")?;
    let info = RequestPathInfo::new(&resource);
    let script = slingshot
        .scripts
        .find(&resolver, &resource, &info, "GET")?
        .map(|script| script.path().to_owned());
    assert_eq!(script, Some("/apps/site/page/html.jsp".into()));

    Ok(())
}

#[sealed_test]
fn resolve_missing_path_to_non_existing_resource() -> Result<()> {
    let site = SiteFixture::new(SITE, SCRIPTS)?;
    let resolver = site.slingshot().factory.anonymous_resolver()?;

    let resource = resolver.resolve("/content/missing.html")?;
    assert_eq!(resource.resource_type(), RESOURCE_TYPE_NON_EXISTING);
    assert_eq!(resource.path(), "/content/missing.html");

    // Mount points between providers are not resolvable.
    let resource = resolver.resolve("/content/archive")?;
    assert!(resource.is_non_existing());

    Ok(())
}

#[sealed_test]
fn list_children_across_providers() -> Result<()> {
    let site = SiteFixture::new(SITE, SCRIPTS)?;
    let resolver = site.slingshot().factory.anonymous_resolver()?;

    let content = resolver
        .get_resource("/content")?
        .ok_or_else(|| anyhow!("no content"))?;
    let children = resolver.list_children(&content)?.collect::<Vec<_>>();
    let names = children.iter().map(Resource::name).collect::<Vec<_>>();
    assert_eq!(names, vec!["page", "archive"]);
    assert!(children[1].is_synthetic());

    let archive = resolver
        .get_resource("/content/archive")?
        .ok_or_else(|| anyhow!("no archive"))?;
    let children = resolver.list_children(&archive)?.collect::<Vec<_>>();
    let paths = children.iter().map(Resource::path).collect::<Vec<_>>();
    assert_eq!(paths, vec!["/content/archive/2024"]);
    assert!(!children[0].is_synthetic());

    let page = resolver
        .get_resource("site/page")?
        .ok_or_else(|| anyhow!("no script folder"))?;
    let children = resolver.list_children(&page)?.collect::<Vec<_>>();
    let names = children.iter().map(Resource::name).collect::<Vec<_>>();
    assert_eq!(names, vec!["html.jsp", "print"]);

    Ok(())
}
