// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resource tree resolution and request authentication.
//!
//! Content lives in a single virtual tree of __resources__, addressed by
//! absolute paths like `/content/site/page`. Parts of that tree are served
//! by __resource providers__ mounted at root paths. A directory on disk, or
//! a handful of resources declared in the configuration file. The
//! [`ResourceResolverFactory`] keeps track of every mounted provider, and
//! logs users in to obtain a [`ResourceResolver`].
//!
//! A resolver maps request paths onto resources. Given
//! `/content/page.print.html`, it finds `/content/page` and leaves
//! `.print.html` as resolution path info, from which [`RequestPathInfo`]
//! extracts selectors and extension. The [`ScriptResolver`] then picks the
//! script that renders the resource.
//!
//! Before any of that, the [`Authenticator`] decides who is making the
//! request, and whether they are allowed to make it anonymously.

pub mod auth;
pub mod config;
pub mod path;
pub mod provider;
pub mod request;
pub mod resolver;
pub mod resource;
pub mod script;
pub mod tree;

pub use auth::{AuthOutcome, Authenticator};
pub use config::{Config, Slingshot};
pub use path::ResourcePaths;
pub use request::RequestPathInfo;
pub use resolver::{Credentials, ResourceResolver, ResourceResolverFactory};
pub use resource::Resource;
pub use script::ScriptResolver;
