// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use slingshot::{
    auth::AuthOutcome,
    path::default_config_path,
    resolver::{Credentials, ResourceResolver},
    Config, RequestPathInfo, Slingshot,
};

use anyhow::{Context, Result};
use base64::{prelude::BASE64_STANDARD, Engine};
use clap::{Parser, Subcommand};
use http::{header, Request};
use inquire::Password;
use std::{fs::read_to_string, io::ErrorKind, path::PathBuf, process::exit};
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "slingshot [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let slingshot = load_config(self.config)?.build()?;
        match self.command {
            Command::Resolve(opts) => run_resolve(&slingshot, opts),
            Command::Ls(opts) => run_ls(&slingshot, opts),
            Command::Auth(opts) => run_auth(&slingshot, opts),
            Command::Mounts => run_mounts(&slingshot),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Resolve request path to resource and script.
    #[command(override_usage = "slingshot resolve [options] <path>")]
    Resolve(ResolveOptions),

    /// List children of resource.
    #[command(override_usage = "slingshot ls [options] <path>")]
    Ls(LsOptions),

    /// Authenticate request against URL.
    #[command(override_usage = "slingshot auth [options] <url>")]
    Auth(AuthOptions),

    /// Show mounted providers and authentication handlers.
    #[command(override_usage = "slingshot mounts")]
    Mounts,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ResolveOptions {
    /// Request path to resolve.
    #[arg(required = true, value_name = "path")]
    pub path: String,

    /// Request method picking the script.
    #[arg(short, long, default_value = "GET", value_name = "method")]
    pub method: String,

    /// Log in as user instead of anonymously.
    #[arg(short, long, value_name = "user")]
    pub user: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct LsOptions {
    /// Path of parent resource.
    #[arg(required = true, value_name = "path")]
    pub path: String,

    /// Log in as user instead of anonymously.
    #[arg(short, long, value_name = "user")]
    pub user: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AuthOptions {
    /// URL or path of request to authenticate.
    #[arg(required = true, value_name = "url")]
    pub url: String,

    /// Send HTTP Basic credentials of user.
    #[arg(short, long, value_name = "user")]
    pub user: Option<String>,

    /// User agent of request.
    #[arg(short, long, value_name = "agent")]
    pub agent: Option<String>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let explicit = path.is_some();
    let path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    match read_to_string(&path) {
        Ok(data) => Ok(data
            .parse::<Config>()
            .with_context(|| format!("invalid configuration {path:?}"))?),
        Err(error) if error.kind() == ErrorKind::NotFound && !explicit => {
            warn!("no configuration at {path:?}, using defaults");
            Ok(Config::default())
        }
        Err(error) => Err(error).with_context(|| format!("cannot read configuration {path:?}")),
    }
}

fn prompt_credentials(user: &str) -> Result<Credentials> {
    let password = Password::new(&format!("Password for {user}:"))
        .without_confirmation()
        .prompt()?;
    Ok(Credentials::new(user, password))
}

fn open_resolver(slingshot: &Slingshot, user: Option<&str>) -> Result<ResourceResolver> {
    let resolver = match user {
        Some(user) => slingshot.factory.resolver(&prompt_credentials(user)?)?,
        None => slingshot.factory.anonymous_resolver()?,
    };
    Ok(resolver)
}

fn run_resolve(slingshot: &Slingshot, opts: ResolveOptions) -> Result<()> {
    let resolver = open_resolver(slingshot, opts.user.as_deref())?;
    let resource = resolver.resolve(&opts.path)?;
    let info = RequestPathInfo::new(&resource);

    println!("resource:  {}", resource.path());
    println!("type:      {}", resource.resource_type());
    if let Some(super_type) = resource.resource_super_type() {
        println!("super:     {super_type}");
    }
    if let Some(provider) = &resource.metadata().provider {
        println!("provider:  {provider}");
    }
    if let Some(selectors) = info.selector_string() {
        println!("selectors: {selectors}");
    }
    if let Some(extension) = info.extension() {
        println!("extension: {extension}");
    }
    if let Some(suffix) = info.suffix() {
        println!("suffix:    {suffix}");
    }

    match slingshot
        .scripts
        .find(&resolver, &resource, &info, &opts.method)?
    {
        Some(script) => println!("script:    {}", script.path()),
        None => println!("script:    <none>"),
    }

    Ok(())
}

fn run_ls(slingshot: &Slingshot, opts: LsOptions) -> Result<()> {
    let resolver = open_resolver(slingshot, opts.user.as_deref())?;
    let parent = resolver
        .get_resource(&opts.path)?
        .with_context(|| format!("no resource at {:?}", opts.path))?;

    for child in resolver.list_children(&parent)? {
        println!("{:<40} {}", child.name(), child.resource_type());
    }

    Ok(())
}

fn run_auth(slingshot: &Slingshot, opts: AuthOptions) -> Result<()> {
    let mut builder = Request::builder().uri(opts.url.as_str());
    if let Some(agent) = &opts.agent {
        builder = builder.header(header::USER_AGENT, agent);
    }
    if let Some(user) = &opts.user {
        let credentials = prompt_credentials(user)?;
        let encoded =
            BASE64_STANDARD.encode(format!("{}:{}", credentials.user_id(), credentials.password()));
        builder = builder.header(header::AUTHORIZATION, format!("Basic {encoded}"));
    }
    let request = builder.body(())?;

    match slingshot.authenticator.handle_security(&request) {
        AuthOutcome::Proceed(resolver) => match resolver.user_id()? {
            Some(user) => println!("proceed as {user}"),
            None => println!("proceed anonymously"),
        },
        AuthOutcome::Respond(response) => {
            println!("{}", response.status());
            for (name, value) in response.headers() {
                println!("{name}: {}", value.to_str().unwrap_or("<binary>"));
            }
            if !response.body().is_empty() {
                println!();
                print!("{}", response.body());
            }
        }
    }

    Ok(())
}

fn run_mounts(slingshot: &Slingshot) -> Result<()> {
    println!("providers:");
    for (root, providers) in slingshot.factory.mounts() {
        println!("  {root:<30} {}", providers.join(", "));
    }

    println!("authentication handlers:");
    for (path, handlers) in slingshot.authenticator.handlers() {
        println!("  {path:<30} {}", handlers.join(", "));
    }

    println!("authentication requirements:");
    for requirement in slingshot.authenticator.requirements() {
        println!("  {requirement}");
    }

    Ok(())
}
