// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path based holder selection.
//!
//! Authentication handlers and authentication requirements both apply to
//! a request by URL prefix. Each is registered under a URL that may name a
//! protocol and a host next to the path, e.g., `https://example.com/admin`.
//! The [`HolderCache`] answers which of them apply to a request, most
//! specific first.
//!
//! # Buckets
//!
//! Holders are bucketed by protocol, then by host. An empty protocol or
//! host matches anything. A request is checked against four buckets, in
//! this order:
//!
//! 1. request protocol and request host,
//! 2. request protocol and any host,
//! 3. any protocol and request host,
//! 4. any protocol and any host.
//!
//! Within a bucket, holders with longer paths come first.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    sync::Arc,
};
use tracing::debug;

/// Parsed registration URL of a holder.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct HolderPath {
    /// URL as it was given.
    pub full: String,

    /// Protocol, empty for any.
    pub protocol: String,

    /// Host with optional port, empty for any.
    pub host: String,

    /// Path prefix, `/` at minimum.
    pub path: String,
}

impl HolderPath {
    /// Parse registration URL.
    ///
    /// Accepts `http://host/path`, `https://host/path`, `//host/path`, and
    /// plain `/path`. A missing path means `/`.
    pub fn parse(url: impl Into<String>) -> Self {
        let full = url.into();
        let mut protocol = "";
        let mut rest = full.as_str();

        if rest.starts_with("http://") || rest.starts_with("https://") {
            if let Some(idx) = rest.find("://") {
                protocol = &rest[..idx];
                rest = &rest[idx + 1..];
            }
        }

        let (host, path) = match rest.strip_prefix("//") {
            Some(authority) => match authority.find('/') {
                Some(idx) => (&authority[..idx], &authority[idx..]),
                None => (authority, "/"),
            },
            None => ("", rest),
        };
        let path = if path.is_empty() { "/" } else { path };

        let protocol = protocol.to_owned();
        let host = host.to_owned();
        let path = path.to_owned();
        Self {
            full,
            protocol,
            host,
            path,
        }
    }
}

impl Display for HolderPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.full)
    }
}

/// Entry selectable by request URL.
pub trait PathHolder: Clone + PartialEq + Send + Sync + 'static {
    fn holder_path(&self) -> &HolderPath;

    /// Order between holders sharing the same path, lesser first.
    fn tie_break(&self, _other: &Self) -> Ordering {
        Ordering::Equal
    }

    /// Check if holder applies to request path.
    fn applies_to(&self, request_path: &str) -> bool {
        request_path.starts_with(self.holder_path().path.as_str())
    }
}

fn holder_order<T: PathHolder>(a: &T, b: &T) -> Ordering {
    let a_path = &a.holder_path().path;
    let b_path = &b.holder_path().path;
    b_path
        .len()
        .cmp(&a_path.len())
        .then_with(|| b_path.cmp(a_path))
        .then_with(|| a.tie_break(b))
}

type Buckets<T> = HashMap<String, HashMap<String, Arc<[T]>>>;

/// Candidate holders of a request, one list per bucket in fallback order.
pub type Applicable<T> = [Arc<[T]>; 4];

/// Copy-on-write cache of path holders.
///
/// Lookups read the current snapshot without locking. Changes are
/// serialized, and each publishes a fresh snapshot in which only the
/// affected bucket was rebuilt.
pub struct HolderCache<T> {
    buckets: ArcSwap<Buckets<T>>,
    lock: Mutex<()>,
}

impl<T: PathHolder> Default for HolderCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PathHolder> HolderCache<T> {
    pub fn new() -> Self {
        Self {
            buckets: ArcSwap::from_pointee(HashMap::new()),
            lock: Mutex::new(()),
        }
    }

    /// Add holder to its bucket.
    pub fn add(&self, holder: T) {
        let _guard = self.lock.lock();
        let mut buckets = Buckets::clone(&self.buckets.load());
        let protocol = holder.holder_path().protocol.clone();
        let host = holder.holder_path().host.clone();
        debug!("adding holder at {}", holder.holder_path());

        let by_host = buckets.entry(protocol).or_default();
        let mut bucket = by_host
            .get(&host)
            .map(|bucket| bucket.to_vec())
            .unwrap_or_default();
        bucket.push(holder);
        by_host.insert(host, sorted(bucket));
        self.buckets.store(Arc::new(buckets));
    }

    /// Remove holder from its bucket.
    ///
    /// Returns `false` if holder was not cached.
    pub fn remove(&self, holder: &T) -> bool {
        let _guard = self.lock.lock();
        let mut buckets = Buckets::clone(&self.buckets.load());
        let path = holder.holder_path();
        let Some(by_host) = buckets.get_mut(&path.protocol) else {
            return false;
        };
        let Some(bucket) = by_host.get(&path.host) else {
            return false;
        };

        let remaining = bucket
            .iter()
            .filter(|cached| *cached != holder)
            .cloned()
            .collect::<Vec<_>>();
        if remaining.len() == bucket.len() {
            return false;
        }

        debug!("removing holder at {}", path);
        if remaining.is_empty() {
            by_host.remove(&path.host);
            if by_host.is_empty() {
                buckets.remove(&path.protocol);
            }
        } else {
            by_host.insert(path.host.clone(), Arc::from(remaining));
        }
        self.buckets.store(Arc::new(buckets));

        true
    }

    /// Candidate holders for request protocol and host.
    ///
    /// The host must include the port, unless it is 80 or 443. See
    /// [`host_key`].
    pub fn find_applicable(&self, protocol: &str, host: &str) -> Applicable<T> {
        let buckets = self.buckets.load();
        let get = |protocol: &str, host: &str| {
            buckets
                .get(protocol)
                .and_then(|by_host| by_host.get(host))
                .cloned()
                .unwrap_or_else(|| Arc::from(Vec::new()))
        };

        [
            get(protocol, host),
            get(protocol, ""),
            get("", host),
            get("", ""),
        ]
    }

    /// Every cached holder, bucket by bucket.
    pub fn holders(&self) -> Vec<T> {
        let buckets = self.buckets.load();
        let mut protocols = buckets.keys().collect::<Vec<_>>();
        protocols.sort();

        let mut holders = Vec::new();
        for protocol in protocols {
            let by_host = &buckets[protocol];
            let mut hosts = by_host.keys().collect::<Vec<_>>();
            hosts.sort();
            for host in hosts {
                holders.extend(by_host[host].iter().cloned());
            }
        }

        holders
    }

    /// Drop every cached holder.
    pub fn clear(&self) {
        let _guard = self.lock.lock();
        self.buckets.store(Arc::new(HashMap::new()));
    }
}

fn sorted<T: PathHolder>(holders: impl IntoIterator<Item = T>) -> Arc<[T]> {
    let mut holders = holders.into_iter().collect::<Vec<_>>();
    holders.sort_by(holder_order);
    Arc::from(holders)
}

/// Bucket key of request host.
///
/// Default HTTP and HTTPS ports are left out.
pub fn host_key(host: &str, port: Option<u16>) -> String {
    match port {
        None | Some(80) | Some(443) => host.to_owned(),
        Some(port) => format!("{host}:{port}"),
    }
}
