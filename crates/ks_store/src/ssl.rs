//! SSL policy for a database host.
//!
//! An explicit setting always wins. Without one, the host decides: loopback
//! and local socket hosts get no SSL, everything else (managed providers
//! included) gets SSL without certificate verification, since managed
//! providers commonly present certificates that are not in the system roots.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgSslMode;

/// Host suffixes of managed Postgres providers.
pub const DEFAULT_PROVIDER_SUFFIXES: &[&str] = &[
    ".rds.amazonaws.com",
    ".compute.amazonaws.com",
    ".compute-1.amazonaws.com",
    ".postgres.database.azure.com",
    ".supabase.co",
    ".supabase.com",
    ".pooler.supabase.com",
    ".neon.tech",
    ".render.com",
    ".db.ondigitalocean.com",
    ".aivencloud.com",
    ".cockroachlabs.cloud",
    ".elephantsql.com",
    ".railway.app",
    ".rlwy.net",
];

/// Explicit caller choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SslSetting {
    Disabled,
    /// Encrypt, but accept any server certificate.
    Relaxed,
    /// Encrypt and verify the certificate chain and hostname.
    Strict,
}

impl SslSetting {
    pub fn ssl_mode(self) -> PgSslMode {
        match self {
            SslSetting::Disabled => PgSslMode::Disable,
            SslSetting::Relaxed => PgSslMode::Require,
            SslSetting::Strict => PgSslMode::VerifyFull,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SslPolicy {
    pub ssl: bool,
    pub relaxed_verification: bool,
}

impl SslPolicy {
    pub const DISABLED: Self = Self {
        ssl: false,
        relaxed_verification: false,
    };
    pub const RELAXED: Self = Self {
        ssl: true,
        relaxed_verification: true,
    };

    pub fn setting(self) -> SslSetting {
        match (self.ssl, self.relaxed_verification) {
            (false, _) => SslSetting::Disabled,
            (true, true) => SslSetting::Relaxed,
            (true, false) => SslSetting::Strict,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostClass {
    Loopback,
    ManagedProvider,
    Other,
}

/// Provider suffix table used for host classification.
#[derive(Debug, Clone)]
pub struct ProviderSuffixes(Vec<String>);

impl ProviderSuffixes {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            suffixes
                .into_iter()
                .map(|s| {
                    let s = s.as_ref().trim().trim_start_matches('.').to_ascii_lowercase();
                    format!(".{s}")
                })
                .collect(),
        )
    }

    pub fn matches(&self, host: &str) -> bool {
        self.0
            .iter()
            .any(|suffix| host.ends_with(suffix.as_str()) || host == &suffix[1..])
    }
}

impl Default for ProviderSuffixes {
    fn default() -> Self {
        Self::new(DEFAULT_PROVIDER_SUFFIXES)
    }
}

fn normalise(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

pub fn host_class(host: &str, providers: &ProviderSuffixes) -> HostClass {
    let host = normalise(host);
    // A leading slash is a Unix socket directory.
    let loopback = host.is_empty()
        || host.starts_with('/')
        || host == "localhost"
        || host.ends_with(".localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback());
    if loopback {
        HostClass::Loopback
    } else if providers.matches(&host) {
        HostClass::ManagedProvider
    } else {
        HostClass::Other
    }
}

pub fn classify_host(host: &str, providers: &ProviderSuffixes) -> SslPolicy {
    match host_class(host, providers) {
        HostClass::Loopback => SslPolicy::DISABLED,
        HostClass::ManagedProvider | HostClass::Other => SslPolicy::RELAXED,
    }
}
