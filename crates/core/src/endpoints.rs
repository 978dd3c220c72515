//! Endpoint validation for configured provider base URLs.
//!
//! Every configured endpoint passes through [`validate_endpoint`] at
//! settings load time, before any client is constructed. Validation is pure
//! and deterministic: no I/O, no side effects.

use url::Url;

use crate::errors::{Error, Result};

/// Closed allowlist: provider name -> accepted hostnames (production and
/// sandbox variants). Unknown providers are rejected outright.
const PROVIDER_ALLOWLIST: &[(&str, &[&str])] = &[
    ("rubic", &["api.rubic.no", "api-test.rubic.no"]),
    (
        "tripletex",
        &["tripletex.no", "api.tripletex.io", "api-test.tripletex.tech"],
    ),
];

/// Accepted hostnames for a provider, if the provider is known.
pub fn allowed_hosts(provider: &str) -> Option<&'static [&'static str]> {
    PROVIDER_ALLOWLIST
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, hosts)| *hosts)
}

/// Validate a configured base endpoint against a provider's allowlist.
///
/// Fails when the endpoint does not parse as a URL, uses a scheme other
/// than `https`, embeds inline credentials, or points at a hostname the
/// provider's allowlist does not contain.
pub fn validate_endpoint(endpoint: &str, provider: &str) -> Result<()> {
    let hosts = allowed_hosts(provider).ok_or_else(|| {
        Error::configuration(format!("Unknown endpoint provider '{}'", provider))
    })?;

    let url = Url::parse(endpoint).map_err(|e| {
        Error::configuration(format!("Endpoint '{}' is not a valid URL: {}", endpoint, e))
    })?;

    if url.scheme() != "https" {
        return Err(Error::configuration(format!(
            "Endpoint '{}' must use https, got '{}'",
            endpoint,
            url.scheme()
        )));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(Error::configuration(format!(
            "Endpoint for provider '{}' must not embed credentials",
            provider
        )));
    }

    let host = url.host_str().ok_or_else(|| {
        Error::configuration(format!("Endpoint '{}' has no hostname", endpoint))
    })?;

    if !hosts.contains(&host) {
        return Err(Error::configuration(format!(
            "Host '{}' is not an allowed endpoint for provider '{}'",
            host, provider
        )));
    }

    Ok(())
}
