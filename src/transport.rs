//! An HTTP client that fetches evaluated variants from the server.
use std::time::Duration;

use base64::prelude::{Engine, BASE64_STANDARD};
use reqwest::Url;

use crate::{Error, Result, UserContext, Variants};

const VARDATA_ENDPOINT: &str = "/sdk/v2/vardata";

/// Header carrying the base64-encoded user context.
const USER_HEADER: &str = "X-Amp-Exp-User";

/// Capability interface for the backend variant fetch.
///
/// The fetch coordinator depends on this trait rather than a concrete HTTP
/// client, so tests and alternative backends can stand in for the network.
/// `timeout` bounds a single attempt, measured from dispatch; an elapsed
/// timeout must surface as [`Error::FetchTimeout`].
pub trait Transport: Send + Sync {
    /// Fetch evaluated variants for `user`.
    fn fetch(&self, user: &UserContext, timeout: Duration) -> Result<Variants>;
}

/// A [`Transport`] that fetches variants over HTTP.
pub struct HttpTransport {
    // Client holds a connection pool internally, so we're reusing the client
    // between requests.
    client: reqwest::blocking::Client,
    endpoint: Url,
    deployment_key: String,
}

impl HttpTransport {
    /// Create a transport fetching from `server_url` on behalf of
    /// `deployment_key`.
    pub fn new(deployment_key: impl Into<String>, server_url: &str) -> Result<HttpTransport> {
        let endpoint = Url::parse_with_params(
            &format!("{server_url}{VARDATA_ENDPOINT}"),
            &[("v", "0")],
        )
        .map_err(|err| Error::InvalidConfig(format!("invalid server url: {err}")))?;

        Ok(HttpTransport {
            client: reqwest::blocking::Client::new(),
            endpoint,
            deployment_key: deployment_key.into(),
        })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, user: &UserContext, timeout: Duration) -> Result<Variants> {
        let user_json = serde_json::to_vec(user)
            .map_err(|err| Error::FetchFailed(format!("failed to encode user context: {err}")))?;

        log::debug!(target: "experiment", "fetching variants");
        let response = self
            .client
            .get(self.endpoint.clone())
            .timeout(timeout)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Api-Key {}", self.deployment_key),
            )
            .header(USER_HEADER, BASE64_STANDARD.encode(user_json))
            .send()?;

        let response = response.error_for_status().map_err(|err| {
            log::warn!(target: "experiment", "received non-200 response while fetching variants: {err:?}");
            Error::from(err)
        })?;

        let variants: Variants = response.json()?;
        log::debug!(target: "experiment", "successfully fetched {} variants", variants.len());

        Ok(variants)
    }
}
