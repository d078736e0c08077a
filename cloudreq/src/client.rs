//! The top-level cloud client: authentication and the endpoint registry.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::{Arc, RwLock};

use cloudreq_core::utils::Redact;
use cloudreq_core::{
    handler_fn, ClientConfig, Credentials, Error, HttpClient, HttpSend, RequestSigner, Result,
    SigningScheme, Stage,
};
use http::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use log::debug;

use crate::config::CloudConfig;
use crate::identity::{CatalogEntry, IdentityV3};

/// `User-Agent` attached to every outgoing call.
pub const USER_AGENT_VALUE: &str = concat!("cloudreq/", env!("CARGO_PKG_VERSION"));

/// Capability key of the endpoint registry: what a service does plus the
/// API version it speaks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    /// Service type as the catalog names it, e.g. `identity` or `compute`.
    pub kind: String,
    /// API version, e.g. `3` or `2.1`; empty when unknown.
    pub version: String,
}

impl ServiceKey {
    /// Create a key for a kind and version.
    pub fn new(kind: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}/v{}", self.kind, self.version)
        }
    }
}

/// A typed binding over one registered service endpoint.
///
/// Implementors name the capability they need with [`ServiceBinding::key`]
/// and build themselves over a scoped client in [`ServiceBinding::bind`];
/// [`CloudClient::get_service`] looks the endpoint up and calls `bind`.
pub trait ServiceBinding: Sized {
    /// The capability this binding needs from the registry.
    fn key() -> ServiceKey;

    /// Build the binding over the endpoint it was registered under.
    fn bind(endpoint: &str, client: &HttpClient) -> Self;
}

/// Credential-derived session state, owned here and nowhere else.
///
/// The signing and header middleware read it through a shared lock; the
/// core pipeline never writes it.
#[derive(Default)]
struct AuthState {
    token: Option<String>,
    project_id: Option<String>,
    domain_id: Option<String>,
}

impl Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("token", &Redact::from(&self.token))
            .field("project_id", &self.project_id)
            .field("domain_id", &self.domain_id)
            .finish()
    }
}

/// Authenticated entry point to one cloud.
///
/// `CloudClient` owns the root [`HttpClient`], the [`CloudConfig`] it was
/// built from, the mutable session state (token, project id, domain id)
/// and the endpoint registry fed by the service catalog. Configure and
/// [`authenticate`](CloudClient::authenticate) once during setup; service
/// bindings obtained afterwards share the authenticated pipeline.
pub struct CloudClient {
    http: HttpClient,
    config: CloudConfig,
    state: Arc<RwLock<AuthState>>,
    registry: HashMap<ServiceKey, String>,
    token_middleware_installed: bool,
}

impl Debug for CloudClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudClient")
            .field("config", &self.config)
            .field("state", &self.state.read().expect("lock poisoned"))
            .field("services", &self.registry.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CloudClient {
    /// Create a client over the given transport.
    ///
    /// The common-header stage is installed right away (`User-Agent`,
    /// `Accept` and `Content-Type`, kept only when the call does not set
    /// its own), and the identity endpoint from `auth_url` seeds the
    /// registry. Nothing talks to the network until
    /// [`authenticate`](CloudClient::authenticate).
    pub fn new(config: CloudConfig, transport: impl HttpSend) -> Result<Self> {
        let http = HttpClient::new(ClientConfig::new(), transport);
        http.configure(
            Stage::CommonHeaders,
            handler_fn(|mut req| {
                let defaults: [(HeaderName, &str); 3] = [
                    (USER_AGENT, USER_AGENT_VALUE),
                    (ACCEPT, "application/json"),
                    (CONTENT_TYPE, "application/json"),
                ];
                for (name, value) in defaults {
                    if !req.headers.contains_key(&name) {
                        req.headers.insert(name, HeaderValue::from_static(value));
                    }
                }
                Ok(req)
            }),
        )?;

        let state = AuthState {
            token: config.auth.token.clone(),
            project_id: config.auth.project_id.clone(),
            domain_id: config.auth.domain_id.clone(),
        };

        let mut client = Self {
            http,
            config,
            state: Arc::new(RwLock::new(state)),
            registry: HashMap::new(),
            token_middleware_installed: false,
        };
        let auth_url = client.config.auth.auth_url.clone();
        client.register_endpoint("identity", &auth_url);
        Ok(client)
    }

    /// The request pipeline shared with every service binding.
    pub fn http_client(&self) -> &HttpClient {
        &self.http
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    /// Token id of the session, once issued or verified.
    pub fn token(&self) -> Option<String> {
        self.state.read().expect("lock poisoned").token.clone()
    }

    /// Project id the session is scoped to, once known.
    pub fn project_id(&self) -> Option<String> {
        self.state.read().expect("lock poisoned").project_id.clone()
    }

    /// Domain id of the authenticated user, once known.
    pub fn domain_id(&self) -> Option<String> {
        self.state.read().expect("lock poisoned").domain_id.clone()
    }

    /// Register a service endpoint under its capability key.
    ///
    /// The version half of the key is read from a trailing `/vN` or
    /// `/vN.M` segment of the URL; catalogs rarely carry an explicit
    /// version field.
    pub fn register_endpoint(&mut self, kind: &str, url: &str) {
        let key = ServiceKey::new(kind, version_from_url(url).unwrap_or_default());
        debug!("registering service {key} at {url}");
        self.registry.insert(key, url.to_string());
    }

    /// Build the typed binding `S` over its registered endpoint.
    ///
    /// Lookup is exact on kind and version first, then falls back to any
    /// endpoint of the same kind, since not every catalog versions its
    /// URLs.
    pub fn get_service<S: ServiceBinding>(&self) -> Result<S> {
        let key = S::key();
        let endpoint = self
            .registry
            .get(&key)
            .or_else(|| {
                self.registry
                    .iter()
                    .find(|(candidate, _)| candidate.kind == key.kind)
                    .map(|(_, url)| url)
            })
            .ok_or_else(|| Error::service_discovery(format!("Service '{key}' is not registered")))?;
        Ok(S::bind(endpoint, &self.http))
    }

    /// Authenticate the session and populate the endpoint registry.
    ///
    /// A configuration carrying an AK/SK pair gets the signing flow:
    /// every later request is signed, the project id is resolved by name
    /// when missing, and `X-Project-Id`/`X-Domain-Id` scoping is injected.
    /// Any other configuration gets the token flow: a token is issued from
    /// the password options (or an existing one verified), injected as
    /// `X-Auth-Token`, and the catalog attached to it fills the registry.
    ///
    /// Call once during setup, before concurrent request traffic starts.
    pub async fn authenticate(&mut self) -> Result<()> {
        if self.config.auth.ak.is_some() || self.config.auth.sk.is_some() {
            self.auth_ak_sk().await
        } else {
            self.auth_token().await
        }
    }

    async fn auth_ak_sk(&mut self) -> Result<()> {
        let (Some(ak), Some(sk)) = (self.config.auth.ak.clone(), self.config.auth.sk.clone())
        else {
            return Err(Error::credential_invalid(format!(
                "Missing AK/SK: {:?}",
                self.config.auth
            )));
        };

        debug!("authenticating with AK/SK, region {}", self.config.region);
        let credentials = Credentials::new(&ak, &sk).with_region(&self.config.region);
        self.http.configure(
            Stage::Signing,
            RequestSigner::new(SigningScheme::Sdk).into_handler(credentials),
        )?;

        // The lookup below already goes out signed.
        if self.project_id().is_none() {
            if let Some(name) = self.config.auth.project_name.clone() {
                let identity: IdentityV3 = self.get_service()?;
                let project = identity
                    .list_projects(Some(&name))
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        Error::unexpected(format!(
                            "no project named '{name}' is visible to these credentials"
                        ))
                    })?;
                let mut state = self.state.write().expect("lock poisoned");
                state.project_id = Some(project.id);
                state.domain_id = Some(project.domain_id);
            }
        }

        // Runs in the middleware stage, so the scoping headers are part
        // of the signature.
        let state = Arc::clone(&self.state);
        self.http.push_middleware(handler_fn(move |mut req| {
            let state = state.read().expect("lock poisoned");
            if let Some(id) = &state.project_id {
                req.headers.insert("x-project-id", id.parse()?);
            }
            if let Some(id) = &state.domain_id {
                req.headers.insert("x-domain-id", id.parse()?);
            }
            Ok(req)
        }));
        Ok(())
    }

    async fn auth_token(&mut self) -> Result<()> {
        let identity: IdentityV3 = self.get_service()?;

        let token = match self.token() {
            Some(token_id) => {
                debug!("verifying existing token");
                self.install_token_middleware();
                identity.verify_token(&token_id, false).await?
            }
            None => {
                debug!("issuing token from password options");
                let token = identity.issue_token(&self.config.auth, false).await?;
                self.state.write().expect("lock poisoned").token = Some(token.id.clone());
                self.install_token_middleware();
                token
            }
        };

        {
            let mut state = self.state.write().expect("lock poisoned");
            if let Some(project) = &token.project {
                state.project_id = Some(project.id.clone());
            }
            state.domain_id = Some(token.user.domain.id.clone());
        }

        let catalog = token
            .catalog
            .ok_or_else(|| Error::unexpected("No service catalog provided"))?;
        self.save_service_catalog(&catalog);
        Ok(())
    }

    /// Middleware reading the session token on every call; before a token
    /// exists it adds nothing, so the issuing request itself stays bare.
    fn install_token_middleware(&mut self) {
        if self.token_middleware_installed {
            return;
        }
        let state = Arc::clone(&self.state);
        self.http.push_middleware(handler_fn(move |mut req| {
            if let Some(token) = &state.read().expect("lock poisoned").token {
                let mut value: HeaderValue = token.parse()?;
                value.set_sensitive(true);
                req.headers.insert("x-auth-token", value);
            }
            Ok(req)
        }));
        self.token_middleware_installed = true;
    }

    /// Keep, per catalog entry, the public endpoint serving the
    /// configured region (or `*`, the any-region marker).
    pub fn save_service_catalog(&mut self, catalog: &[CatalogEntry]) {
        for entry in catalog {
            let endpoint = entry.endpoints.iter().find(|ep| {
                let region = ep.region.as_deref().or(ep.region_id.as_deref());
                (region == Some(self.config.region.as_str()) || region == Some("*"))
                    && ep.interface == "public"
            });
            match endpoint {
                Some(ep) => self.register_endpoint(&entry.kind, &ep.url),
                None => debug!(
                    "no public {} endpoint in region {}, skipping {}",
                    entry.kind, self.config.region, entry.name
                ),
            }
        }
    }
}

/// Version read from a trailing `/vN` or `/vN.M` URL segment.
fn version_from_url(url: &str) -> Option<String> {
    let segment = url.trim_end_matches('/').rsplit('/').next()?;
    let version = segment.strip_prefix('v')?;
    let numeric =
        !version.is_empty() && version.chars().all(|c| c.is_ascii_digit() || c == '.');
    numeric.then(|| version.to_string())
}

#[cfg(test)]
mod tests {
    use cloudreq_core::{ErrorKind, StaticHttpSend};
    use pretty_assertions::assert_eq;
    use serde_json::{from_value, json};
    use test_case::test_case;

    use super::*;

    fn sample_client() -> CloudClient {
        let config = CloudConfig::new("https://iam.eu-de.example.com/v3");
        CloudClient::new(config, StaticHttpSend::new()).unwrap()
    }

    #[test_case("https://iam.eu-de.example.com/v3", Some("3"); "major")]
    #[test_case("https://image.eu-de.example.com/v2.1/", Some("2.1"); "minor and slash")]
    #[test_case("https://ecs.eu-de.example.com", None; "bare host")]
    #[test_case("https://vpc.eu-de.example.com/vpcs", None; "non numeric segment")]
    fn test_version_from_url(url: &str, expect: Option<&str>) {
        assert_eq!(version_from_url(url).as_deref(), expect);
    }

    #[test]
    fn test_service_key_display() {
        assert_eq!(ServiceKey::new("identity", "3").to_string(), "identity/v3");
        assert_eq!(ServiceKey::new("compute", "").to_string(), "compute");
    }

    #[test]
    fn test_new_seeds_identity_endpoint() {
        let client = sample_client();

        assert!(client.get_service::<IdentityV3>().is_ok());
        assert!(client.registry.contains_key(&ServiceKey::new("identity", "3")));
    }

    #[test]
    fn test_get_service_falls_back_across_versions() {
        let mut client = sample_client();
        // Registered without a version suffix, looked up as identity/v3.
        client.registry.clear();
        client.register_endpoint("identity", "https://iam.eu-de.example.com");

        assert!(client.get_service::<IdentityV3>().is_ok());
    }

    #[test]
    fn test_get_service_unknown_capability() {
        #[derive(Debug)]
        struct ImageV2;
        impl ServiceBinding for ImageV2 {
            fn key() -> ServiceKey {
                ServiceKey::new("image", "2")
            }
            fn bind(_endpoint: &str, _client: &HttpClient) -> Self {
                Self
            }
        }

        let err = sample_client().get_service::<ImageV2>().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ServiceDiscovery);
        assert!(err.to_string().contains("'image/v2' is not registered"));
    }

    #[test]
    fn test_save_service_catalog_picks_region_and_interface() {
        let mut client = sample_client();
        let catalog: Vec<CatalogEntry> = from_value(json!([
            {
                "id": "s-1",
                "name": "ecs",
                "type": "compute",
                "endpoints": [
                    {"id": "e-1", "url": "https://ecs.eu-nl.example.com/v1",
                     "region": "eu-nl", "interface": "public"},
                    {"id": "e-2", "url": "https://ecs-admin.eu-de.example.com/v1",
                     "region": "eu-de", "interface": "admin"},
                    {"id": "e-3", "url": "https://ecs.eu-de.example.com/v1",
                     "region": "eu-de", "interface": "public"},
                ],
            },
            {
                "id": "s-2",
                "name": "ims",
                "type": "image",
                "endpoints": [
                    {"id": "e-4", "url": "https://ims.example.com/v2",
                     "region": "*", "interface": "public"},
                ],
            },
            {
                "id": "s-3",
                "name": "swift",
                "type": "object-store",
                "endpoints": [
                    {"id": "e-5", "url": "https://swift.eu-nl.example.com/v1",
                     "region": "eu-nl", "interface": "public"},
                ],
            },
        ]))
        .unwrap();

        client.save_service_catalog(&catalog);

        assert_eq!(
            client.registry.get(&ServiceKey::new("compute", "1")),
            Some(&"https://ecs.eu-de.example.com/v1".to_string())
        );
        assert_eq!(
            client.registry.get(&ServiceKey::new("image", "2")),
            Some(&"https://ims.example.com/v2".to_string())
        );
        // No endpoint for the configured region.
        assert!(!client
            .registry
            .keys()
            .any(|key| key.kind == "object-store"));
    }

    #[test]
    fn test_state_seeded_from_config() {
        let mut config = CloudConfig::new("https://iam.eu-de.example.com/v3")
            .with_token("gAAAAABfseeded-token");
        config.auth.project_id = Some("p-1".to_string());

        let client = CloudClient::new(config, StaticHttpSend::new()).unwrap();

        assert_eq!(client.token().as_deref(), Some("gAAAAABfseeded-token"));
        assert_eq!(client.project_id().as_deref(), Some("p-1"));
        assert_eq!(client.domain_id(), None);
    }
}
