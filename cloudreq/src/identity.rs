//! Identity v3 binding: tokens, the service catalog and projects.

use std::fmt::{self, Debug};

use cloudreq_core::utils::Redact;
use cloudreq_core::{ClientConfig, Error, HttpClient, RequestOptions, Result};
use serde::{Deserialize, Serialize};

use crate::client::{ServiceBinding, ServiceKey};
use crate::config::AuthOptions;

const TOKENS_URL: &str = "/v3/auth/tokens";
const CATALOG_URL: &str = "/v3/auth/catalog";
const PROJECTS_URL: &str = "/v3/projects";

/// A name/id reference, the way identity v3 points at domains and projects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameOrId {
    /// Referenced id, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Referenced name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Domain a user or project belongs to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Domain {
    /// Domain id.
    pub id: String,
    /// Domain name.
    pub name: String,
}

/// The user a token was issued for.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenUser {
    /// User id.
    pub id: String,
    /// User name.
    pub name: String,
    /// Domain the user belongs to.
    pub domain: Domain,
}

/// Project scope attached to a token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenProject {
    /// Project id.
    pub id: String,
    /// Project name.
    pub name: String,
}

/// One endpoint of a catalog entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEndpoint {
    /// Endpoint id.
    pub id: String,
    /// Endpoint URL, usually carrying the API version as its last segment.
    pub url: String,
    /// Region the endpoint serves; `*` means every region.
    #[serde(default)]
    pub region: Option<String>,
    /// Region id, where the catalog distinguishes it from the region name.
    #[serde(default)]
    pub region_id: Option<String>,
    /// Endpoint interface: `public`, `internal` or `admin`.
    pub interface: String,
}

/// One service of the endpoint catalog.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEntry {
    /// Service id.
    pub id: String,
    /// Service name, e.g. `iam`.
    pub name: String,
    /// Service type, e.g. `identity`; the capability side of a
    /// [`ServiceKey`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Endpoints of this service across regions and interfaces.
    pub endpoints: Vec<CatalogEndpoint>,
}

/// An issued or verified token.
#[derive(Clone, PartialEq)]
pub struct Token {
    /// Token id, taken from the `X-Subject-Token` response header.
    pub id: String,
    /// User the token belongs to.
    pub user: TokenUser,
    /// Project scope, when the token is project-scoped.
    pub project: Option<TokenProject>,
    /// Endpoint catalog, unless the token was requested without one.
    pub catalog: Option<Vec<CatalogEntry>>,
}

impl Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("id", &Redact::from(&self.id))
            .field("user", &self.user)
            .field("project", &self.project)
            .field("catalog", &self.catalog.as_ref().map(Vec::len))
            .finish()
    }
}

/// A project (tenant) visible to the authenticated user.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Project {
    /// Project id.
    pub id: String,
    /// Project name, e.g. `eu-de_test`.
    pub name: String,
    /// Domain the project belongs to.
    pub domain_id: String,
    /// Whether the project is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    user: TokenUser,
    #[serde(default)]
    project: Option<TokenProject>,
    #[serde(default)]
    catalog: Option<Vec<CatalogEntry>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenInfo,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct ProjectsResponse {
    projects: Vec<Project>,
}

#[derive(Serialize)]
struct PasswordUser<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    password: &'a str,
    domain: NameOrId,
}

#[derive(Serialize)]
struct PasswordMethod<'a> {
    user: PasswordUser<'a>,
}

#[derive(Serialize)]
struct AuthIdentity<'a> {
    methods: [&'static str; 1],
    password: PasswordMethod<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum AuthScope {
    Project(NameOrId),
    Domain(NameOrId),
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    identity: AuthIdentity<'a>,
    scope: AuthScope,
}

#[derive(Serialize)]
struct AuthBody<'a> {
    auth: AuthRequest<'a>,
}

/// The password-method token request body. Scoped to the project when the
/// options name one, to the domain otherwise.
fn password_body(opts: &AuthOptions) -> Result<serde_json::Value> {
    let Some(password) = opts.password.as_deref() else {
        return Err(Error::credential_invalid("Password has to be provided"));
    };

    let domain = NameOrId {
        id: opts.domain_id.clone(),
        name: opts.domain_name.clone(),
    };
    let scope = if opts.project_id.is_some() || opts.project_name.is_some() {
        AuthScope::Project(NameOrId {
            id: opts.project_id.clone(),
            name: opts.project_name.clone(),
        })
    } else {
        AuthScope::Domain(domain.clone())
    };

    let body = AuthBody {
        auth: AuthRequest {
            identity: AuthIdentity {
                methods: ["password"],
                password: PasswordMethod {
                    user: PasswordUser {
                        name: opts.username.as_deref(),
                        password,
                        domain,
                    },
                },
            },
            scope,
        },
    };
    Ok(serde_json::to_value(body)?)
}

/// The identity v3 binding.
///
/// The one resource binding the facade ships, because authentication
/// itself needs it: issuing and verifying tokens, reading the endpoint
/// catalog and listing projects.
#[derive(Debug, Clone)]
pub struct IdentityV3 {
    client: HttpClient,
}

impl ServiceBinding for IdentityV3 {
    fn key() -> ServiceKey {
        ServiceKey::new("identity", "3")
    }

    fn bind(endpoint: &str, client: &HttpClient) -> Self {
        // Operation paths carry /v3 themselves; catalogs disagree on
        // whether the endpoint does.
        let base = endpoint.trim_end_matches('/');
        let base = base.strip_suffix("/v3").unwrap_or(base);
        Self {
            client: client.child(ClientConfig::new().with_base_url(base)),
        }
    }
}

impl IdentityV3 {
    /// Issue a token from the password credentials in `opts`.
    ///
    /// The token id arrives in the `X-Subject-Token` response header, not
    /// in the body; a response without that header is an error. Passing
    /// `nocatalog` asks the service to skip the catalog in the response.
    pub async fn issue_token(&self, opts: &AuthOptions, nocatalog: bool) -> Result<Token> {
        let resp = self
            .client
            .post(
                RequestOptions::new()
                    .with_url(TOKENS_URL)
                    .with_param_opt("nocatalog", nocatalog.then_some("nocatalog"))
                    .with_json(password_body(opts)?),
            )
            .await?;

        let id = resp
            .header("x-subject-token")
            .ok_or_else(|| Error::unexpected("No tokenID provided as X-Subject-Token"))?
            .to_string();
        let data: TokenResponse = serde_json::from_value(resp.data)?;
        Ok(Token {
            id,
            user: data.token.user,
            project: data.token.project,
            catalog: data.token.catalog,
        })
    }

    /// Look up an existing token and return what it is scoped to.
    pub async fn verify_token(&self, token_id: &str, nocatalog: bool) -> Result<Token> {
        let resp = self
            .client
            .get(
                RequestOptions::new()
                    .with_url(TOKENS_URL)
                    .with_header("X-Subject-Token", token_id)
                    .with_param_opt("nocatalog", nocatalog.then_some("nocatalog")),
            )
            .await?;

        let data: TokenResponse = serde_json::from_value(resp.data)?;
        Ok(Token {
            id: token_id.to_string(),
            user: data.token.user,
            project: data.token.project,
            catalog: data.token.catalog,
        })
    }

    /// List the service endpoint catalog for the token in use.
    pub async fn list_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let resp = self
            .client
            .get(RequestOptions::new().with_url(CATALOG_URL))
            .await?;
        let data: CatalogResponse = serde_json::from_value(resp.data)?;
        Ok(data.catalog)
    }

    /// List visible projects, optionally filtered by exact name.
    pub async fn list_projects(&self, name: Option<&str>) -> Result<Vec<Project>> {
        let resp = self
            .client
            .get(
                RequestOptions::new()
                    .with_url(PROJECTS_URL)
                    .with_param_opt("name", name),
            )
            .await?;
        let data: ProjectsResponse = serde_json::from_value(resp.data)?;
        Ok(data.projects)
    }
}

#[cfg(test)]
mod tests {
    use cloudreq_core::{ErrorKind, StaticHttpSend};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    fn sample_options() -> AuthOptions {
        AuthOptions {
            auth_url: "https://iam.eu-de.example.com/v3".to_string(),
            username: Some("jdoe".to_string()),
            password: Some("hunter2".to_string()),
            domain_name: Some("MYDOMAIN".to_string()),
            ..AuthOptions::default()
        }
    }

    #[test]
    fn test_password_body_scopes_to_domain_by_default() {
        let body = password_body(&sample_options()).unwrap();

        assert_eq!(
            body,
            json!({
                "auth": {
                    "identity": {
                        "methods": ["password"],
                        "password": {
                            "user": {
                                "name": "jdoe",
                                "password": "hunter2",
                                "domain": {"name": "MYDOMAIN"},
                            },
                        },
                    },
                    "scope": {"domain": {"name": "MYDOMAIN"}},
                },
            })
        );
    }

    #[test]
    fn test_password_body_prefers_project_scope() {
        let mut opts = sample_options();
        opts.project_name = Some("eu-de_test".to_string());

        let body = password_body(&opts).unwrap();

        assert_eq!(body["auth"]["scope"], json!({"project": {"name": "eu-de_test"}}));
    }

    #[test]
    fn test_password_body_requires_password() {
        let mut opts = sample_options();
        opts.password = None;

        let err = password_body(&opts).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CredentialInvalid);
        assert!(err.to_string().contains("Password has to be provided"));
    }

    #[test_case("https://iam.eu-de.example.com/v3", "https://iam.eu-de.example.com"; "versioned")]
    #[test_case("https://iam.eu-de.example.com/v3/", "https://iam.eu-de.example.com"; "versioned with slash")]
    #[test_case("https://iam.eu-de.example.com", "https://iam.eu-de.example.com"; "bare")]
    fn test_bind_strips_version_suffix(endpoint: &str, expect: &str) {
        let client = HttpClient::new(ClientConfig::new(), StaticHttpSend::new());

        let identity = IdentityV3::bind(endpoint, &client);

        assert_eq!(identity.client.base_url(), Some(expect));
    }

    #[test]
    fn test_token_deserializes_and_redacts_debug() {
        let data: TokenResponse = serde_json::from_value(json!({
            "token": {
                "user": {
                    "id": "u-1",
                    "name": "jdoe",
                    "domain": {"id": "d-1", "name": "MYDOMAIN"},
                },
                "project": {"id": "p-1", "name": "eu-de_test"},
            },
        }))
        .unwrap();

        let token = Token {
            id: "MIIDkgYJKoZIhvcNAQcCoIIDgzCCA38CAQEx".to_string(),
            user: data.token.user,
            project: data.token.project,
            catalog: data.token.catalog,
        };

        assert_eq!(token.user.domain.id, "d-1");
        assert_eq!(token.project.as_ref().map(|p| p.id.as_str()), Some("p-1"));
        let dump = format!("{token:?}");
        assert!(!dump.contains("MIIDkgYJKoZIhvcNAQcCoIIDgzCCA38CAQEx"));
    }

    #[test]
    fn test_catalog_entry_deserializes() {
        let entry: CatalogEntry = serde_json::from_value(json!({
            "id": "svc-1",
            "name": "ecs",
            "type": "compute",
            "endpoints": [{
                "id": "ep-1",
                "url": "https://ecs.eu-de.example.com/v1",
                "region": "eu-de",
                "region_id": "eu-de",
                "interface": "public",
            }],
        }))
        .unwrap();

        assert_eq!(entry.kind, "compute");
        assert_eq!(entry.endpoints[0].region.as_deref(), Some("eu-de"));
    }
}
