use std::fmt::{self, Debug};

use cloudreq_core::utils::Redact;

/// Region used when the configuration does not name one.
pub const DEFAULT_REGION: &str = "eu-de";

/// Credential material and scope selectors for one cloud.
///
/// Only `auth_url` is always required. Which of the other fields matter
/// depends on the flow picked by [`CloudClient::authenticate`]: username,
/// password and domain for password authentication, `token` to reuse an
/// issued token, `ak`/`sk` for signed requests.
///
/// [`CloudClient::authenticate`]: crate::CloudClient::authenticate
#[derive(Clone, Default)]
pub struct AuthOptions {
    /// Identity endpoint, e.g. `https://iam.eu-de.otc.t-systems.com/v3`.
    pub auth_url: String,
    /// Token id to reuse instead of issuing a fresh one. Populated by
    /// the password flow after a token has been issued.
    pub token: Option<String>,
    /// User name for password authentication.
    pub username: Option<String>,
    /// Password for password authentication.
    pub password: Option<String>,
    /// Domain name the user belongs to.
    pub domain_name: Option<String>,
    /// Domain id; resolved during authentication when absent.
    pub domain_id: Option<String>,
    /// Project name used for project scoping.
    pub project_name: Option<String>,
    /// Project id; resolved during authentication when absent.
    pub project_id: Option<String>,
    /// Access key for signed requests.
    pub ak: Option<String>,
    /// Secret key for signed requests.
    pub sk: Option<String>,
}

impl Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOptions")
            .field("auth_url", &self.auth_url)
            .field("token", &Redact::from(&self.token))
            .field("username", &self.username)
            .field("password", &Redact::from(&self.password))
            .field("domain_name", &self.domain_name)
            .field("domain_id", &self.domain_id)
            .field("project_name", &self.project_name)
            .field("project_id", &self.project_id)
            .field("ak", &Redact::from(&self.ak))
            .field("sk", &Redact::from(&self.sk))
            .finish()
    }
}

/// The one explicit configuration object of [`CloudClient`].
///
/// Nothing here is read from environment variables or config files; the
/// caller assembles the whole configuration in code, usually through the
/// `with_*` presets.
///
/// ```
/// use cloudreq::CloudConfig;
///
/// let config = CloudConfig::new("https://iam.eu-de.otc.t-systems.com/v3")
///     .with_password("jdoe", "secret", "MYDOMAIN")
///     .with_project("eu-de_test");
/// assert_eq!(config.region, "eu-de");
/// ```
///
/// [`CloudClient`]: crate::CloudClient
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Authentication options.
    pub auth: AuthOptions,
    /// Region used to pick service endpoints from the catalog.
    pub region: String,
}

impl CloudConfig {
    /// Start a configuration against the given identity endpoint.
    pub fn new(auth_url: impl Into<String>) -> Self {
        Self {
            auth: AuthOptions {
                auth_url: auth_url.into(),
                ..AuthOptions::default()
            },
            region: DEFAULT_REGION.to_string(),
        }
    }

    /// Authenticate with user name and password under the given domain.
    pub fn with_password(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        domain_name: impl Into<String>,
    ) -> Self {
        self.auth.username = Some(username.into());
        self.auth.password = Some(password.into());
        self.auth.domain_name = Some(domain_name.into());
        self
    }

    /// Authenticate with an already issued token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth.token = Some(token.into());
        self
    }

    /// Authenticate by signing every request with the AK/SK pair.
    pub fn with_ak_sk(mut self, ak: impl Into<String>, sk: impl Into<String>) -> Self {
        self.auth.ak = Some(ak.into());
        self.auth.sk = Some(sk.into());
        self
    }

    /// Scope the session to the named project.
    pub fn with_project(mut self, name: impl Into<String>) -> Self {
        self.auth.project_name = Some(name.into());
        self
    }

    /// Pick service endpoints for this region instead of [`DEFAULT_REGION`].
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_presets_fill_auth_options() {
        let config = CloudConfig::new("https://iam.eu-de.example.com/v3")
            .with_password("jdoe", "hunter2hunter2", "MYDOMAIN")
            .with_project("eu-de_test")
            .with_region("eu-nl");

        assert_eq!(config.auth.auth_url, "https://iam.eu-de.example.com/v3");
        assert_eq!(config.auth.username.as_deref(), Some("jdoe"));
        assert_eq!(config.auth.password.as_deref(), Some("hunter2hunter2"));
        assert_eq!(config.auth.domain_name.as_deref(), Some("MYDOMAIN"));
        assert_eq!(config.auth.project_name.as_deref(), Some("eu-de_test"));
        assert_eq!(config.region, "eu-nl");
    }

    #[test]
    fn test_token_and_ak_sk_presets() {
        let config = CloudConfig::new("https://iam.eu-de.example.com/v3")
            .with_token("gAAAAABfscD3token")
            .with_ak_sk("AKIDEXAMPLE", "BYBYIiF3WUZGlorXmcTEDtNjB40JTibEXAMPLE");

        assert_eq!(config.auth.token.as_deref(), Some("gAAAAABfscD3token"));
        assert_eq!(config.auth.ak.as_deref(), Some("AKIDEXAMPLE"));
        assert!(config.auth.sk.is_some());
        assert_eq!(config.region, DEFAULT_REGION);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = CloudConfig::new("https://iam.eu-de.example.com/v3")
            .with_password("jdoe", "hunter2hunter2", "MYDOMAIN")
            .with_ak_sk("AKIDEXAMPLE", "BYBYIiF3WUZGlorXmcTEDtNjB40JTibEXAMPLE");

        let dump = format!("{:?}", config.auth);
        assert!(!dump.contains("hunter2hunter2"));
        assert!(!dump.contains("BYBYIiF3WUZGlorXmcTEDtNjB40JTibEXAMPLE"));
        assert!(dump.contains("jdoe"));
    }
}
