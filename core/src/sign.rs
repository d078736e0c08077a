//! Credential-based signing of normalized requests.

use std::fmt;
use std::fmt::Write;

use http::{header, HeaderMap, HeaderName, HeaderValue, Uri};
use log::debug;

use crate::chain::{handler_fn, Handler};
use crate::hash::{hex_hmac_sha256, hex_sha256, hmac_sha256};
use crate::options::NormalizedRequest;
use crate::time::{format_date, format_iso8601, now, DateTime};
use crate::utils::Redact;
use crate::{Error, Result};

/// Static access key pair a signing key is derived from.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Access key id, the public half of the pair.
    pub access_key_id: String,
    /// Secret access key, never sent on the wire.
    pub secret_access_key: String,
    /// Region the derived key is scoped to. May stay empty for services
    /// that are not region-bound.
    pub region_name: String,
}

impl Credentials {
    /// Create a key pair with an empty region scope.
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            region_name: String::new(),
        }
    }

    /// Scope the derived signing key to a region.
    pub fn with_region(mut self, region: &str) -> Self {
        self.region_name = region.to_string();
        self
    }

    /// Check whether both halves of the key pair are present.
    pub fn is_complete(&self) -> bool {
        !self.access_key_id.is_empty() && !self.secret_access_key.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("region_name", &self.region_name)
            .finish()
    }
}

/// Canonicalization scheme a [`RequestSigner`] follows.
///
/// Both schemes share the canonical request layout and the HMAC-SHA256 key
/// derivation chain; they differ in their constants and in which headers are
/// folded into the signature.
///
/// - [API Request Signing (Huawei Cloud)](https://support.huaweicloud.com/intl/en-us/devg-apisign/api-sign-algorithm.html)
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningScheme {
    /// `SDK-HMAC-SHA256`, signing every header present on the request.
    Sdk,
    /// `AWS4-HMAC-SHA256`, signing exactly `content-type`, `host` and
    /// `x-amz-date`.
    Aws,
}

impl SigningScheme {
    /// Algorithm label, the leading token of the `Authorization` value.
    pub fn algorithm(&self) -> &'static str {
        match self {
            SigningScheme::Sdk => "SDK-HMAC-SHA256",
            SigningScheme::Aws => "AWS4-HMAC-SHA256",
        }
    }

    /// Header carrying the signing timestamp.
    pub fn date_header(&self) -> HeaderName {
        match self {
            SigningScheme::Sdk => HeaderName::from_static("x-sdk-date"),
            SigningScheme::Aws => HeaderName::from_static("x-amz-date"),
        }
    }

    /// Prefix mixed into the secret key before derivation.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            SigningScheme::Sdk => "SDK",
            SigningScheme::Aws => "AWS4",
        }
    }

    /// Terminal string closing the credential scope.
    pub fn terminal(&self) -> &'static str {
        match self {
            SigningScheme::Sdk => "sdk_request",
            SigningScheme::Aws => "aws4_request",
        }
    }
}

/// RequestSigner that computes an `Authorization` header over the canonical
/// form of a request.
///
/// Signing mutates only the request: `Host` and the scheme's date header are
/// inserted when absent, then `Authorization` is added. Credentials are read,
/// never changed, and an incomplete pair fails before any canonicalization.
#[derive(Debug)]
pub struct RequestSigner {
    scheme: SigningScheme,
    service: String,

    time: Option<DateTime>,
}

impl RequestSigner {
    /// Create a signer for the given scheme with an empty service scope.
    pub fn new(scheme: SigningScheme) -> Self {
        Self {
            scheme,
            service: String::new(),
            time: None,
        }
    }

    /// Scope the derived signing key to a service name.
    pub fn with_service(mut self, service: &str) -> Self {
        self.service = service.to_string();
        self
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// Defaults to the current time. A fixed timestamp makes the signature
    /// reproducible; outside of tests and debugging there is no reason to
    /// set one.
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Sign the request in place with the given credentials.
    pub fn sign(&self, req: &mut NormalizedRequest, credentials: &Credentials) -> Result<()> {
        if !credentials.is_complete() {
            return Err(Error::credential_invalid(
                "access key id and secret access key must both be present",
            ));
        }

        let now = self.time.unwrap_or_else(now);
        let uri: Uri = req.resolved_url()?.parse()?;
        let authority = uri
            .authority()
            .ok_or_else(|| Error::request_invalid(format!("Request without Host: {uri}")))?;

        // Insert HOST header if not present.
        if req.headers.get(header::HOST).is_none() {
            req.headers.insert(header::HOST, authority.as_str().parse()?);
        }
        // Insert the scheme date header if not present.
        let date_header = self.scheme.date_header();
        if req.headers.get(&date_header).is_none() {
            req.headers.insert(date_header, format_iso8601(now).parse()?);
        }

        let signed_headers = self.signed_header_names(&req.headers)?;
        let creq = canonical_request_string(req, &uri, &signed_headers)?;
        let encoded_req = hex_sha256(creq.as_bytes());

        // Scope: "20201021/<region>/<service>/sdk_request"
        let scope = format!(
            "{}/{}/{}/{}",
            format_date(now),
            credentials.region_name,
            self.service,
            self.scheme.terminal()
        );
        debug!("calculated scope: {scope}");

        let string_to_sign = {
            let mut f = String::new();
            writeln!(f, "{}", self.scheme.algorithm())?;
            writeln!(f, "{}", format_iso8601(now))?;
            writeln!(f, "{scope}")?;
            write!(f, "{encoded_req}")?;
            f
        };
        debug!("calculated string to sign: {string_to_sign}");

        let signing_key = generate_signing_key(
            self.scheme,
            &credentials.secret_access_key,
            now,
            &credentials.region_name,
            &self.service,
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let mut authorization = HeaderValue::from_str(&format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            self.scheme.algorithm(),
            credentials.access_key_id,
            scope,
            signed_headers.join(";"),
            signature
        ))?;
        authorization.set_sensitive(true);
        req.headers.insert(header::AUTHORIZATION, authorization);

        Ok(())
    }

    /// Wrap the signer and a key pair into a handler for the signing slot.
    pub fn into_handler(self, credentials: Credentials) -> Handler {
        handler_fn(move |mut req| {
            self.sign(&mut req, &credentials)?;
            Ok(req)
        })
    }

    /// Names folded into the signature, sorted, lowercase.
    fn signed_header_names(&self, headers: &HeaderMap) -> Result<Vec<String>> {
        let mut names: Vec<String> = match self.scheme {
            SigningScheme::Sdk => headers.keys().map(|k| k.as_str().to_string()).collect(),
            SigningScheme::Aws => {
                if headers.get(header::CONTENT_TYPE).is_none() {
                    return Err(Error::request_invalid(
                        "Request without Content-Type: required by AWS4-HMAC-SHA256",
                    ));
                }
                vec![
                    header::CONTENT_TYPE.as_str().to_string(),
                    header::HOST.as_str().to_string(),
                    self.scheme.date_header().as_str().to_string(),
                ]
            }
        };
        names.sort();
        Ok(names)
    }
}

fn canonical_request_string(
    req: &NormalizedRequest,
    uri: &Uri,
    signed_headers: &[String],
) -> Result<String> {
    // 256 is specially chosen to avoid reallocation for most requests.
    let mut f = String::with_capacity(256);

    // Insert method
    writeln!(f, "{}", req.method)?;
    // Insert canonical path
    writeln!(f, "{}", canonical_path(uri.path()))?;
    // Insert query, exactly as it will be sent
    writeln!(f, "{}", uri.query().unwrap_or_default())?;
    // Insert canonical header lines
    for name in signed_headers {
        writeln!(f, "{}:{}", name, canonical_header_value(&req.headers, name)?)?;
    }
    writeln!(f)?;
    writeln!(f, "{}", signed_headers.join(";"))?;
    write!(f, "{}", hex_sha256(&req.body))?;

    Ok(f)
}

/// Canonical form of a path: leading and trailing slash forced.
///
/// Only the canonical request sees this form; the request is still sent
/// with the path exactly as resolved.
fn canonical_path(path: &str) -> String {
    let mut p = String::with_capacity(path.len() + 2);
    if !path.starts_with('/') {
        p.push('/');
    }
    p.push_str(path);
    if !p.ends_with('/') {
        p.push('/');
    }
    p
}

/// Canonical form of one header: values trimmed, repeats joined with ",".
fn canonical_header_value(headers: &HeaderMap, name: &str) -> Result<String> {
    let values = headers
        .get_all(name)
        .iter()
        .map(|v| v.to_str().map(str::trim))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(values.join(","))
}

fn generate_signing_key(
    scheme: SigningScheme,
    secret: &str,
    time: DateTime,
    region: &str,
    service: &str,
) -> Vec<u8> {
    // Sign secret
    let secret = format!("{}{}", scheme.key_prefix(), secret);
    // Sign date
    let sign_date = hmac_sha256(secret.as_bytes(), format_date(time).as_bytes());
    // Sign region
    let sign_region = hmac_sha256(sign_date.as_slice(), region.as_bytes());
    // Sign service
    let sign_service = hmac_sha256(sign_region.as_slice(), service.as_bytes());
    // Sign request
    hmac_sha256(sign_service.as_slice(), scheme.terminal().as_bytes())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use http::Method;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    use super::*;
    use crate::options::RequestOptions;
    use crate::ErrorKind;

    fn test_time() -> DateTime {
        Utc.with_ymd_and_hms(2020, 10, 21, 11, 54, 11).unwrap()
    }

    #[test]
    fn test_sign_sdk_get() -> Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        let credentials =
            Credentials::new("AKIDEXAMPLE", "BYBYIiF3WUZGlorXmcTEDtNjB40JTibEXAMPLE");
        let signer = RequestSigner::new(SigningScheme::Sdk).with_time(test_time());

        let mut req = RequestOptions::new()
            .with_method(Method::GET)
            .with_url("https://iam.eu-de.otc.t-systems.com/v3/projects")
            .with_param("name", "eu-de_test_dmd")
            .with_header("Accept", "application/json")
            .with_header("Content-Type", "application/json")
            .with_header("User-Agent", "cloudreq/0.1")
            .normalize()?;
        signer.sign(&mut req, &credentials)?;

        assert_eq!(req.headers[header::HOST], "iam.eu-de.otc.t-systems.com");
        assert_eq!(req.headers["x-sdk-date"], "20201021T115411Z");
        assert_eq!(
            req.headers[header::AUTHORIZATION].to_str()?,
            "SDK-HMAC-SHA256 Credential=AKIDEXAMPLE/20201021///sdk_request, \
             SignedHeaders=accept;content-type;host;user-agent;x-sdk-date, \
             Signature=8ff63bc23b71fd7ab246149af2aa8b441a07894c5493126711718c1f6b53e7de"
        );
        Ok(())
    }

    #[test]
    fn test_sign_sdk_post_with_body() -> Result<()> {
        let credentials =
            Credentials::new("AKIDEXAMPLE", "BYBYIiF3WUZGlorXmcTEDtNjB40JTibEXAMPLE")
                .with_region("eu-de");
        let signer = RequestSigner::new(SigningScheme::Sdk).with_time(test_time());

        let mut req = RequestOptions::new()
            .with_method(Method::POST)
            .with_url("https://ecs.eu-de.otc.t-systems.com/v1/cloudservers")
            .with_header("Accept", "application/json")
            .with_header("Content-Type", "application/json")
            .with_header("User-Agent", "cloudreq/0.1")
            .with_header("X-Project-Id", "123abc")
            .with_json(json!({"server": {"name": "test"}}))
            .normalize()?;
        signer.sign(&mut req, &credentials)?;

        assert_eq!(
            req.headers[header::AUTHORIZATION].to_str()?,
            "SDK-HMAC-SHA256 Credential=AKIDEXAMPLE/20201021/eu-de//sdk_request, \
             SignedHeaders=accept;content-type;host;user-agent;x-project-id;x-sdk-date, \
             Signature=44f50dbca45128b4d65341fb651b083e60f511f80637b481ad89af64547afb17"
        );
        Ok(())
    }

    #[test]
    fn test_sign_aws_get() -> Result<()> {
        let credentials =
            Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
                .with_region("us-east-1");
        let signer = RequestSigner::new(SigningScheme::Aws)
            .with_service("ec2")
            .with_time(test_time());

        // User-Agent stays outside the signed trio.
        let mut req = RequestOptions::new()
            .with_method(Method::GET)
            .with_url("https://ec2.eu-de.example.com/v1/servers")
            .with_param("limit", 25)
            .with_header("Content-Type", "application/json")
            .with_header("User-Agent", "cloudreq/0.1")
            .normalize()?;
        signer.sign(&mut req, &credentials)?;

        assert_eq!(
            req.headers[header::AUTHORIZATION].to_str()?,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20201021/us-east-1/ec2/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=9e93f6d2cf722a8c990c537fb34b5dda2ffdda33f4aaba87359c0914df64b09f"
        );
        Ok(())
    }

    #[test]
    fn test_sign_requires_complete_credentials() {
        let signer = RequestSigner::new(SigningScheme::Sdk).with_time(test_time());
        let mut req = RequestOptions::new()
            .with_method(Method::GET)
            .with_url("https://iam.eu-de.otc.t-systems.com/v3/projects")
            .normalize()
            .unwrap();

        let err = signer
            .sign(&mut req, &Credentials::new("AKIDEXAMPLE", ""))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CredentialInvalid);
        assert!(req.headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_sign_aws_requires_content_type() {
        let signer = RequestSigner::new(SigningScheme::Aws)
            .with_service("ec2")
            .with_time(test_time());
        let mut req = RequestOptions::new()
            .with_method(Method::GET)
            .with_url("https://ec2.eu-de.example.com/v1/servers")
            .normalize()
            .unwrap();

        let credentials = Credentials::new("AKIDEXAMPLE", "secret").with_region("us-east-1");
        let err = signer.sign(&mut req, &credentials).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RequestInvalid);
    }

    #[test]
    fn test_into_handler_signs() -> Result<()> {
        let credentials =
            Credentials::new("AKIDEXAMPLE", "BYBYIiF3WUZGlorXmcTEDtNjB40JTibEXAMPLE");
        let handler = RequestSigner::new(SigningScheme::Sdk)
            .with_time(test_time())
            .into_handler(credentials);

        let req = RequestOptions::new()
            .with_method(Method::GET)
            .with_url("https://iam.eu-de.otc.t-systems.com/v3/projects")
            .normalize()?;
        let signed = handler(req)?;

        assert!(signed.headers.contains_key(header::AUTHORIZATION));
        assert!(signed.headers[header::AUTHORIZATION].is_sensitive());
        Ok(())
    }

    #[test]
    fn test_generate_signing_key() {
        // Derivation example from the SigV4 documentation.
        let time = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let key = generate_signing_key(
            SigningScheme::Aws,
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            time,
            "us-east-1",
            "iam",
        );

        assert_eq!(
            hex::encode(key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test_case("/v3/projects", "/v3/projects/"; "plain")]
    #[test_case("/v3/projects/", "/v3/projects/"; "already terminated")]
    #[test_case("v3", "/v3/"; "bare segment")]
    #[test_case("/", "/"; "root")]
    fn test_canonical_path(input: &str, expect: &str) {
        assert_eq!(canonical_path(input), expect);
    }

    #[test]
    fn test_canonical_header_value_trims_and_joins() {
        let mut headers = HeaderMap::new();
        headers.append("accept-language", "  en ".parse().unwrap());
        headers.append("accept-language", "de".parse().unwrap());

        assert_eq!(
            canonical_header_value(&headers, "accept-language").unwrap(),
            "en,de"
        );
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let credentials =
            Credentials::new("AKIDEXAMPLE", "BYBYIiF3WUZGlorXmcTEDtNjB40JTibEXAMPLE");
        let dump = format!("{credentials:?}");

        assert!(!dump.contains("BYBYIiF3WUZGlorXmcTEDtNjB40JTibEXAMPLE"));
        assert!(dump.contains("BYB***PLE"));
    }
}
