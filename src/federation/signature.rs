//! HTTP Signatures for ForgeFed
//!
//! Signing of outbound deliveries, verification of inbound inbox posts,
//! and the actor/keyId binding check that stops an authenticated peer from
//! speaking for somebody else.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::{RsaPublicKey, pkcs1v15::Signature as Pkcs1v15Signature};
use sha2::{Digest, Sha256};

use super::fetch::ObjectFetcher;
use super::materialize::Materializer;
use super::object::{Activity, ActivityKind, Object, ObjectOrLink, Person};
use crate::error::AppError;

/// Suffix appended to an actor IRI to name its signing key
pub const MAIN_KEY_SUFFIX: &str = "#main-key";

/// Maximum clock skew accepted on the Date header, in seconds
const MAX_DATE_SKEW_SECONDS: i64 = 300;

/// Key id of an actor's main key.
pub fn main_key_id(actor_iri: &str) -> String {
    format!("{}{}", actor_iri, MAIN_KEY_SUFFIX)
}

/// Sign an HTTP request
///
/// Creates the HTTP Signature header for an outgoing request.
///
/// # Arguments
/// * `method` - HTTP method (e.g., "POST")
/// * `url` - Full URL being requested
/// * `body` - Request body (for digest)
/// * `private_key_pem` - PKCS#8 RSA private key in PEM format
/// * `key_id` - Full URL to the public key (actor#main-key)
/// * `algorithm` - Algorithm name advertised in the header
///
/// # Returns
/// Values for the Signature, Date and Digest (if body present) headers
pub fn sign_request(
    method: &str,
    url: &str,
    body: Option<&[u8]>,
    private_key_pem: &str,
    key_id: &str,
    algorithm: &str,
) -> Result<SignatureHeaders, AppError> {
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::{RandomizedSigner, SignatureEncoding};

    let parsed_url =
        url::Url::parse(url).map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;

    let host = parsed_url
        .host_str()
        .ok_or_else(|| AppError::Validation("Missing host in URL".to_string()))?;
    let host = match parsed_url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let path_and_query = match parsed_url.query() {
        Some(q) => format!("{}?{}", parsed_url.path(), q),
        None => parsed_url.path().to_string(),
    };

    // RFC 2822 style, always GMT
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let digest = body.map(generate_digest);

    let mut signing_parts = vec![
        format!("(request-target): {} {}", method.to_lowercase(), path_and_query),
        format!("host: {}", host),
        format!("date: {}", date),
    ];
    let mut headers_list = vec!["(request-target)", "host", "date"];

    if let Some(ref digest_value) = digest {
        signing_parts.push(format!("digest: {}", digest_value));
        headers_list.push("digest");
    }

    let signing_string = signing_parts.join("\n");

    let private_key = rsa::RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| AppError::MissingSigningKey(format!("{}: {}", key_id, e)))?;

    let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new_unprefixed(private_key);
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, signing_string.as_bytes());
    let signature_b64 = BASE64.encode(signature.to_bytes());

    let signature_header = format!(
        "keyId=\"{}\",algorithm=\"{}\",headers=\"{}\",signature=\"{}\"",
        key_id,
        algorithm,
        headers_list.join(" "),
        signature_b64
    );

    Ok(SignatureHeaders {
        signature: signature_header,
        date,
        digest,
    })
}

/// Headers to add for signed request
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    /// Signature header value
    pub signature: String,
    /// Date header value
    pub date: String,
    /// Digest header value (if body present)
    pub digest: Option<String>,
}

fn header_str<'a>(headers: &'a http::HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .ok_or_else(|| AppError::Validation(format!("Missing {} header", name)))?
        .to_str()
        .map_err(|_| AppError::Validation(format!("Invalid {} header", name)))
}

/// Verify an HTTP request signature against a known public key.
///
/// # Arguments
/// * `method` - HTTP method
/// * `path` - Request path and query
/// * `headers` - All request headers
/// * `body` - Request body (for digest verification)
/// * `public_key_pem` - SPKI RSA public key in PEM format
/// * `algorithms` - Accepted values of the `algorithm` parameter
///
/// # Errors
/// `Validation` describing the first check that failed. Callers treat any
/// error as "not authenticated".
pub fn verify_signature(
    method: &str,
    path: &str,
    headers: &http::HeaderMap,
    body: Option<&[u8]>,
    public_key_pem: &str,
    algorithms: &[String],
) -> Result<(), AppError> {
    let parsed = parse_signature_header(header_str(headers, "signature")?)?;

    if !algorithms
        .iter()
        .any(|algorithm| algorithm.eq_ignore_ascii_case(&parsed.algorithm))
    {
        return Err(AppError::Validation(format!(
            "Unsupported signature algorithm: {}",
            parsed.algorithm
        )));
    }

    for required in ["(request-target)", "host", "date"] {
        if !parsed.headers.iter().any(|h| h == required) {
            return Err(AppError::Validation(format!(
                "Signed headers must include: {}",
                required
            )));
        }
    }

    if body.is_some() && !parsed.headers.iter().any(|h| h == "digest") {
        return Err(AppError::Validation(
            "Signed headers must include: digest".to_string(),
        ));
    }

    let date = DateTime::parse_from_rfc2822(header_str(headers, "date")?)
        .map_err(|_| AppError::Validation("Invalid Date format".to_string()))?;
    if (Utc::now().timestamp() - date.timestamp()).abs() > MAX_DATE_SKEW_SECONDS {
        return Err(AppError::Validation(
            "Date header too old or in future".to_string(),
        ));
    }

    if let Some(body_data) = body {
        if header_str(headers, "digest")? != generate_digest(body_data) {
            return Err(AppError::Validation("Digest mismatch".to_string()));
        }
    }

    let mut signing_parts = Vec::with_capacity(parsed.headers.len());
    for header_name in &parsed.headers {
        let value = match header_name.as_str() {
            "(request-target)" => format!("{} {}", method.to_lowercase(), path),
            "host" | "date" | "digest" | "content-type" => {
                header_str(headers, header_name)?.to_string()
            }
            _ => {
                return Err(AppError::Validation(format!(
                    "Unsupported header in signature: {}",
                    header_name
                )));
            }
        };
        signing_parts.push(format!("{}: {}", header_name, value));
    }
    let signing_string = signing_parts.join("\n");

    let signature_bytes = BASE64
        .decode(&parsed.signature)
        .map_err(|_| AppError::Validation("Invalid signature encoding".to_string()))?;

    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|e| AppError::Validation(format!("Invalid public key: {}", e)))?;
    let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new_unprefixed(public_key);

    let signature = Pkcs1v15Signature::try_from(signature_bytes.as_slice())
        .map_err(|e| AppError::Validation(format!("Invalid signature format: {}", e)))?;

    verifier
        .verify(signing_string.as_bytes(), &signature)
        .map_err(|_| AppError::Validation("Signature verification failed".to_string()))
}

/// Extract keyId from Signature header.
///
/// # Errors
/// `MissingSignature` when the header is absent or unparsable.
pub fn extract_signature_key_id(headers: &http::HeaderMap) -> Result<String, AppError> {
    let signature_header = headers
        .get("signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::MissingSignature)?;

    parse_signature_header(signature_header)
        .map(|parsed| parsed.key_id)
        .map_err(|_| AppError::MissingSignature)
}

/// Parsed Signature header
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    /// Key ID (URL to public key)
    pub key_id: String,
    /// Algorithm (usually rsa-sha256)
    pub algorithm: String,
    /// Signed header names
    pub headers: Vec<String>,
    /// Base64-encoded signature
    pub signature: String,
}

/// Parse Signature header value
///
/// # Format
/// ```text
/// keyId="...",algorithm="...",headers="...",signature="..."
/// ```
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature, AppError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    for part in header.split(',') {
        if let Some((key, value)) = part.trim().split_once('=') {
            let value = value.trim().trim_matches('"');

            match key.trim() {
                "keyId" => key_id = Some(value.to_string()),
                "algorithm" => algorithm = Some(value.to_string()),
                "headers" => {
                    headers = Some(
                        value
                            .split_whitespace()
                            .map(|s| s.to_ascii_lowercase())
                            .collect(),
                    )
                }
                "signature" => signature = Some(value.to_string()),
                _ => {}
            }
        }
    }

    Ok(ParsedSignature {
        key_id: key_id.ok_or_else(|| AppError::Validation("Missing keyId".to_string()))?,
        algorithm: algorithm.unwrap_or_else(|| "hs2019".to_string()),
        // draft-cavage default when the parameter is omitted
        headers: headers.unwrap_or_else(|| vec!["date".to_string()]),
        signature: signature
            .ok_or_else(|| AppError::Validation("Missing signature".to_string()))?,
    })
}

/// Generate SHA-256 digest for body
///
/// # Returns
/// `SHA-256=base64(hash)`
pub fn generate_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("SHA-256={}", BASE64.encode(hasher.finalize()))
}

/// Public key PEM advertised by `person` under `key_id`.
///
/// # Errors
/// `KeyMismatch` if the document is not the actor owning `key_id`, or the
/// advertised key has a different id, another owner, or is not an SPKI
/// `PUBLIC KEY` block.
pub fn public_key_from_person(person: &Person, key_id: &str) -> Result<String, AppError> {
    if main_key_id(&person.id) != key_id {
        return Err(AppError::KeyMismatch(format!(
            "key document {} does not own keyId {}",
            person.id, key_id
        )));
    }

    let public_key = person
        .public_key
        .as_ref()
        .ok_or_else(|| AppError::KeyMismatch(format!("{} advertises no public key", person.id)))?;

    if public_key.id != key_id {
        return Err(AppError::KeyMismatch(format!(
            "cannot find publicKey with id {} in {}",
            key_id, person.id
        )));
    }

    if let Some(owner) = public_key.owner.as_deref() {
        if owner != person.id {
            return Err(AppError::KeyMismatch(format!(
                "publicKey {} is owned by {}, not {}",
                key_id, owner, person.id
            )));
        }
    }

    RsaPublicKey::from_public_key_pem(&public_key.public_key_pem).map_err(|e| {
        AppError::KeyMismatch(format!("publicKeyPem of {} is not a PUBLIC KEY: {}", key_id, e))
    })?;

    Ok(public_key.public_key_pem.clone())
}

fn bind(field: &str, iri: Option<&str>, key_id: &str) -> Result<(), AppError> {
    match iri {
        Some(iri) if main_key_id(iri) != key_id => Err(AppError::ActorKeyMismatch(format!(
            "{} {} is not bound to keyId {}",
            field, iri, key_id
        ))),
        _ => Ok(()),
    }
}

/// Require `actor` and `attributedTo` (when present) to own `key_id`.
///
/// An `Undo` is checked one level deeper as well, so an authenticated actor
/// cannot undo an activity performed by somebody else.
pub fn check_activity_binding(activity: &Activity, key_id: &str) -> Result<(), AppError> {
    bind("actor", activity.actor.as_deref(), key_id)?;
    bind("attributedTo", activity.attributed_to.as_deref(), key_id)?;

    let object = activity
        .object
        .as_ref()
        .ok_or_else(|| AppError::MalformedObject("activity does not contain object".to_string()))?;

    if activity.kind == ActivityKind::Undo {
        let ObjectOrLink::Object(inner) = object else {
            return Err(AppError::MalformedObject(
                "Undo must embed the activity being undone".to_string(),
            ));
        };
        let Object::Activity(undone) = inner.as_ref() else {
            return Err(AppError::MalformedObject(format!(
                "Undo object is a {}, not an activity",
                inner.kind()
            )));
        };
        bind("actor", undone.actor.as_deref(), key_id)?;
        bind("attributedTo", undone.attributed_to.as_deref(), key_id)?;
    }

    Ok(())
}

/// Outcome of verifying an inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub authenticated: bool,
    pub key_id: String,
    /// Signing actor, taken from the key document
    pub actor_iri: String,
}

/// Verifies inbound inbox requests and mirrors the signing actor locally.
#[derive(Clone)]
pub struct SignatureVerifier {
    fetcher: ObjectFetcher,
    materializer: Materializer,
    algorithms: Vec<String>,
}

impl SignatureVerifier {
    pub fn new(fetcher: ObjectFetcher, materializer: Materializer, algorithms: Vec<String>) -> Self {
        Self {
            fetcher,
            materializer,
            algorithms,
        }
    }

    /// Verify the request signature.
    ///
    /// A bad signature yields `authenticated: false`. Failing to obtain the
    /// key (no signature, fetch error, key mismatch) is an error instead.
    pub async fn verify(
        &self,
        method: &str,
        path_and_query: &str,
        headers: &http::HeaderMap,
        body: &[u8],
    ) -> Result<Verification, AppError> {
        let key_id = extract_signature_key_id(headers)?;

        // The key document is read as a Person whatever its declared type.
        let person: Person = self.fetcher.fetch_json(&key_id).await?;
        let public_key_pem = public_key_from_person(&person, &key_id)?;

        let authenticated = match verify_signature(
            method,
            path_and_query,
            headers,
            Some(body),
            &public_key_pem,
            &self.algorithms,
        ) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(key_id = %key_id, error = %e, "Signature rejected");
                false
            }
        };

        if authenticated {
            self.materializer.materialize_actor(&person).await?;
        }

        Ok(Verification {
            authenticated,
            key_id,
            actor_iri: person.id,
        })
    }
}
