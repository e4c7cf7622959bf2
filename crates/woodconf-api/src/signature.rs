//! HTTP message signature verification (RFC 9421, Ed25519).
//!
//! The CI server signs every configuration request with its private key. The
//! signature has to cover the request target and the `Content-Digest` header,
//! and the digest has to match the body.

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature as Ed25519Signature, VerifyingKey};
use sha2::{Digest, Sha256, Sha512};
use std::sync::Arc;
use tracing::warn;

/// Label the CI server signs requests under.
pub const SIGNATURE_LABEL: &str = "woodpecker-ci-extensions";

const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;
const REQUIRED_COMPONENTS: [&str; 2] = ["@request-target", "content-digest"];

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(String),

    #[error("malformed {0} header")]
    Malformed(&'static str),

    #[error("no signature labelled {0}")]
    MissingLabel(&'static str),

    #[error("signature does not cover {0}")]
    Uncovered(&'static str),

    #[error("unsupported component: {0}")]
    UnsupportedComponent(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("signature expired")]
    Expired,

    #[error("content digest does not match the body")]
    DigestMismatch,

    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("signature verification failed")]
    Invalid,
}

/// Verifies request signatures against one public key.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Load a PEM encoded (SubjectPublicKeyInfo) Ed25519 public key.
    pub fn from_pem(pem: &str) -> Result<Self, SignatureError> {
        VerifyingKey::from_public_key_pem(pem.trim())
            .map(Self::new)
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))
    }

    pub fn verify(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        let input = header(headers, "signature-input")?;
        let raw_params = dictionary(input)
            .into_iter()
            .find(|(label, _)| *label == SIGNATURE_LABEL)
            .map(|(_, value)| value)
            .ok_or(SignatureError::MissingLabel(SIGNATURE_LABEL))?;
        let params = SignatureParams::parse(raw_params)?;

        for required in REQUIRED_COMPONENTS {
            if !params.components.iter().any(|c| c == required) {
                return Err(SignatureError::Uncovered(required));
            }
        }

        if let Some(alg) = &params.alg {
            if alg != "ed25519" {
                return Err(SignatureError::UnsupportedAlgorithm(alg.clone()));
            }
        }

        if let Some(expires) = params.expires {
            if expires < chrono::Utc::now().timestamp() {
                return Err(SignatureError::Expired);
            }
        }

        let signature = dictionary(header(headers, "signature")?)
            .into_iter()
            .find(|(label, _)| *label == SIGNATURE_LABEL)
            .map(|(_, value)| value)
            .ok_or(SignatureError::MissingLabel(SIGNATURE_LABEL))?;
        let signature = byte_sequence(signature).ok_or(SignatureError::Malformed("Signature"))?;
        let signature = Ed25519Signature::from_slice(&signature)
            .map_err(|_| SignatureError::Malformed("Signature"))?;

        check_content_digest(header(headers, "content-digest")?, body)?;

        let base = signature_base(&params, method, uri, headers)?;
        self.key
            .verify_strict(base.as_bytes(), &signature)
            .map_err(|_| SignatureError::Invalid)
    }
}

/// Middleware rejecting configuration requests without a valid signature.
pub async fn verify_signature(
    State(verifier): State<Arc<SignatureVerifier>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_SIZE).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "Invalid request body").into_response();
        }
    };

    if let Err(e) = verifier.verify(&parts.method, &parts.uri, &parts.headers, &bytes) {
        warn!(error = %e, uri = %parts.uri, "Rejected request signature");
        return (StatusCode::BAD_REQUEST, "Invalid signature").into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Parsed `Signature-Input` member.
#[derive(Debug)]
struct SignatureParams<'a> {
    /// The member value exactly as sent; it is the `@signature-params` line.
    raw: &'a str,
    components: Vec<String>,
    alg: Option<String>,
    expires: Option<i64>,
}

impl<'a> SignatureParams<'a> {
    fn parse(raw: &'a str) -> Result<Self, SignatureError> {
        const MALFORMED: SignatureError = SignatureError::Malformed("Signature-Input");

        let rest = raw.strip_prefix('(').ok_or(MALFORMED)?;
        let (inner, parameters) = rest.split_once(')').ok_or(MALFORMED)?;

        let mut components = Vec::new();
        for item in inner.split_whitespace() {
            let Some(name) = item.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
                // Component parameters such as `;sf` or `;key` end up here.
                return Err(SignatureError::UnsupportedComponent(item.to_string()));
            };
            components.push(name.to_string());
        }

        let mut alg = None;
        let mut expires = None;
        for parameter in parameters.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = parameter.split_once('=').ok_or(MALFORMED)?;
            match key {
                "alg" => alg = Some(value.trim_matches('"').to_string()),
                "expires" => expires = Some(value.parse().map_err(|_| MALFORMED)?),
                _ => {}
            }
        }

        Ok(Self {
            raw,
            components,
            alg,
            expires,
        })
    }
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Result<&'h str, SignatureError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| SignatureError::MissingHeader(name.to_string()))
}

/// Split a structured field dictionary into `(key, value)` members.
fn dictionary(header: &str) -> Vec<(&str, &str)> {
    let mut members = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in header.char_indices() {
        if quoted {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => quoted = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => quoted = true,
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                members.push(&header[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    members.push(&header[start..]);

    members
        .into_iter()
        .filter_map(|member| member.trim().split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect()
}

/// Decode a structured field byte sequence (`:base64:`).
fn byte_sequence(value: &str) -> Option<Vec<u8>> {
    let encoded = value.strip_prefix(':')?.strip_suffix(':')?;
    STANDARD.decode(encoded).ok()
}

fn check_content_digest(header: &str, body: &[u8]) -> Result<(), SignatureError> {
    let mut checked = false;
    for (alg, value) in dictionary(header) {
        let expected = match alg {
            "sha-256" => Sha256::digest(body).to_vec(),
            "sha-512" => Sha512::digest(body).to_vec(),
            _ => continue,
        };
        let sent = byte_sequence(value).ok_or(SignatureError::Malformed("Content-Digest"))?;
        if sent != expected {
            return Err(SignatureError::DigestMismatch);
        }
        checked = true;
    }

    if checked {
        Ok(())
    } else {
        Err(SignatureError::UnsupportedAlgorithm(header.to_string()))
    }
}

fn signature_base(
    params: &SignatureParams<'_>,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<String, SignatureError> {
    let mut lines = Vec::with_capacity(params.components.len() + 1);
    for component in &params.components {
        let value = match component.as_str() {
            "@method" => method.as_str().to_string(),
            "@path" => uri.path().to_string(),
            "@query" => format!("?{}", uri.query().unwrap_or_default()),
            "@request-target" => uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| uri.path().to_string()),
            "@authority" => headers
                .get("host")
                .and_then(|host| host.to_str().ok())
                .map(str::to_string)
                .or_else(|| uri.authority().map(|a| a.to_string()))
                .ok_or_else(|| SignatureError::MissingHeader("host".to_string()))?
                .to_lowercase(),
            derived if derived.starts_with('@') => {
                return Err(SignatureError::UnsupportedComponent(derived.to_string()));
            }
            name => {
                let values: Vec<&str> = headers
                    .get_all(name)
                    .iter()
                    .filter_map(|value| value.to_str().ok())
                    .map(str::trim)
                    .collect();
                if values.is_empty() {
                    return Err(SignatureError::MissingHeader(name.to_string()));
                }
                values.join(", ")
            }
        };
        lines.push(format!("\"{}\": {}", component, value));
    }
    lines.push(format!("\"@signature-params\": {}", params.raw));

    Ok(lines.join("\n"))
}
