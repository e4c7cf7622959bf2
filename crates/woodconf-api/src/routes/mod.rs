//! API routes.

pub mod config;
pub mod health;

use crate::AppState;
use crate::signature::{SignatureVerifier, verify_signature};
use axum::Router;
use axum::http::Method;
use axum::middleware;
use axum::routing::{MethodFilter, on};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use woodconf_config::ServerConfig;

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no HTTP methods configured")]
    NoMethods,

    #[error("unsupported HTTP method: {0}")]
    Method(String),
}

/// Build the service router.
///
/// With a verifier every configuration request must be signed; the health
/// endpoints are never verified.
pub fn router(
    state: AppState,
    server: &ServerConfig,
    verifier: Option<Arc<SignatureVerifier>>,
) -> Result<Router, RouterError> {
    let filter = method_filter(&server.methods)?;

    let mut app = Router::new().route(&server.endpoint, on(filter, config::resolve_config));
    if let Some(verifier) = verifier {
        app = app.route_layer(middleware::from_fn_with_state(verifier, verify_signature));
    }

    Ok(app
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn method_filter(methods: &[String]) -> Result<MethodFilter, RouterError> {
    methods
        .iter()
        .map(|name| {
            Method::from_bytes(name.to_uppercase().as_bytes())
                .ok()
                .and_then(|method| MethodFilter::try_from(method).ok())
                .ok_or_else(|| RouterError::Method(name.clone()))
        })
        .try_fold(None, |acc: Option<MethodFilter>, filter| {
            let filter = filter?;
            Ok(Some(match acc {
                Some(acc) => acc.or(filter),
                None => filter,
            }))
        })?
        .ok_or(RouterError::NoMethods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::SIGNATURE_LABEL;
    use crate::signature::testing::{public_key_pem, signed_headers, signing_key};
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use woodconf_converter::StarlarkConverter;
    use woodconf_core::{
        Converter, Converters, Environment, Error, File, Provider, Providers, Resolver, Result,
    };

    struct StaticProvider(Vec<File>);

    #[async_trait]
    impl Provider for StaticProvider {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn get(&self, _env: &Environment) -> Result<Vec<File>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl Provider for BrokenProvider {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn get(&self, _env: &Environment) -> Result<Vec<File>> {
            Err(Error::Io("/srv/pipelines: permission denied".to_string()))
        }
    }

    fn state(provider: Option<Arc<dyn Provider>>) -> AppState {
        let providers = Providers::new(provider.into_iter().collect());
        AppState::new(Resolver::new(providers, Converters::default()))
    }

    fn app(provider: Option<Arc<dyn Provider>>) -> Router {
        router(state(provider), &ServerConfig::default(), None).unwrap()
    }

    fn serving(files: Vec<File>) -> Option<Arc<dyn Provider>> {
        Some(Arc::new(StaticProvider(files)))
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_no_configs_is_no_content() {
        let response = app(None).oneshot(post("/ciconfig", "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_configs_are_returned_sanitized() {
        let app = app(serving(vec![
            File::new(".woodpecker/build.yaml", "steps: {}"),
            File::new("deploy.yml", "steps: []"),
        ]));

        let body = json!({
            "repo": {"full_name": "octo/repo", "config_file": ".woodpecker"},
            "pipeline": {"event": "push", "commit": "abc123"},
            "netrc": {"type": "github", "login": "token"}
        });
        let response = app
            .oneshot(post("/ciconfig", &body.to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"configs": [
                {"name": ".woodpecker__build", "data": "steps: {}"},
                {"name": "deploy", "data": "steps: []"}
            ]})
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let response = app(None)
            .oneshot(post("/ciconfig", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_provider_failure_is_opaque_server_error() {
        let response = app(Some(Arc::new(BrokenProvider)))
            .oneshot(post("/ciconfig", "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(!body["error"].as_str().unwrap().contains("/srv/pipelines"));
    }

    #[tokio::test]
    async fn test_bad_script_result_is_opaque_server_error() {
        let provider: Arc<dyn Provider> = Arc::new(StaticProvider(vec![File::new(
            "ci.star",
            "def main(ctx):\n    return {\"name\": \"x\"}\n",
        )]));
        let converters = Converters::new(vec![
            Arc::new(StarlarkConverter::default()) as Arc<dyn Converter>
        ]);
        let state = AppState::new(Resolver::new(Providers::new(vec![provider]), converters));
        let app = router(state, &ServerConfig::default(), None).unwrap();

        let response = app.oneshot(post("/ciconfig", "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        let message = body["error"].as_str().unwrap();
        assert!(!message.contains("list of dicts"));
        assert!(!message.contains("main"));
    }

    #[tokio::test]
    async fn test_duplicate_names_are_server_error() {
        let app = app(serving(vec![
            File::new("a/b.yaml", "one"),
            File::new("a__b.yml", "two"),
        ]));

        let response = app.oneshot(post("/ciconfig", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_disallowed_method() {
        let request = Request::builder()
            .method("GET")
            .uri("/ciconfig")
            .body(Body::empty())
            .unwrap();

        let response = app(None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_configured_endpoint_and_methods() {
        let server = ServerConfig {
            endpoint: "/config".to_string(),
            methods: vec!["PUT".to_string(), "POST".to_string()],
            ..Default::default()
        };
        let app = router(state(None), &server, None).unwrap();

        let mut request = post("/config", "{}");
        *request.method_mut() = Method::PUT;
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.oneshot(post("/ciconfig", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_method_filter_rejects_bad_lists() {
        assert!(matches!(method_filter(&[]), Err(RouterError::NoMethods)));
        assert!(matches!(
            method_filter(&["BREW".to_string()]),
            Err(RouterError::Method(_))
        ));
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app(None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }

    fn signed_app() -> Router {
        let key = signing_key();
        let verifier = SignatureVerifier::from_pem(&public_key_pem(&key)).unwrap();
        router(
            state(serving(vec![File::new("ci.yaml", "steps: {}")])),
            &ServerConfig::default(),
            Some(Arc::new(verifier)),
        )
        .unwrap()
    }

    fn signed_post(body: &str, label: &str) -> Request<Body> {
        let mut request = post("/ciconfig", body);
        for (name, value) in signed_headers(&signing_key(), label, "/ciconfig", body.as_bytes()) {
            request
                .headers_mut()
                .insert(name, value.parse().unwrap());
        }
        request
    }

    #[tokio::test]
    async fn test_signed_request_is_accepted() {
        let response = signed_app()
            .oneshot(signed_post("{}", SIGNATURE_LABEL))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unsigned_or_tampered_request_is_rejected() {
        let response = signed_app().oneshot(post("/ciconfig", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut request = signed_post("{}", SIGNATURE_LABEL);
        *request.body_mut() = Body::from("{\"repo\":{}}");
        let response = signed_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = signed_app()
            .oneshot(signed_post("{}", "other-label"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_is_not_signed() {
        let request = Request::builder()
            .uri("/health/ready")
            .body(Body::empty())
            .unwrap();

        let response = signed_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
