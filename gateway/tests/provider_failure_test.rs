//! Provider failures travel through the inference worker and keep their
//! category at the gateway.

use std::sync::Arc;
use std::time::Duration;

use relay_common::{
    workers, InferOptions, InferRequest, LocalTransport, MemoryDirectory, PeerAddress,
    ServiceDirectory,
};
use relay_gateway::auth::{AuthGateway, AuthWorker, MemoryCredentialStore};
use relay_gateway::{
    AuthClient, GatewayPipeline, MemoryUsageRecorder, PipelineError, RemoteInference,
    SlidingWindowLimiter, SystemClock,
};
use relay_inference::config::OpenAiConfig;
use relay_inference::{InferenceWorker, OpenAiBackend};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Setup {
    auth: Arc<AuthGateway>,
    pipeline: GatewayPipeline,
}

async fn setup(provider: &MockServer) -> Setup {
    let directory = Arc::new(MemoryDirectory::new());
    let transport = LocalTransport::new();

    let auth = Arc::new(AuthGateway::new(
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(SlidingWindowLimiter::default()),
        Arc::new(MemoryUsageRecorder::default()),
        Arc::new(SystemClock),
        10,
    ));
    let auth_address = PeerAddress::new("local://auth");
    transport
        .mount(auth_address.clone(), Arc::new(AuthWorker::new(auth.clone())))
        .await;
    directory.register(workers::AUTH, auth_address).await.unwrap();

    let backend = OpenAiBackend::new(&OpenAiConfig {
        base_url: provider.uri(),
        api_key: Some("sk-test".to_string()),
        timeout_secs: 1,
        ..OpenAiConfig::default()
    });
    let inference_address = PeerAddress::new("local://inference");
    transport
        .mount(
            inference_address.clone(),
            Arc::new(InferenceWorker::new(Arc::new(backend))),
        )
        .await;
    directory
        .register(workers::INFERENCE, inference_address)
        .await
        .unwrap();

    let transport = Arc::new(transport);
    let auth_client = AuthClient::new(directory.clone(), transport.clone(), TIMEOUT);
    let remote = RemoteInference::new(directory, transport, TIMEOUT);
    Setup {
        auth,
        pipeline: GatewayPipeline::new(auth_client, Arc::new(remote), "gpt-3.5-turbo".to_string()),
    }
}

fn infer(api_key: &str) -> InferRequest {
    InferRequest {
        api_key: Some(api_key.to_string()),
        prompt: Some("hello".to_string()),
        model: None,
        options: InferOptions::default(),
    }
}

#[tokio::test]
async fn test_slow_provider_is_a_gateway_timeout() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "choices": [] }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&provider)
        .await;
    let setup = setup(&provider).await;
    let key = setup.auth.register("alice", "a@example.com", "pw").unwrap();

    let err = setup.pipeline.handle(infer(&key)).await.unwrap_err();

    assert_eq!(
        err,
        PipelineError::Timeout("Request timeout - the inference took too long".to_string())
    );
    assert_eq!(setup.auth.stats(&key).total_requests, 0);
}

#[tokio::test]
async fn test_provider_error_is_a_backend_error() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": { "message": "Rate limit reached" }
        })))
        .mount(&provider)
        .await;
    let setup = setup(&provider).await;
    let key = setup.auth.register("bob", "b@example.com", "pw").unwrap();

    let err = setup.pipeline.handle(infer(&key)).await.unwrap_err();

    assert_eq!(
        err,
        PipelineError::BackendError("OpenAI API error: Rate limit reached".to_string())
    );
}
