//! Every role started over real sockets, sharing a discovery file.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_common::protocol::RegisterRequest;
use relay_common::rpc::call;
use relay_common::{
    methods, workers, Completion, FileDirectory, HttpTransport, InferOptions, InferRequest,
    InferenceBackend, InferenceFailure, RpcTransport, ServiceDirectory, Usage, WorkerStatus,
};
use relay_gateway::{Config, Role, RunningWorker};
use relay_inference::config::ServerConfig as InferenceServerConfig;
use relay_inference::RunningInferenceWorker;
use serde_json::Value;

const TIMEOUT: Duration = Duration::from_secs(5);

struct EchoBackend;

#[async_trait]
impl InferenceBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn process(
        &self,
        prompt: &str,
        model: &str,
        _options: &InferOptions,
    ) -> Result<Completion, InferenceFailure> {
        Ok(Completion::new(
            format!("{}: {}", model, prompt),
            Usage::new(1, 1),
        ))
    }
}

fn local_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config
}

#[tokio::test]
async fn test_roles_discover_each_other_through_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let directory: Arc<dyn ServiceDirectory> =
        Arc::new(FileDirectory::new(dir.path().join("discovery.json")));
    let transport: Arc<dyn RpcTransport> = Arc::new(HttpTransport::new());
    let config = local_config();

    let auth = RunningWorker::open(&config, Role::Auth, directory.clone(), transport.clone())
        .await
        .unwrap();
    let gateway = RunningWorker::open(&config, Role::Gateway, directory.clone(), transport.clone())
        .await
        .unwrap();
    let inference = RunningInferenceWorker::open(
        &InferenceServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            advertise_host: "127.0.0.1".to_string(),
        },
        Arc::new(EchoBackend),
        directory.clone(),
    )
    .await
    .unwrap();

    let auth_peer = directory.resolve(workers::AUTH).await.unwrap();
    let registered: Value = call(
        &*transport,
        &auth_peer,
        methods::REGISTER,
        &RegisterRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "secret".to_string(),
        },
        TIMEOUT,
    )
    .await
    .unwrap();
    let api_key = registered["apiKey"].as_str().unwrap().to_string();

    let gateway_peer = directory.resolve(workers::GATEWAY).await.unwrap();
    let completion: Completion = call(
        &*transport,
        &gateway_peer,
        methods::INFER,
        &InferRequest {
            api_key: Some(api_key),
            prompt: Some("hello".to_string()),
            model: Some("gpt-4".to_string()),
            options: InferOptions::default(),
        },
        TIMEOUT,
    )
    .await
    .unwrap();
    assert_eq!(completion.completion, "gpt-4: hello");
    assert_eq!(completion.total_tokens(), 2);

    inference.close().await.unwrap();
    gateway.close().await.unwrap();
    auth.close().await.unwrap();

    let entries = directory.list().await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.status == WorkerStatus::Stopped));
}

#[tokio::test]
async fn test_web_role_registers_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let directory: Arc<dyn ServiceDirectory> =
        Arc::new(FileDirectory::new(dir.path().join("discovery.json")));
    let transport: Arc<dyn RpcTransport> = Arc::new(HttpTransport::new());

    let web = RunningWorker::open(&local_config(), Role::Web, directory.clone(), transport)
        .await
        .unwrap();
    assert_eq!(web.role(), Role::Web);
    assert_eq!(
        directory.resolve(workers::WEB).await.unwrap(),
        *web.address()
    );

    web.close().await.unwrap();
    assert!(directory.resolve(workers::WEB).await.is_err());
}
