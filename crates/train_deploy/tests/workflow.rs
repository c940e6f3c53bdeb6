//! End-to-end workflow tests against an in-memory platform.

use std::sync::Mutex;

use aiplatform::{
    DatasetHandle, DeploySpec, Deployment, EndpointHandle, ModelHandle, Platform, TrainingSpec,
};
use anyhow::Result;
use async_trait::async_trait;
use train_deploy::workflow::{self, WorkflowParams};

const PARENT: &str = "projects/demo/locations/us-central1";

#[derive(Default)]
struct FakeState {
    next_id: u64,
    endpoints: Vec<EndpointHandle>,
    endpoint_creates: usize,
    training_specs: Vec<TrainingSpec>,
    deploy_specs: Vec<DeploySpec>,
    omit_deployed_model_id: bool,
    fail_training: bool,
}

/// In-memory platform recording every call it receives.
#[derive(Default)]
struct FakePlatform {
    state: Mutex<FakeState>,
}

impl FakePlatform {
    fn with_endpoint(display_name: &str) -> (Self, String) {
        let platform = Self::default();
        let resource_name = format!("{PARENT}/endpoints/seeded");
        platform.state.lock().unwrap().endpoints.push(EndpointHandle {
            resource_name: resource_name.clone(),
            display_name: display_name.to_string(),
        });
        (platform, resource_name)
    }

    fn fresh_id(state: &mut FakeState) -> u64 {
        state.next_id += 1;
        state.next_id
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn create_tabular_dataset(
        &self,
        display_name: &str,
        _bq_source: &str,
    ) -> Result<DatasetHandle> {
        let mut state = self.state.lock().unwrap();
        let id = Self::fresh_id(&mut state);
        Ok(DatasetHandle {
            resource_name: format!("{PARENT}/datasets/{id}"),
            display_name: display_name.to_string(),
        })
    }

    async fn run_automl_training(&self, spec: &TrainingSpec) -> Result<ModelHandle> {
        let mut state = self.state.lock().unwrap();
        if state.fail_training {
            anyhow::bail!("Training pipeline ended in state PIPELINE_STATE_FAILED");
        }
        state.training_specs.push(spec.clone());
        let id = Self::fresh_id(&mut state);
        Ok(ModelHandle {
            resource_name: format!("{PARENT}/models/{id}"),
            display_name: spec.model_display_name.clone(),
        })
    }

    async fn list_endpoints(&self, display_name: &str) -> Result<Vec<EndpointHandle>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .endpoints
            .iter()
            .filter(|e| e.display_name == display_name)
            .cloned()
            .collect())
    }

    async fn create_endpoint(&self, display_name: &str) -> Result<EndpointHandle> {
        let mut state = self.state.lock().unwrap();
        state.endpoint_creates += 1;
        let id = Self::fresh_id(&mut state);
        let endpoint = EndpointHandle {
            resource_name: format!("{PARENT}/endpoints/{id}"),
            display_name: display_name.to_string(),
        };
        state.endpoints.push(endpoint.clone());
        Ok(endpoint)
    }

    async fn deploy_model(&self, spec: &DeploySpec) -> Result<Deployment> {
        let mut state = self.state.lock().unwrap();
        state.deploy_specs.push(spec.clone());
        if state.omit_deployed_model_id {
            return Ok(Deployment {
                deployed_model_id: None,
            });
        }
        let id = Self::fresh_id(&mut state);
        Ok(Deployment {
            deployed_model_id: Some(id.to_string()),
        })
    }
}

fn demo_params() -> WorkflowParams {
    WorkflowParams {
        bq_uri: String::from("bq://demo.sales.labeled"),
        ..WorkflowParams::default()
    }
}

#[tokio::test]
async fn fresh_endpoint_is_created_exactly_once() {
    let platform = FakePlatform::default();

    let report = workflow::run(&platform, &demo_params()).await.unwrap();

    let state = platform.state.lock().unwrap();
    assert_eq!(state.endpoint_creates, 1);
    assert_eq!(
        report.endpoint,
        state.endpoints.first().unwrap().resource_name
    );
}

#[tokio::test]
async fn existing_endpoint_is_reused_without_creation() {
    let (platform, seeded) = FakePlatform::with_endpoint("demo-endpoint");

    let report = workflow::run(&platform, &demo_params()).await.unwrap();

    let state = platform.state.lock().unwrap();
    assert_eq!(state.endpoint_creates, 0);
    assert_eq!(report.endpoint, seeded);
}

#[tokio::test]
async fn second_run_resolves_same_endpoint_but_fresh_dataset_and_model() {
    let platform = FakePlatform::default();
    let params = demo_params();

    let first = workflow::run(&platform, &params).await.unwrap();
    let second = workflow::run(&platform, &params).await.unwrap();

    // The endpoint is the sole idempotent resource
    assert_eq!(first.endpoint, second.endpoint);
    assert_ne!(first.dataset, second.dataset);
    assert_ne!(first.model, second.model);

    let state = platform.state.lock().unwrap();
    assert_eq!(state.endpoint_creates, 1);
}

#[tokio::test]
async fn training_request_uses_truncated_milli_node_hours() {
    let platform = FakePlatform::default();

    let mut params = demo_params();
    params.training_budget_hours = 1.0;
    workflow::run(&platform, &params).await.unwrap();

    params.training_budget_hours = 0.0015;
    workflow::run(&platform, &params).await.unwrap();

    let state = platform.state.lock().unwrap();
    assert_eq!(state.training_specs[0].budget_milli_node_hours, 1000);
    assert_eq!(state.training_specs[1].budget_milli_node_hours, 1);
}

#[tokio::test]
async fn training_spec_carries_fixed_policy_and_inputs() {
    let platform = FakePlatform::default();

    let report = workflow::run(&platform, &demo_params()).await.unwrap();

    let state = platform.state.lock().unwrap();
    let spec = &state.training_specs[0];
    assert_eq!(spec.target_column, "label");
    assert_eq!(spec.model_display_name, "automl-model-demo");
    assert_eq!(spec.dataset, report.dataset);
    assert!(spec.disable_early_stopping);
    assert!(spec.display_name.starts_with("automl-train-"));
}

#[tokio::test]
async fn deployment_uses_fixed_traffic_and_scaling() {
    let platform = FakePlatform::default();

    let report = workflow::run(&platform, &demo_params()).await.unwrap();

    let state = platform.state.lock().unwrap();
    let spec = &state.deploy_specs[0];
    assert_eq!(spec.model, report.model);
    assert_eq!(spec.endpoint, report.endpoint);
    assert_eq!(spec.deployed_model_display_name, "automl-model-demo-deployed");
    assert_eq!(spec.traffic_percentage, 100);
    assert_eq!(spec.machine_type, "n1-standard-2");
    assert_eq!(spec.min_replica_count, 1);
    assert_eq!(spec.max_replica_count, 2);
}

#[tokio::test]
async fn missing_deployed_model_id_is_reported_as_null() {
    let platform = FakePlatform::default();
    platform.state.lock().unwrap().omit_deployed_model_id = true;

    let report = workflow::run(&platform, &demo_params()).await.unwrap();
    assert!(report.deployed_model_id.is_none());

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json.as_object().unwrap().len(), 4);
    assert!(json["deployed_model_id"].is_null());
    assert_eq!(json["dataset"], report.dataset.as_str());
    assert_eq!(json["model"], report.model.as_str());
    assert_eq!(json["endpoint"], report.endpoint.as_str());
}

#[tokio::test]
async fn training_failure_aborts_before_endpoint_and_deploy() {
    let platform = FakePlatform::default();
    platform.state.lock().unwrap().fail_training = true;

    let result = workflow::run(&platform, &demo_params()).await;
    assert!(result.is_err());

    let state = platform.state.lock().unwrap();
    assert_eq!(state.endpoint_creates, 0);
    assert!(state.endpoints.is_empty());
    assert!(state.deploy_specs.is_empty());
}
