//! Handle types for remote platform resources.
//!
//! Every entity here is a reference to a resource that lives server-side;
//! the workflow holds no local state beyond these during a run.

/// A provisioned managed tabular dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHandle {
    /// Fully qualified resource name, e.g.
    /// `projects/p/locations/r/datasets/123`.
    pub resource_name: String,
    pub display_name: String,
}

/// A trained model artifact produced by a training job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHandle {
    pub resource_name: String,
    pub display_name: String,
}

/// A durable serving endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHandle {
    pub resource_name: String,
    pub display_name: String,
}

/// The result of binding a model to an endpoint.
///
/// The platform does not always surface the deployed-model id; absence is
/// tolerated and reported downstream as a null field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub deployed_model_id: Option<String>,
}

/// Request to train a classification model against a provisioned dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSpec {
    /// Display name for the training job itself.
    pub display_name: String,
    /// Resource name of the dataset to train on.
    pub dataset: String,
    /// Column of the dataset holding the label.
    pub target_column: String,
    /// Display name for the model the job uploads on success.
    pub model_display_name: String,
    /// Training budget in milli-node-hours (1/1000 of a node-hour).
    pub budget_milli_node_hours: i64,
    /// When true the job consumes its full declared budget instead of
    /// stopping on convergence.
    pub disable_early_stopping: bool,
}

/// Request to attach a trained model to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySpec {
    /// Resource name of the trained model.
    pub model: String,
    /// Resource name of the target endpoint.
    pub endpoint: String,
    pub deployed_model_display_name: String,
    /// Share of endpoint traffic routed to the new deployment. At 100 the
    /// platform demotes every prior deployment on the endpoint to 0%.
    pub traffic_percentage: u8,
    pub machine_type: String,
    pub min_replica_count: u32,
    pub max_replica_count: u32,
}
