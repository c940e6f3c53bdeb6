//! AutoML train-and-deploy workflow.
//!
//! Provisions a tabular dataset, trains a classification model via AutoML,
//! resolves or creates a serving endpoint, and deploys the model to it.

pub mod workflow;
