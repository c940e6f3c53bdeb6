//! Explicit session context for a single workflow run.

use anyhow::Result;

/// Project, region and staging configuration shared by every platform call
/// in a run.
///
/// Constructed once at run start and passed explicitly to the client, so two
/// independent runs with different projects can coexist in one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    project_id: String,
    region: String,
    staging_bucket: String,
}

impl SessionContext {
    /// Creates a session context, validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the project or region is empty, or if the staging
    /// bucket is not a `gs://` URI.
    pub fn new(project_id: &str, region: &str, staging_bucket: &str) -> Result<Self> {
        if project_id.trim().is_empty() {
            anyhow::bail!("Project id must not be empty");
        }

        if region.trim().is_empty() {
            anyhow::bail!("Region must not be empty");
        }

        if !staging_bucket.starts_with("gs://") {
            anyhow::bail!("Staging bucket must be a gs:// URI, got: {staging_bucket}");
        }

        Ok(Self {
            project_id: project_id.to_string(),
            region: region.to_string(),
            staging_bucket: staging_bucket.to_string(),
        })
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    #[must_use]
    pub fn staging_bucket(&self) -> &str {
        &self.staging_bucket
    }

    /// Resource parent path used by list/create calls.
    #[must_use]
    pub fn parent(&self) -> String {
        format!(
            "projects/{}/locations/{}",
            self.project_id, self.region
        )
    }

    /// Default regional API endpoint.
    #[must_use]
    pub fn default_api_endpoint(&self) -> String {
        format!("https://{}-aiplatform.googleapis.com", self.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_context() {
        let ctx = SessionContext::new("my-project", "us-central1", "gs://my-bucket").unwrap();
        assert_eq!(ctx.parent(), "projects/my-project/locations/us-central1");
        assert_eq!(
            ctx.default_api_endpoint(),
            "https://us-central1-aiplatform.googleapis.com"
        );
    }

    #[test]
    fn test_empty_project_rejected() {
        assert!(SessionContext::new("", "us-central1", "gs://bucket").is_err());
        assert!(SessionContext::new("  ", "us-central1", "gs://bucket").is_err());
    }

    #[test]
    fn test_empty_region_rejected() {
        assert!(SessionContext::new("my-project", "", "gs://bucket").is_err());
    }

    #[test]
    fn test_non_gcs_staging_bucket_rejected() {
        assert!(SessionContext::new("my-project", "us-central1", "s3://bucket").is_err());
        assert!(SessionContext::new("my-project", "us-central1", "my-bucket").is_err());
    }
}
