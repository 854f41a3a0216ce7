use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{AxisLimits, Centroid, ClusterCount, DataPoint, InitMethod},
    error::DomainError,
};

/// The five calls the clustering engine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineIntent {
    GenerateDataset,
    StepKmeans,
    RunKmeans,
    ResetKmeans,
    ManualKmeans,
}

impl EngineIntent {
    pub fn endpoint(self) -> &'static str {
        match self {
            EngineIntent::GenerateDataset => "generate-dataset",
            EngineIntent::StepKmeans => "step-kmeans",
            EngineIntent::RunKmeans => "run-kmeans",
            EngineIntent::ResetKmeans => "reset-kmeans",
            EngineIntent::ManualKmeans => "manual-kmeans",
        }
    }
}

impl fmt::Display for EngineIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Body of `step-kmeans` and `run-kmeans`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KmeansRequest {
    pub k: ClusterCount,
    #[serde(rename = "initMethod")]
    pub init_method: InitMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroids: Option<Vec<Centroid>>,
}

impl KmeansRequest {
    /// Centroids travel only with the manual method.
    pub fn new(k: ClusterCount, init_method: InitMethod, centroids: &[Centroid]) -> Self {
        Self {
            k,
            init_method,
            centroids: init_method.is_manual().then(|| centroids.to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetRequest {
    pub k: ClusterCount,
    #[serde(rename = "initMethod")]
    pub init_method: InitMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualCentroidsRequest {
    pub centroids: Vec<Centroid>,
    pub k: ClusterCount,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineRequest {
    GenerateDataset,
    Step(KmeansRequest),
    Run(KmeansRequest),
    Reset(ResetRequest),
    Manual(ManualCentroidsRequest),
}

impl EngineRequest {
    pub fn intent(&self) -> EngineIntent {
        match self {
            EngineRequest::GenerateDataset => EngineIntent::GenerateDataset,
            EngineRequest::Step(_) => EngineIntent::StepKmeans,
            EngineRequest::Run(_) => EngineIntent::RunKmeans,
            EngineRequest::Reset(_) => EngineIntent::ResetKmeans,
            EngineRequest::Manual(_) => EngineIntent::ManualKmeans,
        }
    }

    /// JSON body for the request; `generate-dataset` carries none.
    pub fn body(&self) -> Result<Option<serde_json::Value>, serde_json::Error> {
        let value = match self {
            EngineRequest::GenerateDataset => return Ok(None),
            EngineRequest::Step(body) | EngineRequest::Run(body) => serde_json::to_value(body)?,
            EngineRequest::Reset(body) => serde_json::to_value(body)?,
            EngineRequest::Manual(body) => serde_json::to_value(body)?,
        };
        Ok(Some(value))
    }
}

/// Structured `generate-dataset` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetResponse {
    pub data_points: Vec<[f64; 2]>,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl DatasetResponse {
    pub fn into_parts(self) -> Result<(Vec<DataPoint>, AxisLimits), DomainError> {
        let limits = AxisLimits::new(self.x_min, self.x_max, self.y_min, self.y_max)?;
        let points = self
            .data_points
            .into_iter()
            .map(|[x, y]| DataPoint::new(x, y))
            .collect();
        Ok((points, limits))
    }
}

/// Any structured reply other than a dataset: `{converged}`, `{error}` or `{message}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub converged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(value: u32) -> ClusterCount {
        ClusterCount::new(value).expect("k")
    }

    #[test]
    fn step_body_omits_centroids_for_engine_initialized_methods() {
        let centroids = [Centroid::new(1.0, 2.0)];
        let request = EngineRequest::Step(KmeansRequest::new(k(2), InitMethod::Random, &centroids));
        let body = request.body().expect("encode").expect("body");
        assert_eq!(body, serde_json::json!({ "k": 2, "initMethod": "Random" }));
    }

    #[test]
    fn manual_step_body_carries_centroids() {
        let centroids = [Centroid::new(1.0, 2.0), Centroid::new(-3.5, 0.25)];
        let request = EngineRequest::Run(KmeansRequest::new(k(2), InitMethod::Manual, &centroids));
        let body = request.body().expect("encode").expect("body");
        assert_eq!(
            body,
            serde_json::json!({
                "k": 2,
                "initMethod": "Manual",
                "centroids": [{ "x": 1.0, "y": 2.0 }, { "x": -3.5, "y": 0.25 }],
            })
        );
        assert_eq!(request.intent().endpoint(), "run-kmeans");
    }

    #[test]
    fn generate_dataset_has_no_body() {
        assert!(EngineRequest::GenerateDataset.body().expect("encode").is_none());
    }

    #[test]
    fn status_fields_default_when_absent() {
        let converged: StatusResponse =
            serde_json::from_str(r#"{"converged": true}"#).expect("decode");
        assert!(converged.converged);
        assert!(converged.error.is_none());

        let error: StatusResponse =
            serde_json::from_str(r#"{"error": "select exactly 3 centroids"}"#).expect("decode");
        assert!(!error.converged);
        assert_eq!(error.error.as_deref(), Some("select exactly 3 centroids"));
    }

    #[test]
    fn dataset_response_validates_limits() {
        let payload = DatasetResponse {
            data_points: vec![[0.0, 1.0], [2.0, -1.0]],
            x_min: -1.0,
            x_max: 3.0,
            y_min: -2.0,
            y_max: 2.0,
        };
        let (points, limits) = payload.clone().into_parts().expect("parts");
        assert_eq!(points, vec![DataPoint::new(0.0, 1.0), DataPoint::new(2.0, -1.0)]);
        assert_eq!(limits.x_max(), 3.0);

        let degenerate = DatasetResponse {
            x_max: -1.0,
            ..payload
        };
        assert!(degenerate.into_parts().is_err());
    }
}
