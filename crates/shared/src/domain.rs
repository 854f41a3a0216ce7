use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

macro_rules! point_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub x: f64,
            pub y: f64,
        }

        impl $name {
            pub const fn new(x: f64, y: f64) -> Self {
                Self { x, y }
            }
        }
    };
}

point_newtype!(DataPoint);
point_newtype!(Centroid);

impl From<DataPoint> for Centroid {
    fn from(value: DataPoint) -> Self {
        Self::new(value.x, value.y)
    }
}

impl From<Centroid> for DataPoint {
    fn from(value: Centroid) -> Self {
        Self::new(value.x, value.y)
    }
}

/// Data-space bounds of the current dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAxisLimits")]
pub struct AxisLimits {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

#[derive(Deserialize)]
struct RawAxisLimits {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl TryFrom<RawAxisLimits> for AxisLimits {
    type Error = DomainError;

    fn try_from(raw: RawAxisLimits) -> Result<Self, Self::Error> {
        AxisLimits::new(raw.x_min, raw.x_max, raw.y_min, raw.y_max)
    }
}

impl AxisLimits {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Result<Self, DomainError> {
        let all_finite = [x_min, x_max, y_min, y_max].iter().all(|v| v.is_finite());
        if !all_finite {
            return Err(DomainError::NonFiniteLimits);
        }
        if x_min >= x_max {
            return Err(DomainError::InvertedRange {
                axis: 'x',
                min: x_min,
                max: x_max,
            });
        }
        if y_min >= y_max {
            return Err(DomainError::InvertedRange {
                axis: 'y',
                min: y_min,
                max: y_max,
            });
        }
        Ok(Self {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    pub fn x_min(&self) -> f64 {
        self.x_min
    }

    pub fn x_max(&self) -> f64 {
        self.x_max
    }

    pub fn y_min(&self) -> f64 {
        self.y_min
    }

    pub fn y_max(&self) -> f64 {
        self.y_max
    }

    pub fn x_span(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn y_span(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn contains(&self, point: DataPoint) -> bool {
        (self.x_min..=self.x_max).contains(&point.x) && (self.y_min..=self.y_max).contains(&point.y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InitMethod {
    #[default]
    Random,
    Farthest,
    #[serde(rename = "KMeans++")]
    KMeansPlusPlus,
    Manual,
}

impl InitMethod {
    pub const ALL: [InitMethod; 4] = [
        InitMethod::Random,
        InitMethod::Farthest,
        InitMethod::KMeansPlusPlus,
        InitMethod::Manual,
    ];

    /// Name the engine expects in `initMethod`.
    pub fn wire_name(self) -> &'static str {
        match self {
            InitMethod::Random => "Random",
            InitMethod::Farthest => "Farthest",
            InitMethod::KMeansPlusPlus => "KMeans++",
            InitMethod::Manual => "Manual",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InitMethod::Random => "Random",
            InitMethod::Farthest => "Farthest First",
            InitMethod::KMeansPlusPlus => "KMeans++",
            InitMethod::Manual => "Manual",
        }
    }

    pub fn is_manual(self) -> bool {
        self == InitMethod::Manual
    }
}

impl fmt::Display for InitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for InitMethod {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "random" => Ok(InitMethod::Random),
            "farthest" | "farthest-first" | "farthest_first" => Ok(InitMethod::Farthest),
            "kmeans++" | "kmeans-plus-plus" | "kmeanspp" => Ok(InitMethod::KMeansPlusPlus),
            "manual" => Ok(InitMethod::Manual),
            _ => Err(DomainError::UnknownInitMethod(raw.to_string())),
        }
    }
}

/// Number of clusters; never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ClusterCount(u32);

impl ClusterCount {
    pub const MIN: u32 = 1;

    pub fn new(k: u32) -> Result<Self, DomainError> {
        if k < Self::MIN {
            return Err(DomainError::InvalidClusterCount(k));
        }
        Ok(Self(k))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl Default for ClusterCount {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

impl TryFrom<u32> for ClusterCount {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClusterCount> for u32 {
    fn from(value: ClusterCount) -> Self {
        value.0
    }
}

impl fmt::Display for ClusterCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialized_limits_are_validated() {
        let limits: AxisLimits =
            serde_json::from_str(r#"{"x_min":-1.0,"x_max":1.0,"y_min":0.0,"y_max":2.0}"#)
                .expect("valid limits");
        assert_eq!(limits.y_span(), 2.0);

        let inverted =
            serde_json::from_str::<AxisLimits>(r#"{"x_min":3.0,"x_max":1.0,"y_min":0.0,"y_max":2.0}"#);
        assert!(inverted.is_err());
        let round_trip: AxisLimits =
            serde_json::from_str(&serde_json::to_string(&limits).expect("encode")).expect("decode");
        assert_eq!(round_trip, limits);
    }

    #[test]
    fn rejects_inverted_and_non_finite_limits() {
        assert!(matches!(
            AxisLimits::new(1.0, 1.0, 0.0, 1.0),
            Err(DomainError::InvertedRange { axis: 'x', .. })
        ));
        assert!(matches!(
            AxisLimits::new(0.0, 1.0, 2.0, -2.0),
            Err(DomainError::InvertedRange { axis: 'y', .. })
        ));
        assert!(matches!(
            AxisLimits::new(f64::NAN, 1.0, 0.0, 1.0),
            Err(DomainError::NonFiniteLimits)
        ));
        let limits = AxisLimits::new(-5.0, 5.0, -4.0, 6.0).expect("limits");
        assert_eq!(limits.x_span(), 10.0);
        assert!(limits.contains(DataPoint::new(0.0, 6.0)));
        assert!(!limits.contains(DataPoint::new(5.1, 0.0)));
    }

    #[test]
    fn init_method_uses_engine_wire_names() {
        let encoded = serde_json::to_string(&InitMethod::KMeansPlusPlus).expect("encode");
        assert_eq!(encoded, "\"KMeans++\"");
        let decoded: InitMethod = serde_json::from_str("\"Farthest\"").expect("decode");
        assert_eq!(decoded, InitMethod::Farthest);
        assert_eq!("kmeans++".parse::<InitMethod>().expect("parse"), InitMethod::KMeansPlusPlus);
        assert!("spectral".parse::<InitMethod>().is_err());
    }

    #[test]
    fn cluster_count_is_positive() {
        assert!(ClusterCount::new(0).is_err());
        assert_eq!(ClusterCount::default().get(), 1);
        assert!(serde_json::from_str::<ClusterCount>("0").is_err());
        assert_eq!(serde_json::to_string(&ClusterCount::new(3).expect("k")).expect("encode"), "3");
    }
}
