use crate::error::FrameError;
use crate::features;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;

/// Hand skeleton joints reported per frame
pub const JOINT_COUNT: usize = 21;
/// Values per joint (x, y, z, visibility)
pub const JOINT_VALUES: usize = 4;
/// Inter-bone angles appended after the joint values
pub const ANGLE_COUNT: usize = 15;
/// Length of every feature vector
pub const FEATURE_DIM: usize = JOINT_COUNT * JOINT_VALUES + ANGLE_COUNT;
/// Index fingertip, used as the motion anchor
pub const ANCHOR_JOINT: usize = 8;

/// A single hand landmark in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default = "default_visibility")]
    pub visibility: f32,
}

fn default_visibility() -> f32 {
    1.0
}

impl Joint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: 1.0,
        }
    }
}

/// Normalized 2D fingertip position used for motion tracking
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPoint {
    pub x: f32,
    pub y: f32,
}

impl AnchorPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another anchor
    pub fn distance(&self, other: &AnchorPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Fixed-length feature vector, immutable once produced
///
/// Cloning shares the underlying storage, so one vector can sit in several
/// buffers at once.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Arc<[f32]>);

impl FeatureVector {
    /// Validate raw values into a feature vector of the expected dimension
    pub fn new(values: Vec<f32>, expected_dim: usize) -> Result<Self, FrameError> {
        if values.len() != expected_dim {
            return Err(FrameError::Dimension {
                expected: expected_dim,
                actual: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FrameError::NonFinite {
                field: "feature vector",
            });
        }
        Ok(Self(values.into()))
    }

    /// Element-wise mean of a set of equally sized vectors
    pub fn mean<'a, I>(vectors: I) -> Option<FeatureVector>
    where
        I: IntoIterator<Item = &'a FeatureVector>,
    {
        let mut iter = vectors.into_iter();
        let first = iter.next()?;
        let mut sums: Vec<f64> = first.iter().map(|v| *v as f64).collect();
        let mut count = 1usize;

        for vector in iter {
            if vector.len() != sums.len() {
                return None;
            }
            for (sum, value) in sums.iter_mut().zip(vector.iter()) {
                *sum += *value as f64;
            }
            count += 1;
        }

        let mean: Vec<f32> = sums.into_iter().map(|s| (s / count as f64) as f32).collect();
        Some(FeatureVector(mean.into()))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl Deref for FeatureVector {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

/// One frame from the pose provider
///
/// Either the pre-derived feature vectors or the raw joints (or both) must be
/// present; missing vectors are derived from the joints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseFrame {
    #[serde(default)]
    pub joints: Vec<Joint>,
    #[serde(default)]
    pub static_features: Option<Vec<f32>>,
    #[serde(default)]
    pub dynamic_features: Option<Vec<f32>>,
    #[serde(default)]
    pub anchor: Option<AnchorPoint>,
}

impl PoseFrame {
    /// Frame built from joints only
    pub fn from_joints(joints: Vec<Joint>) -> Self {
        Self {
            joints,
            ..Default::default()
        }
    }

    /// Frame with pre-derived vectors and an explicit anchor
    pub fn with_features(features: Vec<f32>, anchor: Option<AnchorPoint>) -> Self {
        Self {
            joints: Vec::new(),
            static_features: Some(features.clone()),
            dynamic_features: Some(features),
            anchor,
        }
    }

    /// Explicit anchor, falling back to the index fingertip joint
    pub fn anchor(&self) -> Option<AnchorPoint> {
        self.anchor
            .or_else(|| {
                self.joints
                    .get(ANCHOR_JOINT)
                    .map(|joint| AnchorPoint::new(joint.x, joint.y))
            })
            .filter(AnchorPoint::is_finite)
    }

    /// Feature vector for the static classifier
    pub fn static_vector(&self, dim: usize) -> Result<FeatureVector, FrameError> {
        self.vector(self.static_features.as_ref(), false, dim, "static_features")
    }

    /// Feature vector for the dynamic classifier (visibility forced to 1.0)
    pub fn dynamic_vector(&self, dim: usize) -> Result<FeatureVector, FrameError> {
        self.vector(self.dynamic_features.as_ref(), true, dim, "dynamic_features")
    }

    fn vector(
        &self,
        provided: Option<&Vec<f32>>,
        force_visibility: bool,
        dim: usize,
        field: &'static str,
    ) -> Result<FeatureVector, FrameError> {
        match provided {
            Some(values) => FeatureVector::new(values.clone(), dim),
            None if !self.joints.is_empty() => {
                let values = features::derive(&self.joints, force_visibility)?;
                FeatureVector::new(values, dim)
            }
            None => Err(FrameError::MissingFeatures { field }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand() -> Vec<Joint> {
        (0..JOINT_COUNT)
            .map(|i| Joint::new(0.3 + i as f32 * 0.01, 0.5 - i as f32 * 0.015, 0.0))
            .collect()
    }

    #[test]
    fn test_feature_dimension_constant() {
        assert_eq!(FEATURE_DIM, 99);
    }

    #[test]
    fn test_feature_vector_validation() {
        assert!(FeatureVector::new(vec![0.0; FEATURE_DIM], FEATURE_DIM).is_ok());
        assert_eq!(
            FeatureVector::new(vec![0.0; 10], FEATURE_DIM),
            Err(FrameError::Dimension {
                expected: FEATURE_DIM,
                actual: 10
            })
        );

        let mut values = vec![0.0; FEATURE_DIM];
        values[42] = f32::NAN;
        assert!(matches!(
            FeatureVector::new(values, FEATURE_DIM),
            Err(FrameError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_feature_vector_mean() {
        let a = FeatureVector::new(vec![1.0, 2.0, 3.0], 3).unwrap();
        let b = FeatureVector::new(vec![3.0, 4.0, 5.0], 3).unwrap();

        let mean = FeatureVector::mean([&a, &b]).unwrap();
        assert_eq!(mean.as_slice(), &[2.0, 3.0, 4.0]);
        assert!(FeatureVector::mean(std::iter::empty()).is_none());
    }

    #[test]
    fn test_anchor_falls_back_to_index_fingertip() {
        let frame = PoseFrame::from_joints(hand());
        let anchor = frame.anchor().unwrap();
        assert!((anchor.x - 0.38).abs() < 1e-6);
        assert!((anchor.y - 0.38).abs() < 1e-6);

        let explicit = PoseFrame::with_features(vec![0.0; FEATURE_DIM], Some(AnchorPoint::new(0.1, 0.2)));
        assert_eq!(explicit.anchor(), Some(AnchorPoint::new(0.1, 0.2)));

        let blind = PoseFrame::with_features(vec![0.0; FEATURE_DIM], None);
        assert_eq!(blind.anchor(), None);
    }

    #[test]
    fn test_vectors_derived_from_joints() {
        let frame = PoseFrame::from_joints(hand());

        let static_vector = frame.static_vector(FEATURE_DIM).unwrap();
        let dynamic_vector = frame.dynamic_vector(FEATURE_DIM).unwrap();
        assert_eq!(static_vector.len(), FEATURE_DIM);
        assert_eq!(dynamic_vector.len(), FEATURE_DIM);
    }

    #[test]
    fn test_frame_without_any_features_is_rejected() {
        let frame = PoseFrame::default();
        assert_eq!(
            frame.static_vector(FEATURE_DIM),
            Err(FrameError::MissingFeatures {
                field: "static_features"
            })
        );
    }

    #[test]
    fn test_pose_frame_deserializes_with_defaults() {
        let frame: PoseFrame = serde_json::from_str(
            r#"{"joints":[{"x":0.1,"y":0.2}],"anchor":{"x":0.5,"y":0.5}}"#,
        )
        .unwrap();
        assert_eq!(frame.joints[0].visibility, 1.0);
        assert_eq!(frame.joints[0].z, 0.0);
        assert!(frame.static_features.is_none());
        assert_eq!(frame.anchor(), Some(AnchorPoint::new(0.5, 0.5)));
    }
}
