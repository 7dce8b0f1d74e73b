use super::arbiter::RecognitionSource;
use crate::error::ClassifierError;
use crate::frame::FeatureVector;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Raw classifier output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub class_id: usize,
    pub confidence: f32,
}

/// A gesture classification capability
///
/// Static classifiers take a single frame, dynamic ones a window of
/// `input_frames()` frames, oldest first.
pub trait GestureClassifier: Send {
    fn classify(&mut self, frames: &[FeatureVector]) -> Result<Prediction, ClassifierError>;

    /// Number of frames expected per call
    fn input_frames(&self) -> usize;

    /// Class names indexed by class id
    fn labels(&self) -> &[String];
}

/// Class id to gesture name lookup
#[derive(Debug, Clone)]
pub struct LabelMap {
    source: RecognitionSource,
    names: Vec<String>,
}

impl LabelMap {
    pub fn new(source: RecognitionSource, names: Vec<String>) -> Self {
        Self { source, names }
    }

    /// Name for a class id, `static_<id>` / `dynamic_<id>` when unknown
    pub fn name(&self, class_id: usize) -> String {
        match self.names.get(class_id) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{}_{}", self.source, class_id),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// On-disk model for [`CentroidClassifier`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidModel {
    pub labels: Vec<String>,
    pub feature_dim: usize,
    #[serde(default = "default_frames")]
    pub frames: usize,
    /// Per-feature standardization, applied to every frame
    #[serde(default)]
    pub mean: Option<Vec<f32>>,
    #[serde(default)]
    pub scale: Option<Vec<f32>>,
    /// One flattened `frames * feature_dim` centroid per label
    pub centroids: Vec<Vec<f32>>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_frames() -> usize {
    1
}

fn default_temperature() -> f32 {
    1.0
}

/// Nearest-centroid classifier with softmax confidences
pub struct CentroidClassifier {
    model: CentroidModel,
}

impl CentroidClassifier {
    /// Load a JSON model file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let path_str = path.as_ref().display().to_string();
        debug!("Loading classifier model from {}", path_str);

        let contents =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ClassifierError::ModelLoad {
                path: path_str.clone(),
                details: e.to_string(),
            })?;

        let model: CentroidModel =
            serde_json::from_str(&contents).map_err(|e| ClassifierError::ModelLoad {
                path: path_str.clone(),
                details: e.to_string(),
            })?;

        let classifier = Self::from_model(model)?;
        info!(
            "Loaded classifier from {} ({} classes, {} frame(s) x {})",
            path_str,
            classifier.model.labels.len(),
            classifier.model.frames,
            classifier.model.feature_dim
        );
        Ok(classifier)
    }

    /// Validate a model and wrap it
    pub fn from_model(model: CentroidModel) -> Result<Self, ClassifierError> {
        let invalid = |details: String| Err(ClassifierError::InvalidModel { details });

        if model.labels.is_empty() {
            return invalid("model has no labels".to_string());
        }
        if model.feature_dim == 0 || model.frames == 0 {
            return invalid("feature_dim and frames must be greater than 0".to_string());
        }
        if model.centroids.len() != model.labels.len() {
            return invalid(format!(
                "{} centroids for {} labels",
                model.centroids.len(),
                model.labels.len()
            ));
        }

        let expected = model.frames * model.feature_dim;
        if let Some(index) = model.centroids.iter().position(|c| c.len() != expected) {
            return invalid(format!(
                "centroid {} has {} values, expected {}",
                index,
                model.centroids[index].len(),
                expected
            ));
        }

        for (name, values) in [("mean", &model.mean), ("scale", &model.scale)] {
            if let Some(values) = values {
                if values.len() != model.feature_dim {
                    return invalid(format!(
                        "{} has {} values, expected {}",
                        name,
                        values.len(),
                        model.feature_dim
                    ));
                }
            }
        }
        if let Some(scale) = &model.scale {
            if scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return invalid("scale values must be finite and non-zero".to_string());
            }
        }
        if !(model.temperature > 0.0) {
            return invalid("temperature must be greater than 0".to_string());
        }

        Ok(Self { model })
    }

    pub fn feature_dim(&self) -> usize {
        self.model.feature_dim
    }

    fn standardize(&self, index: usize, value: f32) -> f32 {
        let mean = self.model.mean.as_ref().map(|m| m[index]).unwrap_or(0.0);
        let scale = self.model.scale.as_ref().map(|s| s[index]).unwrap_or(1.0);
        (value - mean) / scale
    }
}

impl GestureClassifier for CentroidClassifier {
    fn classify(&mut self, frames: &[FeatureVector]) -> Result<Prediction, ClassifierError> {
        let dim = self.model.feature_dim;
        let shape_ok = frames.len() == self.model.frames && frames.iter().all(|f| f.len() == dim);
        if !shape_ok {
            return Err(ClassifierError::InputShape {
                expected_frames: self.model.frames,
                expected_dim: dim,
                frames: frames.len(),
                dim: frames.first().map(|f| f.len()).unwrap_or(0),
            });
        }

        let input: Vec<f32> = frames
            .iter()
            .flat_map(|frame| {
                frame
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.standardize(i, *v))
            })
            .collect();

        let logits: Vec<f32> = self
            .model
            .centroids
            .iter()
            .map(|centroid| {
                let distance: f32 = centroid
                    .iter()
                    .zip(input.iter())
                    .map(|(c, x)| (c - x) * (c - x))
                    .sum();
                -distance / self.model.temperature
            })
            .collect();

        let probabilities = softmax(&logits);
        let (class_id, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| ClassifierError::Inference {
                details: "model produced no scores".to_string(),
            })?;

        if !confidence.is_finite() {
            return Err(ClassifierError::Inference {
                details: "non-finite confidence".to_string(),
            });
        }

        Ok(Prediction {
            class_id,
            confidence,
        })
    }

    fn input_frames(&self) -> usize {
        self.model.frames
    }

    fn labels(&self) -> &[String] {
        &self.model.labels
    }
}

/// Load a model for one gate and check it fits the feature layout
///
/// Static models must take exactly one frame.
pub fn load_classifier<P: AsRef<Path>>(
    source: RecognitionSource,
    path: P,
    feature_dim: usize,
) -> Result<Box<dyn GestureClassifier>, ClassifierError> {
    let classifier = CentroidClassifier::load(path)?;

    if classifier.feature_dim() != feature_dim {
        return Err(ClassifierError::InvalidModel {
            details: format!(
                "{} model expects {} features per frame, frames carry {}",
                source,
                classifier.feature_dim(),
                feature_dim
            ),
        });
    }
    if source == RecognitionSource::Static && classifier.input_frames() != 1 {
        return Err(ClassifierError::InvalidModel {
            details: format!(
                "static model must take a single frame, not {}",
                classifier.input_frames()
            ),
        });
    }

    Ok(Box::new(classifier))
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn two_class_model() -> CentroidModel {
        CentroidModel {
            labels: vec!["fist".to_string(), "palm".to_string()],
            feature_dim: 3,
            frames: 1,
            mean: None,
            scale: None,
            centroids: vec![vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]],
            temperature: 0.1,
        }
    }

    fn vector(values: &[f32]) -> FeatureVector {
        FeatureVector::new(values.to_vec(), values.len()).unwrap()
    }

    #[test]
    fn test_nearest_centroid_wins() {
        let mut classifier = CentroidClassifier::from_model(two_class_model()).unwrap();

        let prediction = classifier.classify(&[vector(&[0.9, 1.0, 1.1])]).unwrap();
        assert_eq!(prediction.class_id, 1);
        assert!(prediction.confidence > 0.99);

        let prediction = classifier.classify(&[vector(&[0.1, 0.0, 0.0])]).unwrap();
        assert_eq!(prediction.class_id, 0);
    }

    #[test]
    fn test_equidistant_input_is_uncertain() {
        let mut classifier = CentroidClassifier::from_model(two_class_model()).unwrap();
        let prediction = classifier.classify(&[vector(&[0.5, 0.5, 0.5])]).unwrap();
        assert!((prediction.confidence - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_standardization_is_applied() {
        let mut model = two_class_model();
        model.mean = Some(vec![10.0, 10.0, 10.0]);
        model.scale = Some(vec![2.0, 2.0, 2.0]);
        let mut classifier = CentroidClassifier::from_model(model).unwrap();

        // (12 - 10) / 2 = 1 lands on the second centroid
        let prediction = classifier.classify(&[vector(&[12.0, 12.0, 12.0])]).unwrap();
        assert_eq!(prediction.class_id, 1);
    }

    #[test]
    fn test_sequence_model_shape() {
        let mut model = two_class_model();
        model.frames = 2;
        model.centroids = vec![vec![0.0; 6], vec![1.0; 6]];
        let mut classifier = CentroidClassifier::from_model(model).unwrap();
        assert_eq!(classifier.input_frames(), 2);

        let frames = vec![vector(&[1.0, 1.0, 1.0]), vector(&[1.0, 0.9, 1.0])];
        assert_eq!(classifier.classify(&frames).unwrap().class_id, 1);

        let err = classifier.classify(&frames[..1]).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::InputShape {
                expected_frames: 2,
                frames: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_models_are_rejected() {
        let mut model = two_class_model();
        model.centroids.pop();
        assert!(CentroidClassifier::from_model(model).is_err());

        let mut model = two_class_model();
        model.centroids[0] = vec![0.0; 4];
        assert!(CentroidClassifier::from_model(model).is_err());

        let mut model = two_class_model();
        model.scale = Some(vec![1.0, 0.0, 1.0]);
        assert!(CentroidClassifier::from_model(model).is_err());

        let mut model = two_class_model();
        model.temperature = 0.0;
        assert!(CentroidClassifier::from_model(model).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&two_class_model()).unwrap()).unwrap();

        let classifier = CentroidClassifier::load(file.path()).unwrap();
        assert_eq!(classifier.labels(), &["fist".to_string(), "palm".to_string()]);
        assert_eq!(classifier.feature_dim(), 3);

        let missing = CentroidClassifier::load("/nonexistent/model.json");
        assert!(matches!(missing, Err(ClassifierError::ModelLoad { .. })));
    }

    #[test]
    fn test_label_map_fallback() {
        let labels = LabelMap::new(RecognitionSource::Dynamic, vec!["swipe".to_string()]);
        assert_eq!(labels.name(0), "swipe");
        assert_eq!(labels.name(7), "dynamic_7");

        let labels = LabelMap::new(RecognitionSource::Static, Vec::new());
        assert_eq!(labels.name(2), "static_2");
    }
}
