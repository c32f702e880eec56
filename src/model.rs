use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};
use thiserror::Error;

use crate::types::{FeatureVector, PredictionResult};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("feature length mismatch: got {got}, expected {expected}")]
    FeatureLength { got: usize, expected: usize },
    #[error("model returned {0} outputs, expected 1")]
    OutputArity(usize),
    #[error("model returned a non-finite prediction ({0})")]
    NonFinite(f64),
    #[cfg(feature = "torch")]
    #[error(transparent)]
    Torch(#[from] tch::TchError),
}

/// Normalises raw features into the range the predictor was trained on.
pub trait Scaler: Send + Sync {
    fn transform(&self, x: &[f64]) -> Result<Vec<f64>, ModelError>;
}

/// Maps a scaled feature row to its outputs (one per target).
pub trait Predictor: Send + Sync {
    fn predict(&self, x: &[f64]) -> Result<Vec<f64>, ModelError>;

    fn name(&self) -> &str;
}

fn check_len(x: &[f64], expected: usize) -> Result<(), ModelError> {
    if x.len() != expected {
        return Err(ModelError::FeatureLength {
            got: x.len(),
            expected,
        });
    }
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Result<T> {
    let txt = fs::read_to_string(path)
        .with_context(|| format!("failed to read {} at {}", what, path.display()))?;
    serde_json::from_str(&txt).with_context(|| format!("failed to parse {} JSON", what))
}

// ---------- Standard scaler ----------

#[derive(Deserialize)]
struct ScalerJson {
    #[serde(alias = "mean_")]
    mean: Vec<f64>,
    #[serde(alias = "scale_")]
    scale: Vec<f64>,
}

/// Per-column `(x - mean) / scale`, exported from a fitted sklearn
/// `StandardScaler`.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        if mean.len() != FeatureVector::LEN || scale.len() != FeatureVector::LEN {
            bail!(
                "scaler expects {} columns, got mean[{}] scale[{}]",
                FeatureVector::LEN,
                mean.len(),
                scale.len()
            );
        }
        if mean.iter().chain(&scale).any(|v| !v.is_finite()) {
            bail!("scaler parameters must be finite");
        }
        // Constant columns are left unscaled.
        let scale = scale
            .into_iter()
            .map(|s| if s == 0.0 { 1.0 } else { s })
            .collect();
        Ok(Self { mean, scale })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let meta: ScalerJson = read_json(path.as_ref(), "scaler")?;
        Self::new(meta.mean, meta.scale)
    }
}

impl Scaler for StandardScaler {
    fn transform(&self, x: &[f64]) -> Result<Vec<f64>, ModelError> {
        check_len(x, self.mean.len())?;
        Ok(x.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }
}

// ---------- Linear regression ----------

#[derive(Deserialize)]
struct LinearJson {
    #[serde(alias = "coef_")]
    coef: Vec<f64>,
    #[serde(alias = "intercept_")]
    intercept: f64,
}

/// `intercept + coef · x`, exported from a fitted sklearn `LinearRegression`.
#[derive(Debug, Clone)]
pub struct LinearModel {
    coef: Vec<f64>,
    intercept: f64,
}

impl LinearModel {
    pub fn new(coef: Vec<f64>, intercept: f64) -> Result<Self> {
        if coef.len() != FeatureVector::LEN {
            bail!(
                "linear model expects {} coefficients, got {}",
                FeatureVector::LEN,
                coef.len()
            );
        }
        Ok(Self { coef, intercept })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let meta: LinearJson = read_json(path.as_ref(), "linear model")?;
        Self::new(meta.coef, meta.intercept)
    }
}

impl Predictor for LinearModel {
    fn predict(&self, x: &[f64]) -> Result<Vec<f64>, ModelError> {
        check_len(x, self.coef.len())?;
        let y = self.intercept + x.iter().zip(&self.coef).map(|(a, b)| a * b).sum::<f64>();
        Ok(vec![y])
    }

    fn name(&self) -> &str {
        "linear"
    }
}

// ---------- TorchScript regression ----------

#[cfg(feature = "torch")]
pub use torch::TorchModel;

#[cfg(feature = "torch")]
mod torch {
    use super::{check_len, ModelError, Predictor};
    use crate::types::FeatureVector;
    use anyhow::{bail, Context, Result};
    use std::path::Path;
    use tch::{kind::Kind, CModule, Device, Tensor};

    pub struct TorchModel {
        model: CModule,
        device: Device,
    }

    impl TorchModel {
        pub fn load(path: impl AsRef<Path>) -> Result<Self> {
            let path = path.as_ref();
            let device = Device::Cpu;
            let model = CModule::load_on_device(path, device)
                .with_context(|| format!("failed to load TorchScript {}", path.display()))?;

            // Probe output shape with a dummy forward; a regressor yields one value.
            let dummy = Tensor::zeros([1, FeatureVector::LEN as i64], (Kind::Float, device));
            let t = model.forward_ts(&[dummy])?;
            if t.numel() != 1 {
                bail!("unexpected model output size: {:?}", t.size());
            }

            Ok(Self { model, device })
        }
    }

    impl Predictor for TorchModel {
        fn predict(&self, x: &[f64]) -> Result<Vec<f64>, ModelError> {
            check_len(x, FeatureVector::LEN)?;
            let row: Vec<f32> = x.iter().map(|v| *v as f32).collect();
            let input = Tensor::f_from_slice(&row)?
                .f_reshape([1, FeatureVector::LEN as i64])?
                .to_device(self.device);

            let out = self.model.forward_ts(&[input])?.f_flatten(0, -1)?;
            let n = out.numel() as i64;
            (0..n)
                .map(|i| out.f_double_value(&[i]).map_err(ModelError::from))
                .collect()
        }

        fn name(&self) -> &str {
            "torchscript"
        }
    }
}

/// Picks the predictor implementation from the artifact's file extension.
pub fn load_predictor(path: impl AsRef<Path>) -> Result<Box<dyn Predictor>> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("json") => Ok(Box::new(LinearModel::load(path)?)),
        #[cfg(feature = "torch")]
        Some("pt") | Some("pts") => Ok(Box::new(TorchModel::load(path)?)),
        #[cfg(not(feature = "torch"))]
        Some("pt") | Some("pts") => {
            bail!("{} is a TorchScript model but torch support is disabled", path.display())
        }
        _ => bail!("unsupported model artifact {}", path.display()),
    }
}

// ---------- Loaded pair ----------

pub struct ModelArtifacts {
    scaler: Box<dyn Scaler>,
    predictor: Box<dyn Predictor>,
}

impl ModelArtifacts {
    pub fn new(scaler: Box<dyn Scaler>, predictor: Box<dyn Predictor>) -> Self {
        Self { scaler, predictor }
    }

    pub fn load(model_path: impl AsRef<Path>, scaler_path: impl AsRef<Path>) -> Result<Self> {
        let scaler = StandardScaler::load(scaler_path).context("loading scaler")?;
        let predictor = load_predictor(model_path).context("loading model")?;
        Ok(Self::new(Box::new(scaler), predictor))
    }

    pub fn predictor_name(&self) -> &str {
        self.predictor.name()
    }

    /// Scale, predict, and keep the single output.
    pub fn predict(&self, features: &FeatureVector) -> Result<PredictionResult, ModelError> {
        let scaled = self.scaler.transform(&features.to_array())?;
        let out = self.predictor.predict(&scaled)?;
        let price = match out.as_slice() {
            [p] => *p,
            other => return Err(ModelError::OutputArity(other.len())),
        };
        if !price.is_finite() {
            return Err(ModelError::NonFinite(price));
        }
        Ok(PredictionResult { price })
    }
}
