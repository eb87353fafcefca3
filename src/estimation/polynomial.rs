//! Degree-2 polynomial regression over the four interval/speed inputs.
//!
//! Basis order: `1, t01, t12, s01, s12, t01*t01, t01*t12, t01*s01, t01*s12,
//! t12*t12, t12*s01, t12*s12, s01*s01, s01*s12, s12*s12`.

use crate::estimation::features::{FeatureContract, FeatureVector};
use crate::estimation::model::Predictor;
use crate::estimation::selector::ModelTier;
use crate::estimation::ModelError;
use serde::Deserialize;

pub const BASE_INPUTS: usize = 4;
pub const BASIS_TERMS: usize = 15;

/// Expand the base inputs into the fixed quadratic basis.
pub fn quadratic_basis(inputs: [f64; BASE_INPUTS]) -> [f64; BASIS_TERMS] {
    let mut basis = [0.0; BASIS_TERMS];
    basis[0] = 1.0;
    basis[1..=BASE_INPUTS].copy_from_slice(&inputs);

    let mut next = BASE_INPUTS + 1;
    for i in 0..BASE_INPUTS {
        for j in i..BASE_INPUTS {
            basis[next] = inputs[i] * inputs[j];
            next += 1;
        }
    }
    basis
}

/// Artifact parameters for the polynomial model.
#[derive(Debug, Clone, Deserialize)]
pub struct PolynomialParams {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct PolynomialPredictor {
    intercept: f64,
    coefficients: [f64; BASIS_TERMS],
}

impl PolynomialPredictor {
    pub fn new(intercept: f64, coefficients: &[f64]) -> Result<Self, ModelError> {
        let coefficients: [f64; BASIS_TERMS] =
            coefficients
                .try_into()
                .map_err(|_| ModelError::CoefficientCount {
                    expected: BASIS_TERMS,
                    actual: coefficients.len(),
                })?;
        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelError::Invalid(
                "polynomial parameters must be finite".to_string(),
            ));
        }
        Ok(Self {
            intercept,
            coefficients,
        })
    }

    pub fn from_params(params: &PolynomialParams) -> Result<Self, ModelError> {
        Self::new(params.intercept, &params.coefficients)
    }

    /// `intercept + coefficients . basis(inputs)`; never invalid.
    pub fn evaluate(&self, inputs: [f64; BASE_INPUTS]) -> f64 {
        quadratic_basis(inputs)
            .iter()
            .zip(self.coefficients.iter())
            .fold(self.intercept, |acc, (term, coefficient)| {
                acc + coefficient * term
            })
    }
}

impl Predictor for PolynomialPredictor {
    fn contract(&self) -> FeatureContract {
        FeatureContract::Polynomial
    }

    fn predict(&self, features: &FeatureVector) -> Option<f64> {
        debug_assert_eq!(features.contract(), FeatureContract::Polynomial);
        let values = features.values();
        Some(self.evaluate([values[0], values[1], values[2], values[3]]))
    }

    fn tier(&self) -> ModelTier {
        ModelTier::Polynomial
    }
}
