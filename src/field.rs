//! Discrete fields and their point evaluation.
use crate::error::FeecError;
use crate::space::FemSpace;
use crate::stencil::BlockVector;
use itertools::Itertools;

/// A discrete field: a space together with coefficients in it.
#[derive(Debug, Clone)]
pub struct FemField {
    space: FemSpace,
    coefficients: BlockVector,
}

impl FemField {
    pub fn new(space: FemSpace, coefficients: BlockVector) -> Result<Self, FeecError> {
        if !space.contains(&coefficients) {
            return Err(FeecError::IncompatibleSpaces(
                "coefficients are not laid out like the space".to_string(),
            ));
        }
        Ok(Self { space, coefficients })
    }

    pub fn zeros(space: FemSpace) -> Self {
        let coefficients = space.zeros();
        Self { space, coefficients }
    }

    pub fn space(&self) -> &FemSpace {
        &self.space
    }

    pub fn coefficients(&self) -> &BlockVector {
        &self.coefficients
    }

    pub fn coefficients_mut(&mut self) -> &mut BlockVector {
        &mut self.coefficients
    }

    pub fn into_coefficients(self) -> BlockVector {
        self.coefficients
    }

    /// Evaluates one component of the field at a point of the logical domain.
    ///
    /// Every coefficient whose basis function is non-zero at `point` must be owned by this
    /// worker or be part of its (synchronized) ghost region.
    pub fn evaluate(&self, component: usize, point: &[f64]) -> Result<f64, FeecError> {
        let tensor = self.space.components().get(component).ok_or_else(|| {
            FeecError::IncompatibleSpaces(format!(
                "component {component} requested from a space with {} components",
                self.space.num_components()
            ))
        })?;
        if point.len() != tensor.ndim() {
            return Err(FeecError::ArityMismatch {
                expected: tensor.ndim(),
                actual: point.len(),
            });
        }
        let coefficients = self.coefficients.block(component);
        let per_axis: Vec<Vec<(usize, f64)>> = tensor
            .spaces()
            .iter()
            .zip(point)
            .map(|(space, &x)| space.nonzero_basis(x))
            .collect();

        let mut value = 0.0;
        for combination in per_axis.iter().multi_cartesian_product() {
            let index: Vec<usize> = combination.iter().map(|(i, _)| *i).collect();
            let weight: f64 = combination.iter().map(|(_, v)| v).product();
            if weight != 0.0 {
                value += weight * coefficients.get(&index)?;
            }
        }
        Ok(value)
    }
}
