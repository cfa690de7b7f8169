//! Tensor utilities.
use std::borrow::Borrow;
use tch::{TchError, Tensor};

/// Flatten a set of tensors into a single vector.
pub fn f_flatten_tensors<I>(tensors: I) -> Result<Tensor, TchError>
where
    I: IntoIterator,
    <I as IntoIterator>::Item: Borrow<Tensor>,
{
    Tensor::f_cat(
        &tensors
            .into_iter()
            .map(|t| t.borrow().f_flatten(0, -1))
            .collect::<Result<Vec<_>, _>>()?,
        0,
    )
}

/// Flatten a set of tensors into a single vector.
pub fn flatten_tensors<I>(tensors: I) -> Tensor
where
    I: IntoIterator,
    <I as IntoIterator>::Item: Borrow<Tensor>,
{
    f_flatten_tensors(tensors).unwrap()
}

/// The number of elements in a Tensor with the given shape.
///
/// # Panics
/// If any dimension has negative size.
fn shape_size(shape: &[i64]) -> i64 {
    assert!(
        shape.iter().all(|&d| d >= 0),
        "Negative dimension in shape {:?}",
        shape
    );
    shape.iter().product()
}

/// Unflatten a vector into a set of tensors with the given shapes.
///
/// # Panics
/// Panics if any shape has a dimension with negative size.
pub fn f_unflatten_tensors(vector: &Tensor, shapes: &[Vec<i64>]) -> Result<Vec<Tensor>, TchError> {
    let sizes: Vec<_> = shapes.iter().map(|shape| shape_size(shape)).collect();
    vector
        .f_split_with_sizes(&sizes, 0)?
        .iter()
        .zip(shapes)
        .map(|(t, shape)| t.f_reshape(shape))
        .collect()
}

pub fn unflatten_tensors(vector: &Tensor, shapes: &[Vec<i64>]) -> Vec<Tensor> {
    f_unflatten_tensors(vector, shapes).unwrap()
}

/// Zero the gradient of a tensor.
pub fn f_zero_grad(x: &Tensor) -> Result<(), TchError> {
    let mut grad = x.f_grad()?;
    if grad.defined() {
        let _ = grad.f_detach_()?;
        let _ = grad.f_zero_()?;
    }
    Ok(())
}

/// Zero the gradient of a tensor.
pub fn zero_grad(x: &Tensor) {
    f_zero_grad(x).unwrap()
}

/// Fraction of the variance of `returns` explained by `values`.
///
/// Computes `1 - Var[returns - values] / Var[returns]` using the population
/// variance, with gradient tracking disabled.
///
/// * `1.0` - perfect prediction
/// * `0.0` - no better than predicting the mean return
/// * `< 0.0` - worse than predicting the mean return
///
/// Returns NaN if `returns` has zero variance.
pub fn explained_variance(values: &Tensor, returns: &Tensor) -> f64 {
    let _no_grad = tch::no_grad_guard();
    let returns_variance = f64::from(&returns.var(false));
    if returns_variance == 0.0 {
        return f64::NAN;
    }
    1.0 - f64::from(&(returns - values).var(false)) / returns_variance
}


#[cfg(test)]
mod zero_grad {
    use super::*;
    use tch::{Cuda, Device, Kind};

    #[test]
    fn zeros_nonzero_grad() {
        // Work-around for https://github.com/pytorch/pytorch/issues/35736
        Cuda::is_available();

        let mut x = Tensor::zeros(&[3], (Kind::Float, Device::Cpu));
        let _ = x.requires_grad_(true);
        let y = x.sum(Kind::Float);
        y.backward();
        // First verify that the gradient is nonzero
        assert_eq!(x.grad(), Tensor::ones_like(&x));

        zero_grad(&x);
        assert_eq!(x.grad(), Tensor::zeros_like(&x));
    }

    #[test]
    fn test_no_grad_ok() {
        let x = Tensor::zeros(&[3], (Kind::Float, Device::Cpu));
        // Just check that it doesn't crash
        zero_grad(&x);
    }
}

#[cfg(test)]
mod explained_variance {
    use super::*;

    #[test]
    fn perfect_prediction() {
        let returns = Tensor::of_slice(&[1.0f32, 2.0, 3.0, 4.0]);
        let values = returns.copy();
        assert_eq!(explained_variance(&values, &returns), 1.0);
    }

    #[test]
    fn mean_prediction_explains_nothing() {
        let returns = Tensor::of_slice(&[1.0f32, 2.0, 3.0, 4.0]);
        let values = Tensor::of_slice(&[2.5f32, 2.5, 2.5, 2.5]);
        assert_eq!(explained_variance(&values, &returns), 0.0);
    }

    #[test]
    fn worse_than_mean_is_negative() {
        let returns = Tensor::of_slice(&[1.0f32, 2.0, 3.0, 4.0]);
        let values = Tensor::of_slice(&[4.0f32, 3.0, 2.0, 1.0]);
        // Var[returns - values] = 5, Var[returns] = 1.25
        assert_eq!(explained_variance(&values, &returns), -3.0);
    }

    #[test]
    fn zero_return_variance_is_nan() {
        let returns = Tensor::of_slice(&[2.0f32, 2.0, 2.0]);
        let values = Tensor::of_slice(&[1.0f32, 2.0, 3.0]);
        assert!(explained_variance(&values, &returns).is_nan());
    }

    #[test]
    fn ignores_gradient_tracking() {
        let returns = Tensor::of_slice(&[1.0f32, 2.0, 3.0, 4.0]);
        let values = Tensor::of_slice(&[1.0f32, 2.0, 3.0, 4.0]).requires_grad_(true);
        assert_eq!(explained_variance(&values, &returns), 1.0);
    }
}
