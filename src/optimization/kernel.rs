//! The fixed numeric update applied by every update task.
//!
//! The decay and epsilon constants are policy, not hyperparameters, and are not
//! tunable per call.

pub const BETA1: f32 = 0.99;
pub const BETA2: f32 = 0.9999;
pub const GRAD_WEIGHT1: f32 = 0.01;
pub const GRAD_WEIGHT2: f32 = 0.0001;
pub const EPSILON: f32 = 1e-8;
pub const STAT_DECAY: f32 = 0.9999999;

/// Averages every merged gradient into `grad`, in place.
///
/// # Arguments
/// * `grad` - The first gradient of the cycle, receives the mean.
/// * `others` - The rest of the gradients drained in the same cycle.
pub fn merge_grads(grad: &mut [f32], others: &[&[f32]]) {
    if others.is_empty() {
        return;
    }

    let n = (others.len() + 1) as f32;

    for (j, g) in grad.iter_mut().enumerate() {
        let sum: f32 = others.iter().fold(*g, |acc, other| acc + other[j]);
        *g = sum / n;
    }
}

/// The momentum based update of the optimizable parameters.
///
/// All slices must have the same length.
pub fn adam_step(
    params: &mut [f32],
    moment1: &mut [f32],
    moment2: &mut [f32],
    learning_rates: &[f32],
    grad: &[f32],
) {
    params
        .iter_mut()
        .zip(moment1.iter_mut())
        .zip(moment2.iter_mut())
        .zip(learning_rates.iter().zip(grad))
        .for_each(|(((p, m1), m2), (lr, g))| {
            *m1 = BETA1 * *m1 + GRAD_WEIGHT1 * g;
            *m2 = BETA2 * *m2 + GRAD_WEIGHT2 * g * g;
            *p -= lr * (*m1 / (m2.sqrt() + EPSILON));
        });
}

/// The decayed accumulation of running statistics.
pub fn accumulate_step(params: &mut [f32], grad: &[f32]) {
    params
        .iter_mut()
        .zip(grad)
        .for_each(|(p, g)| *p = *p * STAT_DECAY + g);
}

/// Everything one update task owns for a single cycle.
///
/// The moment and learning rate slices cover the optimizable prefix of the
/// range, which may be empty, the remaining elements are accumulated statistics.
#[derive(Debug)]
pub struct RangeUpdate<'a> {
    pub params: &'a mut [f32],
    pub moment1: &'a mut [f32],
    pub moment2: &'a mut [f32],
    pub learning_rates: &'a [f32],
    pub grad: &'a mut [f32],
    pub others: Vec<&'a [f32]>,
}

impl RangeUpdate<'_> {
    /// Merges the cycle's gradients and applies both update rules.
    pub fn apply(self) {
        let Self {
            params,
            moment1,
            moment2,
            learning_rates,
            grad,
            others,
        } = self;

        merge_grads(grad, &others);

        let adam_len = moment1.len();
        let (adam_params, stat_params) = params.split_at_mut(adam_len);
        let (adam_grad, stat_grad) = grad.split_at(adam_len);

        adam_step(adam_params, moment1, moment2, learning_rates, adam_grad);
        accumulate_step(stat_params, stat_grad);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f32 = 1e-6;

    fn assert_close(got: &[f32], expected: &[f32]) {
        assert_eq!(got.len(), expected.len());
        for (i, (g, e)) in got.iter().zip(expected).enumerate() {
            assert!((g - e).abs() < TOL, "index {i}: got {g}, expected {e}");
        }
    }

    #[test]
    fn merge_takes_the_mean() {
        let mut grad = [1., 2., 3.];
        merge_grads(&mut grad, &[&[3., 2., 1.], &[2., 2., 2.]]);
        assert_close(&grad, &[2., 2., 2.]);
    }

    #[test]
    fn merge_of_one_is_identity() {
        let mut grad = [1., -2.];
        merge_grads(&mut grad, &[]);
        assert_eq!(grad, [1., -2.]);
    }

    #[test]
    fn adam_first_step_from_zero() {
        let mut params = [0.; 2];
        let mut m1 = [0.; 2];
        let mut m2 = [0.; 2];

        adam_step(&mut params, &mut m1, &mut m2, &[0.01, 0.1], &[1., 1.]);

        assert_close(&m1, &[0.01, 0.01]);
        assert_close(&m2, &[0.0001, 0.0001]);
        assert_close(&params, &[-0.01, -0.1]);
    }

    #[test]
    fn accumulate_decays_then_adds() {
        let mut params = [0., 10.];
        accumulate_step(&mut params, &[1., 1.]);
        assert_close(&params, &[1., 10. * STAT_DECAY + 1.]);
    }

    #[test]
    fn range_straddling_both_kinds() {
        let mut params = [0.; 4];
        let mut m1 = [0.; 2];
        let mut m2 = [0.; 2];
        let mut grad = [0., 0., 0., 0.];
        let other = [2., 2., 2., 2.];

        RangeUpdate {
            params: &mut params,
            moment1: &mut m1,
            moment2: &mut m2,
            learning_rates: &[0.01, 0.01],
            grad: &mut grad,
            others: vec![&other[..]],
        }
        .apply();

        assert_close(&grad, &[1., 1., 1., 1.]);
        assert_close(&params, &[-0.01, -0.01, 1., 1.]);
    }
}
