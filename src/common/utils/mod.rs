pub fn linear_decay(curr_frac: f32, start: f32, end: f32, end_frac: f32) -> f32 {
    if end_frac <= 0.0 || curr_frac > end_frac {
        end
    } else {
        start + curr_frac * (end - start) / end_frac
    }
}

pub fn mean(data: &[f32]) -> f32 {
    data.iter().fold(0.0, |acc, x| acc + x) / (data.len() as f32)
}

/// Population standard deviation, matching what numpy reports by default.
pub fn std(data: &[f32]) -> f32 {
    let m = mean(data);
    let var = data.iter().fold(0.0, |acc, x| acc + (x - m).powi(2)) / (data.len() as f32);

    var.sqrt()
}

pub fn min(data: &[f32]) -> f32 {
    data.iter().cloned().fold(f32::INFINITY, f32::min)
}

pub fn max(data: &[f32]) -> f32 {
    data.iter().cloned().fold(f32::NEG_INFINITY, f32::max)
}

#[cfg(test)]
mod test {
    use assert_approx_eq::assert_approx_eq;

    use crate::common::utils::{linear_decay, max, mean, min, std};

    #[test]
    fn test_mean() {
        let v = [0.0, 1.0, 2.0];

        assert_eq!(mean(&v), 1.0);

        let v = [];

        assert!(mean(&v).is_nan());
    }

    #[test]
    fn test_std() {
        assert_approx_eq!(std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0, 1e-6);
        assert_eq!(std(&[3.0]), 0.0);
    }

    #[test]
    fn test_min_max() {
        let v = [1.5, -2.0, 0.25];

        assert_eq!(min(&v), -2.0);
        assert_eq!(max(&v), 1.5);
    }

    #[test]
    fn test_linear_decay() {
        assert_approx_eq!(linear_decay(0.0, 1.0, 0.05, 0.5), 1.0, 1e-6);
        assert_approx_eq!(linear_decay(0.25, 1.0, 0.05, 0.5), 0.525, 1e-6);
        assert_approx_eq!(linear_decay(0.9, 1.0, 0.05, 0.5), 0.05, 1e-6);

        // no decay window means the final value from the start
        assert_eq!(linear_decay(0.0, 1.0, 0.05, 0.0), 0.05);
    }
}
