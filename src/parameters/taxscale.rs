//! Piecewise functions materialized from a scale at one instant.
//!
//! These are disposable objects: the resolver rebuilds one on every request
//! and never caches them.

/// The piecewise function a scale materializes to, as a tagged variant over
/// the four scale kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ScaleAtInstant {
    SingleAmount(SingleAmountScale),
    MarginalAmount(MarginalAmountScale),
    AverageRate(LinearAverageRateScale),
    MarginalRate(MarginalRateScale),
}

impl ScaleAtInstant {
    pub fn calc(&self, input: f64) -> f64 {
        match self {
            ScaleAtInstant::SingleAmount(s) => s.calc(input),
            ScaleAtInstant::MarginalAmount(s) => s.calc(input),
            ScaleAtInstant::AverageRate(s) => s.calc(input),
            ScaleAtInstant::MarginalRate(s) => s.calc(input),
        }
    }

    pub fn calc_slice(&self, inputs: &[f64]) -> Vec<f64> {
        inputs.iter().map(|&x| self.calc(x)).collect()
    }
}

fn sorted_insert(thresholds: &mut Vec<f64>, values: &mut Vec<f64>, threshold: f64, value: f64) {
    let pos = thresholds.partition_point(|&t| t <= threshold);
    thresholds.insert(pos, threshold);
    values.insert(pos, value);
}

/// Flat lookup: the amount of the highest bracket whose threshold is not
/// above the input. Inputs below the first threshold map to zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SingleAmountScale {
    thresholds: Vec<f64>,
    amounts: Vec<f64>,
}

impl SingleAmountScale {
    pub fn add_bracket(&mut self, threshold: f64, amount: f64) {
        sorted_insert(&mut self.thresholds, &mut self.amounts, threshold, amount);
    }

    pub fn calc(&self, input: f64) -> f64 {
        match self.thresholds.partition_point(|&t| t <= input) {
            0 => 0.0,
            pos => self.amounts[pos - 1],
        }
    }
}

/// Cumulative lookup: the sum of the amounts of every bracket whose
/// threshold is not above the input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarginalAmountScale {
    thresholds: Vec<f64>,
    amounts: Vec<f64>,
}

impl MarginalAmountScale {
    pub fn add_bracket(&mut self, threshold: f64, amount: f64) {
        sorted_insert(&mut self.thresholds, &mut self.amounts, threshold, amount);
    }

    pub fn calc(&self, input: f64) -> f64 {
        let reached = self.thresholds.partition_point(|&t| t <= input);
        self.amounts[..reached].iter().sum()
    }
}

/// Average rate interpolated linearly between thresholds, applied to the
/// whole input. Beyond the last threshold the last rate applies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearAverageRateScale {
    thresholds: Vec<f64>,
    rates: Vec<f64>,
}

impl LinearAverageRateScale {
    pub fn add_bracket(&mut self, threshold: f64, rate: f64) {
        sorted_insert(&mut self.thresholds, &mut self.rates, threshold, rate);
    }

    pub fn calc(&self, input: f64) -> f64 {
        let (Some(&first), Some(&last)) = (self.thresholds.first(), self.thresholds.last())
        else {
            return 0.0;
        };
        if input < first {
            return 0.0;
        }
        if input >= last {
            return input * self.rates[self.rates.len() - 1];
        }
        let hi = self.thresholds.partition_point(|&t| t <= input);
        let lo = hi - 1;
        let span = self.thresholds[hi] - self.thresholds[lo];
        let fraction = (input - self.thresholds[lo]) / span;
        let rate = self.rates[lo] + (self.rates[hi] - self.rates[lo]) * fraction;
        input * rate
    }
}

/// Classic marginal brackets: each rate applies to the slice of the input
/// falling between its threshold and the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarginalRateScale {
    thresholds: Vec<f64>,
    rates: Vec<f64>,
}

impl MarginalRateScale {
    pub fn add_bracket(&mut self, threshold: f64, rate: f64) {
        sorted_insert(&mut self.thresholds, &mut self.rates, threshold, rate);
    }

    pub fn calc(&self, input: f64) -> f64 {
        let mut total = 0.0;
        for (i, &lower) in self.thresholds.iter().enumerate() {
            if input <= lower {
                break;
            }
            let upper = self.thresholds.get(i + 1).copied().unwrap_or(f64::INFINITY);
            total += self.rates[i] * (input.min(upper) - lower);
        }
        total
    }

    /// The rate of the bracket the input falls in.
    pub fn marginal_rate(&self, input: f64) -> f64 {
        match self.thresholds.partition_point(|&t| t <= input) {
            0 => 0.0,
            pos => self.rates[pos - 1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn two_bracket_marginal() -> MarginalRateScale {
        let mut scale = MarginalRateScale::default();
        scale.add_bracket(0.0, 0.1);
        scale.add_bracket(1000.0, 0.2);
        scale
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(500.0, 50.0)]
    #[case(1000.0, 100.0)]
    #[case(1500.0, 150.0)] // 0.1 * 1000 + 0.2 * 500
    fn test_marginal_rate_calc(#[case] input: f64, #[case] expected: f64) {
        assert_eq!(two_bracket_marginal().calc(input), expected);
    }

    #[test]
    fn test_marginal_rate_of_input() {
        let scale = two_bracket_marginal();
        assert_eq!(scale.marginal_rate(500.0), 0.1);
        assert_eq!(scale.marginal_rate(2000.0), 0.2);
    }

    #[test]
    fn test_single_amount_is_flat() {
        let mut scale = SingleAmountScale::default();
        scale.add_bracket(500.0, 50.0);
        scale.add_bracket(2000.0, 80.0);
        assert_eq!(scale.calc(0.0), 0.0);
        assert_eq!(scale.calc(500.0), 50.0);
        assert_eq!(scale.calc(1999.0), 50.0);
        assert_eq!(scale.calc(1_000_000.0), 80.0);
    }

    #[test]
    fn test_marginal_amount_accumulates() {
        let mut scale = MarginalAmountScale::default();
        scale.add_bracket(0.0, 10.0);
        scale.add_bracket(1000.0, 25.0);
        assert_eq!(scale.calc(500.0), 10.0);
        assert_eq!(scale.calc(1500.0), 35.0);
    }

    #[test]
    fn test_average_rate_interpolates() {
        let mut scale = LinearAverageRateScale::default();
        scale.add_bracket(0.0, 0.0);
        scale.add_bracket(1000.0, 0.1);
        // Halfway between the thresholds, the average rate is 0.05.
        assert_eq!(scale.calc(500.0), 25.0);
        // Beyond the last threshold the last rate applies to the whole input.
        assert_eq!(scale.calc(2000.0), 200.0);
        assert_eq!(scale.calc(-1.0), 0.0);
    }

    #[test]
    fn test_brackets_sort_on_insertion() {
        let mut scale = MarginalRateScale::default();
        scale.add_bracket(1000.0, 0.2);
        scale.add_bracket(0.0, 0.1);
        assert_eq!(scale.calc(1500.0), 150.0);
    }
}
