/// Running sum used to average dose rates without keeping the samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeanAccumulator {
    sum: f64,
    count: u32,
}

impl MeanAccumulator {
    pub fn push(&mut self, value: f32) {
        self.sum += f64::from(value);
        self.count += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum / f64::from(self.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_accumulator_has_no_mean() {
        assert_eq!(MeanAccumulator::default().mean(), None);
    }

    #[test]
    fn mean_of_values() {
        let mut acc = MeanAccumulator::default();
        acc.push(1.0);
        acc.push(2.0);
        acc.push(6.0);
        assert_eq!(acc.count(), 3);
        assert_eq!(acc.mean(), Some(3.0));
    }
}
