use crate::nn::MlpError;
use serde::{Deserialize, Serialize};

/// One supervised training pair: an observation and the action expected for it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub input: Vec<f32>,
    pub output: Vec<f32>,
}

impl Sample {
    pub fn new(input: impl Into<Vec<f32>>, output: impl Into<Vec<f32>>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Ordered training corpus. Order is kept for reproducibility only; every
/// epoch visits all samples.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SampleStore {
    samples: Vec<Sample>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Copies both slices into a new sample at the end of the store.
    pub fn record(&mut self, input: &[f32], output: &[f32]) {
        self.samples.push(Sample::new(input, output));
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// Check every sample against a network's input and output widths.
    pub fn validate_shape(&self, input_size: usize, output_size: usize) -> Result<(), MlpError> {
        for sample in &self.samples {
            if sample.input.len() != input_size {
                return Err(MlpError::ShapeMismatch {
                    what: "sample input",
                    got: sample.input.len(),
                    expected: input_size,
                });
            }
            if sample.output.len() != output_size {
                return Err(MlpError::ShapeMismatch {
                    what: "sample output",
                    got: sample.output.len(),
                    expected: output_size,
                });
            }
        }
        Ok(())
    }
}

impl From<Vec<Sample>> for SampleStore {
    fn from(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

impl FromIterator<Sample> for SampleStore {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SampleStore {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_copies_and_preserves_order() {
        let mut store = SampleStore::new();
        let mut input = vec![0.1, 0.2];
        store.record(&input, &[1.0]);
        input[0] = 9.0;
        store.record(&input, &[-1.0]);

        assert_eq!(store.len(), 2);
        assert_eq!(store.as_slice()[0], Sample::new(vec![0.1, 0.2], vec![1.0]));
        assert_eq!(store.as_slice()[1].input, vec![9.0, 0.2]);
    }

    #[test]
    fn serializes_as_plain_record_list() {
        let store: SampleStore = vec![Sample::new(vec![0.0, 1.0], vec![0.5])].into();
        let json = serde_json::to_string(&store).expect("store should serialize");
        assert_eq!(json, r#"[{"input":[0.0,1.0],"output":[0.5]}]"#);
    }

    #[test]
    fn validate_shape_names_offending_side() {
        let store: SampleStore = [
            Sample::new(vec![0.0, 0.0], vec![0.0]),
            Sample::new(vec![0.0, 0.0], vec![0.0, 1.0]),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            store.validate_shape(2, 1),
            Err(MlpError::ShapeMismatch {
                what: "sample output",
                got: 2,
                expected: 1
            })
        );
        assert!(matches!(
            store.validate_shape(3, 1),
            Err(MlpError::ShapeMismatch {
                what: "sample input",
                ..
            })
        ));
    }
}
