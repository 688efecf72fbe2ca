//! Lazy per-subject streaming.
//!
//! An alternative to materializing the whole dataset: subjects are loaded
//! one at a time, in index order or a seeded shuffle, and handed to the
//! consumer as they decode. Memory stays bounded by a single subject's
//! tensors. Iteration is strictly sequential; there are no worker threads.

use crate::dataset::batch::load_subject;
use crate::dataset::SubjectEntry;
use crate::error::Result;
use crate::transforms;
use ndarray::{Array4, Array5, Axis};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// One streamed subject's tensors.
#[derive(Debug)]
pub struct SubjectSample {
    /// Subject identifier.
    pub subject: String,
    /// Normalized scan intensities, (4, D, H, W).
    pub inputs: Array4<f32>,
    /// Per-class binary masks, (3, D, H, W).
    pub labels: Array4<u8>,
}

/// Builder for [`SubjectStream`].
pub struct SubjectStreamBuilder {
    entries: Vec<SubjectEntry>,
    target_shape: [usize; 3],
    shuffle: bool,
    seed: Option<u64>,
}

impl SubjectStreamBuilder {
    /// Shuffle subject order (default: off, index order).
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Seed the shuffle for reproducible epochs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the configuration and build the stream.
    pub fn build(self) -> Result<SubjectStream> {
        transforms::check_target(&self.target_shape)?;

        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        if self.shuffle {
            let mut rng = match self.seed {
                Some(s) => ChaCha8Rng::seed_from_u64(s),
                None => ChaCha8Rng::from_entropy(),
            };
            order.shuffle(&mut rng);
        }

        Ok(SubjectStream {
            entries: self.entries,
            target_shape: self.target_shape,
            order,
            cursor: 0,
        })
    }
}

/// Restartable, finite iterator over per-subject tensors.
///
/// Failed subjects are yielded as `Err` items so the consumer can count or
/// ignore them; iteration always continues to the next subject.
pub struct SubjectStream {
    entries: Vec<SubjectEntry>,
    target_shape: [usize; 3],
    order: Vec<usize>,
    cursor: usize,
}

impl SubjectStream {
    /// Start building a stream over `entries`.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(entries: Vec<SubjectEntry>, target_shape: [usize; 3]) -> SubjectStreamBuilder {
        SubjectStreamBuilder {
            entries,
            target_shape,
            shuffle: false,
            seed: None,
        }
    }

    /// Total number of subjects in the stream.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the stream has no subjects at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Target shape every sample is resampled to.
    pub fn target_shape(&self) -> [usize; 3] {
        self.target_shape
    }

    /// Rewind to the first subject, keeping the existing order.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Adapt into fixed-size mini-batches.
    pub fn batches(self, batch_size: usize) -> SubjectBatches {
        SubjectBatches {
            stream: self,
            batch_size: batch_size.max(1),
        }
    }
}

impl Iterator for SubjectStream {
    type Item = Result<SubjectSample>;

    fn next(&mut self) -> Option<Self::Item> {
        let &index = self.order.get(self.cursor)?;
        self.cursor += 1;

        let entry = &self.entries[index];
        let item = load_subject(entry, self.target_shape).map(|(inputs, labels)| SubjectSample {
            subject: entry.id().to_string(),
            inputs,
            labels,
        });
        Some(item)
    }
}

/// Iterator over mini-batches from a [`SubjectStream`].
pub struct SubjectBatches {
    stream: SubjectStream,
    batch_size: usize,
}

impl SubjectBatches {
    /// Stack one batch of successful samples into (B, C, D, H, W) tensors.
    ///
    /// Convenience for drivers that want dense mini-batch tensors rather
    /// than per-subject arrays; failed samples must already be filtered out.
    pub fn stack(samples: &[SubjectSample]) -> Option<(Array5<f32>, Array5<u8>)> {
        let first = samples.first()?;
        let (c, d, h, w) = first.inputs.dim();
        let (lc, ..) = first.labels.dim();

        let mut inputs = Array5::<f32>::zeros((samples.len(), c, d, h, w));
        let mut labels = Array5::<u8>::zeros((samples.len(), lc, d, h, w));
        for (row, sample) in samples.iter().enumerate() {
            inputs.index_axis_mut(Axis(0), row).assign(&sample.inputs);
            labels.index_axis_mut(Axis(0), row).assign(&sample.labels);
        }
        Some((inputs, labels))
    }
}

impl Iterator for SubjectBatches {
    type Item = Vec<Result<SubjectSample>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.batch_size);
        for _ in 0..self.batch_size {
            match self.stream.next() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}
