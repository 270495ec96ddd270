//! Batch labeling of a cycle list and the resulting category partition.
//!
//! Labels are computed for every cycle before anything is written back, so a
//! failing cycle leaves the list untouched. The parallel variant computes
//! labels on the Rayon pool and then fills the buckets in index order, giving
//! exactly the same partition as the sequential path.

use std::collections::HashMap;

use rayon::prelude::*;

use super::categorizer::categorize_cycle;
use crate::core::cycle::{Category, CycleError, CycleFrame, Result};

/// Cycle indices grouped by category.
///
/// Every index of the labeled list appears in exactly one bucket, in
/// ascending order. Buckets exist for all categories, empty or not.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryPartition {
    buckets: HashMap<Category, Vec<usize>>,
    labels: Vec<Category>,
}

impl CategoryPartition {
    /// Build a partition from one label per cycle, in index order.
    pub fn from_labels(labels: Vec<Category>) -> Self {
        let mut buckets: HashMap<Category, Vec<usize>> = Category::ALL
            .iter()
            .map(|&c| (c, Vec::new()))
            .collect();

        for (idx, &category) in labels.iter().enumerate() {
            if let Some(bucket) = buckets.get_mut(&category) {
                bucket.push(idx);
            }
        }

        Self { buckets, labels }
    }

    /// Number of labeled cycles.
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Indices assigned to `category`.
    pub fn indices(&self, category: Category) -> &[usize] {
        self.buckets
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Indices assigned to the category with the given name.
    ///
    /// # Errors
    ///
    /// Returns `CycleError::Configuration` for an unrecognized name.
    pub fn indices_by_name(&self, name: &str) -> Result<&[usize]> {
        let category: Category = name.parse()?;
        Ok(self.indices(category))
    }

    /// Category of the cycle at `index`, without recomputing it.
    ///
    /// # Errors
    ///
    /// Returns `CycleError::IndexOutOfRange` past the end of the list.
    pub fn category_of(&self, index: usize) -> Result<Category> {
        self.labels
            .get(index)
            .copied()
            .ok_or(CycleError::IndexOutOfRange {
                index,
                len: self.labels.len(),
            })
    }

    /// Per-cycle labels in index order.
    pub fn labels(&self) -> &[Category] {
        &self.labels
    }

    /// Categories with at least one cycle, in reporting order.
    pub fn non_empty(&self) -> impl Iterator<Item = (Category, &[usize])> + '_ {
        Category::ALL
            .iter()
            .map(move |&c| (c, self.indices(c)))
            .filter(|(_, indices)| !indices.is_empty())
    }

    /// Frames of `cycles` assigned to `category`.
    ///
    /// # Errors
    ///
    /// Returns `CycleError::IndexOutOfRange` if `cycles` is shorter than the
    /// labeled list.
    pub fn cycles_in<'a>(
        &self,
        cycles: &'a [CycleFrame],
        category: Category,
    ) -> Result<Vec<&'a CycleFrame>> {
        self.indices(category)
            .iter()
            .map(|&idx| {
                cycles.get(idx).ok_or(CycleError::IndexOutOfRange {
                    index: idx,
                    len: cycles.len(),
                })
            })
            .collect()
    }

    /// True when every frame's attached category matches this partition.
    pub fn is_consistent_with(&self, cycles: &[CycleFrame]) -> bool {
        cycles.len() == self.labels.len()
            && cycles
                .iter()
                .zip(&self.labels)
                .all(|(frame, &label)| frame.category() == Some(label))
    }
}

/// Categorize every cycle in the list.
///
/// # Errors
///
/// Fails on the first empty cycle; no partial partition is returned.
pub fn categorize_cycles(cycles: &[CycleFrame]) -> Result<CategoryPartition> {
    let labels = cycles
        .iter()
        .enumerate()
        .map(|(idx, frame)| categorize_cycle(frame, idx))
        .collect::<Result<Vec<_>>>()?;

    Ok(CategoryPartition::from_labels(labels))
}

/// Parallel counterpart of [`categorize_cycles`] with identical output.
pub fn categorize_cycles_par(cycles: &[CycleFrame]) -> Result<CategoryPartition> {
    let labels = cycles
        .par_iter()
        .enumerate()
        .map(|(idx, frame)| categorize_cycle(frame, idx))
        .collect::<Result<Vec<_>>>()?;

    Ok(CategoryPartition::from_labels(labels))
}

/// Categorize every cycle and attach the label to each frame.
///
/// Labels are committed only after all cycles were categorized. Running it
/// again on the same list writes the same labels.
pub fn label_cycles(cycles: &mut [CycleFrame], parallel: bool) -> Result<CategoryPartition> {
    let partition = if parallel {
        categorize_cycles_par(cycles)?
    } else {
        categorize_cycles(cycles)?
    };

    apply_labels(cycles, &partition)?;

    for (category, indices) in partition.non_empty() {
        log::debug!("{}: {} cycles", category, indices.len());
    }

    Ok(partition)
}

/// Attach the labels of an existing partition to the frames.
///
/// # Errors
///
/// Returns `CycleError::IndexOutOfRange` if the list and the partition
/// differ in length; no frame is modified in that case.
pub fn apply_labels(cycles: &mut [CycleFrame], partition: &CategoryPartition) -> Result<()> {
    if cycles.len() != partition.len() {
        return Err(CycleError::IndexOutOfRange {
            index: cycles.len().max(partition.len()) - 1,
            len: cycles.len().min(partition.len()),
        });
    }

    for (frame, &label) in cycles.iter_mut().zip(partition.labels()) {
        frame.set_category(label);
    }
    Ok(())
}
