//! Comparison of a computed partition against hand-labeled ground truth.

use std::collections::{BTreeSet, HashMap};

use super::labeler::CategoryPartition;
use crate::core::cycle::Category;

/// Hand-assigned cycle indices per category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundTruth {
    indices: HashMap<Category, Vec<usize>>,
}

impl GroundTruth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add indices to a category, keeping them sorted.
    pub fn insert<I: IntoIterator<Item = usize>>(&mut self, category: Category, indices: I) {
        let bucket = self.indices.entry(category).or_default();
        bucket.extend(indices);
        bucket.sort_unstable();
        bucket.dedup();
    }

    pub fn indices(&self, category: Category) -> &[usize] {
        self.indices
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of labeled indices.
    pub fn len(&self) -> usize {
        self.indices.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ground truth of the 601-cycle dataset the categorizer thresholds were tuned on.
///
/// The test plan repeats every ~100 cycles: an RPT, an SOC definition, a
/// resistance measurement, then a block of accelerated aging. The last block
/// has no SOC definition (index 501 is a look-alike labeled Unknown).
pub fn reference_ground_truth() -> GroundTruth {
    let mut truth = GroundTruth::new();
    truth.insert(Category::Unknown, [0, 501, 600]);
    truth.insert(Category::Rpt, [1, 101, 201, 300, 400, 500]);
    truth.insert(Category::SocDefinition, [2, 102, 202, 301, 401]);
    truth.insert(Category::ResistanceMeasurement, [3, 103, 203, 302, 402, 502]);
    truth.insert(
        Category::AcceleratedAging,
        (4..101)
            .chain(104..201)
            .chain(204..300)
            .chain(303..400)
            .chain(403..500)
            .chain(503..600),
    );
    truth
}

/// Agreement between truth and partition for one category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryCheck {
    pub category: Category,
    pub expected: usize,
    pub actual: usize,
    /// In the truth but labeled differently.
    pub missing: Vec<usize>,
    /// Labeled with this category but not in the truth.
    pub extra: Vec<usize>,
}

impl CategoryCheck {
    pub fn matches(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

/// Result of [`verify_partition`].
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReport {
    /// One entry per category, in reporting order.
    pub checks: Vec<CategoryCheck>,
    /// Truth indices whose computed label agrees.
    pub correct: usize,
    pub total: usize,
}

impl VerificationReport {
    pub fn all_match(&self) -> bool {
        self.checks.iter().all(CategoryCheck::matches)
    }

    /// Fraction of truth indices labeled as expected (1.0 for empty truth).
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    /// Checks that disagree with the truth.
    pub fn mismatches(&self) -> impl Iterator<Item = &CategoryCheck> {
        self.checks.iter().filter(|c| !c.matches())
    }
}

/// Compare a partition with ground truth category by category.
pub fn verify_partition(partition: &CategoryPartition, truth: &GroundTruth) -> VerificationReport {
    let mut correct = 0;

    let checks = Category::ALL
        .iter()
        .map(|&category| {
            let expected: BTreeSet<usize> = truth.indices(category).iter().copied().collect();
            let actual: BTreeSet<usize> = partition.indices(category).iter().copied().collect();

            correct += expected.intersection(&actual).count();

            CategoryCheck {
                category,
                expected: expected.len(),
                actual: actual.len(),
                missing: expected.difference(&actual).copied().collect(),
                extra: actual.difference(&expected).copied().collect(),
            }
        })
        .collect();

    let report = VerificationReport {
        checks,
        correct,
        total: truth.len(),
    };

    for check in report.mismatches() {
        log::warn!(
            "{}: {} missing, {} extra",
            check.category,
            check.missing.len(),
            check.extra.len()
        );
    }

    report
}
