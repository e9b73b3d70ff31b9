//! Flag aggregation for dashboards and run reports.

use std::collections::HashMap;

/// A flag and the number of times it occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagCount {
    pub flag: String,
    pub count: usize,
}

/// Count occurrences of each flag, skipping blank entries. Ordered by count
/// descending, ties alphabetical, so the top of the list is the biggest
/// problem.
pub fn count_flags<I: IntoIterator<Item = String>>(flags: I) -> Vec<FlagCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for flag in flags {
        if flag.trim().is_empty() {
            continue;
        }
        *counts.entry(flag).or_insert(0) += 1;
    }
    let mut ranked: Vec<FlagCount> = counts
        .into_iter()
        .map(|(flag, count)| FlagCount { flag, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.flag.cmp(&b.flag)));
    ranked
}
