//
// Copyright 2026 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;

/// A histogram of equally sized buckets. Values past the last bucket are
/// counted in it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Histogram {
    min: u64,
    bucket_width: u64,
    counts: Vec<u64>,
    count: u64,
    sum: u64,
    max: u64,
}

impl Histogram {
    pub fn linear(buckets: usize, bucket_width: u64, min: u64) -> Self {
        Self {
            min,
            bucket_width: bucket_width.max(1),
            counts: vec![0; buckets.max(1)],
            count: 0,
            sum: 0,
            max: 0,
        }
    }

    pub fn add(&mut self, value: u64) {
        let index = usize::try_from(value.saturating_sub(self.min) / self.bucket_width)
            .unwrap_or(usize::MAX)
            .min(self.counts.len() - 1);
        self.counts[index] += 1;
        self.count += 1;
        self.sum = self.sum.saturating_add(value);
        self.max = self.max.max(value);
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mean = if self.count == 0 { 0.0 } else { self.sum as f64 / self.count as f64 };
        writeln!(f, "Count: {}  Mean: {:.2}  Max: {}", self.count, mean, self.max)?;
        let last = self.counts.len() - 1;
        for (index, count) in self.counts.iter().enumerate() {
            let low = self.min + index as u64 * self.bucket_width;
            let percent =
                if self.count == 0 { 0.0 } else { *count as f64 * 100.0 / self.count as f64 };
            if index == last {
                writeln!(f, "[{low:>4}, inf)  {count:>6}  {percent:>6.2}%")?;
            } else {
                let high = low + self.bucket_width;
                writeln!(f, "[{low:>4}, {high:>4})  {count:>6}  {percent:>6.2}%")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_land_in_their_bucket() {
        let mut histogram = Histogram::linear(20, 1, 0);
        histogram.add(0);
        histogram.add(3);
        histogram.add(3);
        histogram.add(19);
        assert_eq!(histogram.counts()[0], 1);
        assert_eq!(histogram.counts()[3], 2);
        assert_eq!(histogram.counts()[19], 1);
        assert_eq!(histogram.count(), 4);
    }

    #[test]
    fn large_values_collapse_into_the_top_bucket() {
        let mut histogram = Histogram::linear(20, 1, 0);
        histogram.add(20);
        histogram.add(5000);
        histogram.add(u64::MAX);
        assert_eq!(histogram.counts()[19], 3);
        assert_eq!(histogram.counts().iter().sum::<u64>(), 3);
    }

    #[test]
    fn rendering_lists_every_bucket() {
        let mut histogram = Histogram::linear(20, 1, 0);
        histogram.add(2);
        let rendered = histogram.to_string();
        assert!(rendered.starts_with("Count: 1  Mean: 2.00  Max: 2\n"));
        assert_eq!(rendered.lines().count(), 21);
        assert!(rendered.lines().last().unwrap().starts_with("[  19, inf)"));
    }
}
