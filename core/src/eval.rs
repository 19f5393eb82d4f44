//! Offline ranking quality: graded relevance judgments and nDCG.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Discounted cumulative gain, `sum(rel_i / log2(i + 1))` with 1-based `i`.
pub fn dcg(relevances: &[f64]) -> f64 {
    relevances
        .iter()
        .enumerate()
        .map(|(i, rel)| rel / ((i + 2) as f64).log2())
        .sum()
}

/// DCG of `ranked` divided by DCG of `ideal` sorted descending. Zero when no
/// judged document is relevant.
pub fn ndcg(ranked: &[f64], ideal: &[f64]) -> f64 {
    let mut ideal = ideal.to_vec();
    ideal.sort_by(|a, b| b.total_cmp(a));
    ideal.truncate(ranked.len());
    let best = dcg(&ideal);
    if best > 0.0 {
        dcg(ranked) / best
    } else {
        0.0
    }
}

/// Graded relevance per document file name.
#[derive(Debug, Clone, Default)]
pub struct RelevanceJudgments {
    grades: HashMap<String, f64>,
}

impl RelevanceJudgments {
    /// Reads `fileName relevance` lines.
    pub fn load(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut grades = HashMap::new();
        for (n, line) in BufReader::new(f).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, grade) = line
                .rsplit_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("{}:{}: expected `name relevance`", path.display(), n + 1))?;
            let grade: f64 = grade
                .parse()
                .with_context(|| format!("{}:{}: bad relevance {grade:?}", path.display(), n + 1))?;
            grades.insert(name.trim().to_string(), grade);
        }
        Ok(Self { grades })
    }

    pub fn grade(&self, name: &str) -> f64 {
        self.grades.get(name).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.grades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grades.is_empty()
    }

    /// nDCG of the first `k` names of a ranking.
    pub fn ndcg_at<'a, I>(&self, ranking: I, k: usize) -> f64
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ranked: Vec<f64> = ranking.into_iter().take(k).map(|name| self.grade(name)).collect();
        let mut ideal: Vec<f64> = self.grades.values().copied().collect();
        ideal.sort_by(|a, b| b.total_cmp(a));
        ideal.truncate(k);
        let best = dcg(&ideal);
        if best > 0.0 {
            dcg(&ranked) / best
        } else {
            0.0
        }
    }
}

impl FromIterator<(String, f64)> for RelevanceJudgments {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self { grades: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dcg_discounts_by_rank() {
        let d = dcg(&[3.0, 2.0, 0.0, 1.0]);
        let expected = 3.0 + 2.0 / 3f64.log2() + 1.0 / 5f64.log2();
        assert!((d - expected).abs() < 1e-12);
    }

    #[test]
    fn perfect_ranking_scores_one() {
        let judgments: RelevanceJudgments =
            [("a.f", 2.0), ("b.f", 1.0), ("c.f", 0.0)].into_iter().map(|(n, g)| (n.to_string(), g)).collect();
        assert!((judgments.ndcg_at(["a.f", "b.f", "c.f"], 3) - 1.0).abs() < 1e-12);
        assert!(judgments.ndcg_at(["b.f", "a.f"], 2) < 1.0);
        assert_eq!(judgments.ndcg_at(["x.f"], 1), 0.0);
        assert!((ndcg(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn judgments_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relevance.txt");
        std::fs::write(&path, "Kitten.f 2\n\nMy Page.f 1\n").unwrap();
        let j = RelevanceJudgments::load(&path).unwrap();
        assert_eq!(j.len(), 2);
        assert_eq!(j.grade("My Page.f"), 1.0);
        std::fs::write(&path, "broken\n").unwrap();
        assert!(RelevanceJudgments::load(&path).is_err());
    }
}
