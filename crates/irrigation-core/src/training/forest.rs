//! Random forest classifier for the pump-on / pump-off decision
//!
//! Ensemble of CART trees grown on bootstrap samples with gini impurity,
//! `sqrt(n_features)` candidate features per split and balanced class
//! weights. Probabilities are the mean of each tree's weighted leaf class
//! fractions.
//!
//! # Design
//!
//! Trees use an array-based node layout: each node stores its split
//! feature and threshold plus child indices, and leaves carry the class
//! distribution. Traversal goes left when `x[feature] <= threshold`.
//!
//! All randomness comes from one seeded `StdRng` consumed in tree order,
//! so the same data and seed always grow the same forest.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Number of output classes (pump off, pump on)
pub const N_CLASSES: usize = 2;

/// Minimum impurity decrease for a split to be kept
const MIN_IMPURITY_DECREASE: f64 = 1e-12;

/// Hyperparameters for [`RandomForest::fit`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

/// A node in a decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Split feature; `None` for leaves
    pub feature: Option<usize>,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
    /// Weighted class fractions of the training samples reaching this node
    pub value: [f64; N_CLASSES],
}

impl TreeNode {
    pub const fn is_leaf(&self) -> bool {
        self.feature.is_none()
    }
}

/// A fitted classification tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
    n_features: usize,
}

impl DecisionTree {
    /// Class distribution of the leaf `features` falls into
    pub fn predict_proba(&self, features: &[f64]) -> [f64; N_CLASSES] {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            match node.feature {
                None => return node.value,
                Some(f) => {
                    let v = features.get(f).copied().unwrap_or(0.0);
                    idx = if v <= node.threshold { node.left } else { node.right };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    /// Longest root-to-leaf path
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        self.node_depth(0)
    }

    fn node_depth(&self, idx: usize) -> usize {
        let node = &self.nodes[idx];
        if node.is_leaf() {
            return 0;
        }
        1 + self.node_depth(node.left).max(self.node_depth(node.right))
    }

    /// Child pointers in range, split features in range, at least one node
    fn is_consistent(&self) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(i, n)| match n.feature {
                None => true,
                Some(f) => {
                    f < self.n_features
                        && n.left > i
                        && n.right > i
                        && n.left < self.nodes.len()
                        && n.right < self.nodes.len()
                }
            })
    }
}

fn gini(w0: f64, w1: f64) -> f64 {
    let total = w0 + w1;
    if total <= 0.0 {
        return 0.0;
    }
    let p0 = w0 / total;
    let p1 = w1 / total;
    1.0 - p0 * p0 - p1 * p1
}

struct Split {
    feature: usize,
    threshold: f64,
    children_impurity: f64,
}

/// Grows one tree on weighted samples
struct TreeGrower<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    weights: &'a [f64],
    params: &'a ForestParams,
    max_features: usize,
    n_features: usize,
    nodes: Vec<TreeNode>,
    importances: Vec<f64>,
}

impl<'a> TreeGrower<'a> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let (w0, w1) = indices.iter().fold((0.0, 0.0), |(a, b), &i| {
            if self.y[i] == 1 {
                (a, b + self.weights[i])
            } else {
                (a + self.weights[i], b)
            }
        });
        let total = w0 + w1;
        let value = if total > 0.0 {
            [w0 / total, w1 / total]
        } else {
            [0.5, 0.5]
        };
        let impurity = gini(w0, w1);

        let idx = self.nodes.len();
        self.nodes.push(TreeNode {
            feature: None,
            threshold: 0.0,
            left: 0,
            right: 0,
            value,
        });

        if depth >= self.params.max_depth
            || indices.len() < self.params.min_samples_split
            || impurity <= MIN_IMPURITY_DECREASE
        {
            return idx;
        }

        let split = match self.best_split(&indices, total, rng) {
            Some(s) if impurity - s.children_impurity > MIN_IMPURITY_DECREASE => s,
            _ => return idx,
        };

        self.importances[split.feature] += total * (impurity - split.children_impurity);

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);

        let left_idx = self.grow(left, depth + 1, rng);
        let right_idx = self.grow(right, depth + 1, rng);

        let node = &mut self.nodes[idx];
        node.feature = Some(split.feature);
        node.threshold = split.threshold;
        node.left = left_idx;
        node.right = right_idx;
        idx
    }

    /// Lowest weighted child impurity over a random feature subset
    ///
    /// Keeps drawing features past `max_features` until a valid split has
    /// been seen, so constant candidates do not end a node early.
    fn best_split(&self, indices: &[usize], total: f64, rng: &mut StdRng) -> Option<Split> {
        let mut candidates: Vec<usize> = (0..self.n_features).collect();
        candidates.shuffle(rng);

        let mut best: Option<Split> = None;
        let mut examined = 0usize;
        let mut column: Vec<(f64, usize, f64)> = Vec::with_capacity(indices.len());

        for feature in candidates {
            if examined >= self.max_features && best.is_some() {
                break;
            }

            column.clear();
            column.extend(
                indices
                    .iter()
                    .map(|&i| (self.x[i][feature], self.y[i], self.weights[i])),
            );
            column.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let first = column[0].0;
            let last = column[column.len() - 1].0;
            if last <= first {
                continue;
            }
            examined += 1;

            let (mut lw0, mut lw1) = (0.0, 0.0);
            let (tw0, tw1) = column.iter().fold((0.0, 0.0), |(a, b), &(_, y, w)| {
                if y == 1 {
                    (a, b + w)
                } else {
                    (a + w, b)
                }
            });

            for j in 0..column.len() - 1 {
                let (v, y, w) = column[j];
                if y == 1 {
                    lw1 += w;
                } else {
                    lw0 += w;
                }
                let next = column[j + 1].0;
                if next <= v {
                    continue;
                }

                let lw = lw0 + lw1;
                let rw0 = tw0 - lw0;
                let rw1 = tw1 - lw1;
                let rw = rw0 + rw1;
                let children = (lw * gini(lw0, lw1) + rw * gini(rw0, rw1)) / total;

                let better = best
                    .as_ref()
                    .map(|b| children < b.children_impurity)
                    .unwrap_or(true);
                if better {
                    let mut threshold = v + (next - v) / 2.0;
                    if threshold >= next {
                        threshold = v;
                    }
                    best = Some(Split {
                        feature,
                        threshold,
                        children_impurity: children,
                    });
                }
            }
        }

        best
    }
}

/// Result of a forest prediction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestPrediction {
    pub class: usize,
    pub probabilities: [f64; N_CLASSES],
}

impl ForestPrediction {
    /// Probability of the winning class
    pub fn confidence(&self) -> f64 {
        self.probabilities[0].max(self.probabilities[1])
    }
}

/// A fitted random forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    params: ForestParams,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Fit on `x` (rows) and binary labels `y`
    ///
    /// # Errors
    ///
    /// Returns `Err` if the inputs are empty, ragged, or labels are not 0/1.
    pub fn fit(x: &[Vec<f64>], y: &[usize], params: &ForestParams) -> Result<Self, String> {
        if x.is_empty() || x.len() != y.len() {
            return Err(format!("{} rows for {} labels", x.len(), y.len()));
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|r| r.len() != n_features) {
            return Err("rows must share a non-zero width".into());
        }
        if y.iter().any(|&c| c >= N_CLASSES) {
            return Err("labels must be 0 or 1".into());
        }
        if params.n_estimators == 0 {
            return Err("n_estimators must be positive".into());
        }

        let n = y.len();
        let class_weights = balanced_class_weights(y);
        let max_features = ((n_features as f64).sqrt() as usize).max(1);
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut per_tree_importances = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let mut counts = vec![0usize; n];
            for _ in 0..n {
                counts[rng.random_range(0..n)] += 1;
            }
            let weights: Vec<f64> = counts
                .iter()
                .zip(y)
                .map(|(&c, &label)| c as f64 * class_weights[label])
                .collect();
            let indices: Vec<usize> = (0..n).filter(|&i| weights[i] > 0.0).collect();

            let mut grower = TreeGrower {
                x,
                y,
                weights: &weights,
                params,
                max_features,
                n_features,
                nodes: Vec::new(),
                importances: vec![0.0; n_features],
            };
            grower.grow(indices, 0, &mut rng);

            let tree = DecisionTree {
                nodes: grower.nodes,
                n_features,
            };
            if tree.n_nodes() > 1 {
                per_tree_importances.push(normalized(grower.importances));
            }
            trees.push(tree);
        }

        let mut feature_importances = vec![0.0; n_features];
        if !per_tree_importances.is_empty() {
            for imp in &per_tree_importances {
                for (total, v) in feature_importances.iter_mut().zip(imp) {
                    *total += v;
                }
            }
            let count = per_tree_importances.len() as f64;
            feature_importances.iter_mut().for_each(|v| *v /= count);
            feature_importances = normalized(feature_importances);
        }

        Ok(Self {
            trees,
            n_features,
            params: params.clone(),
            feature_importances,
        })
    }

    /// Mean leaf class distribution across trees
    pub fn predict_proba(&self, features: &[f64]) -> [f64; N_CLASSES] {
        let mut sum = [0.0; N_CLASSES];
        for tree in &self.trees {
            let p = tree.predict_proba(features);
            sum[0] += p[0];
            sum[1] += p[1];
        }
        let n = self.trees.len().max(1) as f64;
        [sum[0] / n, sum[1] / n]
    }

    /// Class (argmax of probabilities, ties to class 0) and probabilities
    pub fn predict_with_proba(&self, features: &[f64]) -> ForestPrediction {
        let probabilities = self.predict_proba(features);
        let class = usize::from(probabilities[1] > probabilities[0]);
        ForestPrediction {
            class,
            probabilities,
        }
    }

    pub fn predict(&self, features: &[f64]) -> usize {
        self.predict_with_proba(features).class
    }

    /// Impurity-based importances, one per feature column, summing to 1
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn tree_at(&self, index: usize) -> &DecisionTree {
        &self.trees[index]
    }

    pub fn avg_depth(&self) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: usize = self.trees.iter().map(DecisionTree::depth).sum();
        total as f64 / self.trees.len() as f64
    }

    pub fn total_nodes(&self) -> usize {
        self.trees.iter().map(DecisionTree::n_nodes).sum()
    }

    pub(crate) fn is_consistent(&self) -> bool {
        !self.trees.is_empty()
            && self
                .trees
                .iter()
                .all(|t| t.n_features == self.n_features && t.is_consistent())
    }
}

/// `n / (n_classes * n_c)` per class; absent classes get 0
pub fn balanced_class_weights(y: &[usize]) -> [f64; N_CLASSES] {
    let n = y.len() as f64;
    let mut counts = [0usize; N_CLASSES];
    for &c in y {
        if c < N_CLASSES {
            counts[c] += 1;
        }
    }
    let mut weights = [0.0; N_CLASSES];
    for (w, &c) in weights.iter_mut().zip(&counts) {
        if c > 0 {
            *w = n / (N_CLASSES as f64 * c as f64);
        }
    }
    weights
}

fn normalized(mut values: Vec<f64>) -> Vec<f64> {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 {
        values.iter_mut().for_each(|v| *v /= sum);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Label is 1 when the first column is below 0.4; second column is noise
    fn threshold_data(n: usize) -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(99);
        let x: Vec<Vec<f64>> = (0..n)
            .map(|_| vec![rng.random::<f64>(), rng.random::<f64>()])
            .collect();
        let y = x.iter().map(|r| usize::from(r[0] < 0.4)).collect();
        (x, y)
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_estimators: 20,
            ..Default::default()
        }
    }

    #[test]
    fn test_learns_threshold() {
        let (x, y) = threshold_data(300);
        let forest = RandomForest::fit(&x, &y, &small_params()).unwrap();
        assert_eq!(forest.predict(&[0.1, 0.5]), 1);
        assert_eq!(forest.predict(&[0.9, 0.5]), 0);
        assert!(forest.feature_importances()[0] > forest.feature_importances()[1]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = threshold_data(200);
        let forest = RandomForest::fit(&x, &y, &small_params()).unwrap();
        for row in x.iter().take(20) {
            let p = forest.predict_proba(row);
            assert!((p[0] + p[1] - 1.0).abs() < 1e-9);
            assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = threshold_data(150);
        let a = RandomForest::fit(&x, &y, &small_params()).unwrap();
        let b = RandomForest::fit(&x, &y, &small_params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_depth_limit() {
        let (x, y) = threshold_data(300);
        let params = ForestParams {
            n_estimators: 5,
            max_depth: 2,
            ..Default::default()
        };
        let forest = RandomForest::fit(&x, &y, &params).unwrap();
        for i in 0..forest.n_trees() {
            assert!(forest.tree_at(i).depth() <= 2);
        }
    }

    #[test]
    fn test_balanced_weights() {
        let y = vec![0, 0, 0, 1];
        let w = balanced_class_weights(&y);
        assert!((w[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((w[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_importances_sum_to_one() {
        let (x, y) = threshold_data(200);
        let forest = RandomForest::fit(&x, &y, &small_params()).unwrap();
        let sum: f64 = forest.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(RandomForest::fit(&[], &[], &small_params()).is_err());
        assert!(RandomForest::fit(&[vec![1.0], vec![1.0, 2.0]], &[0, 1], &small_params()).is_err());
        assert!(RandomForest::fit(&[vec![1.0]], &[2], &small_params()).is_err());
    }

    #[test]
    fn test_structure_is_consistent() {
        let (x, y) = threshold_data(100);
        let forest = RandomForest::fit(&x, &y, &small_params()).unwrap();
        assert!(forest.is_consistent());
        assert!(forest.total_nodes() >= forest.n_trees());
        assert_eq!(forest.tree_at(0).n_leaves() * 2 - 1, forest.tree_at(0).n_nodes());
    }
}
