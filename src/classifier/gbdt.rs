//! Gradient-boosted decision trees for binary classification
//!
//! Logistic loss with second-order split gain, L1/L2 leaf regularisation,
//! per-tree row and column sampling. Trees are grown level by level over
//! feature columns presorted once per fit (exact greedy splits).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Classifier, ClassifierFactory, ModelParams};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One regression tree; node 0 is the root. Leaf values already include the learning rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] < *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Frontier node being grown at the current depth
struct OpenNode {
    id: usize,
    grad: f64,
    hess: f64,
}

#[derive(Clone, Copy)]
struct SplitCandidate {
    gain: f64,
    feature: usize,
    threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    params: ModelParams,
    scale_pos_weight: f64,
    n_features: usize,
    trees: Vec<Tree>,
    /// Total split gain per feature
    gain_importance: Vec<f64>,
}

impl GradientBoostedTrees {
    pub fn new(params: ModelParams, scale_pos_weight: f64) -> Self {
        Self {
            params,
            scale_pos_weight,
            n_features: 0,
            trees: Vec::new(),
            gain_importance: Vec::new(),
        }
    }

    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn scale_pos_weight(&self) -> f64 {
        self.scale_pos_weight
    }

    /// Top `n` features by share of total gain
    pub fn top_features(&self, names: &[String], n: usize) -> Vec<(String, f64)> {
        let total: f64 = self.gain_importance.iter().sum();
        let mut ranked: Vec<(String, f64)> = names
            .iter()
            .zip(&self.gain_importance)
            .map(|(name, gain)| {
                let share = if total > 0.0 { gain / total } else { 0.0 };
                (name.clone(), share)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        ranked
    }

    /// Save model to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(writer, self)?;
        tracing::info!(path = %path.as_ref().display(), trees = self.trees.len(), "💾 Model saved");
        Ok(())
    }

    /// Load model from a JSON file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let model: Self = serde_json::from_reader(reader)?;
        tracing::info!(path = %path.as_ref().display(), trees = model.trees.len(), "📂 Model loaded");
        Ok(model)
    }

    /// Soft-thresholded gradient sum (L1)
    fn shrink(&self, grad: f64) -> f64 {
        let alpha = self.params.reg_alpha;
        if grad > alpha {
            grad - alpha
        } else if grad < -alpha {
            grad + alpha
        } else {
            0.0
        }
    }

    fn structure_score(&self, grad: f64, hess: f64) -> f64 {
        let denom = hess + self.params.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        let g = self.shrink(grad);
        g * g / denom
    }

    fn leaf_value(&self, grad: f64, hess: f64) -> f64 {
        let denom = hess + self.params.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -self.shrink(grad) / denom * self.params.learning_rate
    }

    fn split_gain(&self, left: (f64, f64), right: (f64, f64), parent: (f64, f64)) -> f64 {
        0.5 * (self.structure_score(left.0, left.1) + self.structure_score(right.0, right.1)
            - self.structure_score(parent.0, parent.1))
            - self.params.gamma
    }

    #[allow(clippy::too_many_arguments)]
    fn grow_tree(
        &self,
        x: &[&[f64]],
        grad: &[f64],
        hess: &[f64],
        sorted: &[Vec<usize>],
        rows: &[bool],
        columns: &[usize],
        importance: &mut [f64],
    ) -> Tree {
        let mut nodes = Vec::new();

        // slot[r] = index into `open` for rows still in a growing node
        let mut slot: Vec<Option<usize>> = rows.iter().map(|&in_bag| in_bag.then_some(0)).collect();
        let (g_root, h_root) = (0..x.len())
            .filter(|&r| rows[r])
            .fold((0.0, 0.0), |(g, h), r| (g + grad[r], h + hess[r]));

        nodes.push(Node::Leaf {
            value: self.leaf_value(g_root, h_root),
        });
        let mut open = vec![OpenNode {
            id: 0,
            grad: g_root,
            hess: h_root,
        }];

        for _depth in 0..self.params.max_depth {
            if open.is_empty() {
                break;
            }

            let mut best: Vec<Option<SplitCandidate>> = vec![None; open.len()];
            for &feature in columns {
                // Running (grad, hess, last value) of the left side per open node
                let mut acc = vec![(0.0f64, 0.0f64, f64::NAN); open.len()];
                for &r in &sorted[feature] {
                    let Some(s) = slot[r] else { continue };
                    let value = x[r][feature];
                    let (gl, hl, last) = acc[s];

                    // NaN `last` means nothing on the left yet
                    if value > last {
                        let node = &open[s];
                        let (gr, hr) = (node.grad - gl, node.hess - hl);
                        if hl >= self.params.min_child_weight && hr >= self.params.min_child_weight
                        {
                            let gain = self.split_gain((gl, hl), (gr, hr), (node.grad, node.hess));
                            if gain > 0.0 && best[s].map_or(true, |b| gain > b.gain) {
                                best[s] = Some(SplitCandidate {
                                    gain,
                                    feature,
                                    threshold: (last + value) / 2.0,
                                });
                            }
                        }
                    }
                    acc[s] = (gl + grad[r], hl + hess[r], value);
                }
            }

            // Children of slot s live at next-level slots children[s].0 / .1
            let mut next_open = Vec::new();
            let mut children: Vec<Option<(usize, usize)>> = vec![None; open.len()];
            for (s, candidate) in best.iter().enumerate() {
                let Some(split) = candidate else { continue };

                let left = nodes.len();
                let right = left + 1;
                nodes.push(Node::Leaf { value: 0.0 });
                nodes.push(Node::Leaf { value: 0.0 });
                nodes[open[s].id] = Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                };
                importance[split.feature] += split.gain;

                children[s] = Some((next_open.len(), next_open.len() + 1));
                next_open.push(OpenNode {
                    id: left,
                    grad: 0.0,
                    hess: 0.0,
                });
                next_open.push(OpenNode {
                    id: right,
                    grad: 0.0,
                    hess: 0.0,
                });
            }

            for r in 0..x.len() {
                let Some(s) = slot[r] else { continue };
                match (best[s], children[s]) {
                    (Some(split), Some((left, right))) => {
                        let child = if x[r][split.feature] < split.threshold {
                            left
                        } else {
                            right
                        };
                        next_open[child].grad += grad[r];
                        next_open[child].hess += hess[r];
                        slot[r] = Some(child);
                    }
                    _ => slot[r] = None,
                }
            }

            for node in &next_open {
                nodes[node.id] = Node::Leaf {
                    value: self.leaf_value(node.grad, node.hess),
                };
            }
            open = next_open;
        }

        Tree { nodes }
    }

    fn validate_input(x: &[&[f64]], y: &[bool]) -> EngineResult<usize> {
        if x.is_empty() {
            return Err(EngineError::Model("cannot fit on an empty training set".to_string()));
        }
        if x.len() != y.len() {
            return Err(EngineError::Model(format!(
                "{} feature rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        let width = x[0].len();
        if width == 0 {
            return Err(EngineError::Model("feature rows have no columns".to_string()));
        }
        if x.iter().any(|row| row.len() != width) {
            return Err(EngineError::Model("feature rows differ in width".to_string()));
        }
        if x.iter().any(|row| row.iter().any(|v| !v.is_finite())) {
            return Err(EngineError::Model("non-finite feature value".to_string()));
        }
        Ok(width)
    }
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

impl Classifier for GradientBoostedTrees {
    fn fit(&mut self, x: &[&[f64]], y: &[bool]) -> EngineResult<()> {
        self.params.validate()?;
        let width = Self::validate_input(x, y)?;
        let n = x.len();

        self.n_features = width;
        self.trees = Vec::with_capacity(self.params.n_estimators);
        self.gain_importance = vec![0.0; width];

        let sorted: Vec<Vec<usize>> = (0..width)
            .map(|f| {
                let mut idx: Vec<usize> = (0..n).collect();
                idx.sort_by(|&a, &b| x[a][f].total_cmp(&x[b][f]));
                idx
            })
            .collect();

        let weights: Vec<f64> = y
            .iter()
            .map(|&label| if label { self.scale_pos_weight } else { 1.0 })
            .collect();
        let targets: Vec<f64> = y.iter().map(|&label| if label { 1.0 } else { 0.0 }).collect();

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut margins = vec![0.0; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let n_columns = ((width as f64 * self.params.colsample_bytree).round() as usize).clamp(1, width);
        let mut importance = vec![0.0; width];

        for _ in 0..self.params.n_estimators {
            for r in 0..n {
                let p = sigmoid(margins[r]);
                grad[r] = (p - targets[r]) * weights[r];
                hess[r] = p * (1.0 - p) * weights[r];
            }

            let rows: Vec<bool> = if self.params.subsample < 1.0 {
                (0..n).map(|_| rng.gen::<f64>() < self.params.subsample).collect()
            } else {
                vec![true; n]
            };
            let mut columns: Vec<usize> = if n_columns < width {
                rand::seq::index::sample(&mut rng, width, n_columns).into_vec()
            } else {
                (0..width).collect()
            };
            columns.sort_unstable();

            let tree = self.grow_tree(x, &grad, &hess, &sorted, &rows, &columns, &mut importance);
            for r in 0..n {
                margins[r] += tree.predict(x[r]);
            }
            self.trees.push(tree);
        }

        self.gain_importance = importance;

        tracing::debug!(
            rows = n,
            features = width,
            trees = self.trees.len(),
            scale_pos_weight = self.scale_pos_weight,
            "🌲 Boosted trees fitted"
        );
        Ok(())
    }

    fn predict_proba(&self, x: &[f64]) -> EngineResult<f64> {
        if !self.is_trained() {
            return Err(EngineError::Model("model is not trained".to_string()));
        }
        if x.len() != self.n_features {
            return Err(EngineError::Model(format!(
                "expected {} features, got {}",
                self.n_features,
                x.len()
            )));
        }

        let margin: f64 = self.trees.iter().map(|t| t.predict(x)).sum();
        Ok(sigmoid(margin))
    }

    fn top_features(&self, names: &[String], n: usize) -> Vec<(String, f64)> {
        GradientBoostedTrees::top_features(self, names, n)
    }
}

/// Creates boosted-tree models sharing one set of hyperparameters
#[derive(Debug, Clone, Default)]
pub struct GbdtFactory {
    pub params: ModelParams,
}

impl GbdtFactory {
    pub fn new(params: ModelParams) -> Self {
        Self { params }
    }
}

impl ClassifierFactory for GbdtFactory {
    type Model = GradientBoostedTrees;

    fn create(&self, scale_pos_weight: f64) -> GradientBoostedTrees {
        GradientBoostedTrees::new(self.params.clone(), scale_pos_weight)
    }
}
