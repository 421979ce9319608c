// Gradient-boosted classifier fusion
//
// A small binary-logistic tree ensemble trained from a fixed seed set every
// time it is constructed. Nothing is persisted and nothing changes after
// training, so one instance can serve any number of requests.

use crate::fusion::{FusionStrategy, Signals};

/// Feature vector: `[url_score, dom_score, visual_score]`.
pub type Features = [f64; 3];

/// Hand-labelled seed rows. Label `1.0` = legitimate, `0.0` = phishing.
pub const SEED_SET: &[(Features, f64)] = &[
    // legitimate
    ([0.90, 0.90, 0.85], 1.0),
    ([0.85, 0.80, 0.88], 1.0),
    ([0.75, 0.70, 0.72], 1.0),
    // obvious phishing
    ([0.10, 0.00, 0.00], 0.0),
    ([0.25, 0.10, 0.05], 0.0),
    ([0.30, 0.00, 0.10], 0.0),
    // brand spoofing
    ([0.85, 0.00, 0.00], 0.0),
    ([0.80, 0.10, 0.05], 0.0),
    ([0.78, 0.05, 0.00], 0.0),
    // partial similarity attacks
    ([0.60, 0.40, 0.20], 0.0),
    ([0.55, 0.30, 0.25], 0.0),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoosterParams {
    pub rounds: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// L2 regularisation on leaf weights.
    pub lambda: f64,
    /// Minimum hessian mass on each side of a split.
    pub min_child_weight: f64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            rounds: 40,
            max_depth: 3,
            learning_rate: 0.3,
            lambda: 1.0,
            min_child_weight: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Regression tree stored as an arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict(&self, x: &Features) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf { weight } => return weight,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[feature] < threshold { left } else { right };
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    rows: &'a [(Features, f64)],
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a BoosterParams,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    fn build(mut self) -> RegressionTree {
        let all: Vec<usize> = (0..self.rows.len()).collect();
        self.grow(&all, 0);
        RegressionTree { nodes: self.nodes }
    }

    fn grow(&mut self, samples: &[usize], depth: usize) -> usize {
        let index = self.nodes.len();
        let (g, h) = self.totals(samples);
        let lambda = self.params.lambda;

        self.nodes.push(Node::Leaf {
            weight: -g / (h + lambda) * self.params.learning_rate,
        });

        if depth >= self.params.max_depth || samples.len() < 2 {
            return index;
        }

        let Some(split) = self.best_split(samples, g, h) else {
            return index;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .copied()
            .partition(|&i| self.rows[i].0[split.feature] < split.threshold);

        let left = self.grow(&left_rows, depth + 1);
        let right = self.grow(&right_rows, depth + 1);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn totals(&self, samples: &[usize]) -> (f64, f64) {
        samples
            .iter()
            .fold((0.0, 0.0), |(g, h), &i| (g + self.grad[i], h + self.hess[i]))
    }

    /// Exact greedy search over midpoints between distinct feature values.
    fn best_split(&self, samples: &[usize], g: f64, h: f64) -> Option<BestSplit> {
        let lambda = self.params.lambda;
        let parent = g * g / (h + lambda);
        let mut best: Option<BestSplit> = None;

        for feature in 0..3 {
            let mut sorted = samples.to_vec();
            sorted.sort_by(|&a, &b| self.rows[a].0[feature].total_cmp(&self.rows[b].0[feature]));

            let (mut gl, mut hl) = (0.0, 0.0);
            for pair in sorted.windows(2) {
                let (cur, next) = (pair[0], pair[1]);
                gl += self.grad[cur];
                hl += self.hess[cur];

                let (value, next_value) = (self.rows[cur].0[feature], self.rows[next].0[feature]);
                if value == next_value {
                    continue;
                }

                let (gr, hr) = (g - gl, h - hl);
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }

                let gain = gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent;
                if gain > best.as_ref().map_or(1e-12, |b| b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (value + next_value) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Binary logistic gradient-boosted trees.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoostedClassifier {
    base_margin: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedClassifier {
    pub fn train(rows: &[(Features, f64)], params: &BoosterParams) -> Self {
        let n = rows.len();
        let positive = rows.iter().map(|(_, y)| y).sum::<f64>() / n.max(1) as f64;
        let positive = positive.clamp(1e-6, 1.0 - 1e-6);
        let base_margin = (positive / (1.0 - positive)).ln();

        let mut margins = vec![base_margin; n];
        let mut trees = Vec::with_capacity(params.rounds);

        for _ in 0..params.rounds {
            let (grad, hess): (Vec<f64>, Vec<f64>) = rows
                .iter()
                .zip(&margins)
                .map(|((_, y), &m)| {
                    let p = sigmoid(m);
                    (p - y, (p * (1.0 - p)).max(1e-16))
                })
                .unzip();

            let tree = TreeBuilder {
                rows,
                grad: &grad,
                hess: &hess,
                params,
                nodes: Vec::new(),
            }
            .build();

            for (margin, (x, _)) in margins.iter_mut().zip(rows) {
                *margin += tree.predict(x);
            }
            trees.push(tree);
        }

        Self { base_margin, trees }
    }

    /// Probability of the positive (legitimate) class.
    pub fn predict_proba(&self, x: &Features) -> f64 {
        let margin = self.base_margin + self.trees.iter().map(|t| t.predict(x)).sum::<f64>();
        sigmoid(margin)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

/// Fusion strategy backed by [`GradientBoostedClassifier`] trained on
/// [`SEED_SET`]. Reports `1 - P(legitimate)`.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoostedFusion {
    model: GradientBoostedClassifier,
}

impl Default for GradientBoostedFusion {
    fn default() -> Self {
        Self::new()
    }
}

impl GradientBoostedFusion {
    pub fn new() -> Self {
        Self::with_params(&BoosterParams::default())
    }

    pub fn with_params(params: &BoosterParams) -> Self {
        Self {
            model: GradientBoostedClassifier::train(SEED_SET, params),
        }
    }

    pub fn phishing_probability(&self, features: &Features) -> f64 {
        1.0 - self.model.predict_proba(features)
    }
}

impl FusionStrategy for GradientBoostedFusion {
    fn name(&self) -> &'static str {
        "classifier"
    }

    fn fuse(&self, signals: &Signals) -> f64 {
        self.phishing_probability(&[signals.url_score, signals.dom_score, signals.visual_score])
    }
}
