//! Decision-tree ensembles stored as flat node arenas.
//!
//! Each tree is a `Vec<Node>` rooted at index 0. Split nodes compare one
//! feature with `<=` and send ties left. Children always sit at a higher index
//! than their parent, so traversal visits at most `depth + 1` nodes and cannot
//! loop. Trees are never mutated after loading.

use crate::estimation::features::{FeatureContract, FeatureVector};
use crate::estimation::model::Predictor;
use crate::estimation::selector::ModelTier;
use crate::estimation::ModelError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf(f64),
}

/// Serialized form of one tree in a model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeParams {
    pub nodes: Vec<Node>,
}

/// Serialized form of a forest in a model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    pub features: FeatureContract,
    pub trees: Vec<TreeParams>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    depth: usize,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Result<Self, ModelError> {
        if nodes.is_empty() {
            return Err(ModelError::MalformedTree("tree has no nodes".to_string()));
        }

        for (index, node) in nodes.iter().enumerate() {
            match *node {
                Node::Split {
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if !threshold.is_finite() {
                        return Err(ModelError::MalformedTree(format!(
                            "node {index} has non-finite threshold"
                        )));
                    }
                    for child in [left, right] {
                        if child <= index || child >= nodes.len() {
                            return Err(ModelError::MalformedTree(format!(
                                "node {index} has invalid child {child} (tree has {} nodes)",
                                nodes.len()
                            )));
                        }
                    }
                }
                Node::Leaf(value) => {
                    if !value.is_finite() {
                        return Err(ModelError::MalformedTree(format!(
                            "leaf {index} has non-finite value"
                        )));
                    }
                }
            }
        }

        let depth = subtree_depths(&nodes)[0];
        Ok(Self { nodes, depth })
    }

    /// Single leaf tree.
    pub fn constant(value: f64) -> Result<Self, ModelError> {
        Self::new(vec![Node::Leaf(value)])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Longest root-to-leaf path, counted in splits.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Largest feature index any split reads.
    pub fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf(_) => None,
            })
            .max()
    }

    /// Walk from the root to a leaf. `features` must cover `max_feature()`.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[feature] <= threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

// Children sit at higher indices, so one reverse pass fills every depth.
fn subtree_depths(nodes: &[Node]) -> Vec<usize> {
    let mut depths = vec![0; nodes.len()];
    for index in (0..nodes.len()).rev() {
        if let Node::Split { left, right, .. } = nodes[index] {
            depths[index] = 1 + depths[left].max(depths[right]);
        }
    }
    depths
}

/// Ensemble of independent trees over one feature contract; output is the mean.
#[derive(Debug, Clone)]
pub struct Forest {
    contract: FeatureContract,
    trees: Vec<Tree>,
}

impl Forest {
    pub fn new(contract: FeatureContract, trees: Vec<Tree>) -> Result<Self, ModelError> {
        if trees.is_empty() {
            return Err(ModelError::Invalid("forest has no trees".to_string()));
        }
        for (index, tree) in trees.iter().enumerate() {
            if let Some(feature) = tree.max_feature()
                && feature >= contract.len()
            {
                return Err(ModelError::FeatureIndex {
                    tree: index,
                    feature,
                    contract,
                });
            }
        }
        Ok(Self { contract, trees })
    }

    pub fn from_params(params: &ForestParams) -> Result<Self, ModelError> {
        let trees = params
            .trees
            .iter()
            .map(|tree| Tree::new(tree.nodes.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(params.features, trees)
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Deepest tree in the ensemble; bounds the per-tree traversal cost.
    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(Tree::depth).max().unwrap_or(0)
    }

    /// Mean of every tree's leaf for the same feature values.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|tree| tree.evaluate(features)).sum();
        sum / self.trees.len() as f64
    }
}

impl Predictor for Forest {
    fn contract(&self) -> FeatureContract {
        self.contract
    }

    fn predict(&self, features: &FeatureVector) -> Option<f64> {
        debug_assert_eq!(features.contract(), self.contract);
        Some(self.evaluate(features.values()))
    }

    fn tier(&self) -> ModelTier {
        ModelTier::Forest
    }
}
