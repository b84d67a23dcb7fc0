use matrix_param::error::DistributionError;

/// Errors of the inference engine
#[derive(Debug, thiserror::Error)]
pub enum LentilError {
    /// Invalid configuration, reported before any iteration runs
    #[error("configuration error: {0}")]
    Config(String),

    /// A node's parameters or seeds don't fit its declared dimension
    #[error("configuration error in node `{node}`: {source}")]
    NodeConfig {
        node: String,
        #[source]
        source: DistributionError,
    },

    /// An update produced parameters outside the family's domain
    #[error("node `{node}`: {source}")]
    Distribution {
        node: String,
        #[source]
        source: DistributionError,
    },

    #[error("ELBO term of node `{node}` is not finite: {value}")]
    NonFiniteElbo { node: String, value: f64 },

    /// A node kept the old factor count after a drop
    #[error("node `{node}` has {found} factors after a drop, expected {expected}")]
    StaleFactorAxis {
        node: String,
        expected: usize,
        found: usize,
    },

    #[error("refusing to drop all {0} factors")]
    DropAllFactors(usize),

    #[error("numerical failure in node `{node}`: {detail}")]
    Numerical { node: String, detail: String },
}

pub type NodeResult<T> = Result<T, LentilError>;

/// Attach the name of the node a distribution error came from
pub trait AtNode<T> {
    fn at_node(self, node: &str) -> NodeResult<T>;
    fn config_at_node(self, node: &str) -> NodeResult<T>;
}

impl<T> AtNode<T> for Result<T, DistributionError> {
    fn at_node(self, node: &str) -> NodeResult<T> {
        self.map_err(|source| LentilError::Distribution {
            node: node.to_string(),
            source,
        })
    }

    fn config_at_node(self, node: &str) -> NodeResult<T> {
        self.map_err(|source| LentilError::NodeConfig {
            node: node.to_string(),
            source,
        })
    }
}
