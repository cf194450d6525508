use thiserror::Error;

use mim_model::ModelError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("labels not compatible with any device: {}", .labels.join(", "))]
    Unsatisfiable { labels: Vec<String> },

    #[error("invalid pool: {0}")]
    Pool(#[from] ModelError),
}
