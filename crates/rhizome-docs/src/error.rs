//! Documentation engine errors

use thiserror::Error;

use rhizome_store::StoreError;

#[derive(Debug, Error)]
pub enum DocsError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("root node not found: {0}")]
    RootNotFound(String),
}
