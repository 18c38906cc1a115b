// Typed errors for contest file loading.
// The pipeline wraps everything else in anyhow.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    /// Source bytes are neither valid UTF-8 nor valid UTF-16.
    #[error("cannot decode '{path}': not valid UTF-8 or UTF-16")]
    Decode { path: String },

    #[error("cannot read '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed result table in '{path}'")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}
