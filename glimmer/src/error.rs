use thiserror::Error;

use crate::ResourceKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("render target must have a non-zero extent, got {width}x{height}")]
    ZeroExtent { width: u32, height: u32 },

    #[error(
        "reservoir heap holds {capacity} reservoirs, but {required} are required"
    )]
    HeapTooSmall { capacity: u32, required: u32 },

    #[error("couldn't create pipeline `{label}`: {message}")]
    Pipeline { label: String, message: String },

    #[error("shader module `{module}` has not been registered")]
    MissingShader { module: String },

    #[error("couldn't read buffer back: {0}")]
    Readback(String),

    #[error("bindless {kind:?} table has no room for {requested} more entries")]
    BindlessHeapFull { kind: ResourceKind, requested: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
