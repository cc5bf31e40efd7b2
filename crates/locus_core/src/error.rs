use thiserror::Error;

/// Typed failures raised during domain validation and expression compilation.
///
/// Everything here is raised eagerly, at construction or compilation time;
/// once sampling starts no further failure is possible. Numerical
/// degeneracies (empty isosurfaces, empty intersection curves) are valid
/// results, never errors.
#[derive(Debug, Error)]
pub enum LocusError {
    /// An axis range or resolution cannot define a sampling lattice.
    /// Covers resolution < 2 (the spacing divisor would be zero) and
    /// non-finite or inverted ranges.
    #[error("invalid domain for axis '{axis}': {reason}")]
    InvalidDomain { axis: String, reason: String },

    /// A symbol was declared both as a swept axis and as a fixed parameter.
    #[error("symbol '{symbol}' is declared both as an axis and as a fixed parameter")]
    ConflictingParameter { symbol: String },

    /// A free symbol of the expression is neither an axis nor fixed, so the
    /// reduced expression cannot be lowered to a numeric function.
    #[error("unresolved symbol '{symbol}': not an axis and not a fixed parameter")]
    UnresolvedSymbol { symbol: String },

    /// The expression text could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, LocusError>;
