pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error(transparent)]
    Xml(#[from] roxmltree::Error),

    #[error("input document has no root <svg> element")]
    MissingSvgRoot,

    #[error("unsupported dimension value '{value}' for '{attribute}'")]
    Dimension { attribute: String, value: String },

    #[error("malformed path data: {message}")]
    PathData { message: String },

    #[error("malformed points list: '{value}'")]
    Points { value: String },

    #[error("reference depth limit exceeded while expanding '{reference}'")]
    ReferenceDepth { reference: String },
}
