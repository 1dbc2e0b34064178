/// Fatal at startup — the process does not proceed to accept records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config value '{0}'")]
    Missing(&'static str),

    #[error("invalid config value '{name}': {reason}")]
    Invalid { name: &'static str, reason: String },
}
