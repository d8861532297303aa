//! Configuration error type.

#[derive(Debug)]
pub enum ConfigError {
    Io { path: std::path::PathBuf, source: std::io::Error },
    Toml { path: std::path::PathBuf, source: toml::de::Error },
    MissingMode { path: std::path::PathBuf },
    InvalidMode { path: std::path::PathBuf, value: String },
    MissingInterlock { var: &'static str },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => write!(f, "{}: {source}", path.display()),
            ConfigError::Toml { path, source } => write!(f, "{}: {source}", path.display()),
            ConfigError::MissingMode { path } => write!(f, "{}: missing `mode:` key", path.display()),
            ConfigError::InvalidMode { path, value } => {
                write!(f, "{}: invalid mode `{value}` (expected empirical, modeling, or hybrid)", path.display())
            }
            ConfigError::MissingInterlock { var } => {
                write!(f, "unattended mode requires {var}=1 to be set; refusing to start")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
