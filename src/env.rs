//! Runtime environment detection.
//!
//! Single source of truth for the runtime environment, read from the
//! `PRIMA_ENV` environment variable.
//!
//! Set `PRIMA_ENV` to one of:
//! - `test` - Test mode (session token lives in a file instead of the keyring)
//! - `development` or `dev` - Development mode
//! - (anything else or unset) - Production mode

/// Runtime environment for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Development environment.
    Development,
    /// Test environment - file-backed token storage.
    Test,
}

impl Environment {
    /// Detect current environment from `PRIMA_ENV`.
    #[must_use]
    pub fn current() -> Self {
        match std::env::var("PRIMA_ENV").as_deref() {
            Ok("test") => Self::Test,
            Ok("development" | "dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` if this is the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }

    /// Returns `true` if this is the production environment.
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Returns `true` if the OS keyring should be bypassed.
#[must_use]
pub fn should_skip_keyring() -> bool {
    Environment::current().is_test()
}
