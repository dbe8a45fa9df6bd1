//! Crate-wide constants.

pub const APP_NAME: &str = "veebuild";

/// Number of hex characters kept from a SHA-256 digest for an [`ObjectHash`](crate::util::hash::ObjectHash).
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Namespace assumed for coordinates written without one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Checks a production build with tests enabled may not skip without an explicit override.
pub const MANDATORY_PROD_CHECKS: &[&str] = &["license", "nullanalysis"];

/// Directory (relative to the working directory) holding the artifact store by default.
pub const DEFAULT_STORE_DIR: &str = ".veebuild/store";

/// Environment variable overriding the artifact store location.
pub const STORE_ENV: &str = "VEEBUILD_STORE";

/// `SOURCE_DATE_EPOCH` handed to external commands (1980-01-01, the ZIP epoch).
pub const SOURCE_DATE_EPOCH: &str = "315532800";
