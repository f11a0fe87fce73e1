//! Decoder configuration.
//!
//! Provides [`DecoderConfig`], the explicit set of permissive parsing
//! behaviors the decoder supports. Every combination of options is valid;
//! values loaded from the environment that cannot be parsed keep their
//! strict defaults.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// How the decoder treats a struct that names the same member twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateMembers {
    /// Keep the position of the first occurrence and the value of the last.
    #[default]
    LastWins,
    /// Keep the first occurrence and ignore later ones.
    FirstWins,
    /// Fail with a structural error.
    Reject,
}

impl FromStr for DuplicateMembers {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "last-wins" | "last" => Ok(Self::LastWins),
            "first-wins" | "first" => Ok(Self::FirstWins),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown duplicate member policy: {other}")),
        }
    }
}

/// XML-RPC response decoder configuration.
///
/// # Examples
///
/// ```
/// use rpcstack_xml::DecoderConfig;
///
/// let config = DecoderConfig::default();
/// assert!(config.declaration_optional);
/// assert!(!config.unknown_types_as_string);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct DecoderConfig {
    /// Accept documents without an `<?xml ...?>` declaration.
    #[builder(default = true)]
    pub declaration_optional: bool,

    /// Decode unknown type tags as strings instead of failing.
    #[builder(default = false)]
    pub unknown_types_as_string: bool,

    /// Accept the `<nil/>` extension type.
    #[builder(default = false)]
    pub allow_nil: bool,

    /// Accept the `<i8>` 64-bit integer extension type.
    #[builder(default = false)]
    pub allow_i8: bool,

    /// Accept the `ex:`-prefixed Apache extension tags (`ex:nil`, `ex:i8`).
    #[builder(default = false)]
    pub apache_extensions: bool,

    /// Policy for repeated struct member names.
    #[builder(default)]
    pub duplicate_members: DuplicateMembers,

    /// Maximum struct/array nesting. `None` means unbounded.
    #[builder(default, setter(strip_option))]
    pub max_depth: Option<usize>,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            declaration_optional: true,
            unknown_types_as_string: false,
            allow_nil: false,
            allow_i8: false,
            apache_extensions: false,
            duplicate_members: DuplicateMembers::LastWins,
            max_depth: None,
            log_level: String::from("info"),
        }
    }
}

impl DecoderConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `XMLRPC_DECLARATION_OPTIONAL` | `true` |
    /// | `XMLRPC_UNKNOWN_TYPES_AS_STRING` | `false` |
    /// | `XMLRPC_ALLOW_NIL` | `false` |
    /// | `XMLRPC_ALLOW_I8` | `false` |
    /// | `XMLRPC_APACHE_EXTENSIONS` | `false` |
    /// | `XMLRPC_DUPLICATE_MEMBERS` | `last-wins` |
    /// | `XMLRPC_MAX_DEPTH` | *(unset)* |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// # Examples
    ///
    /// ```
    /// use rpcstack_xml::{Decoder, DecoderConfig};
    ///
    /// let config = DecoderConfig::from_env();
    /// let decoder = Decoder::new(config.clone());
    /// assert_eq!(decoder.config(), &config);
    /// ```
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Used by [`DecoderConfig::from_env`]; also handy for layering other
    /// sources without touching the process environment.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        read_bool(&lookup, "XMLRPC_DECLARATION_OPTIONAL", &mut config.declaration_optional);
        read_bool(&lookup, "XMLRPC_UNKNOWN_TYPES_AS_STRING", &mut config.unknown_types_as_string);
        read_bool(&lookup, "XMLRPC_ALLOW_NIL", &mut config.allow_nil);
        read_bool(&lookup, "XMLRPC_ALLOW_I8", &mut config.allow_i8);
        read_bool(&lookup, "XMLRPC_APACHE_EXTENSIONS", &mut config.apache_extensions);
        if let Some(v) = lookup("XMLRPC_DUPLICATE_MEMBERS") {
            match v.parse() {
                Ok(policy) => config.duplicate_members = policy,
                Err(e) => tracing::warn!(error = %e, "ignoring XMLRPC_DUPLICATE_MEMBERS"),
            }
        }
        if let Some(v) = lookup("XMLRPC_MAX_DEPTH") {
            match v.parse::<usize>() {
                Ok(n) => config.max_depth = Some(n),
                Err(e) => tracing::warn!(value = %v, error = %e, "ignoring XMLRPC_MAX_DEPTH"),
            }
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }
}

/// Parse `1`/`0`/`true`/`false` (case-insensitive).
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" => Some(true),
        "0" => Some(false),
        v if v.eq_ignore_ascii_case("true") => Some(true),
        v if v.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

/// Overwrite `target` from `key` when the variable is set and parses.
fn read_bool<F>(lookup: &F, key: &str, target: &mut bool)
where
    F: Fn(&str) -> Option<String>,
{
    let Some(v) = lookup(key) else {
        return;
    };
    match parse_bool(&v) {
        Some(b) => *target = b,
        None => tracing::warn!(key, value = %v, "ignoring unparseable boolean"),
    }
}
