use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How functions parameterized over a base class are lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenericPolicy {
    /// Emit the function once; calls on class-typed parameters switch on the tag.
    #[default]
    TagDispatch,
    /// Clone the function per concrete argument classes seen at call sites.
    Monomorphize,
}

/// What a runtime narrowing does when the instance is unrelated to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NarrowingPolicy {
    /// Relabel the static view without looking at the tag.
    Permissive,
    /// Fault unless the instance is the target class or a subclass of it.
    #[default]
    Checked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringOptions {
    pub generic_policy: GenericPolicy,
    pub narrowing_policy: NarrowingPolicy,
}

pub const GENERIC_POLICY_ENV: &str = "DEVIRT_GENERIC_POLICY";
pub const NARROWING_POLICY_ENV: &str = "DEVIRT_NARROWING";

impl LoweringOptions {
    pub fn new(generic_policy: GenericPolicy, narrowing_policy: NarrowingPolicy) -> Self {
        Self {
            generic_policy,
            narrowing_policy,
        }
    }

    /// Defaults overridden by `DEVIRT_GENERIC_POLICY` and `DEVIRT_NARROWING`.
    /// Unrecognised values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(value) = std::env::var(GENERIC_POLICY_ENV) {
            match parse_generic_policy(&value) {
                Some(policy) => options.generic_policy = policy,
                None => tracing::warn!("ignoring {}={:?}", GENERIC_POLICY_ENV, value),
            }
        }
        if let Ok(value) = std::env::var(NARROWING_POLICY_ENV) {
            match parse_narrowing_policy(&value) {
                Some(policy) => options.narrowing_policy = policy,
                None => tracing::warn!("ignoring {}={:?}", NARROWING_POLICY_ENV, value),
            }
        }
        options
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading lowering options from {}", path.display()))?;
        serde_json::from_str(&text)
            .wrap_err_with(|| format!("parsing lowering options in {}", path.display()))
    }
}

pub fn parse_generic_policy(value: &str) -> Option<GenericPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "tag-dispatch" | "tag" | "dispatch" => Some(GenericPolicy::TagDispatch),
        "monomorphize" | "mono" => Some(GenericPolicy::Monomorphize),
        _ => None,
    }
}

pub fn parse_narrowing_policy(value: &str) -> Option<NarrowingPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "checked" | "strict" => Some(NarrowingPolicy::Checked),
        "permissive" | "unchecked" => Some(NarrowingPolicy::Permissive),
        _ => None,
    }
}
