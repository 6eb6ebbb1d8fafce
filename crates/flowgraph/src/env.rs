use std::env;
use std::sync::OnceLock;

static VALIDATE_PASSES: OnceLock<bool> = OnceLock::new();

/// When `FLOWGRAPH_VALIDATE_PASSES` is set, pipelines re-check every graph
/// invariant after each pass instead of trusting the rewrite driver.
pub(crate) fn validate_passes_enabled() -> bool {
    *VALIDATE_PASSES.get_or_init(|| {
        env::var("FLOWGRAPH_VALIDATE_PASSES")
            .map(|value| {
                matches!(
                    value.trim().to_ascii_lowercase().as_str(),
                    "1" | "true" | "yes" | "on"
                )
            })
            .unwrap_or(false)
    })
}
