/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "resiliencebench=info,resiliencebench_operator=info";

#[derive(Clone, Debug, Default)]
pub struct ObservabilityOptions {
    /// Overrides [`DEFAULT_FILTER`] when `RUST_LOG` is unset.
    pub default_filter: Option<String>,
    /// Emit ANSI colors.
    pub ansi: bool,
}
