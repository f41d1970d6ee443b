use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber for embedders that do not bring their own.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies. Calling this
/// twice, or after another subscriber was installed, is a no-op.
pub fn init(default_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    if tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}
