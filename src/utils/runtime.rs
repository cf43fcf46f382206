use anyhow::Result;

/// Everything the application does happens on one cooperative timeline, so a current thread
/// runtime is all that's needed.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
