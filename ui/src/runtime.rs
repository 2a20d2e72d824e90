use std::sync::OnceLock;

/// Process-wide runtime that hosts backfill tasks off the input thread.
pub fn shared_runtime() -> &'static tokio::runtime::Runtime {
    static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("kbar-backfill")
            .enable_all()
            .build()
            .expect("tokio runtime")
    })
}
