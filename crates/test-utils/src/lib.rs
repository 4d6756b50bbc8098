pub mod builders;
pub mod fake_executor;

use std::sync::{Arc, Once};

use dagspec::config::{CompiledJob, EngineConfig};
use dagspec::engine::{CoreRuntime, EngineServices};
use dagspec::fs::mock::MockFileSystem;
use dagspec::metadata::InMemoryMetadataStore;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Collaborators backed by in-memory fakes, plus handles to inspect them.
pub struct TestServices {
    pub fs: MockFileSystem,
    pub metadata: InMemoryMetadataStore,
}

impl TestServices {
    pub fn new() -> Self {
        Self {
            fs: MockFileSystem::new(),
            metadata: InMemoryMetadataStore::new(),
        }
    }

    /// Engine services sharing this instance's fs and metadata store
    /// (no cache).
    pub fn services(&self) -> EngineServices {
        EngineServices::new(Arc::new(self.fs.clone()), Arc::new(self.metadata.clone()))
    }

    pub fn core(&self, job: &CompiledJob, cfg: &EngineConfig) -> CoreRuntime {
        CoreRuntime::for_job(job, cfg, self.services())
    }
}

impl Default for TestServices {
    fn default() -> Self {
        Self::new()
    }
}
