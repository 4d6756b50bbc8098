#![allow(dead_code)]

pub use dagspec_test_utils::builders;
pub use dagspec_test_utils::fake_executor;
pub use dagspec_test_utils::{TestServices, init_tracing, with_timeout};
