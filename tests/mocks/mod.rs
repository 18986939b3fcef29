//! In-memory session doubles for dispatcher-level tests.

pub mod mock_session_factory;
pub mod mock_sessions;

#[allow(unused_imports)]
pub use mock_session_factory::{MockSessionFactory, MockUpstream};
#[allow(unused_imports)]
pub use mock_sessions::{MockDav, MockImap, MockSmtp};
