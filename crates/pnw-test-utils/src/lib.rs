//! pnw-test-utils: a mock Pusher server and wire-format fixtures shared by
//! this workspace's integration tests.

pub mod fixtures;
pub mod mock_pusher_server;

pub use mock_pusher_server::MockPusherServer;
