//! Integration tests: the controller driven end to end through mock ports.

mod lifecycle_tests;
mod mock_hw;
mod ota_flow_tests;
