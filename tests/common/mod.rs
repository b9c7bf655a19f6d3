pub mod api_mock;
pub mod upstream_mock;
