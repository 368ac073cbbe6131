//! HTTP integration tests driving the router in-process.

mod health_test;
mod helpers;
mod upload_test;
