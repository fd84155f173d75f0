mod lifecycle_tests;
mod shutdown_tests;
