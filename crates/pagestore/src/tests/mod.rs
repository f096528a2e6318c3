mod compress_tests;
mod store_tests;
