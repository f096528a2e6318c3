mod attrs_tests;
mod search_tests;
