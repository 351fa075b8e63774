mod common;

mod build_tests;
mod check_tests;
mod repin_tests;
