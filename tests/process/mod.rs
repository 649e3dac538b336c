//! Process module tests.

mod process_test;
