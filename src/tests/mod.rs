//! Internal tests, grouped by module.

mod support;

mod config;
