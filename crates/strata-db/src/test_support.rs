//! Shared test utilities for strata-db unit tests.
