//! Cross-crate lifecycle tests run against both storage backends.
