//! Cross-module tests: the pipeline driven by scripted remote services, and
//! the HTTP routes on top of it.
