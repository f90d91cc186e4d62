// src/health/tests/mod.rs
