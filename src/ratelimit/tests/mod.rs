// src/ratelimit/tests/mod.rs

mod limiter_tests;
