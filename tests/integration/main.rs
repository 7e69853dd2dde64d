//! Integration test suite for Natega-Sweep

mod dispatch_tests;
