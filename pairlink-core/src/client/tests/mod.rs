//! End-to-end client tests
//!
//! Each test drives two or more full `Client` instances against a shared
//! in-process relay, covering the complete pairing flow the way a host
//! application would run it.

mod pairing_flow;
