//! vaultbench: Benchmark harness and scoring engine for file-editing agents.
//!
//! This library provides tools for running benchmark suites against agent
//! drivers inside a sandboxed vault, diffing the outcome against expected
//! snapshots, and scoring correctness and efficiency.

// Core modules
pub mod artifacts;
pub mod cli;
pub mod config;
pub mod diff;
pub mod driver;
pub mod metrics;
pub mod report;
pub mod result;
pub mod runner;
pub mod sandbox;
pub mod scoring;
pub mod snapshot;
pub mod storage;
pub mod suite;
pub mod transcript;

// Re-export commonly used types
pub use config::HarnessConfig;
pub use driver::{AgentDriver, DriverContext, DriverError, NoopDriver, OracleDriver};
pub use result::{CaseResult, CaseStatus, RunResult};
pub use runner::{CaseEvent, HarnessError, RunOrchestrator};
pub use scoring::{CaseScore, ScoreWeights, ScoringEngine};
pub use storage::{FsVault, MemoryVault, ScopedVault, StorageError, VaultStorage};
pub use suite::{BenchmarkCase, BenchmarkSuite, SuiteError};
