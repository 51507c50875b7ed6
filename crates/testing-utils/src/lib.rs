//! # distjet testing utils
//!
//! 各crate的集成测试共用的测试替身、数据构造器和辅助函数。
//!
//! ```toml
//! [dev-dependencies]
//! distjet-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
