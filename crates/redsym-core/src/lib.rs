#![forbid(unsafe_code)]

//! Shared vocabulary of the redsym workspace: the script value model with its
//! JSON boundary, the execution-graph IR produced by the symbolic builder, the
//! command table both backends validate against, and the error taxonomy.

pub mod cmd;
pub mod error;
pub mod ir;
pub mod value;

pub use error::RedisError;
pub use value::Value;
