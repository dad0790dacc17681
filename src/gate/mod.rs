//! 管理后台登录闸门
//!
//! 拦截受保护前缀下的请求：已登录放行，否则展示登录页；
//! 登录提交经过锁定检查、格式校验与哈希比对后签发会话 cookie。

pub mod client;
pub mod credentials;
pub mod decision;
pub mod limiter;
pub mod middleware;
pub mod password;
pub mod path;
pub mod render;
pub mod session;
pub mod store;

pub use credentials::{CredentialHasher, EnvCredentials};
pub use decision::{Gate, GateSettings};
pub use middleware::gate_middleware;
pub use store::{spawn_sweeper, MemoryAttemptStore};
