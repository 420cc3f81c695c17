//! 管理接口模块。
//!
//! 提供 key 池的查看与人工干预：
//! - 查看每个 key 的使用情况与失败状态
//! - 手动轮换、标记失败、重置失败集合
//! - 运行时设置读写

pub mod handler;

pub use handler::*;
