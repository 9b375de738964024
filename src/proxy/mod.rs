//! # 代理模块
//!
//! 分叉路由、桩命中判断与上游转发

pub mod dispatcher;
pub mod forwarding;
pub mod stub_response;
pub mod targets;

pub use dispatcher::{DispatchDecision, Dispatcher, redirect_permanent};
pub use forwarding::UpstreamForwarder;
pub use stub_response::build_stub_response;
pub use targets::{RESERVED_FORKS, Target, TargetRegistry, clean_path};
