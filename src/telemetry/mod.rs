pub mod config;
pub mod ctx;
pub mod emit;
pub mod ops;

use ctx::LogCtx;

// Factory helpers, one per CLI operation
pub fn insights() -> LogCtx<ops::insights::Insights> { LogCtx::new(config::logs_are_json()) }
pub fn post() -> LogCtx<ops::post::Post> { LogCtx::new(config::logs_are_json()) }
pub fn login() -> LogCtx<ops::login::Login> { LogCtx::new(config::logs_are_json()) }
pub fn init() -> LogCtx<ops::init::Init> { LogCtx::new(config::logs_are_json()) }
