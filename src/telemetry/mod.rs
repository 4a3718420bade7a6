pub mod config;
pub mod ctx;
pub mod ops;

use ctx::LogCtx;

pub fn run() -> LogCtx<ops::run::Run> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn fetch() -> LogCtx<ops::fetch::Fetch> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn presets() -> LogCtx<ops::presets::Presets> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn metrics() -> LogCtx<ops::metrics::Metrics> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
