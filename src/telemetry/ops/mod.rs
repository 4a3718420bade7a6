pub mod run;
pub mod fetch;
pub mod presets;
pub mod metrics;
