use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Run;

#[derive(Copy, Clone, Debug)]
pub enum Phase { Plan, FetchFeed, Analyze, CallModel, CallWebhook, Normalize, Aggregate, Export }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::Plan => "plan",
        Phase::FetchFeed => "fetch_feed",
        Phase::Analyze => "analyze",
        Phase::CallModel => "call_model",
        Phase::CallWebhook => "call_webhook",
        Phase::Normalize => "normalize",
        Phase::Aggregate => "aggregate",
        Phase::Export => "export",
    }}
    fn span(&self) -> Span { match self {
        Phase::Plan => info_span!("plan"),
        Phase::FetchFeed => info_span!("fetch_feed"),
        Phase::Analyze => info_span!("analyze"),
        Phase::CallModel => info_span!("call_model"),
        Phase::CallWebhook => info_span!("call_webhook"),
        Phase::Normalize => info_span!("normalize"),
        Phase::Aggregate => info_span!("aggregate"),
        Phase::Export => info_span!("export"),
    }}
}

impl OpMarker for Run {
    const NAME: &'static str = "run";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("run") }
}
