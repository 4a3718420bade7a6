use tracing::{info_span, Span};

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Metrics;

#[derive(Copy, Clone, Debug)]
pub enum Phase {
    Load,
    Normalize,
    Aggregate,
}

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Load => "load",
            Phase::Normalize => "normalize",
            Phase::Aggregate => "aggregate",
        }
    }

    fn span(&self) -> Span {
        match self {
            Phase::Load => info_span!("load"),
            Phase::Normalize => info_span!("normalize"),
            Phase::Aggregate => info_span!("aggregate"),
        }
    }
}

impl OpMarker for Metrics {
    const NAME: &'static str = "metrics";
    type Phase = Phase;

    fn root_span() -> Span {
        info_span!("metrics")
    }
}
