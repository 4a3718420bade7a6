use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Fetch;

#[derive(Copy, Clone, Debug)]
pub enum Phase { Download, Parse }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self { Phase::Download => "download", Phase::Parse => "parse" } }
    fn span(&self) -> Span { match self { Phase::Download => info_span!("download"), Phase::Parse => info_span!("parse") } }
}

impl OpMarker for Fetch {
    const NAME: &'static str = "fetch";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("fetch") }
}
