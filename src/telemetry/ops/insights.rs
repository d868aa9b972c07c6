use tracing::{info_span, Span};

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Insights;

#[derive(Copy, Clone, Debug)]
pub enum Phase {
    LoadConfig,
    Folder,
    Fetch,
    Extract,
    Prompt,
    CallLlm,
    Persist,
    Notify,
}

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::LoadConfig => "load_config",
            Phase::Folder => "folder",
            Phase::Fetch => "fetch",
            Phase::Extract => "extract",
            Phase::Prompt => "prompt",
            Phase::CallLlm => "call_llm",
            Phase::Persist => "persist",
            Phase::Notify => "notify",
        }
    }

    fn span(&self) -> Span {
        match self {
            Phase::LoadConfig => info_span!("load_config"),
            Phase::Folder => info_span!("folder"),
            Phase::Fetch => info_span!("fetch"),
            Phase::Extract => info_span!("extract"),
            Phase::Prompt => info_span!("prompt"),
            Phase::CallLlm => info_span!("call_llm"),
            Phase::Persist => info_span!("persist"),
            Phase::Notify => info_span!("notify"),
        }
    }
}

impl OpMarker for Insights {
    const NAME: &'static str = "insights";
    type Phase = Phase;

    fn root_span() -> Span {
        info_span!("insights")
    }
}
