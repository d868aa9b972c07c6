use tracing::{info_span, Span};

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Post;

#[derive(Copy, Clone, Debug)]
pub enum Phase {
    LoadConfig,
    LoadInsights,
    Folder,
    Fetch,
    Extract,
    Prompt,
    CallLlm,
    GenerateImage,
    Persist,
    Notify,
}

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::LoadConfig => "load_config",
        Phase::LoadInsights => "load_insights",
        Phase::Folder => "folder",
        Phase::Fetch => "fetch",
        Phase::Extract => "extract",
        Phase::Prompt => "prompt",
        Phase::CallLlm => "call_llm",
        Phase::GenerateImage => "generate_image",
        Phase::Persist => "persist",
        Phase::Notify => "notify",
    }}
    fn span(&self) -> Span { match self {
        Phase::LoadConfig => info_span!("load_config"),
        Phase::LoadInsights => info_span!("load_insights"),
        Phase::Folder => info_span!("folder"),
        Phase::Fetch => info_span!("fetch"),
        Phase::Extract => info_span!("extract"),
        Phase::Prompt => info_span!("prompt"),
        Phase::CallLlm => info_span!("call_llm"),
        Phase::GenerateImage => info_span!("generate_image"),
        Phase::Persist => info_span!("persist"),
        Phase::Notify => info_span!("notify"),
    }}
}

impl OpMarker for Post {
    const NAME: &'static str = "post";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("post") }
}
