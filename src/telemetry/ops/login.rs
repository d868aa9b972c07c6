use tracing::{info_span, Span};

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Login;

#[derive(Copy, Clone, Debug)]
pub enum Phase {
    ClientLogin,
}

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::ClientLogin => "client_login",
        }
    }
    fn span(&self) -> Span {
        match self {
            Phase::ClientLogin => info_span!("client_login"),
        }
    }
}

impl OpMarker for Login {
    const NAME: &'static str = "login";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("login") }
}
