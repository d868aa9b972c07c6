use anyhow::Result;
use serde::Serialize;

use crate::output::config::OutputConfig;
use crate::output::types::{Envelope, Meta};
use crate::output::Emitter;

use super::config;

/// Print a result envelope on stdout. Only active in JSON mode (`--json` or
/// `INSIGHTS_OUTPUT_FORMAT=json`); text mode relies on the log lines.
pub fn print_result<T: Serialize>(op: &'static str, result: &T, meta: Option<Meta>) -> Result<()> {
    let mut cfg = OutputConfig::from_env();
    if config::json_mode() {
        cfg = cfg.force_json();
    }
    if !cfg.is_structured() {
        return Ok(());
    }
    let env = Envelope::result(op, result, meta)?;
    Emitter::from_env(cfg).emit(&env)?;
    Ok(())
}
