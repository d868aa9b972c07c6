use std::io::{self, Write};

use super::config::OutputConfig;
use super::types::Envelope;

/// Writes result envelopes to stdout as JSON, one per line unless pretty.
pub struct Emitter {
    pretty: bool,
}

impl Emitter {
    pub fn from_env(cfg: OutputConfig) -> Self {
        Emitter { pretty: cfg.pretty }
    }

    fn write_to(&self, env: &Envelope, w: &mut dyn Write) -> io::Result<()> {
        if self.pretty { serde_json::to_writer_pretty(&mut *w, env)? } else { serde_json::to_writer(&mut *w, env)? }
        writeln!(w)
    }

    pub fn emit(&self, env: &Envelope) -> io::Result<()> {
        let mut out = io::stdout().lock();
        self.write_to(env, &mut out)?;
        out.flush()
    }
}
