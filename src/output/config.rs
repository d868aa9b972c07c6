use std::env;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub pretty: bool,
}

impl OutputConfig {
    pub fn from_env() -> Self {
        let format = match env::var("INSIGHTS_OUTPUT_FORMAT").ok().as_deref() {
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Text,
        };
        let pretty = match env::var("INSIGHTS_OUTPUT_PRETTY").ok().as_deref() {
            Some(v) => parse_flag(v),
            None => false,
        };
        OutputConfig { format, pretty }
    }

    pub fn force_json(self) -> Self {
        OutputConfig { format: OutputFormat::Json, ..self }
    }

    pub fn is_structured(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

fn parse_flag(v: &str) -> bool {
    v.eq_ignore_ascii_case("1") || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_values_are_case_insensitive() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("yes"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }

    #[test]
    fn force_json_keeps_pretty() {
        let cfg = OutputConfig { format: OutputFormat::Text, pretty: true }.force_json();
        assert!(cfg.is_structured());
        assert!(cfg.pretty);
    }
}
