pub mod acquire;
pub mod exists;
pub mod hold;
pub mod release;
pub mod renew;

use serde::Serialize;

use crate::OutputFormat;

/// Result of one lock operation, as printed to stdout.
#[derive(Debug, Serialize)]
pub struct Outcome<'a> {
    pub operation: &'a str,
    pub lock_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<&'a str>,
    pub ok: bool,
}

impl Outcome<'_> {
    fn text(&self) -> String {
        let verdict = if self.ok { "ok" } else { "failed" };
        match self.request_id {
            Some(id) => format!("{} {}: {verdict} (request id {id})", self.operation, self.lock_key),
            None => format!("{} {}: {verdict}", self.operation, self.lock_key),
        }
    }
}

pub fn report(outcome: &Outcome<'_>, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(outcome)?),
        OutputFormat::Text => println!("{}", outcome.text()),
    }
    Ok(())
}
