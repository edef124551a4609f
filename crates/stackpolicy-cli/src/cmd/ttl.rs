use crate::output::print_json;
use anyhow::Context;
use chrono::{DateTime, Utc};
use stackpolicy_core::ttl::{self, DEFAULT_TTL_MINUTES};

pub fn run(minutes: Option<u32>, now: Option<&str>, json: bool) -> anyhow::Result<()> {
    let now = match now {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("invalid --now timestamp '{raw}'"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    let minutes = minutes.unwrap_or(DEFAULT_TTL_MINUTES);
    let timestamp = ttl::format_timestamp(ttl::expiration(now, minutes)?);

    if json {
        print_json(&serde_json::json!({
            "ttl_minutes": minutes,
            "timestamp": timestamp,
        }))?;
    } else {
        println!("{timestamp}");
    }
    Ok(())
}
