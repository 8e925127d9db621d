// src/normalize/deploy.rs
use serde_json::Value;

use super::{str_at, BodyLines, Disposition, Rendered};
use crate::verify::Provider;

/// Netlify fires on every state change; only final states notify.
pub fn classify_deployment(payload: &Value) -> Disposition {
    match str_at(payload, "/state") {
        Some("ready") | Some("error") => Disposition::Notify,
        Some(other) => Disposition::Ignore(format!("deploy state '{other}' is not final")),
        None => Disposition::Ignore("deploy payload without state".to_string()),
    }
}

fn describe_state(state: &str) -> &str {
    match state {
        "ready" => "succeeded",
        "error" => "failed",
        other => other,
    }
}

pub(crate) fn render(provider: Provider, payload: &Value) -> Option<Rendered> {
    if !payload.is_object() {
        return None;
    }
    let site = str_at(payload, "/site_name")
        .or_else(|| str_at(payload, "/name"))
        .unwrap_or("unknown site");
    let state = str_at(payload, "/state").unwrap_or("unknown");
    let url = str_at(payload, "/deploy_ssl_url")
        .or_else(|| str_at(payload, "/deploy_url"))
        .or_else(|| str_at(payload, "/url"))
        .unwrap_or_default();
    let deploy_id = str_at(payload, "/deploy_id")
        .or_else(|| str_at(payload, "/id"))
        .unwrap_or_default();
    let status = describe_state(state);

    let mut body = BodyLines::default();
    body.push("Site", site);
    body.push("Status", status);
    body.push("Deploy URL", url);
    body.push("Deploy ID", deploy_id);
    body.push("Error", str_at(payload, "/error_message").unwrap_or_default());

    let mut out = Rendered {
        title: format!("{provider} deploy {status}: {site}"),
        body: body.finish(),
        ..Default::default()
    };
    out.meta("provider", provider.label());
    out.meta("site", site);
    out.meta("state", state);
    out.meta("deploy_id", deploy_id);
    out.meta("deploy_url", url);
    Some(out)
}
