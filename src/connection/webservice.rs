//! WebService validator (§4.5) and NetworkHeartbeat (§4.6).
//!
//! Both talk to the same kind of backend: a templated URL answered with a
//! one-line JSON reply. The validator resolves `CHECK_BADGE` (and any
//! other state the config routes) into a new state; the heartbeat probes
//! liveness and degrades/restores the system around network outages.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::config::{HeartbeatConfig, ValidatorAction, WebServiceConfig};
use crate::connection::{Connection, EventSender};
use crate::error::NetworkError;
use crate::message::{Message, State, Value};

// ---------------------------------------------------------------------------
// URL templating
// ---------------------------------------------------------------------------

/// Render `{name}` placeholders from `params`. An unresolvable placeholder
/// is an error the caller swallows quietly (§4.5 step 2b): no state change,
/// just a log line.
fn render_template(template: &str, params: &HashMap<String, String>) -> Result<String, NetworkError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open + 1..];
        let Some(close) = rest.find('}') else {
            return Err(NetworkError::UrlTemplate(format!(
                "unterminated placeholder in '{template}'"
            )));
        };
        let name = &rest[..close];
        let value = params
            .get(name)
            .ok_or_else(|| NetworkError::UrlTemplate(format!("unknown placeholder '{{{name}}}'")))?;
        out.push_str(value);
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn value_to_param(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
    }
}

fn build_params(
    tool_id: &str,
    message: &Message,
    saved_reply: Option<&serde_json::Value>,
) -> HashMap<String, String> {
    let mut params = HashMap::new();
    params.insert("tool_id".to_string(), tool_id.to_string());
    if let Some(badge_id) = &message.badge_id {
        params.insert("badge_id".to_string(), badge_id.clone());
    } else {
        params.entry("badge_id".to_string()).or_default();
    }
    params.insert("state".to_string(), message.state.wire_name().to_string());
    params.insert("from".to_string(), message.from.clone());
    for (k, v) in &message.fields {
        params.insert(k.clone(), value_to_param(v));
    }
    // saved_reply is applied last: a carried backend field (e.g. a session
    // token) must win over the message's own fields of the same name.
    if let Some(serde_json::Value::Object(obj)) = saved_reply {
        for (k, v) in obj {
            params.insert(k.clone(), value_to_param(&Value::from_json(v)));
        }
    }
    params
}

/// Perform a GET, read the full body as a single line, parse as JSON.
async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<serde_json::Value, NetworkError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| NetworkError::Http(e.to_string()))?;
    let body = resp
        .text()
        .await
        .map_err(|e| NetworkError::Http(e.to_string()))?;
    let line = body.lines().next().unwrap_or("");
    serde_json::from_str(line).map_err(|e| NetworkError::Json(e.to_string()))
}

/// Pick the unique condition with the greatest (>0) field-match count
/// against `reply`. Ties return `None` (§4.5 step 2f).
fn best_match(
    conditions: &[(State, HashMap<String, Value>)],
    reply: &serde_json::Value,
) -> Option<State> {
    let reply_obj = reply.as_object();
    let mut best: Option<(State, usize)> = None;
    let mut tied = false;
    for (state, fields) in conditions {
        let count = fields
            .iter()
            .filter(|(k, expected)| {
                reply_obj
                    .and_then(|o| o.get(k.as_str()))
                    .map(Value::from_json)
                    .as_ref()
                    == Some(*expected)
            })
            .count();
        if count == 0 {
            continue;
        }
        match best {
            None => best = Some((*state, count)),
            Some((_, best_count)) if count > best_count => {
                best = Some((*state, count));
                tied = false;
            }
            Some((_, best_count)) if count == best_count => tied = true,
            _ => {}
        }
    }
    if tied {
        None
    } else {
        best.map(|(s, _)| s)
    }
}

// ---------------------------------------------------------------------------
// WebService validator
// ---------------------------------------------------------------------------

pub struct WebService {
    routing: HashMap<State, ValidatorAction>,
    tool_id: String,
    client: reqwest::Client,
    saved_reply: Arc<Mutex<Option<serde_json::Value>>>,
    heartbeat: Option<NetworkHeartbeat>,
}

impl WebService {
    pub fn new(config: &WebServiceConfig, tool_id: String) -> Self {
        let routing = config.routing.iter().cloned().collect();
        let heartbeat = config
            .heartbeat_monitor
            .as_ref()
            .map(|hb| NetworkHeartbeat::new(hb.clone()));
        Self {
            routing,
            tool_id,
            client: reqwest::Client::new(),
            saved_reply: Arc::new(Mutex::new(None)),
            heartbeat,
        }
    }

    /// The heartbeat this validator spawned, if `heartbeat_monitor` was
    /// configured — the Interlock registers it as its own Connection too,
    /// so its `update` also receives the main fanout and its background
    /// loop gets started alongside everything else.
    pub fn take_heartbeat(&mut self) -> Option<NetworkHeartbeat> {
        self.heartbeat.take()
    }
}

impl Connection for WebService {
    fn update(&mut self, message: &Message, outbox: &EventSender) {
        let Some(action) = self.routing.get(&message.state).cloned() else {
            return;
        };
        let tool_id = self.tool_id.clone();
        let message = message.clone();
        let client = self.client.clone();
        let saved_reply = self.saved_reply.clone();
        let outbox = outbox.clone();

        tokio::spawn(async move {
            let (url_template, save_reply, conditions) = match &action {
                ValidatorAction::UrlOnly(u) => (u.clone(), false, Vec::new()),
                ValidatorAction::Full {
                    url,
                    save_reply,
                    conditions,
                } => (url.clone(), *save_reply, conditions.clone()),
            };

            let params = {
                let saved = saved_reply.lock();
                build_params(&tool_id, &message, saved.as_ref())
            };
            let url = match render_template(&url_template, &params) {
                Ok(u) => u,
                Err(e) => {
                    debug!("webservice: {e}");
                    return;
                }
            };

            let reply = match fetch_json(&client, &url).await {
                Ok(r) => r,
                Err(NetworkError::Json(e)) => {
                    warn!("webservice: reply JSON parse error: {e}");
                    return;
                }
                Err(e) => {
                    warn!("webservice: {e}");
                    let _ = outbox.send(Message::new(State::ErrorNetwork, "WebService"));
                    return;
                }
            };

            if save_reply {
                *saved_reply.lock() = Some(reply.clone());
            }

            if let Some(resolved) = best_match(&conditions, &reply) {
                let _ = outbox.send(Message::new(resolved, "WebService"));
            }
        });
    }

    fn start_background(&mut self, outbox: EventSender) {
        if let Some(hb) = self.heartbeat.as_mut() {
            hb.start_background(outbox);
        }
    }

    fn kind(&self) -> &'static str {
        "webservice:connection"
    }
}

// ---------------------------------------------------------------------------
// NetworkHeartbeat
// ---------------------------------------------------------------------------

pub struct NetworkHeartbeat {
    query_url: String,
    client: reqwest::Client,
    current_mode: Arc<Mutex<State>>,
}

impl NetworkHeartbeat {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            query_url: config.query_url,
            client: reqwest::Client::new(),
            current_mode: Arc::new(Mutex::new(State::PowerUp)),
        }
    }
}

impl Connection for NetworkHeartbeat {
    fn update(&mut self, message: &Message, _outbox: &EventSender) {
        if message.state.is_heartbeat_tracked() {
            *self.current_mode.lock() = message.state;
        }
    }

    fn start_background(&mut self, outbox: EventSender) {
        let query_url = self.query_url.clone();
        let client = self.client.clone();
        let current_mode = self.current_mode.clone();
        tokio::spawn(async move {
            loop {
                let mode = *current_mode.lock();
                let probing = matches!(
                    mode,
                    State::Inactive | State::Error | State::ErrorNetwork | State::ErrorMaintenance
                );
                if !probing {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }

                let params = HashMap::from([
                    ("tool_id".to_string(), String::new()),
                    ("badge_id".to_string(), String::new()),
                ]);
                let url = render_template(&query_url, &params).unwrap_or(query_url.clone());

                match fetch_json(&client, &url).await {
                    Ok(_) => {
                        if mode != State::Inactive {
                            let _ = outbox.send(Message::new(State::Inactive, "NetworkHeartbeat"));
                        }
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                    Err(e) => {
                        debug!("heartbeat probe failed: {e}");
                        if mode != State::ErrorNetwork {
                            let _ =
                                outbox.send(Message::new(State::ErrorNetwork, "NetworkHeartbeat"));
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
    }

    fn kind(&self) -> &'static str {
        "internal:network_heartbeat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitutes_known_placeholders() {
        let mut params = HashMap::new();
        params.insert("tool_id".to_string(), "0xdead".to_string());
        params.insert("badge_id".to_string(), "1234".to_string());
        let url = render_template("http://host/check?tool={tool_id}&badge={badge_id}", &params)
            .unwrap();
        assert_eq!(url, "http://host/check?tool=0xdead&badge=1234");
    }

    #[test]
    fn template_rejects_unknown_placeholder() {
        let params = HashMap::new();
        assert!(render_template("http://host/{missing}", &params).is_err());
    }

    #[test]
    fn build_params_exposes_state_and_from() {
        let message = Message::new(State::CheckBadge, "BadgeReader").with_badge_id("1234");
        let params = build_params("0xdead", &message, None);
        assert_eq!(params.get("state").map(String::as_str), Some("CHECK_BADGE"));
        assert_eq!(params.get("from").map(String::as_str), Some("BadgeReader"));
    }

    #[test]
    fn build_params_saved_reply_overrides_message_fields() {
        let message = Message::new(State::CheckBadge, "BadgeReader")
            .with_field("session", Value::String("from-message".to_string()));
        let saved_reply = serde_json::json!({"session": "from-backend"});
        let params = build_params("0xdead", &message, Some(&saved_reply));
        assert_eq!(params.get("session").map(String::as_str), Some("from-backend"));
    }

    #[test]
    fn build_params_saved_reply_overrides_tool_id_and_badge_id() {
        let message = Message::new(State::CheckBadge, "BadgeReader").with_badge_id("1234");
        let saved_reply = serde_json::json!({"tool_id": "overridden", "badge_id": "overridden"});
        let params = build_params("0xdead", &message, Some(&saved_reply));
        assert_eq!(params.get("tool_id").map(String::as_str), Some("overridden"));
        assert_eq!(params.get("badge_id").map(String::as_str), Some("overridden"));
    }

    #[test]
    fn best_match_picks_unique_highest_count() {
        let reply = serde_json::json!({"status": "ok", "maintenance": false});
        let conditions = vec![
            (
                State::Active,
                HashMap::from([("status".to_string(), Value::String("ok".to_string()))]),
            ),
            (
                State::ErrorMaintenance,
                HashMap::from([
                    ("status".to_string(), Value::String("ok".to_string())),
                    ("maintenance".to_string(), Value::Bool(true)),
                ]),
            ),
        ];
        assert_eq!(best_match(&conditions, &reply), Some(State::Active));
    }

    #[test]
    fn best_match_ties_return_none() {
        let reply = serde_json::json!({"status": "ok"});
        let conditions = vec![
            (
                State::Active,
                HashMap::from([("status".to_string(), Value::String("ok".to_string()))]),
            ),
            (
                State::LoginDenied,
                HashMap::from([("status".to_string(), Value::String("ok".to_string()))]),
            ),
        ];
        assert_eq!(best_match(&conditions, &reply), None);
    }

    #[test]
    fn best_match_zero_matches_is_none() {
        let reply = serde_json::json!({"status": "bad"});
        let conditions = vec![(
            State::Active,
            HashMap::from([("status".to_string(), Value::String("ok".to_string()))]),
        )];
        assert_eq!(best_match(&conditions, &reply), None);
    }

    #[test]
    fn heartbeat_suppresses_probe_while_active() {
        let hb = NetworkHeartbeat::new(HeartbeatConfig {
            query_url: "http://host/heartbeat".to_string(),
        });
        *hb.current_mode.lock() = State::Active;
        assert!(!matches!(
            *hb.current_mode.lock(),
            State::Inactive | State::Error | State::ErrorNetwork | State::ErrorMaintenance
        ));
    }
}
