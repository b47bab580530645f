use std::time::Duration;

use reqwest::{StatusCode, header::RETRY_AFTER};
use serde_json::{Map, Value, json};

use crate::{
    agent::{AgentTurn, ChatBackend, ChatRequest, ToolCall},
    config::PlannerConfig,
    planner::{PlannerBackend, PlannerError, PlannerFuture, PlannerReply},
    tools::ToolDeclaration,
};

/// `generateContent` client shared by plan generation and the agent chat.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &PlannerConfig, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Open a chat in which the planner may call any of `declarations`.
    pub fn chat(&self, declarations: Vec<ToolDeclaration>) -> GeminiChat {
        GeminiChat {
            client: self.clone(),
            tools: function_declarations(&declarations),
            history: Vec::new(),
        }
    }

    async fn generate_content(&self, body: &Value) -> Result<Value, PlannerError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        tracing::debug!(model = %self.model, "sending generateContent request");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &text));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| PlannerError::Fatal(format!("unreadable planner response: {err}")))
    }
}

impl PlannerBackend for GeminiClient {
    fn backend_name(&self) -> &'static str {
        "gemini"
    }

    fn generate<'a>(&'a self, prompt: &'a str, schema: &'a Value) -> PlannerFuture<'a, PlannerReply> {
        Box::pin(async move {
            let body = plan_request(prompt, schema);
            let response = self.generate_content(&body).await?;
            Ok(plan_reply(&response))
        })
    }
}

pub struct GeminiChat {
    client: GeminiClient,
    tools: Value,
    history: Vec<Value>,
}

impl ChatBackend for GeminiChat {
    fn send<'a>(&'a mut self, request: &'a ChatRequest) -> PlannerFuture<'a, AgentTurn> {
        Box::pin(async move {
            let user = user_content(request);
            let mut contents = self.history.clone();
            contents.push(user.clone());
            let body = json!({
                "contents": contents,
                "tools": [{ "functionDeclarations": self.tools }],
            });

            let response = self.client.generate_content(&body).await?;
            let reply = candidate_content(&response)
                .cloned()
                .unwrap_or_else(|| json!({ "role": "model", "parts": [] }));

            self.history.push(user);
            self.history.push(reply.clone());
            Ok(agent_turn(&reply))
        })
    }
}

fn classify_transport(err: reqwest::Error) -> PlannerError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        PlannerError::transient(err.to_string())
    } else {
        PlannerError::Fatal(err.to_string())
    }
}

fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> PlannerError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| first_string(&value, &[&["error", "message"], &["message"]]))
        .unwrap_or_else(|| body.trim().to_string());
    let message = format!("{status}: {detail}");

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        PlannerError::Transient {
            message,
            retry_after,
        }
    } else {
        PlannerError::Fatal(message)
    }
}

fn plan_request(prompt: &str, schema: &Value) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": upper_types(schema),
        },
    })
}

fn plan_reply(response: &Value) -> PlannerReply {
    let text = candidate_content(response)
        .map(joined_text)
        .filter(|text| !text.trim().is_empty());
    let structured = text
        .as_deref()
        .and_then(|text| serde_json::from_str::<Value>(text.trim()).ok());
    PlannerReply { structured, text }
}

fn function_declarations(declarations: &[ToolDeclaration]) -> Value {
    Value::Array(
        declarations
            .iter()
            .map(|decl| {
                let mut entry = Map::new();
                entry.insert("name".to_string(), json!(decl.name));
                entry.insert("description".to_string(), json!(decl.description));
                if let Some(parameters) = &decl.parameters {
                    entry.insert("parameters".to_string(), upper_types(parameters));
                }
                Value::Object(entry)
            })
            .collect(),
    )
}

fn user_content(request: &ChatRequest) -> Value {
    let mut parts = Vec::new();
    if let Some(result) = &request.tool_result {
        parts.push(json!({
            "functionResponse": {
                "name": result.name,
                "response": {
                    "success": result.output.success,
                    "message": result.output.message,
                },
            }
        }));
    }
    parts.push(json!({ "text": request.directive }));
    json!({ "role": "user", "parts": parts })
}

fn candidate_content(response: &Value) -> Option<&Value> {
    at_path(response, &["candidates"])
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
}

fn joined_text(content: &Value) -> String {
    parts(content)
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
}

fn agent_turn(content: &Value) -> AgentTurn {
    let call = parts(content)
        .find_map(|part| part.get("functionCall"))
        .map(|call| ToolCall {
            name: first_string(call, &[&["name"]]),
            args: call.get("args").cloned().unwrap_or(Value::Null),
        });
    AgentTurn {
        text: joined_text(content),
        call,
    }
}

fn parts(content: &Value) -> impl Iterator<Item = &Value> {
    content
        .get("parts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Gemini spells schema types in upper case (`OBJECT`, `STRING`, ...).
fn upper_types(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = match (key.as_str(), value) {
                        ("type", Value::String(kind)) => Value::String(kind.to_ascii_uppercase()),
                        ("properties", Value::Object(props)) => Value::Object(
                            props
                                .iter()
                                .map(|(name, prop)| (name.clone(), upper_types(prop)))
                                .collect(),
                        ),
                        _ => upper_types(value),
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(upper_types).collect()),
        other => other.clone(),
    }
}

fn first_string(payload: &Value, paths: &[&[&str]]) -> Option<String> {
    for path in paths {
        if let Some(value) = at_path(payload, path).and_then(Value::as_str)
            && !value.trim().is_empty()
        {
            return Some(value.to_string());
        }
    }

    None
}

fn at_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = current.get(*segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ToolResult;
    use crate::tools::{ToolOutput, declarations};

    #[test]
    fn plan_request_asks_for_json_with_upper_case_types() {
        let schema = json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "type": { "type": "string" },
                    "message": { "type": "string", "nullable": true }
                },
                "required": ["type"]
            }
        });

        let body = plan_request("Plan it.", &schema);

        assert_eq!(body["contents"][0]["parts"][0]["text"], "Plan it.");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        let items = &body["generationConfig"]["responseSchema"]["items"];
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "ARRAY");
        assert_eq!(items["type"], "OBJECT");
        assert_eq!(items["properties"]["type"]["type"], "STRING");
        assert_eq!(items["properties"]["message"]["nullable"], true);
        assert_eq!(items["required"], json!(["type"]));
    }

    #[test]
    fn plan_reply_keeps_text_and_parsed_value() {
        let response = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "[{\"sha\": \"abc1234\"," },
                        { "text": " \"action\": \"PICK\"}]" }
                    ]
                }
            }]
        });

        let reply = plan_reply(&response);

        assert_eq!(
            reply.structured,
            Some(json!([{ "sha": "abc1234", "action": "PICK" }]))
        );
        assert!(reply.text.unwrap().starts_with("[{"));

        let prose = plan_reply(&json!({
            "candidates": [{ "content": { "parts": [{ "text": "Here: [1]" }] } }]
        }));
        assert_eq!(prose.structured, None);
        assert_eq!(prose.text.as_deref(), Some("Here: [1]"));
        assert_eq!(plan_reply(&json!({ "candidates": [] })), PlannerReply::default());
    }

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        let err = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(7)),
            r#"{"error": {"message": "Resource exhausted"}}"#,
        );
        match err {
            PlannerError::Transient {
                message,
                retry_after,
            } => {
                assert_eq!(message, "429 Too Many Requests: Resource exhausted");
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected transient, got {other:?}"),
        }

        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, None, "overloaded"),
            PlannerError::Transient { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, None, "bad schema"),
            PlannerError::Fatal(message) if message == "400 Bad Request: bad schema"
        ));
    }

    #[test]
    fn tool_results_travel_as_function_responses() {
        let request = ChatRequest {
            directive: "Continue".to_string(),
            tool_result: Some(ToolResult {
                name: "edit".to_string(),
                output: ToolOutput::failed("Cannot delete missing.txt: file does not exist"),
            }),
        };

        let content = user_content(&request);

        assert_eq!(content["role"], "user");
        assert_eq!(content["parts"][0]["functionResponse"]["name"], "edit");
        assert_eq!(
            content["parts"][0]["functionResponse"]["response"]["success"],
            false
        );
        assert_eq!(content["parts"][1]["text"], "Continue");
    }

    #[test]
    fn agent_turn_takes_the_first_function_call() {
        let content = json!({
            "role": "model",
            "parts": [
                { "text": "Starting the rebase." },
                { "functionCall": { "name": "start", "args": { "base_commit": "abc1234" } } },
                { "functionCall": { "name": "finish", "args": {} } }
            ]
        });

        let turn = agent_turn(&content);

        assert_eq!(turn.text, "Starting the rebase.");
        assert_eq!(
            turn.call,
            Some(ToolCall {
                name: Some("start".to_string()),
                args: json!({ "base_commit": "abc1234" }),
            })
        );

        let unnamed = agent_turn(&json!({ "parts": [{ "functionCall": { "args": {} } }] }));
        assert_eq!(unnamed.call.unwrap().name, None);
    }

    #[test]
    fn declarations_are_rendered_for_the_tools_field() {
        let rendered = function_declarations(&declarations());
        let entries = rendered.as_array().unwrap();

        assert_eq!(entries.len(), 6);
        assert_eq!(entries[0]["name"], "start");
        assert_eq!(entries[0]["parameters"]["type"], "OBJECT");
        assert_eq!(
            entries[0]["parameters"]["properties"]["base_commit"]["type"],
            "STRING"
        );
        assert!(entries[3].get("parameters").is_none());
    }
}
