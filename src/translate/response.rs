use super::anthropic_types::{
    generate_message_id, ErrorResponse, MessagesResponse, ResponseContentBlock, StopReason, Usage,
};
use super::openai_types::{ChatCompletionResponse, ChatErrorResponse, ChatToolCall};

/// Translate an OpenAI Chat Completion response into an Anthropic Messages response.
/// Pure function: `model` is echoed back unchanged.
///
/// Text wins over tool calls: a choice carrying non-empty `content` becomes a
/// single text block even if it also lists tool calls.
pub fn openai_to_anthropic(resp: &ChatCompletionResponse, model: &str) -> MessagesResponse {
    let choice = resp.choices.first();

    let content = match choice {
        Some(c) => match (c.message.content.as_deref(), c.message.tool_calls.as_ref()) {
            (Some(text), _) if !text.is_empty() => vec![ResponseContentBlock::Text {
                text: text.to_string(),
            }],
            (_, Some(tool_calls)) => tool_calls.iter().map(tool_use_block).collect(),
            _ => Vec::new(),
        },
        None => Vec::new(),
    };

    let stop_reason = map_finish_reason(choice.and_then(|c| c.finish_reason.as_deref()));

    let mut message = MessagesResponse::new(generate_message_id(), model, content);
    message.stop_reason = Some(stop_reason);
    message.usage = resp.usage.as_ref().map(|u| Usage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });
    message
}

fn tool_use_block(tc: &ChatToolCall) -> ResponseContentBlock {
    ResponseContentBlock::ToolUse {
        id: tc.id.clone(),
        name: tc.function.name.clone(),
        input: parse_tool_input(tc.function.arguments.as_deref()),
    }
}

/// Parse tool-call arguments into an input object.
/// Absent, malformed, or non-object arguments degrade to `{}`.
pub fn parse_tool_input(arguments: Option<&str>) -> serde_json::Value {
    match arguments.map(|s| serde_json::from_str::<serde_json::Value>(s)) {
        Some(Ok(value @ serde_json::Value::Object(_))) => value,
        Some(Err(e)) => {
            tracing::debug!(error = %e, "Tool arguments are not valid JSON, using empty input");
            empty_input()
        }
        _ => empty_input(),
    }
}

pub(crate) fn empty_input() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Map OpenAI finish_reason to Anthropic stop_reason
pub fn map_finish_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("tool_calls") => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    }
}

/// Translate an OpenAI error into an Anthropic error response
pub fn openai_error_to_anthropic(err: &ChatErrorResponse) -> ErrorResponse {
    let error_type = match err.error.error_type.as_str() {
        "invalid_request_error" => "invalid_request_error",
        "rate_limit_error" | "rate_limit_exceeded" => "rate_limit_error",
        _ => "api_error",
    };

    ErrorResponse::new(error_type, &err.error.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::openai_types::*;
    use serde_json::json;

    fn make_response(message: ChoiceMessage, finish_reason: Option<&str>) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: "chatcmpl-abc123".to_string(),
            model: "gpt-4o".to_string(),
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason: finish_reason.map(String::from),
            }],
            usage: None,
        }
    }

    fn tool_call(id: &str, name: &str, arguments: Option<&str>) -> ChatToolCall {
        ChatToolCall {
            id: id.to_string(),
            call_type: Some("function".to_string()),
            function: ChatToolCallFunction {
                name: name.to_string(),
                arguments: arguments.map(String::from),
            },
        }
    }

    #[test]
    fn test_simple_text_response() {
        let resp = make_response(
            ChoiceMessage {
                content: Some("Hello!".to_string()),
                ..Default::default()
            },
            Some("stop"),
        );
        let result = openai_to_anthropic(&resp, "claude-sonnet-4-20250514");

        assert_eq!(result.role, "assistant");
        assert_eq!(result.response_type, "message");
        assert_eq!(result.model, "claude-sonnet-4-20250514");
        assert_eq!(result.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(result.stop_sequence, None);
        assert_eq!(
            result.content,
            vec![ResponseContentBlock::Text {
                text: "Hello!".to_string()
            }]
        );
        assert!(result.id.starts_with("msg_"));
    }

    #[test]
    fn test_tool_calls_preserve_order() {
        let resp = make_response(
            ChoiceMessage {
                content: None,
                tool_calls: Some(vec![
                    tool_call("call_1", "get_weather", Some(r#"{"city":"London"}"#)),
                    tool_call("call_2", "get_time", Some(r#"{"tz":"UTC"}"#)),
                ]),
                ..Default::default()
            },
            Some("tool_calls"),
        );

        let result = openai_to_anthropic(&resp, "test-model");

        assert_eq!(result.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(result.content.len(), 2);
        match &result.content[1] {
            ResponseContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "call_2");
                assert_eq!(name, "get_time");
                assert_eq!(input, &json!({"tz": "UTC"}));
            }
            other => panic!("Expected tool_use content block, got {other:?}"),
        }
    }

    #[test]
    fn test_text_takes_precedence_over_tool_calls() {
        let resp = make_response(
            ChoiceMessage {
                content: Some("Let me check.".to_string()),
                tool_calls: Some(vec![tool_call("call_abc", "search", Some("{}"))]),
                ..Default::default()
            },
            Some("tool_calls"),
        );

        let result = openai_to_anthropic(&resp, "test-model");
        assert_eq!(result.content.len(), 1);
        assert!(matches!(result.content[0], ResponseContentBlock::Text { .. }));
        assert_eq!(result.stop_reason, Some(StopReason::ToolUse));
    }

    #[test]
    fn test_bad_arguments_become_empty_input() {
        let resp = make_response(
            ChoiceMessage {
                tool_calls: Some(vec![
                    tool_call("a", "f", Some("{\"city\":")),
                    tool_call("b", "g", None),
                    tool_call("c", "h", Some("[1,2]")),
                ]),
                ..Default::default()
            },
            Some("tool_calls"),
        );

        let result = openai_to_anthropic(&resp, "test-model");
        for block in &result.content {
            match block {
                ResponseContentBlock::ToolUse { input, .. } => assert_eq!(input, &json!({})),
                other => panic!("Expected tool_use content block, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_null_tool_call_fields_still_translate() {
        let resp: ChatCompletionResponse = serde_json::from_str(
            r#"{"id":"chatcmpl-1","choices":[{"message":{"role":"assistant","content":null,"tool_calls":[
                {"id":null,"type":"function","function":{"name":"lookup","arguments":"{\"q\":1}"}},
                {"id":"call_2","type":"function","function":{"name":null,"arguments":null}}
            ]},"finish_reason":"tool_calls"}]}"#,
        )
        .unwrap();

        let result = openai_to_anthropic(&resp, "m");
        assert_eq!(result.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(
            result.content,
            vec![
                ResponseContentBlock::ToolUse {
                    id: String::new(),
                    name: "lookup".to_string(),
                    input: json!({"q": 1}),
                },
                ResponseContentBlock::ToolUse {
                    id: "call_2".to_string(),
                    name: String::new(),
                    input: json!({}),
                },
            ]
        );
    }

    #[test]
    fn test_empty_choice_yields_empty_content() {
        let resp = make_response(ChoiceMessage::default(), None);
        let result = openai_to_anthropic(&resp, "m");
        assert!(result.content.is_empty());
        assert_eq!(result.stop_reason, Some(StopReason::EndTurn));

        let no_choices = ChatCompletionResponse::default();
        let result = openai_to_anthropic(&no_choices, "m");
        assert!(result.content.is_empty());
        assert_eq!(result.stop_reason, Some(StopReason::EndTurn));
    }

    #[test]
    fn test_usage_mapped_when_reported() {
        let mut resp = make_response(
            ChoiceMessage {
                content: Some("hi".to_string()),
                ..Default::default()
            },
            Some("stop"),
        );
        resp.usage = Some(ChatUsage {
            prompt_tokens: 10,
            completion_tokens: 20,
            total_tokens: 30,
        });

        let result = openai_to_anthropic(&resp, "m");
        assert_eq!(
            result.usage,
            Some(Usage {
                input_tokens: 10,
                output_tokens: 20
            })
        );
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(map_finish_reason(Some("stop")), StopReason::EndTurn);
        assert_eq!(map_finish_reason(Some("length")), StopReason::EndTurn);
        assert_eq!(map_finish_reason(Some("tool_calls")), StopReason::ToolUse);
        assert_eq!(map_finish_reason(None), StopReason::EndTurn);
    }

    #[test]
    fn test_error_mapping() {
        let err = ChatErrorResponse {
            error: ChatError {
                message: "Too many requests".to_string(),
                error_type: "rate_limit_exceeded".to_string(),
                code: None,
            },
        };
        let mapped = openai_error_to_anthropic(&err);
        assert_eq!(mapped.error_type, "error");
        assert_eq!(mapped.error.error_type, "rate_limit_error");
        assert_eq!(mapped.error.message, "Too many requests");

        let err = ChatErrorResponse {
            error: ChatError {
                message: "boom".to_string(),
                error_type: "server_error".to_string(),
                code: None,
            },
        };
        assert_eq!(openai_error_to_anthropic(&err).error.error_type, "api_error");
    }
}
