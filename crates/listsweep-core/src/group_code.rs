use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use crate::container::SessionEntry;

/// Ordered rules deciding which session rows carry a group code. First match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCodePolicy {
    pub id: String,
    pub version: String,
    pub rules: Vec<GroupCodeRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCodeRule {
    pub id: String,
    /// evalexpr condition over the row signals, e.g. `unread > 0 && contains(name, "ops")`.
    pub when: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSignals {
    pub name: String,
    pub subtitle: String,
    pub time: String,
    pub unread: u32,
    pub member_count: u32,
    pub is_today: bool,
}

impl RowSignals {
    pub fn from_entry(entry: &SessionEntry) -> Self {
        Self {
            name: entry.name.clone(),
            subtitle: entry.subtitle.clone(),
            time: entry.time.clone(),
            unread: entry.unread,
            member_count: member_count(&entry.name).unwrap_or(0),
            is_today: entry.flags.is_today,
        }
    }
}

/// Group chats render their member count as a trailing `(N)`.
pub fn member_count(name: &str) -> Option<u32> {
    static COUNT: OnceLock<Regex> = OnceLock::new();
    let re = COUNT.get_or_init(|| Regex::new(r"\((\d+)\)\s*$").expect("member count pattern is valid"));
    re.captures(name)?.get(1)?.as_str().parse().ok()
}

impl Default for GroupCodePolicy {
    fn default() -> Self {
        Self {
            id: "builtin-group-code".to_string(),
            version: "1".to_string(),
            rules: vec![GroupCodeRule {
                id: "letters-dash-digits".to_string(),
                when: r#"regex_match(name, "[A-Z]{2,}-[0-9]{3,}")"#.to_string(),
            }],
        }
    }
}

impl GroupCodePolicy {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Id of the first rule whose condition holds for the row.
    pub fn matching_rule(&self, signals: &RowSignals) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| evaluate_condition(&rule.when, signals))
            .map(|rule| rule.id.as_str())
    }
}

fn evaluate_condition(condition: &str, signals: &RowSignals) -> bool {
    use evalexpr::*;

    let mut context = HashMapContext::new();
    context
        .set_value("name".into(), Value::String(signals.name.clone()))
        .ok();
    context
        .set_value("subtitle".into(), Value::String(signals.subtitle.clone()))
        .ok();
    context
        .set_value("time".into(), Value::String(signals.time.clone()))
        .ok();
    context
        .set_value("unread".into(), Value::Int(signals.unread as i64))
        .ok();
    context
        .set_value("member_count".into(), Value::Int(signals.member_count as i64))
        .ok();
    context
        .set_value("is_today".into(), Value::Boolean(signals.is_today))
        .ok();

    context
        .set_function(
            "contains".into(),
            Function::new(|argument| {
                let arguments = argument.as_tuple()?;
                match arguments.as_slice() {
                    [Value::String(haystack), Value::String(needle)] => {
                        Ok(Value::Boolean(haystack.contains(needle.as_str())))
                    }
                    _ => Err(EvalexprError::CustomMessage(
                        "contains() expects two string arguments".to_string(),
                    )),
                }
            }),
        )
        .ok();

    context
        .set_function(
            "regex_match".into(),
            Function::new(|argument| {
                let arguments = argument.as_tuple()?;
                match arguments.as_slice() {
                    [Value::String(text), Value::String(pattern)] => {
                        let re = Regex::new(pattern).map_err(|err| {
                            EvalexprError::CustomMessage(format!("invalid regex: {err}"))
                        })?;
                        Ok(Value::Boolean(re.is_match(text)))
                    }
                    _ => Err(EvalexprError::CustomMessage(
                        "regex_match() expects two string arguments".to_string(),
                    )),
                }
            }),
        )
        .ok();

    match eval_boolean_with_context(condition, &context) {
        Ok(result) => result,
        Err(err) => {
            log::warn!("group-code condition '{condition}' failed: {err}");
            false
        }
    }
}
