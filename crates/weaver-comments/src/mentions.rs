//! Mention extraction from rich comment content.
//!
//! Comment content is a small document of `{type, attrs, content}` nodes. A
//! mention is a node of type `mention` with `attrs.id` (the node id deep
//! links point at) and `attrs.userId` (who gets notified).

use serde_json::Value;
use smol_str::SmolStr;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mention {
    pub node_id: SmolStr,
    pub user_id: SmolStr,
}

/// Every mention in `content`, depth first.
pub fn collect_mentions(content: &Value) -> Vec<Mention> {
    let mut out = Vec::new();
    walk(content, &mut out);
    out
}

fn walk(node: &Value, out: &mut Vec<Mention>) {
    match node {
        Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("mention") {
                let attrs = map.get("attrs");
                let field = |key: &str| {
                    attrs
                        .and_then(|a| a.get(key))
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(SmolStr::new)
                };
                if let (Some(node_id), Some(user_id)) = (field("id"), field("userId")) {
                    out.push(Mention { node_id, user_id });
                }
            }
            if let Some(children) = map.get("content") {
                walk(children, out);
            }
        }
        _ => {}
    }
}

/// Mentions in `new` whose user was not already mentioned in `old`.
pub fn new_mentions(old: &Value, new: &Value) -> Vec<Mention> {
    let before = collect_mentions(old);
    collect_mentions(new)
        .into_iter()
        .filter(|m| !before.iter().any(|b| b.user_id == m.user_id))
        .collect()
}

/// Whether `content` contains a mention node with this id.
pub fn contains_mention_node(content: &Value, node_id: &str) -> bool {
    collect_mentions(content)
        .iter()
        .any(|m| m.node_id == node_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paragraph(children: Value) -> Value {
        json!({"type": "doc", "content": [{"type": "paragraph", "content": children}]})
    }

    #[test]
    fn test_collect_nested_mentions() {
        let content = paragraph(json!([
            {"type": "text", "text": "hey "},
            {"type": "mention", "attrs": {"id": "m1", "userId": "u2"}},
            {"type": "mention", "attrs": {"id": "m2"}},
        ]));
        assert_eq!(
            collect_mentions(&content),
            vec![Mention {
                node_id: "m1".into(),
                user_id: "u2".into()
            }]
        );
        assert!(contains_mention_node(&content, "m1"));
        assert!(!contains_mention_node(&content, "m2"));
    }

    #[test]
    fn test_new_mentions_by_user() {
        let old = paragraph(json!([
            {"type": "mention", "attrs": {"id": "m1", "userId": "u2"}},
        ]));
        let new = paragraph(json!([
            {"type": "mention", "attrs": {"id": "m5", "userId": "u2"}},
            {"type": "mention", "attrs": {"id": "m6", "userId": "u3"}},
        ]));
        let fresh = new_mentions(&old, &new);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].user_id, "u3");
    }

    #[test]
    fn test_plain_values() {
        assert!(collect_mentions(&Value::Null).is_empty());
        assert!(collect_mentions(&json!("text")).is_empty());
    }
}
