use serde::{Deserialize, Serialize};

fn stream_default() -> bool {
    true
}

fn max_ctx_messages_default() -> i64 {
    10
}

/// A folder groups chats and carries default provider settings that new
/// chats inside it inherit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub system_message: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    /// Comma-separated knowledge collection ids, stored as entered.
    pub knowledge_collection_ids: Option<String>,
    #[serde(default = "stream_default")]
    pub stream: bool,
    #[serde(default = "max_ctx_messages_default")]
    pub max_ctx_messages: i64,
    pub created_at: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub folder_id: Option<String>,
    pub name: Option<String>,
    pub summary: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub system_message: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    #[serde(default = "stream_default")]
    pub stream: bool,
    pub context: Option<String>,
    #[serde(default = "max_ctx_messages_default")]
    pub max_ctx_messages: i64,
    pub prompt: Option<String>,
    pub input: Option<String>,
    pub created_at: Option<i64>,
}

/// One prompt/reply exchange inside a chat. `is_active` marks a message
/// whose reply is still streaming in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub prompt: Option<String>,
    pub reply: Option<String>,
    pub reasoning: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub chat_id: Option<String>,
    pub temperature: Option<f64>,
    pub model: Option<String>,
    pub memo: Option<String>,
    pub created_at: Option<i64>,
    #[serde(default)]
    pub is_active: bool,
    pub cited_files: Option<String>,
    pub cited_chunks: Option<String>,
    pub max_tokens: Option<i64>,
}

/// A bookmarked message, denormalized so it survives deletion of the chat
/// it came from. At most one bookmark per message (`msg_id` is unique).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    pub msg_id: String,
    pub prompt: Option<String>,
    pub reply: Option<String>,
    pub reasoning: Option<String>,
    pub temperature: Option<f64>,
    pub model: Option<String>,
    pub memo: Option<String>,
    #[serde(default)]
    pub favorite: bool,
    pub cited_files: Option<String>,
    pub cited_chunks: Option<String>,
    pub created_at: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: String,
    pub name: Option<String>,
    pub system_message: Option<String>,
    pub user_message: Option<String>,
    pub system_variables: Option<String>,
    pub user_variables: Option<String>,
    pub models: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub pined_at: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub id: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub input_price: Option<f64>,
    pub output_price: Option<f64>,
    pub created_at: Option<i64>,
}

/// Aggregated token counts for one provider+model pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotal {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeCollection {
    pub id: String,
    pub name: String,
    pub memo: Option<String>,
    pub pined_at: Option<i64>,
    #[serde(default)]
    pub favorite: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeFile {
    pub id: String,
    pub collection_id: String,
    pub name: String,
    pub size: Option<i64>,
    pub num_of_chunks: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_field_names_match_the_columns() {
        let chat = Chat {
            id: "c1".to_owned(),
            folder_id: Some("f1".to_owned()),
            name: None,
            summary: None,
            provider: None,
            model: None,
            system_message: None,
            temperature: None,
            max_tokens: None,
            stream: true,
            context: None,
            max_ctx_messages: 10,
            prompt: None,
            input: None,
            created_at: Some(1),
        };
        let json = serde_json::to_value(&chat).unwrap();
        assert_eq!(json["folderId"], "f1");
        assert_eq!(json["maxCtxMessages"], 10);
        assert_eq!(json["createdAt"], 1);
    }

    #[test]
    fn stream_and_ctx_window_default_like_the_schema() {
        let folder: Folder = serde_json::from_str(r#"{"id":"f1"}"#).unwrap();
        assert!(folder.stream);
        assert_eq!(folder.max_ctx_messages, 10);
        assert_eq!(folder.name, None);
    }
}
