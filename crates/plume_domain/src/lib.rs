mod entities;
pub use entities::{
    Bookmark, Chat, Folder, KnowledgeCollection, KnowledgeFile, Message, Prompt, Usage, UsageTotal,
};

mod ids;
pub use ids::{ENTITY_ID_LEN, new_entity_id};

pub mod paths;
