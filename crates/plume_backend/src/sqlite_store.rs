use crate::gateway::{self, BatchStatement, Row};
use crate::time::now_unix_seconds;
use anyhow::{Context as _, anyhow};
use plume_domain::{
    Bookmark, Chat, Folder, KnowledgeCollection, KnowledgeFile, Message, Prompt, Usage,
    UsageTotal, new_entity_id,
};
use rusqlite::{Connection, OptionalExtension as _, params};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

const LATEST_SCHEMA_VERSION: u32 = 4;

const MIGRATIONS: &[(u32, &str)] = &[
    (
        1,
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/migrations/0001_init.sql"
        )),
    ),
    (
        2,
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/migrations/0002_chat_columns.sql"
        )),
    ),
    (
        3,
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/migrations/0003_reasoning_columns.sql"
        )),
    ),
    (
        4,
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/migrations/0004_folder_provider.sql"
        )),
    ),
];

/// Handle to the persistence worker. Cloning shares the single worker
/// thread and its one database connection; SQLite serializes writers, this
/// layer adds no locking of its own.
///
/// The raw `run`/`query_all`/`query_one`/`run_batch` operations never
/// surface errors: failures are logged and collapse to
/// `false`/empty/`None`. Typed operations return `anyhow::Result`.
#[derive(Clone)]
pub struct SqliteStore {
    tx: mpsc::Sender<DbCommand>,
}

enum DbCommand {
    Run {
        sql: String,
        params: Value,
        reply: mpsc::Sender<bool>,
    },
    QueryAll {
        sql: String,
        params: Value,
        reply: mpsc::Sender<Vec<Row>>,
    },
    QueryOne {
        sql: String,
        id: Value,
        reply: mpsc::Sender<Option<Row>>,
    },
    RunBatch {
        statements: Vec<BatchStatement>,
        reply: mpsc::Sender<bool>,
    },
    CreateFolder {
        folder: Box<Folder>,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    ListFolders {
        reply: mpsc::Sender<anyhow::Result<Vec<Folder>>>,
    },
    DeleteFolder {
        id: String,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    CreateChat {
        chat: Box<Chat>,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    GetChat {
        id: String,
        reply: mpsc::Sender<anyhow::Result<Option<Chat>>>,
    },
    ListChats {
        reply: mpsc::Sender<anyhow::Result<Vec<Chat>>>,
    },
    UpdateChat {
        chat: Box<Chat>,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    DeleteChat {
        id: String,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    CreateMessage {
        message: Box<Message>,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    ListChatMessages {
        chat_id: String,
        reply: mpsc::Sender<anyhow::Result<Vec<Message>>>,
    },
    UpdateMessageReply {
        id: String,
        reply_text: Option<String>,
        reasoning: Option<String>,
        input_tokens: Option<i64>,
        output_tokens: Option<i64>,
        is_active: bool,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    DeleteMessage {
        id: String,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    CreateBookmark {
        bookmark: Box<Bookmark>,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    GetBookmarkByMsgId {
        msg_id: String,
        reply: mpsc::Sender<anyhow::Result<Option<Bookmark>>>,
    },
    ListBookmarks {
        reply: mpsc::Sender<anyhow::Result<Vec<Bookmark>>>,
    },
    SetBookmarkFavorite {
        id: String,
        favorite: bool,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    DeleteBookmark {
        id: String,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    CreatePrompt {
        prompt: Box<Prompt>,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    ListPrompts {
        reply: mpsc::Sender<anyhow::Result<Vec<Prompt>>>,
    },
    UpdatePrompt {
        prompt: Box<Prompt>,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    SetPromptPinned {
        id: String,
        pined_at: Option<i64>,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    DeletePrompt {
        id: String,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    InsertUsage {
        usage: Box<Usage>,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    UsageTotalsSince {
        since: i64,
        reply: mpsc::Sender<anyhow::Result<Vec<UsageTotal>>>,
    },
    CreateKnowledgeCollection {
        collection: Box<KnowledgeCollection>,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    ListKnowledgeCollections {
        reply: mpsc::Sender<anyhow::Result<Vec<KnowledgeCollection>>>,
    },
    UpdateKnowledgeCollection {
        id: String,
        name: String,
        memo: Option<String>,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    SetKnowledgeCollectionFavorite {
        id: String,
        favorite: bool,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    DeleteKnowledgeCollection {
        id: String,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    CreateKnowledgeFile {
        file: Box<KnowledgeFile>,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    ListCollectionFiles {
        collection_id: String,
        reply: mpsc::Sender<anyhow::Result<Vec<KnowledgeFile>>>,
    },
    DeleteKnowledgeFile {
        id: String,
        reply: mpsc::Sender<anyhow::Result<bool>>,
    },
    SetChatKnowledgeCollections {
        chat_id: String,
        collection_ids: Vec<String>,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    ListChatKnowledgeCollectionIds {
        chat_id: String,
        reply: mpsc::Sender<anyhow::Result<Vec<String>>>,
    },
}

impl SqliteStore {
    /// Opens (creating and migrating as needed) the database at `db_path`
    /// and starts the worker. A schema or migration failure is returned
    /// here, before any request is accepted: the store never serves a
    /// partially-initialized database.
    pub fn new(db_path: PathBuf) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<()>>();

        std::thread::Builder::new()
            .name("plume-sqlite".to_owned())
            .spawn(move || {
                let mut db = match SqliteDatabase::open(&db_path) {
                    Ok(db) => {
                        let _ = ready_tx.send(Ok(()));
                        db
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                while let Ok(cmd) = rx.recv() {
                    dispatch(&mut db, cmd);
                }
            })
            .context("failed to spawn sqlite worker thread")?;

        ready_rx
            .recv()
            .context("sqlite worker terminated before reporting readiness")??;
        Ok(Self { tx })
    }

    /// Runs one caller-supplied statement. `false` on any failure.
    pub fn run(&self, sql: String, params: Value) -> bool {
        let (reply_tx, reply_rx) = mpsc::channel();
        if self
            .tx
            .send(DbCommand::Run {
                sql,
                params,
                reply: reply_tx,
            })
            .is_err()
        {
            tracing::error!("db-run dropped: sqlite worker is not running");
            return false;
        }
        reply_rx.recv().unwrap_or(false)
    }

    /// Fetches every matching row. Empty on failure as well as on no match.
    pub fn query_all(&self, sql: String, params: Value) -> Vec<Row> {
        let (reply_tx, reply_rx) = mpsc::channel();
        if self
            .tx
            .send(DbCommand::QueryAll {
                sql,
                params,
                reply: reply_tx,
            })
            .is_err()
        {
            tracing::error!("db-all dropped: sqlite worker is not running");
            return Vec::new();
        }
        reply_rx.recv().unwrap_or_default()
    }

    /// Fetches one row by id. `None` on failure as well as on absence.
    pub fn query_one(&self, sql: String, id: Value) -> Option<Row> {
        let (reply_tx, reply_rx) = mpsc::channel();
        if self
            .tx
            .send(DbCommand::QueryOne {
                sql,
                id,
                reply: reply_tx,
            })
            .is_err()
        {
            tracing::error!("db-get dropped: sqlite worker is not running");
            return None;
        }
        reply_rx.recv().unwrap_or(None)
    }

    /// Runs an ordered batch atomically; the whole batch commits or none of
    /// it does. `false` on any failure.
    pub fn run_batch(&self, statements: Vec<BatchStatement>) -> bool {
        let (reply_tx, reply_rx) = mpsc::channel();
        if self
            .tx
            .send(DbCommand::RunBatch {
                statements,
                reply: reply_tx,
            })
            .is_err()
        {
            tracing::error!("db-transaction dropped: sqlite worker is not running");
            return false;
        }
        reply_rx.recv().unwrap_or(false)
    }

    pub fn create_folder(&self, folder: Folder) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::CreateFolder {
                folder: Box::new(folder),
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn list_folders(&self) -> anyhow::Result<Vec<Folder>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::ListFolders { reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    /// Deletes a folder and detaches its chats. Chats themselves survive.
    pub fn delete_folder(&self, id: String) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::DeleteFolder { id, reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn create_chat(&self, chat: Chat) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::CreateChat {
                chat: Box::new(chat),
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn get_chat(&self, id: String) -> anyhow::Result<Option<Chat>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::GetChat { id, reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn list_chats(&self) -> anyhow::Result<Vec<Chat>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::ListChats { reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn update_chat(&self, chat: Chat) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::UpdateChat {
                chat: Box::new(chat),
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    /// Deletes a chat; its messages and knowledge relations cascade away.
    pub fn delete_chat(&self, id: String) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::DeleteChat { id, reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn create_message(&self, message: Message) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::CreateMessage {
                message: Box::new(message),
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn list_chat_messages(&self, chat_id: String) -> anyhow::Result<Vec<Message>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::ListChatMessages {
                chat_id,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    /// Stores a finished (or re-streamed) reply on an existing message.
    #[allow(clippy::too_many_arguments)]
    pub fn update_message_reply(
        &self,
        id: String,
        reply_text: Option<String>,
        reasoning: Option<String>,
        input_tokens: Option<i64>,
        output_tokens: Option<i64>,
        is_active: bool,
    ) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::UpdateMessageReply {
                id,
                reply_text,
                reasoning,
                input_tokens,
                output_tokens,
                is_active,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn delete_message(&self, id: String) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::DeleteMessage { id, reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    /// Creates a bookmark. Bookmarking an already-bookmarked message
    /// refreshes the stored copy in place; the original bookmark id and its
    /// favorite flag are kept (`msgId` stays unique).
    pub fn create_bookmark(&self, bookmark: Bookmark) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::CreateBookmark {
                bookmark: Box::new(bookmark),
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn get_bookmark_by_msg_id(&self, msg_id: String) -> anyhow::Result<Option<Bookmark>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::GetBookmarkByMsgId {
                msg_id,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn list_bookmarks(&self) -> anyhow::Result<Vec<Bookmark>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::ListBookmarks { reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn set_bookmark_favorite(&self, id: String, favorite: bool) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::SetBookmarkFavorite {
                id,
                favorite,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn delete_bookmark(&self, id: String) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::DeleteBookmark { id, reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn create_prompt(&self, prompt: Prompt) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::CreatePrompt {
                prompt: Box::new(prompt),
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn list_prompts(&self) -> anyhow::Result<Vec<Prompt>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::ListPrompts { reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn update_prompt(&self, prompt: Prompt) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::UpdatePrompt {
                prompt: Box::new(prompt),
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn set_prompt_pinned(&self, id: String, pined_at: Option<i64>) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::SetPromptPinned {
                id,
                pined_at,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn delete_prompt(&self, id: String) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::DeletePrompt { id, reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn insert_usage(&self, usage: Usage) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::InsertUsage {
                usage: Box::new(usage),
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    /// Token totals per provider+model for rows stamped at or after `since`.
    pub fn usage_totals_since(&self, since: i64) -> anyhow::Result<Vec<UsageTotal>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::UsageTotalsSince {
                since,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn create_knowledge_collection(
        &self,
        collection: KnowledgeCollection,
    ) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::CreateKnowledgeCollection {
                collection: Box::new(collection),
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn list_knowledge_collections(&self) -> anyhow::Result<Vec<KnowledgeCollection>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::ListKnowledgeCollections { reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn update_knowledge_collection(
        &self,
        id: String,
        name: String,
        memo: Option<String>,
    ) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::UpdateKnowledgeCollection {
                id,
                name,
                memo,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn set_knowledge_collection_favorite(
        &self,
        id: String,
        favorite: bool,
    ) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::SetKnowledgeCollectionFavorite {
                id,
                favorite,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    /// Deletes a collection; its files and chat relations cascade away.
    pub fn delete_knowledge_collection(&self, id: String) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::DeleteKnowledgeCollection { id, reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn create_knowledge_file(&self, file: KnowledgeFile) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::CreateKnowledgeFile {
                file: Box::new(file),
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn list_collection_files(&self, collection_id: String) -> anyhow::Result<Vec<KnowledgeFile>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::ListCollectionFiles {
                collection_id,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn delete_knowledge_file(&self, id: String) -> anyhow::Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::DeleteKnowledgeFile { id, reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    /// Replaces the set of knowledge collections attached to a chat in one
    /// atomic step.
    pub fn set_chat_knowledge_collections(
        &self,
        chat_id: String,
        collection_ids: Vec<String>,
    ) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::SetChatKnowledgeCollections {
                chat_id,
                collection_ids,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn list_chat_knowledge_collection_ids(
        &self,
        chat_id: String,
    ) -> anyhow::Result<Vec<String>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::ListChatKnowledgeCollectionIds {
                chat_id,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }
}

fn dispatch(db: &mut SqliteDatabase, cmd: DbCommand) {
    match cmd {
        DbCommand::Run { sql, params, reply } => {
            tracing::debug!(sql, params = %params, "db-run");
            let result = gateway::run(&db.conn, &sql, &params);
            let _ = reply.send(swallow("db-run", &sql, result).is_some());
        }
        DbCommand::QueryAll { sql, params, reply } => {
            tracing::debug!(sql, params = %params, "db-all");
            let result = gateway::query_all(&db.conn, &sql, &params);
            let _ = reply.send(swallow("db-all", &sql, result).unwrap_or_default());
        }
        DbCommand::QueryOne { sql, id, reply } => {
            tracing::debug!(sql, id = %id, "db-get");
            let result = gateway::query_one(&db.conn, &sql, &id);
            let _ = reply.send(swallow("db-get", &sql, result).flatten());
        }
        DbCommand::RunBatch { statements, reply } => {
            tracing::debug!(
                statements = %serde_json::to_string(&statements).unwrap_or_default(),
                "db-transaction"
            );
            let result = gateway::run_batch(&db.conn, &statements);
            let _ = reply.send(swallow("db-transaction", "", result).is_some());
        }
        DbCommand::CreateFolder { folder, reply } => {
            let _ = reply.send(db.create_folder(&folder));
        }
        DbCommand::ListFolders { reply } => {
            let _ = reply.send(db.list_folders());
        }
        DbCommand::DeleteFolder { id, reply } => {
            let _ = reply.send(db.delete_folder(&id));
        }
        DbCommand::CreateChat { chat, reply } => {
            let _ = reply.send(db.create_chat(&chat));
        }
        DbCommand::GetChat { id, reply } => {
            let _ = reply.send(db.get_chat(&id));
        }
        DbCommand::ListChats { reply } => {
            let _ = reply.send(db.list_chats());
        }
        DbCommand::UpdateChat { chat, reply } => {
            let _ = reply.send(db.update_chat(&chat));
        }
        DbCommand::DeleteChat { id, reply } => {
            let _ = reply.send(db.delete_chat(&id));
        }
        DbCommand::CreateMessage { message, reply } => {
            let _ = reply.send(db.create_message(&message));
        }
        DbCommand::ListChatMessages { chat_id, reply } => {
            let _ = reply.send(db.list_chat_messages(&chat_id));
        }
        DbCommand::UpdateMessageReply {
            id,
            reply_text,
            reasoning,
            input_tokens,
            output_tokens,
            is_active,
            reply,
        } => {
            let _ = reply.send(db.update_message_reply(
                &id,
                reply_text.as_deref(),
                reasoning.as_deref(),
                input_tokens,
                output_tokens,
                is_active,
            ));
        }
        DbCommand::DeleteMessage { id, reply } => {
            let _ = reply.send(db.delete_message(&id));
        }
        DbCommand::CreateBookmark { bookmark, reply } => {
            let _ = reply.send(db.create_bookmark(&bookmark));
        }
        DbCommand::GetBookmarkByMsgId { msg_id, reply } => {
            let _ = reply.send(db.get_bookmark_by_msg_id(&msg_id));
        }
        DbCommand::ListBookmarks { reply } => {
            let _ = reply.send(db.list_bookmarks());
        }
        DbCommand::SetBookmarkFavorite { id, favorite, reply } => {
            let _ = reply.send(db.set_bookmark_favorite(&id, favorite));
        }
        DbCommand::DeleteBookmark { id, reply } => {
            let _ = reply.send(db.delete_bookmark(&id));
        }
        DbCommand::CreatePrompt { prompt, reply } => {
            let _ = reply.send(db.create_prompt(&prompt));
        }
        DbCommand::ListPrompts { reply } => {
            let _ = reply.send(db.list_prompts());
        }
        DbCommand::UpdatePrompt { prompt, reply } => {
            let _ = reply.send(db.update_prompt(&prompt));
        }
        DbCommand::SetPromptPinned { id, pined_at, reply } => {
            let _ = reply.send(db.set_prompt_pinned(&id, pined_at));
        }
        DbCommand::DeletePrompt { id, reply } => {
            let _ = reply.send(db.delete_prompt(&id));
        }
        DbCommand::InsertUsage { usage, reply } => {
            let _ = reply.send(db.insert_usage(&usage));
        }
        DbCommand::UsageTotalsSince { since, reply } => {
            let _ = reply.send(db.usage_totals_since(since));
        }
        DbCommand::CreateKnowledgeCollection { collection, reply } => {
            let _ = reply.send(db.create_knowledge_collection(&collection));
        }
        DbCommand::ListKnowledgeCollections { reply } => {
            let _ = reply.send(db.list_knowledge_collections());
        }
        DbCommand::UpdateKnowledgeCollection {
            id,
            name,
            memo,
            reply,
        } => {
            let _ = reply.send(db.update_knowledge_collection(&id, &name, memo.as_deref()));
        }
        DbCommand::SetKnowledgeCollectionFavorite { id, favorite, reply } => {
            let _ = reply.send(db.set_knowledge_collection_favorite(&id, favorite));
        }
        DbCommand::DeleteKnowledgeCollection { id, reply } => {
            let _ = reply.send(db.delete_knowledge_collection(&id));
        }
        DbCommand::CreateKnowledgeFile { file, reply } => {
            let _ = reply.send(db.create_knowledge_file(&file));
        }
        DbCommand::ListCollectionFiles {
            collection_id,
            reply,
        } => {
            let _ = reply.send(db.list_collection_files(&collection_id));
        }
        DbCommand::DeleteKnowledgeFile { id, reply } => {
            let _ = reply.send(db.delete_knowledge_file(&id));
        }
        DbCommand::SetChatKnowledgeCollections {
            chat_id,
            collection_ids,
            reply,
        } => {
            let _ = reply.send(db.set_chat_knowledge_collections(&chat_id, &collection_ids));
        }
        DbCommand::ListChatKnowledgeCollectionIds { chat_id, reply } => {
            let _ = reply.send(db.list_chat_knowledge_collection_ids(&chat_id));
        }
    }
}

/// Collapses a raw-gateway failure to its falsy response, keeping the
/// detail in the log only.
fn swallow<T>(op: &str, sql: &str, result: anyhow::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), sql, "{} failed", op);
            None
        }
    }
}

#[derive(Debug)]
struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut conn = Connection::open(db_path)
            .with_context(|| format!("failed to open sqlite db {}", db_path.display()))?;

        configure_connection(&mut conn).context("failed to configure sqlite connection")?;
        apply_migrations(&mut conn).context("failed to apply sqlite migrations")?;

        Ok(Self { conn })
    }

    fn create_folder(&mut self, folder: &Folder) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO folders (id, name, provider, model, systemMessage, temperature,
                                  maxTokens, knowledgeCollectionIds, stream, maxCtxMessages, createdAt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                folder.id,
                folder.name,
                folder.provider,
                folder.model,
                folder.system_message,
                folder.temperature,
                folder.max_tokens,
                folder.knowledge_collection_ids,
                folder.stream,
                folder.max_ctx_messages,
                folder.created_at,
            ],
        )?;
        Ok(())
    }

    fn list_folders(&mut self) -> anyhow::Result<Vec<Folder>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, provider, model, systemMessage, temperature, maxTokens,
                    knowledgeCollectionIds, stream, maxCtxMessages, createdAt
             FROM folders ORDER BY createdAt ASC",
        )?;
        let rows = stmt.query_map([], folder_from_row)?;
        let mut folders = Vec::new();
        for row in rows {
            folders.push(row?);
        }
        Ok(folders)
    }

    /// `chats.folderId` carries no foreign key, so detaching is explicit
    /// and rides the same transaction as the delete.
    fn delete_folder(&mut self, id: &str) -> anyhow::Result<bool> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE chats SET folderId = NULL WHERE folderId = ?1",
            params![id],
        )?;
        let deleted = tx.execute("DELETE FROM folders WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn create_chat(&mut self, chat: &Chat) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO chats (id, folderId, name, summary, provider, model, systemMessage,
                                temperature, maxTokens, stream, context, maxCtxMessages,
                                prompt, input, createdAt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                chat.id,
                chat.folder_id,
                chat.name,
                chat.summary,
                chat.provider,
                chat.model,
                chat.system_message,
                chat.temperature,
                chat.max_tokens,
                chat.stream,
                chat.context,
                chat.max_ctx_messages,
                chat.prompt,
                chat.input,
                chat.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_chat(&mut self, id: &str) -> anyhow::Result<Option<Chat>> {
        self.conn
            .query_row(
                "SELECT id, folderId, name, summary, provider, model, systemMessage,
                        temperature, maxTokens, stream, context, maxCtxMessages,
                        prompt, input, createdAt
                 FROM chats WHERE id = ?1",
                params![id],
                chat_from_row,
            )
            .optional()
            .context("failed to load chat")
    }

    fn list_chats(&mut self) -> anyhow::Result<Vec<Chat>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, folderId, name, summary, provider, model, systemMessage,
                    temperature, maxTokens, stream, context, maxCtxMessages,
                    prompt, input, createdAt
             FROM chats ORDER BY createdAt DESC",
        )?;
        let rows = stmt.query_map([], chat_from_row)?;
        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    fn update_chat(&mut self, chat: &Chat) -> anyhow::Result<bool> {
        let updated = self.conn.execute(
            "UPDATE chats SET folderId = ?2, name = ?3, summary = ?4, provider = ?5,
                              model = ?6, systemMessage = ?7, temperature = ?8,
                              maxTokens = ?9, stream = ?10, context = ?11,
                              maxCtxMessages = ?12, prompt = ?13, input = ?14
             WHERE id = ?1",
            params![
                chat.id,
                chat.folder_id,
                chat.name,
                chat.summary,
                chat.provider,
                chat.model,
                chat.system_message,
                chat.temperature,
                chat.max_tokens,
                chat.stream,
                chat.context,
                chat.max_ctx_messages,
                chat.prompt,
                chat.input,
            ],
        )?;
        Ok(updated > 0)
    }

    fn delete_chat(&mut self, id: &str) -> anyhow::Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM chats WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn create_message(&mut self, message: &Message) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO messages (id, prompt, reply, reasoning, inputTokens, outputTokens,
                                   chatId, temperature, model, memo, createdAt, isActive,
                                   citedFiles, citedChunks, maxTokens)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                message.id,
                message.prompt,
                message.reply,
                message.reasoning,
                message.input_tokens,
                message.output_tokens,
                message.chat_id,
                message.temperature,
                message.model,
                message.memo,
                message.created_at,
                message.is_active,
                message.cited_files,
                message.cited_chunks,
                message.max_tokens,
            ],
        )?;
        Ok(())
    }

    fn list_chat_messages(&mut self, chat_id: &str) -> anyhow::Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, prompt, reply, reasoning, inputTokens, outputTokens, chatId,
                    temperature, model, memo, createdAt, isActive, citedFiles,
                    citedChunks, maxTokens
             FROM messages WHERE chatId = ?1 ORDER BY createdAt ASC",
        )?;
        let rows = stmt.query_map(params![chat_id], message_from_row)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    fn update_message_reply(
        &mut self,
        id: &str,
        reply: Option<&str>,
        reasoning: Option<&str>,
        input_tokens: Option<i64>,
        output_tokens: Option<i64>,
        is_active: bool,
    ) -> anyhow::Result<bool> {
        let updated = self.conn.execute(
            "UPDATE messages SET reply = ?2, reasoning = ?3, inputTokens = ?4,
                                 outputTokens = ?5, isActive = ?6
             WHERE id = ?1",
            params![id, reply, reasoning, input_tokens, output_tokens, is_active],
        )?;
        Ok(updated > 0)
    }

    fn delete_message(&mut self, id: &str) -> anyhow::Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn create_bookmark(&mut self, bookmark: &Bookmark) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO bookmarks (id, msgId, prompt, reply, reasoning, temperature,
                                    model, memo, favorite, citedFiles, citedChunks, createdAt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(msgId) DO UPDATE SET
               prompt = excluded.prompt,
               reply = excluded.reply,
               reasoning = excluded.reasoning,
               temperature = excluded.temperature,
               model = excluded.model,
               memo = excluded.memo,
               citedFiles = excluded.citedFiles,
               citedChunks = excluded.citedChunks",
            params![
                bookmark.id,
                bookmark.msg_id,
                bookmark.prompt,
                bookmark.reply,
                bookmark.reasoning,
                bookmark.temperature,
                bookmark.model,
                bookmark.memo,
                bookmark.favorite,
                bookmark.cited_files,
                bookmark.cited_chunks,
                bookmark.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_bookmark_by_msg_id(&mut self, msg_id: &str) -> anyhow::Result<Option<Bookmark>> {
        self.conn
            .query_row(
                "SELECT id, msgId, prompt, reply, reasoning, temperature, model, memo,
                        favorite, citedFiles, citedChunks, createdAt
                 FROM bookmarks WHERE msgId = ?1",
                params![msg_id],
                bookmark_from_row,
            )
            .optional()
            .context("failed to load bookmark")
    }

    fn list_bookmarks(&mut self) -> anyhow::Result<Vec<Bookmark>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, msgId, prompt, reply, reasoning, temperature, model, memo,
                    favorite, citedFiles, citedChunks, createdAt
             FROM bookmarks ORDER BY favorite DESC, createdAt DESC",
        )?;
        let rows = stmt.query_map([], bookmark_from_row)?;
        let mut bookmarks = Vec::new();
        for row in rows {
            bookmarks.push(row?);
        }
        Ok(bookmarks)
    }

    fn set_bookmark_favorite(&mut self, id: &str, favorite: bool) -> anyhow::Result<bool> {
        let updated = self.conn.execute(
            "UPDATE bookmarks SET favorite = ?2 WHERE id = ?1",
            params![id, favorite],
        )?;
        Ok(updated > 0)
    }

    fn delete_bookmark(&mut self, id: &str) -> anyhow::Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM bookmarks WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn create_prompt(&mut self, prompt: &Prompt) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO prompts (id, name, systemMessage, userMessage, systemVariables,
                                  userVariables, models, temperature, maxTokens,
                                  createdAt, updatedAt, pinedAt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                prompt.id,
                prompt.name,
                prompt.system_message,
                prompt.user_message,
                prompt.system_variables,
                prompt.user_variables,
                prompt.models,
                prompt.temperature,
                prompt.max_tokens,
                prompt.created_at,
                prompt.updated_at,
                prompt.pined_at,
            ],
        )?;
        Ok(())
    }

    fn list_prompts(&mut self) -> anyhow::Result<Vec<Prompt>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, systemMessage, userMessage, systemVariables, userVariables,
                    models, temperature, maxTokens, createdAt, updatedAt, pinedAt
             FROM prompts ORDER BY pinedAt IS NULL, pinedAt DESC, createdAt DESC",
        )?;
        let rows = stmt.query_map([], prompt_from_row)?;
        let mut prompts = Vec::new();
        for row in rows {
            prompts.push(row?);
        }
        Ok(prompts)
    }

    fn update_prompt(&mut self, prompt: &Prompt) -> anyhow::Result<bool> {
        let now = now_unix_seconds();
        let updated = self.conn.execute(
            "UPDATE prompts SET name = ?2, systemMessage = ?3, userMessage = ?4,
                                systemVariables = ?5, userVariables = ?6, models = ?7,
                                temperature = ?8, maxTokens = ?9, updatedAt = ?10
             WHERE id = ?1",
            params![
                prompt.id,
                prompt.name,
                prompt.system_message,
                prompt.user_message,
                prompt.system_variables,
                prompt.user_variables,
                prompt.models,
                prompt.temperature,
                prompt.max_tokens,
                now,
            ],
        )?;
        Ok(updated > 0)
    }

    fn set_prompt_pinned(&mut self, id: &str, pined_at: Option<i64>) -> anyhow::Result<bool> {
        let now = now_unix_seconds();
        let updated = self.conn.execute(
            "UPDATE prompts SET pinedAt = ?2, updatedAt = ?3 WHERE id = ?1",
            params![id, pined_at, now],
        )?;
        Ok(updated > 0)
    }

    fn delete_prompt(&mut self, id: &str) -> anyhow::Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM prompts WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn insert_usage(&mut self, usage: &Usage) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO usages (id, provider, model, inputTokens, outputTokens,
                                 inputPrice, outputPrice, createdAt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                usage.id,
                usage.provider,
                usage.model,
                usage.input_tokens,
                usage.output_tokens,
                usage.input_price,
                usage.output_price,
                usage.created_at,
            ],
        )?;
        Ok(())
    }

    fn usage_totals_since(&mut self, since: i64) -> anyhow::Result<Vec<UsageTotal>> {
        let mut stmt = self.conn.prepare(
            "SELECT provider, model,
                    COALESCE(SUM(inputTokens), 0), COALESCE(SUM(outputTokens), 0)
             FROM usages WHERE createdAt >= ?1
             GROUP BY provider, model
             ORDER BY provider ASC, model ASC",
        )?;
        let rows = stmt.query_map(params![since], |row| {
            Ok(UsageTotal {
                provider: row.get(0)?,
                model: row.get(1)?,
                input_tokens: row.get(2)?,
                output_tokens: row.get(3)?,
            })
        })?;
        let mut totals = Vec::new();
        for row in rows {
            totals.push(row?);
        }
        Ok(totals)
    }

    fn create_knowledge_collection(
        &mut self,
        collection: &KnowledgeCollection,
    ) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO knowledge_collections (id, name, memo, pinedAt, favorite,
                                                createdAt, updatedAt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                collection.id,
                collection.name,
                collection.memo,
                collection.pined_at,
                collection.favorite,
                collection.created_at,
                collection.updated_at,
            ],
        )?;
        Ok(())
    }

    fn list_knowledge_collections(&mut self) -> anyhow::Result<Vec<KnowledgeCollection>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, memo, pinedAt, favorite, createdAt, updatedAt
             FROM knowledge_collections
             ORDER BY pinedAt IS NULL, pinedAt DESC, createdAt DESC",
        )?;
        let rows = stmt.query_map([], knowledge_collection_from_row)?;
        let mut collections = Vec::new();
        for row in rows {
            collections.push(row?);
        }
        Ok(collections)
    }

    fn update_knowledge_collection(
        &mut self,
        id: &str,
        name: &str,
        memo: Option<&str>,
    ) -> anyhow::Result<bool> {
        let now = now_unix_seconds();
        let updated = self.conn.execute(
            "UPDATE knowledge_collections SET name = ?2, memo = ?3, updatedAt = ?4
             WHERE id = ?1",
            params![id, name, memo, now],
        )?;
        Ok(updated > 0)
    }

    fn set_knowledge_collection_favorite(
        &mut self,
        id: &str,
        favorite: bool,
    ) -> anyhow::Result<bool> {
        let now = now_unix_seconds();
        let updated = self.conn.execute(
            "UPDATE knowledge_collections SET favorite = ?2, updatedAt = ?3 WHERE id = ?1",
            params![id, favorite, now],
        )?;
        Ok(updated > 0)
    }

    fn delete_knowledge_collection(&mut self, id: &str) -> anyhow::Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM knowledge_collections WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn create_knowledge_file(&mut self, file: &KnowledgeFile) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO knowledge_files (id, collectionId, name, size, numOfChunks,
                                          createdAt, updatedAt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                file.id,
                file.collection_id,
                file.name,
                file.size,
                file.num_of_chunks,
                file.created_at,
                file.updated_at,
            ],
        )?;
        Ok(())
    }

    fn list_collection_files(&mut self, collection_id: &str) -> anyhow::Result<Vec<KnowledgeFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, collectionId, name, size, numOfChunks, createdAt, updatedAt
             FROM knowledge_files WHERE collectionId = ?1 ORDER BY createdAt ASC",
        )?;
        let rows = stmt.query_map(params![collection_id], knowledge_file_from_row)?;
        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    fn delete_knowledge_file(&mut self, id: &str) -> anyhow::Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM knowledge_files WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn set_chat_knowledge_collections(
        &mut self,
        chat_id: &str,
        collection_ids: &[String],
    ) -> anyhow::Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM chat_knowledge_rels WHERE chatId = ?1",
            params![chat_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chat_knowledge_rels (id, chatId, collectionId) VALUES (?1, ?2, ?3)",
            )?;
            for collection_id in collection_ids {
                stmt.execute(params![new_entity_id(), chat_id, collection_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn list_chat_knowledge_collection_ids(&mut self, chat_id: &str) -> anyhow::Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT collectionId FROM chat_knowledge_rels WHERE chatId = ?1
             ORDER BY collectionId ASC",
        )?;
        let rows = stmt.query_map(params![chat_id], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}

fn folder_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: row.get(0)?,
        name: row.get(1)?,
        provider: row.get(2)?,
        model: row.get(3)?,
        system_message: row.get(4)?,
        temperature: row.get(5)?,
        max_tokens: row.get(6)?,
        knowledge_collection_ids: row.get(7)?,
        stream: row.get::<_, Option<i64>>(8)?.map(|v| v != 0).unwrap_or(true),
        max_ctx_messages: row.get::<_, Option<i64>>(9)?.unwrap_or(10),
        created_at: row.get(10)?,
    })
}

fn chat_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        folder_id: row.get(1)?,
        name: row.get(2)?,
        summary: row.get(3)?,
        provider: row.get(4)?,
        model: row.get(5)?,
        system_message: row.get(6)?,
        temperature: row.get(7)?,
        max_tokens: row.get(8)?,
        stream: row.get::<_, Option<i64>>(9)?.map(|v| v != 0).unwrap_or(true),
        context: row.get(10)?,
        max_ctx_messages: row.get::<_, Option<i64>>(11)?.unwrap_or(10),
        prompt: row.get(12)?,
        input: row.get(13)?,
        created_at: row.get(14)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        prompt: row.get(1)?,
        reply: row.get(2)?,
        reasoning: row.get(3)?,
        input_tokens: row.get(4)?,
        output_tokens: row.get(5)?,
        chat_id: row.get(6)?,
        temperature: row.get(7)?,
        model: row.get(8)?,
        memo: row.get(9)?,
        created_at: row.get(10)?,
        is_active: row
            .get::<_, Option<i64>>(11)?
            .map(|v| v != 0)
            .unwrap_or(false),
        cited_files: row.get(12)?,
        cited_chunks: row.get(13)?,
        max_tokens: row.get(14)?,
    })
}

fn bookmark_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bookmark> {
    Ok(Bookmark {
        id: row.get(0)?,
        msg_id: row.get(1)?,
        prompt: row.get(2)?,
        reply: row.get(3)?,
        reasoning: row.get(4)?,
        temperature: row.get(5)?,
        model: row.get(6)?,
        memo: row.get(7)?,
        favorite: row
            .get::<_, Option<i64>>(8)?
            .map(|v| v != 0)
            .unwrap_or(false),
        cited_files: row.get(9)?,
        cited_chunks: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn prompt_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Prompt> {
    Ok(Prompt {
        id: row.get(0)?,
        name: row.get(1)?,
        system_message: row.get(2)?,
        user_message: row.get(3)?,
        system_variables: row.get(4)?,
        user_variables: row.get(5)?,
        models: row.get(6)?,
        temperature: row.get(7)?,
        max_tokens: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        pined_at: row.get(11)?,
    })
}

fn knowledge_collection_from_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<KnowledgeCollection> {
    Ok(KnowledgeCollection {
        id: row.get(0)?,
        name: row.get(1)?,
        memo: row.get(2)?,
        pined_at: row.get(3)?,
        favorite: row
            .get::<_, Option<i64>>(4)?
            .map(|v| v != 0)
            .unwrap_or(false),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn knowledge_file_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeFile> {
    Ok(KnowledgeFile {
        id: row.get(0)?,
        collection_id: row.get(1)?,
        name: row.get(2)?,
        size: row.get(3)?,
        num_of_chunks: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn configure_connection(conn: &mut Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )
    .context("failed to apply sqlite PRAGMAs")?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> anyhow::Result<()> {
    let mut current: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
        .context("failed to read user_version")? as u32;

    if current > LATEST_SCHEMA_VERSION {
        return Err(anyhow!(
            "sqlite schema version is newer than this build: db={}, app={}",
            current,
            LATEST_SCHEMA_VERSION
        ));
    }

    if current == LATEST_SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch("BEGIN IMMEDIATE;")
        .context("failed to begin migration transaction")?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        if let Err(err) = conn
            .execute_batch(sql)
            .with_context(|| format!("failed to apply migration v{version:04}"))
        {
            let _ = conn.execute_batch("ROLLBACK;");
            return Err(err);
        }
        if let Err(err) = conn
            .pragma_update(None, "user_version", *version as i64)
            .context("failed to update user_version")
        {
            let _ = conn.execute_batch("ROLLBACK;");
            return Err(err);
        }
        current = *version;
    }

    conn.execute_batch("COMMIT;")
        .context("failed to commit migration transaction")?;
    Ok(())
}
