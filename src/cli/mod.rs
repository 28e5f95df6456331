use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Backend Args ---
    /// Base URL of the RAG API (e.g., http://localhost:8000)
    #[arg(long, env = "CHAT_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Route of the streaming chat endpoint, relative to the base URL.
    #[arg(long, env = "CHAT_ROUTE", default_value = "/chat/stream")]
    pub chat_route: String,

    /// Number of documents the backend should retrieve per question.
    #[arg(long, env = "RAG_DEFAULT_LIMIT", default_value = "5")]
    pub rag_limit: usize,

    /// Skip the `/health` check on startup.
    #[arg(long, env = "SKIP_HEALTH_CHECK", default_value = "false")]
    pub skip_health_check: bool,

    // --- Session Args ---
    /// File that persists the session id between runs. Defaults to <config dir>/rag-chat/session.json
    #[arg(long, env = "SESSION_PATH")]
    pub session_path: Option<String>,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
