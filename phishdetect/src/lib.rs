// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export the input helpers used by the CLI and its tests
pub use handlers::{load_config, load_urls_from_file, parse_score, parse_url_line};
