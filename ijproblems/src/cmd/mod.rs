pub mod crawl;
pub mod server;

use clap::ValueEnum;
use std::fmt;

/// データアクセス実装の選択肢。プロセス起動時に明示的に選ぶ
#[derive(Debug, ValueEnum, Clone)]
pub enum BackendKind {
    Memory,
    Postgres,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Postgres => write!(f, "postgres"),
        }
    }
}
