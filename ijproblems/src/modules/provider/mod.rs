pub mod memory;
pub mod postgres;

use crate::{modules::ranking::RankingRow, types::tables::Problem};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Maximum number of rows one global ranking query may return.
/// Wider ranges are truncated, not rejected.
pub const MAX_RANKING_RANGE: usize = 200;

/// One observed acceptance, ready to be recorded into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptanceEntry {
    pub aoj_userid: String,
    pub problem_id: i64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Number of newly inserted acceptance rows (duplicates excluded).
    pub inserted: usize,
    /// Number of distinct users whose aggregates were recomputed.
    pub recomputed_users: usize,
}

/// データアクセスの能力インタフェース
///
/// 実装はプロセス起動時の設定で選ばれたちょうど2種類:
/// 決定的なインメモリ実装([`memory::MemoryDataProvider`])と
/// 永続ストア実装([`postgres::PgDataProvider`])。
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// 既知の全問題IDを返すメソッド。クローラのフィルタに使う
    async fn list_problem_ids(&self) -> Result<HashSet<i64>>;

    /// 問題カタログ全件を問題ID順で返すメソッド
    async fn list_problems(&self) -> Result<Vec<Problem>>;

    async fn get_problem(&self, problem_id: i64) -> Result<Option<Problem>>;

    /// 観測したacceptanceのバッチを1トランザクションで記録するメソッド
    ///
    /// (ユーザ, 問題)ごとに最初の観測だけが残る(冪等)。1行以上挿入された
    /// ユーザそれぞれについて、同じトランザクション内で集計を再計算する。
    /// 挿入と再計算の間のクラッシュが観測されることはない。
    async fn commit_acceptances(&self, entries: &[AcceptanceEntry]) -> Result<CommitSummary>;

    /// グローバルランキングの`begin`行目から`end`行目までを返すメソッド
    ///
    /// `begin`/`end`は1始まりで両端を含む。並びはtotal_pointの降順、
    /// 同点はaoj_useridの昇順。[`MAX_RANKING_RANGE`]行を超える幅は
    /// 切り詰める。
    async fn get_global_ranking(
        &self,
        contest_type: i32,
        begin: usize,
        end: usize,
    ) -> Result<Vec<RankingRow>>;

    /// そのコンテスト種別で1問以上解いたユーザの数を返すメソッド
    async fn get_user_count(&self, contest_type: i32) -> Result<usize>;

    /// 指定ユーザ群のランキング行を返すメソッド
    ///
    /// 1問も解いていないユーザも省かず、0埋めの行として返す。
    /// 呼び出し側は要求したIDごとに1行を期待している。
    async fn get_user_local_ranking(
        &self,
        contest_type: i32,
        aoj_userids: &[String],
    ) -> Result<Vec<RankingRow>>;

    async fn get_user_solved_problems(&self, aoj_userid: &str) -> Result<HashSet<i64>>;

    /// 問題カタログ全体の集計行("TOTAL"行)を返すメソッド
    async fn get_problems_total_row(&self, contest_type: i32) -> Result<RankingRow>;

    async fn get_problem_acceptance_count(&self, problem_id: i64) -> Result<usize>;
}

/// Convert an inclusive 1-indexed [begin, end] range into (offset, limit),
/// applying the size guard. Returns None for an empty or inverted range.
pub(crate) fn ranking_window(begin: usize, end: usize) -> Option<(usize, usize)> {
    if begin == 0 || end < begin {
        return None;
    }

    let mut width = end - begin + 1;
    if width > MAX_RANKING_RANGE {
        tracing::warn!(
            "ranking range [{}, {}] is wider than {} rows, truncating",
            begin,
            end,
            MAX_RANKING_RANGE
        );
        width = MAX_RANKING_RANGE;
    }

    Some((begin - 1, width))
}
