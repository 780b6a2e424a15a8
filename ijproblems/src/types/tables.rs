use crate::modules::ranking::RankingRow;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Problem {
    pub problem_id: i64,
    pub contest_type: i32, // 0: 国内予選, 1: アジア地区予選
    pub level: i32,        // 1始まり。ポイント表の長さを超えない
    pub name: String,
    pub org: String,     // "Official" または "JAG"
    pub year: i32,       // 出題年
    pub used_in: String, // 使用されたコンテスト名
    pub slot: String,    // 問題スロット(A, B, ...)
    pub en: bool,
    pub ja: bool,
}

/// Materialized per-user aggregate row, one per (user, contest type).
/// Never authoritative: always re-derivable from the acceptance ledger.
#[derive(Debug, Clone, FromRow)]
pub struct UserPoint {
    pub aoj_userid: String,
    pub contest_type: i32,
    pub total_point: i64,
    pub total_solved: i32,
    pub solved_counts: Vec<i32>,
}

impl UserPoint {
    pub fn into_ranking_row(self) -> RankingRow {
        RankingRow {
            aoj_userid: self.aoj_userid,
            total_point: self.total_point,
            total_solved: self.total_solved,
            solved_counts: self.solved_counts,
        }
    }
}
