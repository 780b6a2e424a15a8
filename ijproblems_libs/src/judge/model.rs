use serde::{Deserialize, Serialize};

/// 問題別の解答フィード(feed A)の1エントリ
///
/// ジャッジAPIは他にもフィールドを返すが、このシステムが使うのは
/// 解答者と提出日時だけなので残りは読み捨てる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub user_id: String,
    /// Submission time in epoch milliseconds.
    pub submission_date: i64,
}

/// 全問題横断の最新解答フィード(feed B)の1エントリ
///
/// `problem_id`は数値とは限らない。廃止された問題や外部コンテストの
/// 識別子が混ざるため、呼び出し側で数値に解釈できないものを捨てる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestSolution {
    pub problem_id: String,
    pub user_id: String,
    /// Submission time in epoch milliseconds.
    pub submission_date: i64,
}
