use crate::modules::points::{self, NUMBER_OF_CONTEST_TYPES};
use serde::{Deserialize, Serialize};

/// Externally visible ranking projection of one user for one contest type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingRow {
    pub aoj_userid: String,
    pub total_point: i64,
    pub total_solved: i32,
    pub solved_counts: Vec<i32>,
}

impl RankingRow {
    /// 1問も解いていないユーザのための0埋めの行を作るメソッド
    pub fn empty(aoj_userid: &str, contest_type: i32) -> Self {
        let levels = points::points(contest_type)
            .map(|points| points.len())
            .unwrap_or(0);

        RankingRow {
            aoj_userid: String::from(aoj_userid),
            total_point: 0,
            total_solved: 0,
            solved_counts: vec![0; levels],
        }
    }
}

/// Per-user aggregate over both contest types, derived purely from the
/// set of solved problems. Never stored authoritatively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAggregate {
    pub aoj_userid: String,
    pub total_point: [i64; NUMBER_OF_CONTEST_TYPES],
    pub total_solved: [i32; NUMBER_OF_CONTEST_TYPES],
    pub solved_counts: [Vec<i32>; NUMBER_OF_CONTEST_TYPES],
}

impl UserAggregate {
    /// 解いた問題の(コンテスト種別, レベル)の列から集計を作るメソッド
    ///
    /// ポイント表に存在しない種別・レベルの問題は集計から除外する。
    /// 問題表とポイント表の食い違いで集計全体を失敗させない。
    pub fn from_solved<I>(aoj_userid: &str, solved: I) -> Self
    where
        I: IntoIterator<Item = (i32, i32)>,
    {
        let mut aggregate = UserAggregate {
            aoj_userid: String::from(aoj_userid),
            total_point: [0; NUMBER_OF_CONTEST_TYPES],
            total_solved: [0; NUMBER_OF_CONTEST_TYPES],
            solved_counts: std::array::from_fn(|contest_type| {
                vec![
                    0;
                    points::points(contest_type as i32)
                        .map(|points| points.len())
                        .unwrap_or(0)
                ]
            }),
        };

        for (contest_type, level) in solved {
            let (index, points) = match (
                points::contest_type_index(contest_type),
                points::points(contest_type),
            ) {
                (Some(index), Some(points)) => (index, points),
                _ => continue,
            };
            let level_index = match usize::try_from(level - 1) {
                Ok(level_index) if level_index < points.len() => level_index,
                _ => continue,
            };

            aggregate.total_point[index] += points[level_index];
            aggregate.total_solved[index] += 1;
            aggregate.solved_counts[index][level_index] += 1;
        }

        aggregate
    }

    pub fn is_empty(&self, contest_type: i32) -> bool {
        match points::contest_type_index(contest_type) {
            Some(index) => self.total_solved[index] == 0,
            None => true,
        }
    }

    pub fn to_ranking_row(&self, contest_type: i32) -> RankingRow {
        match points::contest_type_index(contest_type) {
            Some(index) => RankingRow {
                aoj_userid: self.aoj_userid.clone(),
                total_point: self.total_point[index],
                total_solved: self.total_solved[index],
                solved_counts: self.solved_counts[index].clone(),
            },
            None => RankingRow::empty(&self.aoj_userid, contest_type),
        }
    }
}

/// ランキングの並び順: total_pointの降順、同点はaoj_useridの昇順。
/// グローバルランキングとローカルランキングで共通の1つの規則を使う。
pub fn sort_ranking_rows(rows: &mut [RankingRow]) {
    rows.sort_by(|a, b| {
        b.total_point
            .cmp(&a.total_point)
            .then_with(|| a.aoj_userid.cmp(&b.aoj_userid))
    });
}
