use super::{ranking_window, AcceptanceEntry, CommitSummary, DataProvider};
use crate::{
    modules::{
        points::{self, level_from_performance},
        ranking::{sort_ranking_rows, RankingRow, UserAggregate},
    },
    types::tables::Problem,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use itertools::Itertools;
use std::collections::{hash_map::Entry, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// 決定的なインメモリ実装
///
/// 集計は保持せず、読み出しのたびに台帳から導出し直す。集計が常に
/// 台帳の純粋な関数であることをこの実装が保証の根拠になっている。
pub struct MemoryDataProvider {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    problems: HashMap<i64, Problem>,
    /// (user, problem) -> first observed submission time. The ledger.
    first_seen: HashMap<(String, i64), DateTime<Utc>>,
}

impl MemoryState {
    fn aggregates(&self) -> Vec<UserAggregate> {
        let mut solved: HashMap<&String, Vec<(i32, i32)>> = HashMap::new();
        for (aoj_userid, problem_id) in self.first_seen.keys() {
            let problem = match self.problems.get(problem_id) {
                Some(problem) => problem,
                None => continue,
            };
            solved
                .entry(aoj_userid)
                .or_default()
                .push((problem.contest_type, problem.level));
        }

        solved
            .into_iter()
            .map(|(aoj_userid, pairs)| UserAggregate::from_solved(aoj_userid, pairs))
            .collect()
    }

    fn aggregate_of(&self, aoj_userid: &str) -> UserAggregate {
        let pairs = self
            .first_seen
            .keys()
            .filter(|(user, _)| user == aoj_userid)
            .filter_map(|(_, problem_id)| {
                self.problems
                    .get(problem_id)
                    .map(|problem| (problem.contest_type, problem.level))
            });
        UserAggregate::from_solved(aoj_userid, pairs)
    }
}

impl MemoryDataProvider {
    pub fn with_problems(problems: Vec<Problem>) -> Self {
        let problems = problems
            .into_iter()
            .map(|problem| (problem.problem_id, problem))
            .collect();

        MemoryDataProvider {
            state: Mutex::new(MemoryState {
                problems,
                first_seen: HashMap::new(),
            }),
        }
    }

    /// 決定的なダミーデータ入りの実装を作るメソッド
    ///
    /// 各レベルちょうど2問ずつ。レベルはパフォーマンス値から
    /// [`level_from_performance`]で導出する。
    pub fn fixture() -> Result<Self> {
        let mut problems: Vec<Problem> = Vec::new();

        for (index, perf) in (0..20i64).map(|i| 100 + 200 * i).enumerate() {
            let problem_id = 1500 + index as i64;
            problems.push(Problem {
                problem_id,
                contest_type: 0,
                level: level_from_performance(0, perf)?,
                name: format!("Dummy Domestic Problem {}", problem_id),
                org: String::from(if index % 2 == 0 { "Official" } else { "JAG" }),
                year: 2010 + (index % 14) as i32,
                used_in: String::new(),
                slot: String::from(&"ABCDEFGH"[index % 8..index % 8 + 1]),
                en: true,
                ja: true,
            });
        }

        for (index, perf) in (0..24i64).map(|i| 200 + 150 * i).enumerate() {
            let problem_id = 2000 + index as i64;
            let official = index % 3 == 0;
            problems.push(Problem {
                problem_id,
                contest_type: 1,
                level: level_from_performance(1, perf)?,
                name: format!("Dummy Regional Problem {}", problem_id),
                org: String::from(if official { "Official" } else { "JAG" }),
                year: 2010 + (index % 14) as i32,
                used_in: String::from(if official { "" } else { "Practice" }),
                slot: String::from(&"ABCDEFGHIJK"[index % 11..index % 11 + 1]),
                en: true,
                ja: index % 3 != 1,
            });
        }

        let provider = Self::with_problems(problems);
        {
            let mut state = provider
                .state
                .lock()
                .map_err(|_| anyhow!("memory provider state is poisoned"))?;
            let problem_ids: Vec<i64> = state.problems.keys().copied().sorted().collect();
            let base = Utc
                .timestamp_millis_opt(1_600_000_000_000)
                .single()
                .ok_or_else(|| anyhow!("invalid fixture base timestamp"))?;

            for user in 0..8i64 {
                let aoj_userid = format!("user{}", user);
                for problem_id in problem_ids.iter().copied() {
                    if problem_id % (user + 2) != 0 {
                        continue;
                    }
                    let first_seen = base + chrono::Duration::seconds(problem_id);
                    state
                        .first_seen
                        .insert((aoj_userid.clone(), problem_id), first_seen);
                }
            }
        }

        Ok(provider)
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory provider state is poisoned"))
    }

    #[cfg(test)]
    pub(crate) fn first_seen(
        &self,
        aoj_userid: &str,
        problem_id: i64,
    ) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .ok()?
            .first_seen
            .get(&(String::from(aoj_userid), problem_id))
            .copied()
    }
}

#[async_trait]
impl DataProvider for MemoryDataProvider {
    async fn list_problem_ids(&self) -> Result<HashSet<i64>> {
        Ok(self.state()?.problems.keys().copied().collect())
    }

    async fn list_problems(&self) -> Result<Vec<Problem>> {
        Ok(self
            .state()?
            .problems
            .values()
            .cloned()
            .sorted_by_key(|problem| problem.problem_id)
            .collect())
    }

    async fn get_problem(&self, problem_id: i64) -> Result<Option<Problem>> {
        Ok(self.state()?.problems.get(&problem_id).cloned())
    }

    async fn commit_acceptances(&self, entries: &[AcceptanceEntry]) -> Result<CommitSummary> {
        let mut state = self.state()?;
        let mut inserted = 0usize;
        let mut touched: HashSet<&str> = HashSet::new();

        for entry in entries.iter() {
            match state
                .first_seen
                .entry((entry.aoj_userid.clone(), entry.problem_id))
            {
                Entry::Vacant(vacant) => {
                    vacant.insert(entry.submitted_at);
                    inserted += 1;
                    touched.insert(entry.aoj_userid.as_str());
                }
                // 最初の観測が勝つ。後からの観測は日時も上書きしない
                Entry::Occupied(_) => {}
            }
        }

        // 集計は読み出し時に毎回導出されるので、ここでの再計算は不要。
        // 件数はストア実装と同じ意味で報告する
        Ok(CommitSummary {
            inserted,
            recomputed_users: touched.len(),
        })
    }

    async fn get_global_ranking(
        &self,
        contest_type: i32,
        begin: usize,
        end: usize,
    ) -> Result<Vec<RankingRow>> {
        let (offset, limit) = match ranking_window(begin, end) {
            Some(window) => window,
            None => return Ok(Vec::new()),
        };

        let state = self.state()?;
        let mut rows: Vec<RankingRow> = state
            .aggregates()
            .iter()
            .filter(|aggregate| !aggregate.is_empty(contest_type))
            .map(|aggregate| aggregate.to_ranking_row(contest_type))
            .collect();
        sort_ranking_rows(&mut rows);

        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn get_user_count(&self, contest_type: i32) -> Result<usize> {
        let state = self.state()?;
        Ok(state
            .aggregates()
            .iter()
            .filter(|aggregate| !aggregate.is_empty(contest_type))
            .count())
    }

    async fn get_user_local_ranking(
        &self,
        contest_type: i32,
        aoj_userids: &[String],
    ) -> Result<Vec<RankingRow>> {
        let state = self.state()?;
        let mut rows: Vec<RankingRow> = aoj_userids
            .iter()
            .map(|aoj_userid| {
                state
                    .aggregate_of(aoj_userid)
                    .to_ranking_row(contest_type)
            })
            .collect();
        sort_ranking_rows(&mut rows);

        Ok(rows)
    }

    async fn get_user_solved_problems(&self, aoj_userid: &str) -> Result<HashSet<i64>> {
        Ok(self
            .state()?
            .first_seen
            .keys()
            .filter(|(user, _)| user == aoj_userid)
            .map(|(_, problem_id)| *problem_id)
            .collect())
    }

    async fn get_problems_total_row(&self, contest_type: i32) -> Result<RankingRow> {
        let state = self.state()?;
        let points = points::points(contest_type).unwrap_or(&[]);
        let mut row = RankingRow::empty("TOTAL", contest_type);

        for problem in state.problems.values() {
            if problem.contest_type != contest_type {
                continue;
            }
            let level_index = match usize::try_from(problem.level - 1) {
                Ok(level_index) if level_index < points.len() => level_index,
                _ => continue,
            };
            row.solved_counts[level_index] += 1;
            row.total_solved += 1;
            row.total_point += points[level_index];
        }

        Ok(row)
    }

    async fn get_problem_acceptance_count(&self, problem_id: i64) -> Result<usize> {
        Ok(self
            .state()?
            .first_seen
            .keys()
            .filter(|(_, accepted)| *accepted == problem_id)
            .count())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn problem(problem_id: i64, contest_type: i32, level: i32) -> Problem {
        Problem {
            problem_id,
            contest_type,
            level,
            name: format!("Problem {}", problem_id),
            org: String::from("JAG"),
            year: 2020,
            used_in: String::new(),
            slot: String::from("A"),
            en: true,
            ja: true,
        }
    }

    fn entry(aoj_userid: &str, problem_id: i64, millis: i64) -> AcceptanceEntry {
        AcceptanceEntry {
            aoj_userid: String::from(aoj_userid),
            problem_id,
            submitted_at: Utc.timestamp_millis_opt(millis).single().unwrap(),
        }
    }

    #[tokio::test]
    async fn record_acceptance_is_idempotent() {
        let provider = MemoryDataProvider::with_problems(vec![problem(1500, 0, 1)]);

        let first = provider
            .commit_acceptances(&[entry("alice", 1500, 1000)])
            .await
            .unwrap();
        assert_eq!(first.inserted, 1);
        assert_eq!(first.recomputed_users, 1);

        // A later observation with a nominally earlier timestamp is a no-op.
        let second = provider
            .commit_acceptances(&[entry("alice", 1500, 500)])
            .await
            .unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.recomputed_users, 0);

        assert_eq!(
            provider.first_seen("alice", 1500),
            Utc.timestamp_millis_opt(1000).single()
        );
    }

    #[tokio::test]
    async fn recompute_is_batched_per_user() {
        let provider =
            MemoryDataProvider::with_problems(vec![problem(1500, 0, 1), problem(1501, 0, 2)]);

        let summary = provider
            .commit_acceptances(&[
                entry("alice", 1500, 1000),
                entry("alice", 1501, 2000),
                entry("bob", 1500, 3000),
            ])
            .await
            .unwrap();

        assert_eq!(summary.inserted, 3);
        assert_eq!(summary.recomputed_users, 2);
    }

    #[tokio::test]
    async fn zero_aggregate_user_is_excluded_from_ranking() {
        let provider = MemoryDataProvider::with_problems(vec![problem(1500, 0, 1)]);
        provider
            .commit_acceptances(&[entry("alice", 1500, 1000)])
            .await
            .unwrap();

        assert_eq!(provider.get_user_count(0).await.unwrap(), 1);
        assert_eq!(provider.get_user_count(1).await.unwrap(), 0);
        assert!(provider.get_global_ranking(1, 1, 200).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_ranking_synthesizes_rows_for_unknown_users() {
        let provider = MemoryDataProvider::with_problems(vec![problem(1500, 0, 1)]);
        provider
            .commit_acceptances(&[entry("alice", 1500, 1000)])
            .await
            .unwrap();

        let rows = provider
            .get_user_local_ranking(0, &[String::from("alice"), String::from("zoe")])
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].aoj_userid, "alice");
        assert_eq!(rows[0].total_point, 20);
        assert_eq!(rows[1].aoj_userid, "zoe");
        assert_eq!(rows[1].total_point, 0);
        assert_eq!(rows[1].total_solved, 0);
    }

    #[tokio::test]
    async fn global_ranking_is_ordered_and_sliced() {
        let provider = MemoryDataProvider::with_problems(vec![
            problem(1500, 0, 1),
            problem(1501, 0, 2),
        ]);
        provider
            .commit_acceptances(&[
                entry("carol", 1500, 1000),
                entry("carol", 1501, 1000),
                entry("alice", 1500, 1000),
                entry("bob", 1500, 1000),
            ])
            .await
            .unwrap();

        // carol has 50 points, alice and bob tie with 20 points each.
        let rows = provider.get_global_ranking(0, 1, 200).await.unwrap();
        let order: Vec<&str> = rows.iter().map(|row| row.aoj_userid.as_str()).collect();
        assert_eq!(order, vec!["carol", "alice", "bob"]);

        let page = provider.get_global_ranking(0, 2, 3).await.unwrap();
        let order: Vec<&str> = page.iter().map(|row| row.aoj_userid.as_str()).collect();
        assert_eq!(order, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn total_row_sums_the_whole_catalog() {
        let provider = MemoryDataProvider::with_problems(vec![
            problem(1500, 0, 1),
            problem(1501, 0, 1),
            problem(1502, 0, 3),
            problem(1600, 1, 1),
        ]);

        let row = provider.get_problems_total_row(0).await.unwrap();
        assert_eq!(row.aoj_userid, "TOTAL");
        assert_eq!(row.total_solved, 3);
        assert_eq!(row.total_point, 20 + 20 + 50);
        assert_eq!(row.solved_counts[0], 2);
        assert_eq!(row.solved_counts[2], 1);
    }

    #[tokio::test]
    async fn fixture_is_deterministic() {
        let first = MemoryDataProvider::fixture().unwrap();
        let second = MemoryDataProvider::fixture().unwrap();

        assert_eq!(
            first.list_problems().await.unwrap(),
            second.list_problems().await.unwrap()
        );
        assert_eq!(
            first.get_global_ranking(0, 1, 200).await.unwrap(),
            second.get_global_ranking(0, 1, 200).await.unwrap()
        );

        // Two problems per level for both contest types.
        let problems = first.list_problems().await.unwrap();
        for contest_type in 0..2 {
            let levels = points::points(contest_type).unwrap().len() as i32;
            for level in 1..=levels {
                let count = problems
                    .iter()
                    .filter(|problem| {
                        problem.contest_type == contest_type && problem.level == level
                    })
                    .count();
                assert_eq!(count, 2, "contest_type={} level={}", contest_type, level);
            }
        }
    }
}
