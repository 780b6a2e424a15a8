use crate::modules::provider::{AcceptanceEntry, DataProvider};
use anyhow::Result;
use chrono::{TimeZone, Utc};
use ijproblems_libs::judge::client::JudgeClient;
use std::collections::HashSet;
use tokio::time::{self, Duration};

/// クロール無効時にループを寝かせておく間隔
const IDLE_SLEEP: Duration = Duration::from_secs(86400);

/// 外部ジャッジとローカルの台帳を同期し続けるスケジューラ
///
/// 3つのフェーズを順に無限に繰り返す:
/// 1. 作業キューが空なら既知の全問題IDで補充する
/// 2. キューの先頭の問題の全解答履歴を取り込む。フェッチに失敗したら
///    キューを進めずに同じ問題を再試行し続ける
/// 3. 最新解答フィードを取り込み、新着のacceptanceを反映する
///
/// フェーズ間はそれぞれ設定された間隔だけ眠る。永続化の失敗だけが
/// エラーとして伝播し、プロセスを落とす(再クロールは冪等なので
/// crash-and-restartで回復できる)。
pub struct CrawlScheduler<C, P> {
    client: C,
    provider: P,
    interval: Duration,
    queue: Vec<i64>,
}

impl<C, P> CrawlScheduler<C, P>
where
    C: JudgeClient + Send + Sync,
    P: DataProvider,
{
    pub fn new(client: C, provider: P, interval: Duration) -> Self {
        CrawlScheduler {
            client,
            provider,
            interval,
            queue: Vec::new(),
        }
    }

    pub async fn run(mut self) -> Result<()> {
        if self.interval.is_zero() {
            // 間隔が0または未設定のときは何もクロールしない。運用側の
            // 明示的なオプトアウトであってエラーではない
            tracing::info!("crawl interval is zero or unset, not crawling");
            loop {
                time::sleep(IDLE_SLEEP).await;
            }
        }

        tracing::debug!("crawl interval is {} seconds", self.interval.as_secs());

        loop {
            if self.queue.is_empty() {
                self.refill_queue().await?;
            }

            if let Some(problem_id) = self.queue.last().copied() {
                while !self.crawl_problem(problem_id).await? {
                    time::sleep(self.interval).await;
                }
            }

            time::sleep(self.interval).await;

            while !self.crawl_latest().await? {
                time::sleep(self.interval).await;
            }

            time::sleep(self.interval).await;
        }
    }

    /// 既知の全問題IDで作業キューを補充するメソッド
    ///
    /// 処理順はスタック順(後入れ先出し)で、順序自体に意味はない。
    /// IDを昇順に積むのは実行を再現可能にするためだけ
    async fn refill_queue(&mut self) -> Result<()> {
        let mut problem_ids: Vec<i64> =
            self.provider.list_problem_ids().await?.into_iter().collect();
        problem_ids.sort_unstable();

        tracing::info!("refill crawl queue with {} problems", problem_ids.len());
        self.queue = problem_ids;

        Ok(())
    }

    /// 1問題の全解答履歴を取り込むメソッド
    ///
    /// フェッチ成功時だけキューを進める。戻り値はフェッチに成功したか
    /// どうかで、永続化の失敗はErrとして伝播する
    async fn crawl_problem(&mut self, problem_id: i64) -> Result<bool> {
        let solutions = match self.client.problem_solutions(problem_id).await {
            Ok(solutions) => solutions,
            Err(e) => {
                tracing::warn!("crawl for problem {} failed cause: {:?}", problem_id, e);
                return Ok(false);
            }
        };

        self.queue.pop();

        let mut seen: HashSet<String> = HashSet::new();
        let mut entries: Vec<AcceptanceEntry> = Vec::new();
        for solution in solutions {
            // フィードの順序に保証はない。同一ユーザは最初の観測だけ残す
            if !seen.insert(solution.user_id.clone()) {
                continue;
            }
            if let Some(entry) = to_entry(solution.user_id, problem_id, solution.submission_date)
            {
                entries.push(entry);
            }
        }

        let summary = self.provider.commit_acceptances(&entries).await?;
        tracing::info!(
            "crawl for problem {} ok, inserted = {}, recomputed users = {}",
            problem_id,
            summary.inserted,
            summary.recomputed_users
        );

        Ok(true)
    }

    /// 最新解答フィードを取り込むメソッド
    ///
    /// 既知の問題ID集合は同期のたびに取り直す。追加されたばかりの
    /// 問題を取りこぼさないため
    async fn crawl_latest(&mut self) -> Result<bool> {
        let known_problem_ids = self.provider.list_problem_ids().await?;

        let solutions = match self.client.latest_solutions().await {
            Ok(solutions) => solutions,
            Err(e) => {
                tracing::warn!("crawl for latest solutions failed cause: {:?}", e);
                return Ok(false);
            }
        };

        let mut seen: HashSet<(String, i64)> = HashSet::new();
        let mut entries: Vec<AcceptanceEntry> = Vec::new();
        for solution in solutions {
            // 数値でないproblemIdは想定内のノイズとして読み捨てる
            let problem_id = match solution.problem_id.parse::<i64>() {
                Ok(problem_id) => problem_id,
                Err(_) => continue,
            };
            if !known_problem_ids.contains(&problem_id) {
                continue;
            }
            if !seen.insert((solution.user_id.clone(), problem_id)) {
                continue;
            }
            if let Some(entry) = to_entry(solution.user_id, problem_id, solution.submission_date)
            {
                entries.push(entry);
            }
        }

        let summary = self.provider.commit_acceptances(&entries).await?;
        tracing::info!(
            "crawl for latest solutions ok, inserted = {}, recomputed users = {}",
            summary.inserted,
            summary.recomputed_users
        );

        Ok(true)
    }
}

fn to_entry(
    aoj_userid: String,
    problem_id: i64,
    submission_millis: i64,
) -> Option<AcceptanceEntry> {
    match Utc.timestamp_millis_opt(submission_millis).single() {
        Some(submitted_at) => Some(AcceptanceEntry {
            aoj_userid,
            problem_id,
            submitted_at,
        }),
        None => {
            tracing::warn!(
                "drop solution of {} with unrepresentable submission date {}",
                aoj_userid,
                submission_millis
            );
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::modules::provider::memory::MemoryDataProvider;
    use crate::types::tables::Problem;
    use async_trait::async_trait;
    use ijproblems_libs::judge::client::JudgeClientError;
    use ijproblems_libs::judge::model::{LatestSolution, Solution};
    use std::sync::Mutex;

    struct ScriptedClient {
        /// Remaining number of fetches that fail before succeeding.
        failures: Mutex<usize>,
        solutions: Vec<Solution>,
        latest: Vec<LatestSolution>,
    }

    impl ScriptedClient {
        fn new(failures: usize) -> Self {
            ScriptedClient {
                failures: Mutex::new(failures),
                solutions: Vec::new(),
                latest: Vec::new(),
            }
        }

        fn take_failure(&self) -> bool {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                true
            } else {
                false
            }
        }
    }

    #[async_trait]
    impl JudgeClient for ScriptedClient {
        async fn problem_solutions(
            &self,
            _problem_id: i64,
        ) -> Result<Vec<Solution>, JudgeClientError> {
            if self.take_failure() {
                return Err(JudgeClientError::UnexpectedError(String::from(
                    "scripted failure",
                )));
            }
            Ok(self.solutions.clone())
        }

        async fn latest_solutions(&self) -> Result<Vec<LatestSolution>, JudgeClientError> {
            if self.take_failure() {
                return Err(JudgeClientError::UnexpectedError(String::from(
                    "scripted failure",
                )));
            }
            Ok(self.latest.clone())
        }
    }

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

    fn solution(user_id: &str, millis: i64) -> Solution {
        Solution {
            user_id: String::from(user_id),
            submission_date: millis,
        }
    }

    fn latest(problem_id: &str, user_id: &str, millis: i64) -> LatestSolution {
        LatestSolution {
            problem_id: String::from(problem_id),
            user_id: String::from(user_id),
            submission_date: millis,
        }
    }

    #[tokio::test]
    async fn queue_advances_only_after_fetch_success() {
        let mut client = ScriptedClient::new(2);
        client.solutions = vec![solution("alice", 1000)];
        let provider = MemoryDataProvider::with_problems(vec![problem(1500, 0, 1)]);

        let mut scheduler = CrawlScheduler::new(client, provider, Duration::from_secs(1));
        scheduler.refill_queue().await.unwrap();
        assert_eq!(scheduler.queue, vec![1500]);

        // Two transient fetch failures keep the problem on the queue.
        assert!(!scheduler.crawl_problem(1500).await.unwrap());
        assert_eq!(scheduler.queue, vec![1500]);
        assert!(!scheduler.crawl_problem(1500).await.unwrap());
        assert_eq!(scheduler.queue, vec![1500]);

        // The third attempt succeeds and dequeues the problem.
        assert!(scheduler.crawl_problem(1500).await.unwrap());
        assert!(scheduler.queue.is_empty());

        let solved = scheduler
            .provider
            .get_user_solved_problems("alice")
            .await
            .unwrap();
        assert!(solved.contains(&1500));
    }

    #[tokio::test]
    async fn duplicate_users_in_feed_keep_first_observation() {
        let mut client = ScriptedClient::new(0);
        client.solutions = vec![
            solution("alice", 1000),
            solution("alice", 500),
            solution("bob", 2000),
        ];
        let provider = MemoryDataProvider::with_problems(vec![problem(1500, 0, 1)]);

        let mut scheduler = CrawlScheduler::new(client, provider, Duration::from_secs(1));
        scheduler.refill_queue().await.unwrap();
        assert!(scheduler.crawl_problem(1500).await.unwrap());

        assert_eq!(
            scheduler.provider.first_seen("alice", 1500),
            Utc.timestamp_millis_opt(1000).single()
        );
        assert_eq!(
            scheduler.provider.first_seen("bob", 1500),
            Utc.timestamp_millis_opt(2000).single()
        );
    }

    #[tokio::test]
    async fn latest_feed_filters_unknown_and_malformed_problem_ids() {
        let mut client = ScriptedClient::new(0);
        client.latest = vec![
            latest("1500", "alice", 1000),
            latest("ALDS1_1_A", "bob", 1000),
            latest("9999", "carol", 1000),
            latest("1500", "alice", 9000),
        ];
        let provider = MemoryDataProvider::with_problems(vec![problem(1500, 0, 1)]);

        let mut scheduler = CrawlScheduler::new(client, provider, Duration::from_secs(1));
        assert!(scheduler.crawl_latest().await.unwrap());

        assert_eq!(
            scheduler.provider.first_seen("alice", 1500),
            Utc.timestamp_millis_opt(1000).single()
        );
        assert_eq!(scheduler.provider.first_seen("bob", 1500), None);
        assert!(scheduler
            .provider
            .get_user_solved_problems("carol")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn latest_feed_retries_on_fetch_failure() {
        let mut client = ScriptedClient::new(1);
        client.latest = vec![latest("1500", "alice", 1000)];
        let provider = MemoryDataProvider::with_problems(vec![problem(1500, 0, 1)]);

        let mut scheduler = CrawlScheduler::new(client, provider, Duration::from_secs(1));
        assert!(!scheduler.crawl_latest().await.unwrap());
        assert!(scheduler.crawl_latest().await.unwrap());

        assert!(scheduler
            .provider
            .get_user_solved_problems("alice")
            .await
            .unwrap()
            .contains(&1500));
    }
}
