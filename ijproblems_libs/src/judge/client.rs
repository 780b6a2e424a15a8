use crate::judge::model::{LatestSolution, Solution};
use async_trait::async_trait;
use reqwest::{Client, Url};
use thiserror::Error;
use tokio::time::Duration;

type Result<T> = std::result::Result<T, JudgeClientError>;

/// Default location of the AOJ judge API.
pub const DEFAULT_JUDGE_API_URL: &str = "https://judgeapi.u-aizu.ac.jp";

/// Number of solutions requested per problem in one shot.
/// The feed is size-capped; pages past this cap are not retrieved.
// TODO: page through /solutions/problems/{id} once a problem accumulates
// more than this many accepted solutions.
pub const SOLUTIONS_FETCH_SIZE: u32 = 10000;

#[derive(Debug, Error)]
pub enum JudgeClientError {
    #[error("failed to request to judge api")]
    RequestError(#[from] reqwest::Error),
    #[error("failed to deserialize JSON data")]
    DeserializeError(#[from] serde_json::Error),
    #[error("invalid judge api url given")]
    InvalidUrlError(#[from] url::ParseError),
    #[error("{0}")]
    UnexpectedError(String),
}

/// 外部ジャッジの解答フィードへのアクセスを抽象化するトレイト
///
/// クローラはこのトレイト経由でのみジャッジと通信する。
#[async_trait]
pub trait JudgeClient {
    /// 1問題の全解答履歴を取得するメソッド(feed A)
    async fn problem_solutions(&self, problem_id: i64) -> Result<Vec<Solution>>;
    /// 全問題横断の最新解答一覧を取得するメソッド(feed B)
    async fn latest_solutions(&self) -> Result<Vec<LatestSolution>>;
}

pub struct AojClient {
    base_url: Url,
    solutions_url: Url,
    client: Client,
}

impl AojClient {
    pub fn new(judge_api_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(judge_api_url)?;
        base_url.set_path("");
        let solutions_url = base_url.join("solutions")?;

        let client = Client::builder()
            .gzip(true)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(AojClient {
            base_url,
            solutions_url,
            client,
        })
    }
}

#[async_trait]
impl JudgeClient for AojClient {
    async fn problem_solutions(&self, problem_id: i64) -> Result<Vec<Solution>> {
        let url = self
            .base_url
            .join(&format!("solutions/problems/{}", problem_id))?;
        let res = self
            .client
            .get(url)
            .query(&[("size", SOLUTIONS_FETCH_SIZE.to_string())])
            .send()
            .await?;

        match res.error_for_status_ref() {
            Ok(_) => {}
            Err(e) => {
                let message = format!(
                    "error response returned from judge api for problem {}: {:?}",
                    problem_id, e
                );
                tracing::warn!(message);
                return Err(JudgeClientError::UnexpectedError(message));
            }
        };

        let solutions: Vec<Solution> = res.json().await?;
        Ok(solutions)
    }

    async fn latest_solutions(&self) -> Result<Vec<LatestSolution>> {
        let res = self.client.get(self.solutions_url.clone()).send().await?;

        match res.error_for_status_ref() {
            Ok(_) => {}
            Err(e) => {
                let message = format!(
                    "error response returned from judge api latest solutions feed: {:?}",
                    e
                );
                tracing::warn!(message);
                return Err(JudgeClientError::UnexpectedError(message));
            }
        };

        let solutions: Vec<LatestSolution> = res.json().await?;
        Ok(solutions)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn create_new_client() {
        let client = AojClient::new("https://judgeapi.u-aizu.ac.jp").unwrap();

        assert_eq!(
            client.solutions_url,
            Url::parse("https://judgeapi.u-aizu.ac.jp/solutions").unwrap()
        );
        assert_eq!(
            client
                .base_url
                .join("solutions/problems/2439")
                .unwrap(),
            Url::parse("https://judgeapi.u-aizu.ac.jp/solutions/problems/2439").unwrap()
        );
    }

    #[test]
    fn reject_invalid_url() {
        assert!(AojClient::new("not a url").is_err());
    }

    /// Normal system test of the per-problem solutions feed.
    ///
    /// This test sends a request to the real judge API, so it is ignored by
    /// default. Run it explicitly when the judge is reachable:
    ///
    /// ```ignore
    /// cargo test -p ijproblems_libs -- --ignored
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_problem_solutions() {
        let client = AojClient::new(DEFAULT_JUDGE_API_URL).unwrap();
        let solutions = client.problem_solutions(2439).await.unwrap();

        assert!(!solutions.is_empty());
    }

    /// Normal system test of the latest solutions feed. See
    /// [`test_problem_solutions`] for how to run it.
    #[tokio::test]
    #[ignore]
    async fn test_latest_solutions() {
        let client = AojClient::new(DEFAULT_JUDGE_API_URL).unwrap();
        let solutions = client.latest_solutions().await.unwrap();

        assert!(!solutions.is_empty());
    }
}
