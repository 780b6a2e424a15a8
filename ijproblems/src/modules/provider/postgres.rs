use super::{ranking_window, AcceptanceEntry, CommitSummary, DataProvider};
use crate::{
    modules::{
        points::{self, NUMBER_OF_CONTEST_TYPES},
        ranking::{sort_ranking_rows, RankingRow, UserAggregate},
    },
    types::tables::{Problem, UserPoint},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::Postgres, Pool, Transaction};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::env;
use tokio_stream::StreamExt;

/// 環境変数からPostgreSQLの接続URLを組み立てるメソッド
pub fn postgres_url() -> Result<String> {
    let user = env::var("POSTGRES_USER").with_context(|| {
        let message = "POSTGRES_USER environment variable must be set";
        tracing::error!(message);
        String::from(message)
    })?;
    let password = env::var("POSTGRES_PASSWORD").with_context(|| {
        let message = "POSTGRES_PASSWORD environment variable must be set";
        tracing::error!(message);
        String::from(message)
    })?;
    let hostname = env::var("POSTGRES_HOST").unwrap_or_else(|_| String::from("postgres"));
    let port = env::var("POSTGRES_PORT")
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(5432);
    let dbname = env::var("POSTGRES_DB").with_context(|| {
        let message = "POSTGRES_DB environment variable must be set";
        tracing::error!(message);
        String::from(message)
    })?;

    Ok(format!(
        "postgres://{}:{}@{}:{}/{}",
        user, password, hostname, port, dbname
    ))
}

pub struct PgDataProvider {
    pool: Pool<Postgres>,
}

impl PgDataProvider {
    pub fn new(pool: Pool<Postgres>) -> Self {
        PgDataProvider { pool }
    }

    /// 1ユーザ分の集計を台帳から再計算して保存するメソッド
    ///
    /// 集計は常にacceptance台帳と問題カタログだけから導出する。
    /// 1問も解いていないコンテスト種別の行は保存しない(不在が0を意味する)。
    async fn recompute_user(tx: &mut Transaction<'_, Postgres>, aoj_userid: &str) -> Result<()> {
        let solved: Vec<(i32, i32)> = sqlx::query_as(
            r#"
            SELECT "problems"."contest_type", "problems"."level"
            FROM "acceptances"
            JOIN "problems" ON "problems"."problem_id" = "acceptances"."problem_id"
            WHERE "acceptances"."aoj_userid" = $1
            "#,
        )
        .bind(aoj_userid)
        .fetch_all(&mut *tx)
        .await?;

        let aggregate = UserAggregate::from_solved(aoj_userid, solved);

        for contest_type in 0..NUMBER_OF_CONTEST_TYPES as i32 {
            if aggregate.is_empty(contest_type) {
                sqlx::query(
                    r#"
                    DELETE FROM "user_points"
                    WHERE "aoj_userid" = $1 AND "contest_type" = $2
                    "#,
                )
                .bind(aoj_userid)
                .bind(contest_type)
                .execute(&mut *tx)
                .await?;
                continue;
            }

            let row = aggregate.to_ranking_row(contest_type);
            sqlx::query(
                r#"
                MERGE INTO "user_points"
                USING
                    (VALUES($1, $2, $3, $4, $5)) AS "user_point"("aoj_userid", "contest_type", "total_point", "total_solved", "solved_counts")
                ON
                    "user_points"."aoj_userid" = "user_point"."aoj_userid"
                    AND "user_points"."contest_type" = "user_point"."contest_type"
                WHEN MATCHED THEN
                    UPDATE SET (
                        "total_point",
                        "total_solved",
                        "solved_counts"
                    ) = (
                        "user_point"."total_point",
                        "user_point"."total_solved",
                        "user_point"."solved_counts"
                    )
                WHEN NOT MATCHED THEN
                    INSERT ("aoj_userid", "contest_type", "total_point", "total_solved", "solved_counts")
                    VALUES ("user_point"."aoj_userid", "user_point"."contest_type", "user_point"."total_point", "user_point"."total_solved", "user_point"."solved_counts");
                "#,
            )
            .bind(aoj_userid)
            .bind(contest_type)
            .bind(row.total_point)
            .bind(row.total_solved)
            .bind(&row.solved_counts)
            .execute(&mut *tx)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl DataProvider for PgDataProvider {
    async fn list_problem_ids(&self) -> Result<HashSet<i64>> {
        let problem_ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT "problem_id" FROM "problems";
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(HashSet::from_iter(problem_ids))
    }

    async fn list_problems(&self) -> Result<Vec<Problem>> {
        let mut stream = sqlx::query_as::<_, Problem>(
            r#"
            SELECT
                "problem_id",
                "contest_type",
                "level",
                "name",
                "org",
                "year",
                "used_in",
                "slot",
                "en",
                "ja"
            FROM
                "problems"
            ORDER BY
                "problem_id"
            "#,
        )
        .fetch(&self.pool);

        let mut problems: Vec<Problem> = Vec::new();
        while let Some(problem) = StreamExt::try_next(&mut stream).await? {
            problems.push(problem);
        }

        Ok(problems)
    }

    async fn get_problem(&self, problem_id: i64) -> Result<Option<Problem>> {
        let problem = sqlx::query_as(
            r#"
            SELECT
                "problem_id",
                "contest_type",
                "level",
                "name",
                "org",
                "year",
                "used_in",
                "slot",
                "en",
                "ja"
            FROM
                "problems"
            WHERE
                "problem_id" = $1
            "#,
        )
        .bind(problem_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(problem)
    }

    async fn commit_acceptances(&self, entries: &[AcceptanceEntry]) -> Result<CommitSummary> {
        let mut tx = self.pool.begin().await.with_context(|| {
            let message = "failed to start transaction";
            tracing::error!(message);
            String::from(message)
        })?;

        let mut inserted = 0usize;
        let mut touched: BTreeSet<&str> = BTreeSet::new();

        for entry in entries.iter() {
            let result = sqlx::query(
                r#"
                INSERT INTO "acceptances" ("aoj_userid", "problem_id", "first_seen")
                VALUES ($1, $2, $3)
                ON CONFLICT ("aoj_userid", "problem_id") DO NOTHING
                "#,
            )
            .bind(&entry.aoj_userid)
            .bind(entry.problem_id)
            .bind(entry.submitted_at)
            .execute(&mut tx)
            .await;

            match result {
                // 既存の(ユーザ, 問題)は挿入0件になる。最初の観測が勝つ
                Ok(done) => {
                    if done.rows_affected() == 1 {
                        inserted += 1;
                        touched.insert(entry.aoj_userid.as_str());
                    }
                }
                Err(e) => {
                    tracing::error!("an error occurred at saving {:?}.", entry);
                    tx.rollback().await?;
                    anyhow::bail!("an error occurred in transaction: {}", e);
                }
            }
        }

        for aoj_userid in touched.iter() {
            if let Err(e) = Self::recompute_user(&mut tx, aoj_userid).await {
                tracing::error!("an error occurred at recomputing {}.", aoj_userid);
                tx.rollback().await?;
                anyhow::bail!("an error occurred in transaction: {}", e);
            }
        }

        tx.commit().await?;

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

        let rows: Vec<UserPoint> = sqlx::query_as(
            r#"
            SELECT
                "aoj_userid",
                "contest_type",
                "total_point",
                "total_solved",
                "solved_counts"
            FROM
                "user_points"
            WHERE
                "contest_type" = $1
            ORDER BY
                "total_point" DESC,
                "aoj_userid" ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(contest_type)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserPoint::into_ranking_row).collect())
    }

    async fn get_user_count(&self, contest_type: i32) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM "user_points" WHERE "contest_type" = $1;
            "#,
        )
        .bind(contest_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as usize)
    }

    async fn get_user_local_ranking(
        &self,
        contest_type: i32,
        aoj_userids: &[String],
    ) -> Result<Vec<RankingRow>> {
        let found: Vec<UserPoint> = sqlx::query_as(
            r#"
            SELECT
                "aoj_userid",
                "contest_type",
                "total_point",
                "total_solved",
                "solved_counts"
            FROM
                "user_points"
            WHERE
                "contest_type" = $1 AND "aoj_userid" = ANY($2)
            "#,
        )
        .bind(contest_type)
        .bind(aoj_userids)
        .fetch_all(&self.pool)
        .await?;

        let mut found: HashMap<String, RankingRow> = found
            .into_iter()
            .map(|row| (row.aoj_userid.clone(), row.into_ranking_row()))
            .collect();

        // 要求されたIDごとに1行。未知のユーザは0埋めの行で補う
        let mut rows: Vec<RankingRow> = aoj_userids
            .iter()
            .map(|aoj_userid| {
                found
                    .remove(aoj_userid)
                    .unwrap_or_else(|| RankingRow::empty(aoj_userid, contest_type))
            })
            .collect();
        sort_ranking_rows(&mut rows);

        Ok(rows)
    }

    async fn get_user_solved_problems(&self, aoj_userid: &str) -> Result<HashSet<i64>> {
        let problem_ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT "problem_id" FROM "acceptances" WHERE "aoj_userid" = $1;
            "#,
        )
        .bind(aoj_userid)
        .fetch_all(&self.pool)
        .await?;

        Ok(HashSet::from_iter(problem_ids))
    }

    async fn get_problems_total_row(&self, contest_type: i32) -> Result<RankingRow> {
        let counts_by_level: Vec<(i32, i64)> = sqlx::query_as(
            r#"
            SELECT "level", COUNT(*) FROM "problems"
            WHERE "contest_type" = $1
            GROUP BY "level"
            "#,
        )
        .bind(contest_type)
        .fetch_all(&self.pool)
        .await?;

        let points = points::points(contest_type).unwrap_or(&[]);
        let mut row = RankingRow::empty("TOTAL", contest_type);
        for (level, count) in counts_by_level {
            let level_index = match usize::try_from(level - 1) {
                Ok(level_index) if level_index < points.len() => level_index,
                _ => continue,
            };
            row.solved_counts[level_index] += count as i32;
            row.total_solved += count as i32;
            row.total_point += points[level_index] * count;
        }

        Ok(row)
    }

    async fn get_problem_acceptance_count(&self, problem_id: i64) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM "acceptances" WHERE "problem_id" = $1;
            "#,
        )
        .bind(problem_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as usize)
    }
}
