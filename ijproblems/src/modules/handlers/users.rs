use crate::modules::{
    handlers::{sanitize_userids, ValidatedParameter},
    points,
    provider::DataProvider,
    ranking::RankingRow,
};
use anyhow::Result;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use ijproblems_libs::api::ApiResponseStats;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, PartialEq, Eq, Clone)]
pub struct UserParameter {
    #[validate(range(min = 0, max = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contest_type: Option<i32>,
}

impl Default for UserParameter {
    fn default() -> Self {
        Self { contest_type: None }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub stats: ApiResponseStats<UserParameter>,
    /// The user's own ranking row; zero-valued if the user never solved
    /// anything.
    pub items: Vec<RankingRow>,
    pub points: Vec<i64>,
    pub total_row: Option<RankingRow>,
    pub solved_problem_ids: Vec<i64>,
    pub message: Option<String>,
}

impl UserResponse {
    fn error(params: UserParameter, message: impl ToString) -> Self {
        Self {
            stats: ApiResponseStats {
                time: 0,
                total: 0,
                index: 0,
                count: 0,
                pages: 0,
                params,
            },
            items: Vec::new(),
            points: Vec::new(),
            total_row: None,
            solved_problem_ids: Vec::new(),
            message: Some(message.to_string()),
        }
    }
}

pub async fn get_user(
    Path(aoj_userid): Path<String>,
    ValidatedParameter(params): ValidatedParameter<UserParameter>,
    Extension(provider): Extension<Arc<dyn DataProvider>>,
) -> (StatusCode, Json<UserResponse>) {
    let start_process = Instant::now();

    let contest_type = params.contest_type.unwrap_or(0);
    let aoj_userid = match sanitize_userids(std::slice::from_ref(&aoj_userid)).pop() {
        Some(aoj_userid) => aoj_userid,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(UserResponse::error(params, "invalid user id")),
            );
        }
    };

    let result: Result<(Vec<RankingRow>, RankingRow, Vec<i64>)> = async {
        let items = provider
            .get_user_local_ranking(contest_type, std::slice::from_ref(&aoj_userid))
            .await?;
        let total_row = provider.get_problems_total_row(contest_type).await?;

        let mut solved_problem_ids: Vec<i64> = provider
            .get_user_solved_problems(&aoj_userid)
            .await?
            .into_iter()
            .collect();
        solved_problem_ids.sort_unstable();

        Ok((items, total_row, solved_problem_ids))
    }
    .await;

    let (items, total_row, solved_problem_ids) = match result {
        Ok(results) => results,
        Err(e) => {
            tracing::error!("request failed cause: {:?}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(UserResponse::error(params, "unexpected error")),
            );
        }
    };

    let time = Instant::now().duration_since(start_process).as_millis() as u32;
    let count = items.len() as u32;

    let stats = ApiResponseStats {
        time,
        total: count,
        index: 1,
        count,
        pages: 1,
        params,
    };

    (
        StatusCode::OK,
        Json(UserResponse {
            stats,
            items,
            points: points::points(contest_type).unwrap_or(&[]).to_vec(),
            total_row: Some(total_row),
            solved_problem_ids,
            message: None,
        }),
    )
}
