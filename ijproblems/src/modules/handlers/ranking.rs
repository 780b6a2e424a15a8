use crate::modules::{
    handlers::{sanitize_userids, ValidatedParameter},
    points,
    provider::DataProvider,
    ranking::RankingRow,
};
use axum::{extract::Extension, http::StatusCode, Json};
use ijproblems_libs::api::{
    deserialize_optional_comma_separated, ApiResponse, ApiResponseStats,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use validator::Validate;

/// ランキング1ページあたりのユーザ数
pub const USERS_IN_ONE_PAGE: usize = 200;

#[derive(Debug, Serialize, Deserialize, Validate, PartialEq, Eq, Clone)]
pub struct GlobalRankingParameter {
    #[validate(range(min = 0, max = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contest_type: Option<i32>,
    #[validate(range(min = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl Default for GlobalRankingParameter {
    fn default() -> Self {
        Self {
            contest_type: None,
            page: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GlobalRankingResponse {
    pub stats: ApiResponseStats<GlobalRankingParameter>,
    pub items: Vec<RankingRow>,
    pub points: Vec<i64>,
    pub total_row: Option<RankingRow>,
    pub message: Option<String>,
}

impl GlobalRankingResponse {
    fn error(params: GlobalRankingParameter, message: impl ToString) -> Self {
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
            message: Some(message.to_string()),
        }
    }
}

pub async fn get_global_ranking(
    ValidatedParameter(params): ValidatedParameter<GlobalRankingParameter>,
    Extension(provider): Extension<Arc<dyn DataProvider>>,
) -> (StatusCode, Json<GlobalRankingResponse>) {
    let start_process = Instant::now();

    let contest_type = params.contest_type.unwrap_or(0);
    let page = params.page.unwrap_or(1) as usize;
    let begin = (page - 1) * USERS_IN_ONE_PAGE + 1;
    let end = page * USERS_IN_ONE_PAGE;

    let (items, total, total_row) = match tokio::try_join!(
        provider.get_global_ranking(contest_type, begin, end),
        provider.get_user_count(contest_type),
        provider.get_problems_total_row(contest_type),
    ) {
        Ok(results) => results,
        Err(e) => {
            tracing::error!("request failed cause: {:?}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GlobalRankingResponse::error(params, "unexpected error")),
            );
        }
    };

    let time = Instant::now().duration_since(start_process).as_millis() as u32;
    let total = total as u32;
    let count = items.len() as u32;
    let rows = USERS_IN_ONE_PAGE as u32;
    let pages = (total + rows - 1) / rows;

    let stats = ApiResponseStats {
        time,
        total,
        index: page as u32,
        count,
        pages,
        params,
    };

    (
        StatusCode::OK,
        Json(GlobalRankingResponse {
            stats,
            items,
            points: points::points(contest_type).unwrap_or(&[]).to_vec(),
            total_row: Some(total_row),
            message: None,
        }),
    )
}

#[derive(Debug, Serialize, Deserialize, Validate, PartialEq, Eq, Clone)]
pub struct LocalRankingParameter {
    #[validate(range(min = 0, max = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contest_type: Option<i32>,
    /// ユーザ本人とライバルたち。カンマ区切り
    #[validate(length(min = 1, max = 20))]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_comma_separated"
    )]
    pub users: Option<Vec<String>>,
}

impl Default for LocalRankingParameter {
    fn default() -> Self {
        Self {
            contest_type: None,
            users: None,
        }
    }
}

pub async fn get_local_ranking(
    ValidatedParameter(params): ValidatedParameter<LocalRankingParameter>,
    Extension(provider): Extension<Arc<dyn DataProvider>>,
) -> (
    StatusCode,
    Json<ApiResponse<LocalRankingParameter, RankingRow>>,
) {
    let start_process = Instant::now();

    let contest_type = params.contest_type.unwrap_or(0);
    let aoj_userids = sanitize_userids(params.users.as_deref().unwrap_or(&[]));

    let items = match provider
        .get_user_local_ranking(contest_type, &aoj_userids)
        .await
    {
        Ok(items) => items,
        Err(e) => {
            tracing::error!("request failed cause: {:?}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(params, "unexpected error")),
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
        Json(ApiResponse {
            stats,
            items,
            message: None,
        }),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deserialize_global_ranking_parameter() {
        let query = "contest_type=1&page=3";
        let params: GlobalRankingParameter = serde_structuredqs::from_str(query).unwrap();

        assert_eq!(
            params,
            GlobalRankingParameter {
                contest_type: Some(1),
                page: Some(3),
            }
        );
    }

    #[test]
    fn empty_query_string() {
        let params: GlobalRankingParameter = serde_structuredqs::from_str("").unwrap();
        assert_eq!(params, GlobalRankingParameter::default());
    }

    #[test]
    fn out_of_range_parameters_fail_validation() {
        let params: GlobalRankingParameter =
            serde_structuredqs::from_str("contest_type=2&page=0").unwrap();
        assert!(params.validate().is_err());
    }

    #[test]
    fn deserialize_local_ranking_users() {
        let query = "contest_type=0&users=Alice,bob,carol";
        let params: LocalRankingParameter = serde_structuredqs::from_str(query).unwrap();

        assert_eq!(
            params.users,
            Some(vec![
                String::from("Alice"),
                String::from("bob"),
                String::from("carol"),
            ])
        );
    }
}
