pub mod problems;
pub mod ranking;
pub mod users;

use crate::modules::provider::DataProvider;
use axum::{
    async_trait,
    extract::{Extension, FromRequestParts},
    http::StatusCode,
    Json,
};
use http::request::Parts;
use ijproblems_libs::api::ApiResponse;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use validator::Validate;

/// AOJのユーザIDとして受け付ける形
static AOJ_USERID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9A-Za-z_]+$").unwrap());

/// Lowercase, drop malformed ids, dedup. Request noise is filtered,
/// never an error.
pub(crate) fn sanitize_userids(aoj_userids: &[String]) -> Vec<String> {
    let unique: BTreeSet<String> = aoj_userids
        .iter()
        .map(|aoj_userid| aoj_userid.trim().to_lowercase())
        .filter(|aoj_userid| AOJ_USERID_PATTERN.is_match(aoj_userid))
        .collect();

    unique.into_iter().collect()
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

pub async fn readiness(
    Extension(provider): Extension<Arc<dyn DataProvider>>,
) -> StatusCode {
    match provider.list_problem_ids().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::error!("readiness probe failed cause: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// クエリ文字列をパースして検証する抽出器
///
/// 不正なパラメータは400とエラー封筒で応答する。
pub struct ValidatedParameter<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidatedParameter<T>
where
    T: DeserializeOwned + Validate + Serialize + Default + Clone,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiResponse<T, ()>>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query = parts.uri.query().unwrap_or_default();
        let value: T = serde_structuredqs::from_str(query).map_err(|rejection| {
            tracing::error!("Parsing error: {}", rejection);
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(
                    T::default(),
                    format!("invalid format query string: [{}]", rejection),
                )),
            )
        })?;

        value.validate().map_err(|rejection| {
            tracing::error!("Validation error: {}", rejection);
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(
                    value.clone(),
                    format!("Validation error: [{}]", rejection).replace('\n', ", "),
                )),
            )
        })?;

        Ok(ValidatedParameter(value))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sanitize_lowercases_and_drops_malformed_ids() {
        let ids = vec![
            String::from("Alice"),
            String::from("bob"),
            String::from("  carol "),
            String::from("no;injection"),
            String::from(""),
            String::from("ALICE"),
        ];

        assert_eq!(
            sanitize_userids(&ids),
            vec![
                String::from("alice"),
                String::from("bob"),
                String::from("carol"),
            ]
        );
    }
}
