use crate::modules::{
    handlers::{sanitize_userids, ValidatedParameter},
    points,
    provider::DataProvider,
    ranking::RankingRow,
};
use crate::types::tables::Problem;
use anyhow::Result;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use ijproblems_libs::api::{deserialize_optional_comma_separated, ApiResponseStats};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, PartialEq, Eq, Clone)]
pub struct ProblemListParameter {
    #[validate(range(min = 0, max = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contest_type: Option<i32>,
    #[validate(range(min = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_lower: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ja: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub en: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_solved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aoj_userid: Option<String>,
    #[validate(length(max = 20))]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_comma_separated"
    )]
    pub rivals: Option<Vec<String>>,
}

impl Default for ProblemListParameter {
    fn default() -> Self {
        Self {
            contest_type: None,
            level_lower: None,
            ja: None,
            en: None,
            hide_solved: None,
            aoj_userid: None,
            rivals: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProblemListResponse {
    pub stats: ApiResponseStats<ProblemListParameter>,
    pub items: Vec<Problem>,
    pub points: Vec<i64>,
    pub total_row: Option<RankingRow>,
    pub local_ranking: Vec<RankingRow>,
    pub user_solved_problems: Vec<i64>,
    pub message: Option<String>,
}

impl ProblemListResponse {
    fn error(params: ProblemListParameter, message: impl ToString) -> Self {
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
            local_ranking: Vec::new(),
            user_solved_problems: Vec::new(),
            message: Some(message.to_string()),
        }
    }
}

pub async fn get_problems(
    ValidatedParameter(params): ValidatedParameter<ProblemListParameter>,
    Extension(provider): Extension<Arc<dyn DataProvider>>,
) -> (StatusCode, Json<ProblemListResponse>) {
    let start_process = Instant::now();

    let contest_type = params.contest_type.unwrap_or(0);
    let level_lower = params.level_lower.unwrap_or(1);
    let ja = params.ja.unwrap_or(true);
    let en = params.en.unwrap_or(true);
    let hide_solved = params.hide_solved.unwrap_or(false);

    let aoj_userid = params
        .aoj_userid
        .as_ref()
        .map(|aoj_userid| sanitize_userids(std::slice::from_ref(aoj_userid)))
        .unwrap_or_default()
        .pop();

    // ユーザ本人とライバルをまとめてローカルランキングの対象にする
    let mut ranking_userids: Vec<String> = params.rivals.clone().unwrap_or_default();
    if let Some(aoj_userid) = aoj_userid.as_ref() {
        ranking_userids.push(aoj_userid.clone());
    }
    let ranking_userids = sanitize_userids(&ranking_userids);

    let result: Result<(Vec<Problem>, RankingRow, Vec<RankingRow>, Vec<i64>)> = async {
        let solved: HashSet<i64> = match aoj_userid.as_ref() {
            Some(aoj_userid) => provider.get_user_solved_problems(aoj_userid).await?,
            None => HashSet::new(),
        };

        let mut items: Vec<Problem> = provider
            .list_problems()
            .await?
            .into_iter()
            .filter(|problem| {
                problem.contest_type == contest_type
                    && problem.level >= level_lower
                    && ((ja && problem.ja) || (en && problem.en))
                    && !(hide_solved && solved.contains(&problem.problem_id))
            })
            .collect();
        items.sort_by_key(|problem| (problem.level, Reverse(problem.year), problem.problem_id));

        let total_row = provider.get_problems_total_row(contest_type).await?;
        let local_ranking = provider
            .get_user_local_ranking(contest_type, &ranking_userids)
            .await?;

        let mut user_solved_problems: Vec<i64> = solved.into_iter().collect();
        user_solved_problems.sort_unstable();

        Ok((items, total_row, local_ranking, user_solved_problems))
    }
    .await;

    let (items, total_row, local_ranking, user_solved_problems) = match result {
        Ok(results) => results,
        Err(e) => {
            tracing::error!("request failed cause: {:?}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ProblemListResponse::error(params, "unexpected error")),
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
        Json(ProblemListResponse {
            stats,
            items,
            points: points::points(contest_type).unwrap_or(&[]).to_vec(),
            total_row: Some(total_row),
            local_ranking,
            user_solved_problems,
            message: None,
        }),
    )
}

#[derive(Debug, Serialize)]
pub struct ProblemDetailResponse {
    pub problem: Option<Problem>,
    pub points: Vec<i64>,
    pub contest: Option<String>,
    pub acceptance_count: u32,
    pub message: Option<String>,
}

/// 問題が属するコンテストの表示名を組み立てるメソッド
fn contest_label(problem: &Problem) -> String {
    match (problem.contest_type, problem.org.as_str()) {
        (0, "Official") => String::from("ICPC Japan Domestic Contest"),
        (0, _) => {
            if problem.used_in.is_empty() {
                String::from("JAG Practice Contest for Japan Domestic")
            } else {
                format!("JAG Practice Contest {} for Japan Domestic", problem.used_in)
            }
        }
        (1, "Official") => String::from("ICPC Asia Japan Regional Contest"),
        (1, _) => format!("JAG {} Contest", problem.used_in),
        _ => String::new(),
    }
}

pub async fn get_problem(
    Path(problem_id): Path<i64>,
    Extension(provider): Extension<Arc<dyn DataProvider>>,
) -> (StatusCode, Json<ProblemDetailResponse>) {
    let result: Result<(Option<Problem>, usize)> = async {
        let problem = provider.get_problem(problem_id).await?;
        let acceptance_count = provider.get_problem_acceptance_count(problem_id).await?;
        Ok((problem, acceptance_count))
    }
    .await;

    let (problem, acceptance_count) = match result {
        Ok(results) => results,
        Err(e) => {
            tracing::error!("request failed cause: {:?}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ProblemDetailResponse {
                    problem: None,
                    points: Vec::new(),
                    contest: None,
                    acceptance_count: 0,
                    message: Some(String::from("unexpected error")),
                }),
            );
        }
    };

    let problem = match problem {
        Some(problem) => problem,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ProblemDetailResponse {
                    problem: None,
                    points: Vec::new(),
                    contest: None,
                    acceptance_count: 0,
                    message: Some(format!("problem {} is not found", problem_id)),
                }),
            );
        }
    };

    let points = points::points(problem.contest_type).unwrap_or(&[]).to_vec();
    let contest = contest_label(&problem);

    (
        StatusCode::OK,
        Json(ProblemDetailResponse {
            problem: Some(problem),
            points,
            contest: Some(contest),
            acceptance_count: acceptance_count as u32,
            message: None,
        }),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deserialize_problem_list_parameter() {
        let query = "contest_type=1&level_lower=3&ja=true&en=false&hide_solved=true&aoj_userid=alice&rivals=bob,carol";
        let params: ProblemListParameter = serde_structuredqs::from_str(query).unwrap();

        let expected = ProblemListParameter {
            contest_type: Some(1),
            level_lower: Some(3),
            ja: Some(true),
            en: Some(false),
            hide_solved: Some(true),
            aoj_userid: Some(String::from("alice")),
            rivals: Some(vec![String::from("bob"), String::from("carol")]),
        };

        assert_eq!(params, expected);
    }

    #[test]
    fn empty_query_string() {
        let params: ProblemListParameter = serde_structuredqs::from_str("").unwrap();
        assert_eq!(params, ProblemListParameter::default());
    }

    fn problem(contest_type: i32, org: &str, used_in: &str) -> Problem {
        Problem {
            problem_id: 2439,
            contest_type,
            level: 3,
            name: String::from("Hakone"),
            org: String::from(org),
            year: 2014,
            used_in: String::from(used_in),
            slot: String::from("A"),
            en: true,
            ja: true,
        }
    }

    #[test]
    fn contest_label_of_each_origin() {
        assert_eq!(
            contest_label(&problem(0, "Official", "")),
            "ICPC Japan Domestic Contest"
        );
        assert_eq!(
            contest_label(&problem(0, "JAG", "2014")),
            "JAG Practice Contest 2014 for Japan Domestic"
        );
        assert_eq!(
            contest_label(&problem(1, "Official", "")),
            "ICPC Asia Japan Regional Contest"
        );
        assert_eq!(
            contest_label(&problem(1, "JAG", "Spring")),
            "JAG Spring Contest"
        );
    }
}
