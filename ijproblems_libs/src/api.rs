use serde::{Deserialize, Deserializer, Serialize};

/// Common envelope of the JSON API responses.
///
/// `P` is the echoed request parameter type, `T` the item type.
#[derive(Debug, Serialize)]
pub struct ApiResponse<P, T>
where
    P: Serialize,
    T: Serialize,
{
    pub stats: ApiResponseStats<P>,
    pub items: Vec<T>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponseStats<P>
where
    P: Serialize,
{
    /// Server-side processing time in milliseconds.
    pub time: u32,
    /// Total number of rows matching the request.
    pub total: u32,
    /// 1-indexed page number of this response.
    pub index: u32,
    /// Number of rows in this response.
    pub count: u32,
    /// Total number of pages.
    pub pages: u32,
    pub params: P,
}

impl<P, T> ApiResponse<P, T>
where
    P: Serialize,
    T: Serialize,
{
    pub fn error(params: P, message: impl ToString) -> Self {
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
            message: Some(message.to_string()),
        }
    }
}

/// Deserialize an optional comma-separated query string value
/// (e.g. `users=alice,bob`) into a list. Empty elements are dropped;
/// a value with no remaining elements becomes `None`.
pub fn deserialize_optional_comma_separated<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    let elements: Option<Vec<String>> = value.map(|value| {
        value
            .split(',')
            .map(|element| element.trim().to_string())
            .filter(|element| !element.is_empty())
            .collect()
    });

    Ok(elements.filter(|elements: &Vec<String>| !elements.is_empty()))
}
